//! # Application State
//!
//! Shared state handed to every route handler through the `State`
//! extractor. The engine owns all lifecycle rules; the state only wires it
//! to the configured ledger, payment processor and event collaborators.

use std::sync::Arc;

use gigflow_engine::{
    BroadcastHub, CallbackSigner, CallbackUrls, Engine, EventDispatcher, HostedCheckout, Outcome,
    TracingNotifier,
};
use gigflow_ledger::Ledger;

use crate::config::AppConfig;

/// Handle shared by all handlers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<Engine<Ledger>>,
    pub dispatcher: EventDispatcher,
    /// Realtime hub; subscribe to receive task and dispute channels.
    pub hub: BroadcastHub,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the engine over `ledger` with the hosted checkout from `config`.
    pub fn new(config: AppConfig, ledger: Ledger) -> Self {
        let processor = HostedCheckout::new(
            config.payment.merchant_id.clone(),
            config.payment.process_url.clone(),
            CallbackUrls::from_base(&config.public_base_url),
            CallbackSigner::new(config.payment.secret.clone()),
        );
        let hub = BroadcastHub::default();
        let dispatcher = EventDispatcher::new(Arc::new(TracingNotifier), Arc::new(hub.clone()));
        Self {
            engine: Arc::new(Engine::new(ledger, Arc::new(processor))),
            dispatcher,
            hub,
            config: Arc::new(config),
        }
    }

    /// Dispatch the events of a committed operation and return its value.
    pub async fn settle<T>(&self, outcome: Outcome<T>) -> T {
        let (value, events) = outcome.into_parts();
        self.dispatcher.dispatch(&events).await;
        value
    }
}
