//! # gigflow-engine — Assignment Lifecycle & Escrow Settlement
//!
//! Moves a task from posting through bidding, escrow, work, review and
//! settlement, with disputes able to freeze settlement and overrule it.
//!
//! ## Services
//!
//! - **Bid acceptance** ([`bids`]): create and cancel tasks, place bids,
//!   accept one bid and reject the rest.
//! - **Escrow payment** ([`escrow`]): initiate a processor checkout and
//!   apply the signed capture callback, idempotently.
//! - **Completion & settlement** ([`settlement`]): start, submit, request
//!   revisions, approve and release funds to the doer.
//! - **Dispute resolution** ([`dispute`]): open, respond, follow up,
//!   resolve by admin ruling, or cancel.
//!
//! ## Guarantees
//!
//! Every mutating operation is a single [`LedgerStore::transact`] call:
//! preconditions are checked against rows read inside the transaction
//! and all writes commit together or not at all. Replays of operations
//! that already took effect return [`Outcome::AlreadyProcessed`] and write
//! nothing, so webhook retries and double clicks never double-credit.
//!
//! Events describing each commit are returned to the caller rather than
//! delivered here; see [`events::EventDispatcher`].
//!
//! [`LedgerStore::transact`]: gigflow_ledger::LedgerStore::transact

pub mod bids;
pub mod dispute;
pub mod engine;
pub mod error;
pub mod escrow;
pub mod events;
pub mod outcome;
pub mod processor;
pub mod settlement;
pub mod signature;

pub use bids::NewTask;
pub use dispute::{DisputeRuling, NewDispute};
pub use engine::{DisputeView, Engine, TaskView};
pub use error::EngineError;
pub use escrow::Checkout;
pub use events::{
    Broadcast, BroadcastHub, Broadcaster, DispatchError, DomainEvent, EventDispatcher,
    Notification, Notifier, TracingNotifier,
};
pub use outcome::Outcome;
pub use processor::{CallbackUrls, CheckoutForm, CheckoutRequest, HostedCheckout, PaymentProcessor};
pub use signature::{CallbackError, CallbackSigner, PaymentCallback, SignatureError};
