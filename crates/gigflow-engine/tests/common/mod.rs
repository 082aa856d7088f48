//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use gigflow_core::{ActingUser, BidId, Money, TaskId, UserId};
use gigflow_engine::{
    CallbackSigner, CallbackUrls, Engine, HostedCheckout, NewTask, PaymentCallback,
};
use gigflow_ledger::{LedgerStore, MemoryLedger, TaskAggregate};
use gigflow_state::{BidStatus, TaskStatus};

pub const SECRET: &str = "escrow-test-secret";

pub struct Harness {
    pub engine: Arc<Engine<MemoryLedger>>,
    pub signer: CallbackSigner,
    pub poster: ActingUser,
    pub admin: ActingUser,
}

impl Harness {
    pub fn new() -> Self {
        let signer = CallbackSigner::new(SECRET);
        let processor = HostedCheckout::new(
            "10000100",
            "https://processor.test/eng/process",
            CallbackUrls::from_base("https://gigs.test"),
            signer.clone(),
        );
        Self {
            engine: Arc::new(Engine::new(MemoryLedger::new(), Arc::new(processor))),
            signer,
            poster: ActingUser::member(UserId::new()),
            admin: ActingUser::admin(UserId::new()),
        }
    }

    /// An `OPEN` task with the given budget.
    pub async fn task(&self, budget: u32) -> TaskId {
        let new = NewTask {
            title: "Design a logo".into(),
            budget: Money::from_units(budget),
            deadline: Utc::now() + Duration::days(7),
        };
        self.engine
            .create_task(self.poster, new)
            .await
            .expect("create task")
            .value()
            .id
    }

    /// A bid from a fresh member.
    pub async fn bid(&self, task_id: TaskId, amount: u32) -> (BidId, ActingUser) {
        let bidder = ActingUser::member(UserId::new());
        let bid = self
            .engine
            .place_bid(bidder, task_id, Money::from_units(amount))
            .await
            .expect("place bid");
        (bid.value().id, bidder)
    }

    /// A task directly assigned to a doer, with a losing sibling bid.
    pub async fn assigned(&self) -> (TaskId, ActingUser) {
        let task_id = self.task(100).await;
        let (bid_id, doer) = self.bid(task_id, 60).await;
        self.bid(task_id, 80).await;
        self.engine
            .accept_bid(self.poster, task_id, bid_id)
            .await
            .expect("accept bid");
        (task_id, doer)
    }

    /// A task submitted for review.
    pub async fn under_review(&self) -> (TaskId, ActingUser) {
        let (task_id, doer) = self.assigned().await;
        self.engine
            .submit_work(doer, task_id, serde_json::json!({"files": ["logo.svg"]}))
            .await
            .expect("submit work");
        (task_id, doer)
    }

    pub async fn aggregate(&self, task_id: TaskId) -> TaskAggregate {
        self.engine
            .store()
            .aggregate(task_id)
            .await
            .expect("store")
            .expect("task exists")
    }

    pub async fn balance(&self, user: ActingUser) -> Money {
        self.engine.balance(user.id).await.expect("balance")
    }

    /// A callback signed over every field in order.
    pub fn callback(&self, correlation_id: &str, status: &str, amount: &str) -> PaymentCallback {
        let mut fields = vec![
            ("m_payment_id".to_string(), correlation_id.to_string()),
            ("pf_payment_id".to_string(), "1089250".to_string()),
            ("payment_status".to_string(), status.to_string()),
            ("amount_gross".to_string(), amount.to_string()),
        ];
        let signature = self
            .signer
            .sign_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        fields.push(("signature".to_string(), signature));
        PaymentCallback::from_fields(fields).expect("well-formed callback")
    }
}

/// Checks the task-level invariants that must hold after every commit.
pub fn assert_invariants(agg: &TaskAggregate) {
    let engaged = !matches!(agg.task.status, TaskStatus::Open | TaskStatus::Cancelled);
    assert_eq!(
        agg.task.doer_id.is_some(),
        engaged,
        "doer presence must track status {}",
        agg.task.status
    );

    let accepted: Vec<_> = agg
        .bids
        .iter()
        .filter(|b| b.status == BidStatus::Accepted)
        .collect();
    assert!(accepted.len() <= 1, "more than one accepted bid");
    if let Some(bid) = accepted.first() {
        assert_eq!(Some(bid.user_id), agg.task.doer_id);
        assert_eq!(Some(bid.id), agg.task.accepted_bid_id);
    }
}
