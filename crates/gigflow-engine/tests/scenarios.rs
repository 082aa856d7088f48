//! # End-to-End Lifecycle Scenarios
//!
//! Each test drives the engine through one complete path against the
//! in-memory ledger and checks task, bid, payment and balance rows.

mod common;

use common::{assert_invariants, Harness};
use gigflow_core::Money;
use gigflow_engine::{DisputeRuling, EngineError, NewDispute, Outcome};
use gigflow_state::{
    BidStatus, DisputeOutcome, DisputeStatus, PaymentStatus, RejectionReason, TaskStatus,
};

#[tokio::test]
async fn direct_acceptance_assigns_and_rejects_siblings() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (bid60, doer) = h.bid(task_id, 60).await;
    let (bid80, loser) = h.bid(task_id, 80).await;

    let outcome = h
        .engine
        .accept_bid(h.poster, task_id, bid60)
        .await
        .expect("accept");
    assert!(outcome.is_applied());

    let agg = h.aggregate(task_id).await;
    assert_eq!(agg.task.status, TaskStatus::Assigned);
    assert_eq!(agg.task.doer_id, Some(doer.id));
    assert_eq!(agg.bid(bid60).map(|b| b.status), Some(BidStatus::Accepted));
    assert_eq!(agg.bid(bid80).map(|b| b.status), Some(BidStatus::Rejected));
    let payment = agg.payment.as_ref().expect("payment row");
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, Money::from_units(60));
    assert!(payment.captured_at.is_none());
    assert_invariants(&agg);

    let notified: Vec<_> = outcome
        .events()
        .iter()
        .flat_map(|e| e.recipients())
        .collect();
    assert!(notified.contains(&doer.id));
    assert!(notified.contains(&loser.id));
}

#[tokio::test]
async fn escrow_capture_assigns_and_replay_is_quiet() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (bid60, _) = h.bid(task_id, 60).await;
    let (bid80, doer) = h.bid(task_id, 80).await;

    let checkout = h
        .engine
        .initiate_payment(h.poster, task_id, bid80)
        .await
        .expect("initiate");
    let payment = checkout.value().payment.clone();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, Money::from_units(80));
    assert_eq!(checkout.value().form.field("amount"), Some("80.00"));
    assert_eq!(
        checkout.value().form.field("m_payment_id"),
        Some(payment.correlation_id.as_str())
    );
    assert_eq!(h.aggregate(task_id).await.task.status, TaskStatus::Open);

    let callback = h.callback(&payment.correlation_id, "COMPLETE", "80.00");
    let first = h
        .engine
        .confirm_callback(callback.clone())
        .await
        .expect("confirm");
    assert!(first.is_applied());

    let after_first = h.aggregate(task_id).await;
    assert_eq!(after_first.task.status, TaskStatus::Assigned);
    assert_eq!(after_first.task.doer_id, Some(doer.id));
    assert_eq!(after_first.bid(bid80).map(|b| b.status), Some(BidStatus::Accepted));
    assert_eq!(after_first.bid(bid60).map(|b| b.status), Some(BidStatus::Rejected));
    let held = after_first.payment.as_ref().expect("payment row");
    assert_eq!(held.status, PaymentStatus::Pending);
    assert!(held.captured_at.is_some());
    assert_eq!(
        held.verification_payload.as_ref().map(|v| v["pf_payment_id"].clone()),
        Some(serde_json::json!("1089250"))
    );
    assert_invariants(&after_first);

    let replay = h.engine.confirm_callback(callback).await.expect("replay");
    assert!(matches!(replay, Outcome::AlreadyProcessed { .. }));
    assert!(replay.events().is_empty());
    assert_eq!(h.aggregate(task_id).await, after_first);
}

#[tokio::test]
async fn approval_releases_and_credits_the_doer() {
    let h = Harness::new();
    let (task_id, doer) = h.under_review().await;
    assert_eq!(h.aggregate(task_id).await.task.status, TaskStatus::UnderReview);

    let approved = h
        .engine
        .approve_work(h.poster, task_id)
        .await
        .expect("approve");
    assert!(approved.is_applied());

    let agg = h.aggregate(task_id).await;
    assert_eq!(agg.task.status, TaskStatus::Completed);
    assert_eq!(agg.payment_status(), Some(PaymentStatus::Released));
    assert_eq!(h.balance(doer).await, Money::from_units(60));
    assert_invariants(&agg);
}

#[tokio::test]
async fn dispute_blocks_approval_until_release_ruling() {
    let h = Harness::new();
    let (task_id, doer) = h.assigned().await;

    let dispute = h
        .engine
        .open_dispute(
            doer,
            task_id,
            NewDispute {
                reason: "Scope changed after assignment".into(),
            },
        )
        .await
        .expect("open dispute")
        .value()
        .clone();
    let agg = h.aggregate(task_id).await;
    assert_eq!(agg.task.status, TaskStatus::InDispute);
    assert_eq!(agg.payment_status(), Some(PaymentStatus::Disputed));
    assert_eq!(dispute.pre_dispute_status, TaskStatus::Assigned);

    let err = h
        .engine
        .approve_work(h.poster, task_id)
        .await
        .expect_err("approval while disputed");
    assert!(matches!(err, EngineError::InvalidState { .. }));
    assert_eq!(err.reason(), Some(RejectionReason::DisputeOpen));

    let ruling = DisputeRuling {
        outcome: DisputeOutcome::Release,
        notes: "Work matches the brief".into(),
    };
    let resolved = h
        .engine
        .resolve(h.admin, dispute.id, ruling.clone())
        .await
        .expect("resolve");
    assert_eq!(resolved.value().status, DisputeStatus::ResolvedRelease);
    assert_eq!(resolved.value().resolved_by, Some(h.admin.id));

    let agg = h.aggregate(task_id).await;
    assert_eq!(agg.task.status, TaskStatus::Completed);
    assert_eq!(agg.payment_status(), Some(PaymentStatus::Released));
    assert_eq!(h.balance(doer).await, Money::from_units(60));
    assert_invariants(&agg);

    let retry = h
        .engine
        .resolve(h.admin, dispute.id, ruling)
        .await
        .expect("retry");
    assert!(!retry.is_applied());
    assert_eq!(h.balance(doer).await, Money::from_units(60));
}

#[tokio::test]
async fn refund_ruling_cancels_without_crediting() {
    let h = Harness::new();
    let (task_id, doer) = h.assigned().await;
    h.engine
        .start_work(doer, task_id)
        .await
        .expect("start work");

    let dispute = h
        .engine
        .open_dispute(
            h.poster,
            task_id,
            NewDispute {
                reason: "No progress for two weeks".into(),
            },
        )
        .await
        .expect("open dispute")
        .value()
        .clone();
    assert_eq!(dispute.pre_dispute_status, TaskStatus::InProgress);

    h.engine
        .resolve(
            h.admin,
            dispute.id,
            DisputeRuling {
                outcome: DisputeOutcome::Refund,
                notes: String::new(),
            },
        )
        .await
        .expect("resolve");

    let agg = h.aggregate(task_id).await;
    assert_eq!(agg.task.status, TaskStatus::Cancelled);
    assert_eq!(agg.payment_status(), Some(PaymentStatus::Refunded));
    assert!(agg.task.doer_id.is_none());
    assert!(agg.accepted_bid().is_none());
    assert_eq!(h.balance(doer).await, Money::zero());
    assert_invariants(&agg);
}
