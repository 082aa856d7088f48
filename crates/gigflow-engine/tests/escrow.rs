//! Escrow initiation and processor callback handling.

mod common;

use common::{assert_invariants, Harness};
use gigflow_core::Money;
use gigflow_engine::{DisputeRuling, EngineError, NewDispute, Outcome};
use gigflow_state::{BidStatus, DisputeOutcome, PaymentStatus, RejectionReason, TaskStatus};

#[tokio::test]
async fn incomplete_status_changes_nothing() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (bid_id, _) = h.bid(task_id, 70).await;
    let checkout = h
        .engine
        .initiate_payment(h.poster, task_id, bid_id)
        .await
        .expect("initiate");
    let before = h.aggregate(task_id).await;

    let callback = h.callback(&checkout.value().payment.correlation_id, "CANCELLED", "70.00");
    let err = h
        .engine
        .confirm_callback(callback)
        .await
        .expect_err("not complete");
    assert_eq!(err.reason(), Some(RejectionReason::PaymentNotConfirmed));
    assert_eq!(h.aggregate(task_id).await, before);
}

#[tokio::test]
async fn tampered_callback_is_rejected() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (bid_id, _) = h.bid(task_id, 70).await;
    let checkout = h
        .engine
        .initiate_payment(h.poster, task_id, bid_id)
        .await
        .expect("initiate");
    let correlation = checkout.value().payment.correlation_id.clone();

    let mut callback = h.callback(&correlation, "COMPLETE", "70.00");
    callback.signature = "00".repeat(32);
    let err = h
        .engine
        .confirm_callback(callback)
        .await
        .expect_err("bad signature");
    assert!(matches!(err, EngineError::SignatureInvalid));

    let mut callback = h.callback(&correlation, "COMPLETE", "70.00");
    for (name, value) in callback.fields.iter_mut() {
        if name == "amount_gross" {
            *value = "1.00".into();
        }
    }
    let err = h
        .engine
        .confirm_callback(callback)
        .await
        .expect_err("altered field");
    assert!(matches!(err, EngineError::SignatureInvalid));

    assert_eq!(h.aggregate(task_id).await.task.status, TaskStatus::Open);
}

#[tokio::test]
async fn unknown_correlation_is_not_found() {
    let h = Harness::new();
    let callback = h.callback("no-such-payment", "COMPLETE", "10.00");
    let err = h
        .engine
        .confirm_callback(callback)
        .await
        .expect_err("unknown");
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn amount_mismatch_is_rejected() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (bid_id, _) = h.bid(task_id, 70).await;
    let checkout = h
        .engine
        .initiate_payment(h.poster, task_id, bid_id)
        .await
        .expect("initiate");

    let callback = h.callback(&checkout.value().payment.correlation_id, "COMPLETE", "69.99");
    let err = h
        .engine
        .confirm_callback(callback)
        .await
        .expect_err("short capture");
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.aggregate(task_id).await.task.status, TaskStatus::Open);
}

#[tokio::test]
async fn reinitiating_repoints_the_single_payment_row() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (first_bid, _) = h.bid(task_id, 60).await;
    let (second_bid, doer) = h.bid(task_id, 90).await;

    let first = h
        .engine
        .initiate_payment(h.poster, task_id, first_bid)
        .await
        .expect("first initiate")
        .value()
        .payment
        .clone();
    let second = h
        .engine
        .initiate_payment(h.poster, task_id, second_bid)
        .await
        .expect("second initiate")
        .value()
        .payment
        .clone();
    assert_eq!(first.id, second.id);
    assert_ne!(first.correlation_id, second.correlation_id);
    assert_eq!(second.amount, Money::from_units(90));

    let stale = h.callback(&first.correlation_id, "COMPLETE", "60.00");
    let err = h
        .engine
        .confirm_callback(stale)
        .await
        .expect_err("stale correlation");
    assert!(matches!(err, EngineError::NotFound(_)));

    let fresh = h.callback(&second.correlation_id, "COMPLETE", "90.00");
    h.engine.confirm_callback(fresh).await.expect("confirm");
    let agg = h.aggregate(task_id).await;
    assert_eq!(agg.task.doer_id, Some(doer.id));
    assert_eq!(agg.bid(first_bid).map(|b| b.status), Some(BidStatus::Rejected));
    assert_invariants(&agg);
}

#[tokio::test]
async fn only_the_poster_may_initiate() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (bid_id, bidder) = h.bid(task_id, 70).await;
    let err = h
        .engine
        .initiate_payment(bidder, task_id, bid_id)
        .await
        .expect_err("bidder initiating");
    assert!(matches!(err, EngineError::Unauthorized(_)));
}

#[tokio::test]
async fn direct_acceptance_closes_the_escrow_path() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (escrow_bid, _) = h.bid(task_id, 70).await;
    let (direct_bid, _) = h.bid(task_id, 75).await;
    h.engine
        .initiate_payment(h.poster, task_id, escrow_bid)
        .await
        .expect("initiate");

    // A payment row now exists, so direct acceptance is refused.
    let err = h
        .engine
        .accept_bid(h.poster, task_id, direct_bid)
        .await
        .expect_err("accept after initiate");
    assert_eq!(err.reason(), Some(RejectionReason::PaymentExists));

    let (task_id, _) = h.assigned().await;
    let bid_id = h.aggregate(task_id).await.bids[1].id;
    let err = h
        .engine
        .initiate_payment(h.poster, task_id, bid_id)
        .await
        .expect_err("initiate after assignment");
    assert_eq!(err.reason(), Some(RejectionReason::TaskNotOpen));
}

#[tokio::test]
async fn replay_after_settlement_stays_quiet() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (bid_id, doer) = h.bid(task_id, 50).await;
    let correlation = h
        .engine
        .initiate_payment(h.poster, task_id, bid_id)
        .await
        .expect("initiate")
        .value()
        .payment
        .correlation_id
        .clone();
    let callback = h.callback(&correlation, "COMPLETE", "50.00");
    h.engine
        .confirm_callback(callback.clone())
        .await
        .expect("confirm");

    h.engine
        .submit_work(doer, task_id, serde_json::json!({"note": "done"}))
        .await
        .expect("submit");
    h.engine
        .approve_work(h.poster, task_id)
        .await
        .expect("approve");

    let replay = h.engine.confirm_callback(callback).await.expect("replay");
    assert!(matches!(replay, Outcome::AlreadyProcessed { .. }));
    let agg = h.aggregate(task_id).await;
    assert_eq!(agg.task.status, TaskStatus::Completed);
    assert_eq!(agg.payment_status(), Some(PaymentStatus::Released));
    assert_eq!(h.balance(doer).await, Money::from_units(50));
}

#[tokio::test]
async fn replay_after_refund_stays_quiet() {
    let h = Harness::new();
    let task_id = h.task(100).await;
    let (bid_id, doer) = h.bid(task_id, 50).await;
    let correlation = h
        .engine
        .initiate_payment(h.poster, task_id, bid_id)
        .await
        .expect("initiate")
        .value()
        .payment
        .correlation_id
        .clone();
    let callback = h.callback(&correlation, "COMPLETE", "50.00");
    h.engine
        .confirm_callback(callback.clone())
        .await
        .expect("confirm");

    let dispute_id = h
        .engine
        .open_dispute(doer, task_id, NewDispute { reason: "Scope changed".into() })
        .await
        .expect("open dispute")
        .value()
        .id;
    let ruling = DisputeRuling {
        outcome: DisputeOutcome::Refund,
        notes: String::new(),
    };
    h.engine
        .resolve(h.admin, dispute_id, ruling)
        .await
        .expect("refund");

    let replay = h.engine.confirm_callback(callback).await.expect("replay");
    assert!(matches!(replay, Outcome::AlreadyProcessed { .. }));
    let agg = h.aggregate(task_id).await;
    assert_eq!(agg.task.status, TaskStatus::Cancelled);
    assert_eq!(agg.task.accepted_bid_id, None);
    assert_eq!(agg.payment_status(), Some(PaymentStatus::Refunded));
    assert_eq!(h.balance(doer).await, Money::zero());
    assert_invariants(&agg);
}
