//! Dispute conversation rules, cancellation and ruling edge cases.

mod common;

use common::{assert_invariants, Harness};
use gigflow_core::{ActingUser, UserId};
use gigflow_engine::{DisputeRuling, EngineError, NewDispute};
use gigflow_state::{DisputeOutcome, DisputeStatus, PaymentStatus, RejectionReason, TaskStatus};

fn reason(text: &str) -> NewDispute {
    NewDispute {
        reason: text.into(),
    }
}

fn ruling(outcome: DisputeOutcome) -> DisputeRuling {
    DisputeRuling {
        outcome,
        notes: String::new(),
    }
}

#[tokio::test]
async fn only_the_other_party_responds_once() {
    let h = Harness::new();
    let (task_id, doer) = h.assigned().await;
    let dispute = h
        .engine
        .open_dispute(h.poster, task_id, reason("Missed the deadline"))
        .await
        .expect("open")
        .value()
        .clone();

    let err = h
        .engine
        .respond(h.poster, dispute.id, "me again", vec![])
        .await
        .expect_err("initiator responding");
    assert_eq!(err.reason(), Some(RejectionReason::InitiatorCannotRespond));

    let outsider = ActingUser::member(UserId::new());
    let err = h
        .engine
        .respond(outsider, dispute.id, "hello", vec![])
        .await
        .expect_err("outsider responding");
    assert!(matches!(err, EngineError::Unauthorized(_)));

    let responded = h
        .engine
        .respond(
            doer,
            dispute.id,
            "The brief changed twice",
            vec!["https://files.test/chat.png".into(), "  ".into()],
        )
        .await
        .expect("respond");
    assert_eq!(responded.value().responded_by, Some(doer.id));
    assert_eq!(responded.value().response_evidence.len(), 1);

    let err = h
        .engine
        .respond(doer, dispute.id, "one more thing", vec![])
        .await
        .expect_err("second response");
    assert_eq!(err.reason(), Some(RejectionReason::AlreadyResponded));
}

#[tokio::test]
async fn follow_ups_append_in_order_while_open() {
    let h = Harness::new();
    let (task_id, doer) = h.assigned().await;
    let dispute_id = h
        .engine
        .open_dispute(doer, task_id, reason("Unclear requirements"))
        .await
        .expect("open")
        .value()
        .id;

    for (sender, message) in [(doer, "first"), (h.poster, "second"), (doer, "third")] {
        h.engine
            .add_follow_up(sender, dispute_id, message, vec![])
            .await
            .expect("follow up");
    }
    let view = h.engine.dispute_view(dispute_id).await.expect("view");
    let messages: Vec<_> = view.follow_ups.iter().map(|f| f.message.as_str()).collect();
    assert_eq!(messages, ["first", "second", "third"]);

    h.engine
        .cancel_dispute(doer, dispute_id)
        .await
        .expect("cancel");
    let err = h
        .engine
        .add_follow_up(h.poster, dispute_id, "too late", vec![])
        .await
        .expect_err("closed dispute");
    assert_eq!(err.reason(), Some(RejectionReason::DisputeNotOpen));
}

#[tokio::test]
async fn cancel_restores_the_pre_dispute_status() {
    let h = Harness::new();
    let (task_id, doer) = h.under_review().await;
    let dispute_id = h
        .engine
        .open_dispute(h.poster, task_id, reason("Files are corrupt"))
        .await
        .expect("open")
        .value()
        .id;

    let cancelled = h
        .engine
        .cancel_dispute(h.admin, dispute_id)
        .await
        .expect("admin cancel");
    assert_eq!(cancelled.value().status, DisputeStatus::Cancelled);
    assert!(cancelled.value().closed_at.is_some());

    let agg = h.aggregate(task_id).await;
    assert_eq!(agg.task.status, TaskStatus::UnderReview);
    assert_eq!(agg.payment_status(), Some(PaymentStatus::Pending));
    assert_invariants(&agg);

    // Settlement is unblocked again.
    h.engine
        .approve_work(h.poster, task_id)
        .await
        .expect("approve after cancel");
    assert_eq!(h.aggregate(task_id).await.task.status, TaskStatus::Completed);
    assert!(!h.balance(doer).await.is_zero());
}

#[tokio::test]
async fn only_admins_resolve() {
    let h = Harness::new();
    let (task_id, doer) = h.assigned().await;
    let dispute_id = h
        .engine
        .open_dispute(doer, task_id, reason("Poster unresponsive"))
        .await
        .expect("open")
        .value()
        .id;

    let err = h
        .engine
        .resolve(h.poster, dispute_id, ruling(DisputeOutcome::Refund))
        .await
        .expect_err("member resolving");
    assert!(matches!(err, EngineError::Unauthorized(_)));
    assert_eq!(h.aggregate(task_id).await.task.status, TaskStatus::InDispute);
}

#[tokio::test]
async fn conflicting_ruling_on_resolved_dispute_is_rejected() {
    let h = Harness::new();
    let (task_id, doer) = h.assigned().await;
    let dispute_id = h
        .engine
        .open_dispute(doer, task_id, reason("Poster unresponsive"))
        .await
        .expect("open")
        .value()
        .id;
    h.engine
        .resolve(h.admin, dispute_id, ruling(DisputeOutcome::Release))
        .await
        .expect("release");

    let err = h
        .engine
        .resolve(h.admin, dispute_id, ruling(DisputeOutcome::Refund))
        .await
        .expect_err("flip ruling");
    assert_eq!(err.reason(), Some(RejectionReason::OutcomeMismatch));
    assert_eq!(h.aggregate(task_id).await.payment_status(), Some(PaymentStatus::Released));
}

#[tokio::test]
async fn one_open_dispute_and_none_on_open_or_completed_tasks() {
    let h = Harness::new();
    let (task_id, doer) = h.assigned().await;
    h.engine
        .open_dispute(doer, task_id, reason("first"))
        .await
        .expect("open");
    let err = h
        .engine
        .open_dispute(h.poster, task_id, reason("second"))
        .await
        .expect_err("second dispute");
    assert_eq!(err.reason(), Some(RejectionReason::DisputeOpen));

    let open_task = h.task(50).await;
    let err = h
        .engine
        .open_dispute(h.poster, open_task, reason("nobody assigned"))
        .await
        .expect_err("open task");
    assert_eq!(err.reason(), Some(RejectionReason::NotDisputable));

    let (done, doer) = h.under_review().await;
    h.engine.approve_work(h.poster, done).await.expect("approve");
    let err = h
        .engine
        .open_dispute(doer, done, reason("after the fact"))
        .await
        .expect_err("completed task");
    assert_eq!(err.reason(), Some(RejectionReason::NotDisputable));
}

#[tokio::test]
async fn empty_reason_is_a_validation_error() {
    let h = Harness::new();
    let (task_id, doer) = h.assigned().await;
    let err = h
        .engine
        .open_dispute(doer, task_id, reason("   "))
        .await
        .expect_err("blank reason");
    assert!(matches!(err, EngineError::Validation(_)));
}
