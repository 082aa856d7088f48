//! # Task/Payment Transition Function
//!
//! The lifecycle of a task and its escrow payment is one state machine over
//! the pair `(TaskStatus, Option<PaymentStatus>)`. [`transition()`] is the
//! single place that decides whether an event is legal from a given pair and
//! what the resulting pair is.
//!
//! ```text
//!   OPEN ──BidAccepted / PaymentConfirmed──▶ ASSIGNED ──WorkStarted──▶ IN_PROGRESS
//!     │                                         │   ◀──RevisionRequested──┐  │
//!     │                                         └──WorkSubmitted──▶ UNDER_REVIEW
//!     └──TaskCancelled──▶ CANCELLED                                      │
//!                              ▲                        WorkApproved ────┴──▶ COMPLETED
//!                              │                                               ▲
//!   {ASSIGNED, IN_PROGRESS, UNDER_REVIEW} ──DisputeOpened──▶ IN_DISPUTE ───────┤ Release
//!                              └──────────────── Refund ────────┘   └─Cancelled(restore)
//! ```
//!
//! The function is pure. Guards that depend on data outside the status
//! pair (who is calling, whether a bid belongs to the task) live in the
//! engine services; the reason codes they reject with are shared here so
//! every rejection carries one closed vocabulary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::{PaymentStatus, TaskStatus};

/// An event applied to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Direct acceptance of a bid by the poster.
    BidAccepted,
    /// The payment processor confirmed capture of escrowed funds.
    PaymentConfirmed,
    /// The doer started work.
    WorkStarted,
    /// The doer submitted work for review.
    WorkSubmitted,
    /// The poster sent submitted work back for changes.
    RevisionRequested,
    /// The poster approved the work; funds settle to the doer.
    WorkApproved,
    /// Either party opened a dispute.
    DisputeOpened,
    /// Admin ruling in the poster's favour.
    DisputeResolvedRefund,
    /// Admin ruling in the doer's favour.
    DisputeResolvedRelease,
    /// The dispute was withdrawn; the task returns to `restore`.
    DisputeCancelled {
        /// Status recorded on the dispute when it was opened.
        restore: TaskStatus,
    },
    /// The poster withdrew the task before assignment.
    TaskCancelled,
}

impl TaskEvent {
    /// Stable event name used in logs and error payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BidAccepted => "BidAccepted",
            Self::PaymentConfirmed => "PaymentConfirmed",
            Self::WorkStarted => "WorkStarted",
            Self::WorkSubmitted => "WorkSubmitted",
            Self::RevisionRequested => "RevisionRequested",
            Self::WorkApproved => "WorkApproved",
            Self::DisputeOpened => "DisputeOpened",
            Self::DisputeResolvedRefund => "DisputeResolvedRefund",
            Self::DisputeResolvedRelease => "DisputeResolvedRelease",
            Self::DisputeCancelled { .. } => "DisputeCancelled",
            Self::TaskCancelled => "TaskCancelled",
        }
    }
}

impl std::fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The status pair after a legal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// New task status.
    pub task: TaskStatus,
    /// New payment status. `None` only when no payment row exists.
    pub payment: Option<PaymentStatus>,
}

/// Why an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The task is no longer accepting bids.
    TaskNotOpen,
    /// A payment row already exists for the task.
    PaymentExists,
    /// The task has no payment row.
    PaymentMissing,
    /// The payment is not in the `PENDING` state.
    PaymentNotPending,
    /// The payment is not held by a dispute.
    PaymentNotDisputed,
    /// Disputes may only be opened on engaged, unsettled tasks.
    NotDisputable,
    /// The task has no open dispute.
    NotInDispute,
    /// The remembered pre-dispute status is not one a dispute can return to.
    InvalidRestoreState,
    /// The event is not legal from the current task status.
    WrongState,
    /// Settlement is frozen by an open dispute.
    DisputeOpen,
    /// A poster cannot accept their own bid.
    SelfAcceptance,
    /// The bid was already accepted or rejected.
    BidNotPending,
    /// The dispute has already been resolved or cancelled.
    DisputeNotOpen,
    /// The dispute already carries a response.
    AlreadyResponded,
    /// Only the non-initiating party may respond.
    InitiatorCannotRespond,
    /// The processor reported a status other than `complete`.
    PaymentNotConfirmed,
    /// The caller already bid on this task.
    BidAlreadyPlaced,
    /// A retried ruling named a different outcome than the recorded one.
    OutcomeMismatch,
}

impl RejectionReason {
    /// Machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TaskNotOpen => "task_not_open",
            Self::PaymentExists => "payment_exists",
            Self::PaymentMissing => "payment_missing",
            Self::PaymentNotPending => "payment_not_pending",
            Self::PaymentNotDisputed => "payment_not_disputed",
            Self::NotDisputable => "not_disputable",
            Self::NotInDispute => "not_in_dispute",
            Self::InvalidRestoreState => "invalid_restore_state",
            Self::WrongState => "wrong_state",
            Self::DisputeOpen => "dispute_open",
            Self::SelfAcceptance => "self_acceptance",
            Self::BidNotPending => "bid_not_pending",
            Self::DisputeNotOpen => "dispute_not_open",
            Self::AlreadyResponded => "already_responded",
            Self::InitiatorCannotRespond => "initiator_cannot_respond",
            Self::PaymentNotConfirmed => "payment_not_confirmed",
            Self::BidAlreadyPlaced => "bid_already_placed",
            Self::OutcomeMismatch => "outcome_mismatch",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A refused transition, with the pair it was attempted from.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{event} rejected from task {from} (payment {}): {reason}", payment_label(.payment))]
pub struct Rejection {
    /// Task status the event was applied to.
    pub from: TaskStatus,
    /// Payment status the event was applied to.
    pub payment: Option<PaymentStatus>,
    /// The attempted event.
    pub event: TaskEvent,
    /// Reason code.
    pub reason: RejectionReason,
}

fn payment_label(payment: &Option<PaymentStatus>) -> &'static str {
    payment.map(|p| p.as_str()).unwrap_or("NONE")
}

/// Apply `event` to the pair `(task, payment)`.
///
/// Returns the next pair, or a [`Rejection`] naming the reason. Every
/// successful transition out of `OPEN` requires either no payment row
/// (direct acceptance creates one) or a `PENDING` one (escrow capture);
/// settlement edges require `PENDING` outside a dispute and `DISPUTED`
/// inside one. `RELEASED` and `REFUNDED` payments never move again.
pub fn transition(
    task: TaskStatus,
    payment: Option<PaymentStatus>,
    event: TaskEvent,
) -> Result<Transition, Rejection> {
    use PaymentStatus as P;
    use TaskStatus as T;

    let reject = |reason| Rejection {
        from: task,
        payment,
        event,
        reason,
    };
    // Moves the task while the payment stays PENDING, then relabels it.
    let from_pending = |next: TaskStatus, paid: PaymentStatus| match payment {
        Some(P::Pending) => Ok(Transition {
            task: next,
            payment: Some(paid),
        }),
        Some(_) => Err(reject(RejectionReason::PaymentNotPending)),
        None => Err(reject(RejectionReason::PaymentMissing)),
    };
    let from_disputed = |next: TaskStatus, settled: PaymentStatus| match payment {
        Some(P::Disputed) => Ok(Transition {
            task: next,
            payment: Some(settled),
        }),
        Some(_) => Err(reject(RejectionReason::PaymentNotDisputed)),
        None => Err(reject(RejectionReason::PaymentMissing)),
    };

    match (event, task) {
        (TaskEvent::BidAccepted, T::Open) => match payment {
            None => Ok(Transition {
                task: T::Assigned,
                payment: Some(P::Pending),
            }),
            Some(_) => Err(reject(RejectionReason::PaymentExists)),
        },
        (TaskEvent::PaymentConfirmed, T::Open) => from_pending(T::Assigned, P::Pending),
        (TaskEvent::BidAccepted | TaskEvent::PaymentConfirmed, _) => {
            Err(reject(RejectionReason::TaskNotOpen))
        }

        (TaskEvent::WorkStarted, T::Assigned) => from_pending(T::InProgress, P::Pending),
        (TaskEvent::WorkSubmitted, T::Assigned | T::InProgress) => {
            from_pending(T::UnderReview, P::Pending)
        }
        (TaskEvent::RevisionRequested, T::UnderReview) => from_pending(T::InProgress, P::Pending),
        (TaskEvent::WorkApproved, T::UnderReview) => from_pending(T::Completed, P::Released),
        (
            TaskEvent::WorkStarted
            | TaskEvent::WorkSubmitted
            | TaskEvent::RevisionRequested
            | TaskEvent::WorkApproved,
            T::InDispute,
        ) => Err(reject(RejectionReason::DisputeOpen)),
        (
            TaskEvent::WorkStarted
            | TaskEvent::WorkSubmitted
            | TaskEvent::RevisionRequested
            | TaskEvent::WorkApproved,
            _,
        ) => Err(reject(RejectionReason::WrongState)),

        (TaskEvent::DisputeOpened, t) if t.is_disputable() => {
            from_pending(T::InDispute, P::Disputed)
        }
        (TaskEvent::DisputeOpened, T::InDispute) => Err(reject(RejectionReason::DisputeOpen)),
        (TaskEvent::DisputeOpened, _) => Err(reject(RejectionReason::NotDisputable)),

        (TaskEvent::DisputeResolvedRefund, T::InDispute) => {
            from_disputed(T::Cancelled, P::Refunded)
        }
        (TaskEvent::DisputeResolvedRelease, T::InDispute) => {
            from_disputed(T::Completed, P::Released)
        }
        (TaskEvent::DisputeCancelled { restore }, T::InDispute) => {
            if !restore.is_disputable() {
                return Err(reject(RejectionReason::InvalidRestoreState));
            }
            from_disputed(restore, P::Pending)
        }
        (
            TaskEvent::DisputeResolvedRefund
            | TaskEvent::DisputeResolvedRelease
            | TaskEvent::DisputeCancelled { .. },
            _,
        ) => Err(reject(RejectionReason::NotInDispute)),

        (TaskEvent::TaskCancelled, T::Open) => match payment {
            None => Ok(Transition {
                task: T::Cancelled,
                payment: None,
            }),
            Some(_) => Err(reject(RejectionReason::PaymentExists)),
        },
        (TaskEvent::TaskCancelled, _) => Err(reject(RejectionReason::TaskNotOpen)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use PaymentStatus as P;
    use TaskStatus as T;

    fn ok(task: T, payment: Option<P>, event: TaskEvent) -> Transition {
        transition(task, payment, event).unwrap()
    }

    fn reason(task: T, payment: Option<P>, event: TaskEvent) -> RejectionReason {
        transition(task, payment, event).unwrap_err().reason
    }

    #[test]
    fn direct_accept_creates_pending_payment() {
        let next = ok(T::Open, None, TaskEvent::BidAccepted);
        assert_eq!(next.task, T::Assigned);
        assert_eq!(next.payment, Some(P::Pending));
    }

    #[test]
    fn direct_accept_refused_once_payment_initiated() {
        assert_eq!(
            reason(T::Open, Some(P::Pending), TaskEvent::BidAccepted),
            RejectionReason::PaymentExists
        );
    }

    #[test]
    fn accept_and_confirm_require_open_task() {
        for event in [TaskEvent::BidAccepted, TaskEvent::PaymentConfirmed] {
            assert_eq!(
                reason(T::Assigned, Some(P::Pending), event),
                RejectionReason::TaskNotOpen
            );
        }
    }

    #[test]
    fn payment_confirmation_requires_pending_row() {
        let next = ok(T::Open, Some(P::Pending), TaskEvent::PaymentConfirmed);
        assert_eq!(next.task, T::Assigned);
        assert_eq!(
            reason(T::Open, None, TaskEvent::PaymentConfirmed),
            RejectionReason::PaymentMissing
        );
    }

    #[test]
    fn happy_path_to_completion() {
        let mut pair = ok(T::Open, None, TaskEvent::BidAccepted);
        for event in [
            TaskEvent::WorkStarted,
            TaskEvent::WorkSubmitted,
            TaskEvent::RevisionRequested,
            TaskEvent::WorkSubmitted,
            TaskEvent::WorkApproved,
        ] {
            pair = ok(pair.task, pair.payment, event);
        }
        assert_eq!(pair.task, T::Completed);
        assert_eq!(pair.payment, Some(P::Released));
    }

    #[test]
    fn submit_directly_from_assigned() {
        let next = ok(T::Assigned, Some(P::Pending), TaskEvent::WorkSubmitted);
        assert_eq!(next.task, T::UnderReview);
    }

    #[test]
    fn approve_blocked_by_dispute() {
        assert_eq!(
            reason(T::InDispute, Some(P::Disputed), TaskEvent::WorkApproved),
            RejectionReason::DisputeOpen
        );
    }

    #[test]
    fn approve_twice_is_refused() {
        assert_eq!(
            reason(T::Completed, Some(P::Released), TaskEvent::WorkApproved),
            RejectionReason::WrongState
        );
        assert_eq!(
            reason(T::UnderReview, Some(P::Released), TaskEvent::WorkApproved),
            RejectionReason::PaymentNotPending
        );
    }

    #[test]
    fn dispute_marks_payment_disputed() {
        for from in [T::Assigned, T::InProgress, T::UnderReview] {
            let next = ok(from, Some(P::Pending), TaskEvent::DisputeOpened);
            assert_eq!(next.task, T::InDispute);
            assert_eq!(next.payment, Some(P::Disputed));
        }
    }

    #[test]
    fn completed_task_cannot_be_disputed() {
        assert_eq!(
            reason(T::Completed, Some(P::Released), TaskEvent::DisputeOpened),
            RejectionReason::NotDisputable
        );
        assert_eq!(
            reason(T::InDispute, Some(P::Disputed), TaskEvent::DisputeOpened),
            RejectionReason::DisputeOpen
        );
    }

    #[test]
    fn rulings_settle_the_payment() {
        let refund = ok(T::InDispute, Some(P::Disputed), TaskEvent::DisputeResolvedRefund);
        assert_eq!((refund.task, refund.payment), (T::Cancelled, Some(P::Refunded)));
        let release = ok(T::InDispute, Some(P::Disputed), TaskEvent::DisputeResolvedRelease);
        assert_eq!((release.task, release.payment), (T::Completed, Some(P::Released)));
    }

    #[test]
    fn dispute_cancel_restores_previous_status() {
        let next = ok(
            T::InDispute,
            Some(P::Disputed),
            TaskEvent::DisputeCancelled {
                restore: T::UnderReview,
            },
        );
        assert_eq!((next.task, next.payment), (T::UnderReview, Some(P::Pending)));
        assert_eq!(
            reason(
                T::InDispute,
                Some(P::Disputed),
                TaskEvent::DisputeCancelled { restore: T::Open }
            ),
            RejectionReason::InvalidRestoreState
        );
    }

    #[test]
    fn task_cancel_only_before_any_payment() {
        let next = ok(T::Open, None, TaskEvent::TaskCancelled);
        assert_eq!((next.task, next.payment), (T::Cancelled, None));
        assert_eq!(
            reason(T::Open, Some(P::Pending), TaskEvent::TaskCancelled),
            RejectionReason::PaymentExists
        );
        assert_eq!(
            reason(T::Assigned, Some(P::Pending), TaskEvent::TaskCancelled),
            RejectionReason::TaskNotOpen
        );
    }

    #[test]
    fn rejection_message_names_event_and_pair() {
        let err = transition(T::Completed, Some(P::Released), TaskEvent::WorkApproved).unwrap_err();
        assert_eq!(
            err.to_string(),
            "WorkApproved rejected from task COMPLETED (payment RELEASED): wrong_state"
        );
    }

    fn any_task() -> impl Strategy<Value = TaskStatus> {
        proptest::sample::select(TaskStatus::ALL.to_vec())
    }

    fn any_payment() -> impl Strategy<Value = Option<PaymentStatus>> {
        proptest::option::of(proptest::sample::select(vec![
            P::Pending,
            P::Released,
            P::Disputed,
            P::Refunded,
        ]))
    }

    fn any_event() -> impl Strategy<Value = TaskEvent> {
        prop_oneof![
            Just(TaskEvent::BidAccepted),
            Just(TaskEvent::PaymentConfirmed),
            Just(TaskEvent::WorkStarted),
            Just(TaskEvent::WorkSubmitted),
            Just(TaskEvent::RevisionRequested),
            Just(TaskEvent::WorkApproved),
            Just(TaskEvent::DisputeOpened),
            Just(TaskEvent::DisputeResolvedRefund),
            Just(TaskEvent::DisputeResolvedRelease),
            any_task().prop_map(|restore| TaskEvent::DisputeCancelled { restore }),
            Just(TaskEvent::TaskCancelled),
        ]
    }

    proptest! {
        #[test]
        fn terminal_tasks_reject_everything(
            task in prop_oneof![Just(T::Completed), Just(T::Cancelled)],
            payment in any_payment(),
            event in any_event(),
        ) {
            prop_assert!(transition(task, payment, event).is_err());
        }

        #[test]
        fn settled_payments_never_move(
            task in any_task(),
            settled in prop_oneof![Just(P::Released), Just(P::Refunded)],
            event in any_event(),
        ) {
            prop_assert!(transition(task, Some(settled), event).is_err());
        }

        #[test]
        fn disputed_marker_tracks_in_dispute(
            task in any_task(),
            payment in any_payment(),
            event in any_event(),
        ) {
            if let Ok(next) = transition(task, payment, event) {
                prop_assert_eq!(next.task == T::InDispute, next.payment == Some(P::Disputed));
                if next.task != T::Cancelled || payment.is_some() {
                    prop_assert!(next.payment.is_some());
                }
            }
        }

        #[test]
        fn rejection_reports_the_input_pair(
            task in any_task(),
            payment in any_payment(),
            event in any_event(),
        ) {
            if let Err(rejection) = transition(task, payment, event) {
                prop_assert_eq!(rejection.from, task);
                prop_assert_eq!(rejection.payment, payment);
                prop_assert_eq!(rejection.event, event);
            }
        }
    }
}
