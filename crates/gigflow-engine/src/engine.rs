//! The [`Engine`] handle, shared guards and read views.

use std::sync::Arc;

use gigflow_core::{ActingUser, DisputeId, Money, TaskId, UserId};
use gigflow_ledger::{
    BidRecord, DisputeRecord, FollowUpRecord, LedgerStore, PaymentRecord, SubmissionRecord,
    TaskAggregate, TaskRecord,
};
use serde::Serialize;

use crate::error::EngineError;
use crate::processor::PaymentProcessor;

/// Orchestrates every lifecycle operation over a ledger store.
///
/// The engine holds no mutable state of its own. Each operation reads and
/// writes through one [`LedgerStore::transact`] call.
pub struct Engine<S> {
    pub(crate) store: S,
    pub(crate) processor: Arc<dyn PaymentProcessor>,
}

impl<S: LedgerStore> Engine<S> {
    pub fn new(store: S, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self { store, processor }
    }

    /// The underlying ledger.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// A task with its bids, payment, latest dispute and submissions.
    pub async fn task_view(&self, task_id: TaskId) -> Result<TaskView, EngineError> {
        let agg = self
            .store
            .aggregate(task_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(task_id.to_string()))?;
        let submissions = self.store.submissions(task_id).await?;
        Ok(TaskView {
            task: agg.task,
            bids: agg.bids,
            payment: agg.payment,
            dispute: agg.dispute,
            submissions,
        })
    }

    /// A dispute with its follow-ups in creation order.
    pub async fn dispute_view(&self, dispute_id: DisputeId) -> Result<DisputeView, EngineError> {
        let dispute = self
            .store
            .dispute(dispute_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(dispute_id.to_string()))?;
        let follow_ups = self.store.follow_ups(dispute_id).await?;
        Ok(DisputeView {
            dispute,
            follow_ups,
        })
    }

    /// A user's account balance.
    pub async fn balance(&self, user_id: UserId) -> Result<Money, EngineError> {
        Ok(self.store.balance(user_id).await?)
    }

    pub(crate) async fn task_of_dispute(&self, dispute_id: DisputeId) -> Result<TaskId, EngineError> {
        self.store
            .task_for_dispute(dispute_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(dispute_id.to_string()))
    }
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

/// Read model of a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub task: TaskRecord,
    pub bids: Vec<BidRecord>,
    pub payment: Option<PaymentRecord>,
    pub dispute: Option<DisputeRecord>,
    pub submissions: Vec<SubmissionRecord>,
}

/// Read model of a dispute.
#[derive(Debug, Clone, Serialize)]
pub struct DisputeView {
    pub dispute: DisputeRecord,
    pub follow_ups: Vec<FollowUpRecord>,
}

// ---------------------------------------------------------------------------
// Guards shared by the services
// ---------------------------------------------------------------------------

pub(crate) fn require_poster(
    agg: &TaskAggregate,
    actor: ActingUser,
    action: &str,
) -> Result<(), EngineError> {
    if agg.task.poster_id != actor.id {
        return Err(EngineError::Unauthorized(format!(
            "only the poster of {} may {action}",
            agg.task.id
        )));
    }
    Ok(())
}

pub(crate) fn require_doer(
    agg: &TaskAggregate,
    actor: ActingUser,
    action: &str,
) -> Result<(), EngineError> {
    if agg.task.doer_id != Some(actor.id) {
        return Err(EngineError::Unauthorized(format!(
            "only the assigned doer of {} may {action}",
            agg.task.id
        )));
    }
    Ok(())
}

/// Trimmed, non-empty text.
pub(crate) fn required_text(value: &str, field: &str) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// The doer of an engaged task. Absent only on corrupt rows.
pub(crate) fn doer_of(agg: &TaskAggregate) -> Result<UserId, EngineError> {
    agg.task.doer_id.ok_or_else(|| {
        EngineError::Conflict(format!("{} is {} without a doer", agg.task.id, agg.task.status))
    })
}

/// The payment row of a task that must have one.
pub(crate) fn payment_of(agg: &TaskAggregate) -> Result<&PaymentRecord, EngineError> {
    agg.payment.as_ref().ok_or_else(|| {
        EngineError::invalid("Settlement", agg, gigflow_state::RejectionReason::PaymentMissing)
    })
}
