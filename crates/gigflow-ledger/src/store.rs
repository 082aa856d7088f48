//! The [`LedgerStore`] trait.

use async_trait::async_trait;
use gigflow_core::{DisputeId, Money, TaskId, UserId};

use crate::aggregate::{ChangeSet, TaskAggregate};
use crate::error::StoreError;
use crate::records::{DisputeRecord, FollowUpRecord, SubmissionRecord, TaskRecord};

/// Durable storage with atomic per-task transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Persist a newly created task.
    async fn insert_task(&self, task: TaskRecord) -> Result<(), StoreError>;

    /// Run a read-decide-write transaction on one task.
    ///
    /// The store locks the task, loads its aggregate and calls `decide`.
    /// On `Ok((changes, value))` the changes are written atomically and
    /// `value` is returned; on `Err` nothing is written. A missing task
    /// yields `StoreError::TaskNotFound` converted into `E`.
    async fn transact<R, E, F>(&self, task_id: TaskId, decide: F) -> Result<R, E>
    where
        F: FnOnce(&TaskAggregate) -> Result<(ChangeSet, R), E> + Send,
        R: Send,
        E: From<StoreError> + Send;

    /// Snapshot of a task and its children.
    async fn aggregate(&self, task_id: TaskId) -> Result<Option<TaskAggregate>, StoreError>;

    /// The task a dispute belongs to.
    async fn task_for_dispute(&self, dispute_id: DisputeId) -> Result<Option<TaskId>, StoreError>;

    /// The task whose payment carries this processor correlation id.
    async fn task_for_correlation(&self, correlation_id: &str)
        -> Result<Option<TaskId>, StoreError>;

    /// A dispute by id, including resolved and cancelled ones.
    async fn dispute(&self, dispute_id: DisputeId) -> Result<Option<DisputeRecord>, StoreError>;

    /// Follow-ups of a dispute in creation order.
    async fn follow_ups(&self, dispute_id: DisputeId) -> Result<Vec<FollowUpRecord>, StoreError>;

    /// Submissions of a task in creation order.
    async fn submissions(&self, task_id: TaskId) -> Result<Vec<SubmissionRecord>, StoreError>;

    /// A user's account balance. Zero for users never credited.
    async fn balance(&self, user_id: UserId) -> Result<Money, StoreError>;
}
