//! # Ledger Records
//!
//! One struct per table. Records are plain data: the engine decides every
//! field value and the store persists them as given.

use chrono::{DateTime, Utc};
use gigflow_core::{
    BidId, DisputeId, FollowUpId, Money, PaymentId, SubmissionId, TaskId, UserId,
};
use gigflow_state::{BidStatus, DisputeStatus, PaymentStatus, TaskStatus};
use serde::{Deserialize, Serialize};

/// A posted task (the assignment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub poster_id: UserId,
    /// Set iff `status` is neither `OPEN` nor `CANCELLED`.
    pub doer_id: Option<UserId>,
    pub title: String,
    pub budget: Money,
    pub deadline: DateTime<Utc>,
    pub status: TaskStatus,
    /// Set iff `doer_id` is set.
    pub accepted_bid_id: Option<BidId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// A fresh `OPEN` task.
    pub fn open(
        poster_id: UserId,
        title: impl Into<String>,
        budget: Money,
        deadline: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            poster_id,
            doer_id: None,
            title: title.into(),
            budget,
            deadline,
            status: TaskStatus::Open,
            accepted_bid_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A doer's offer on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRecord {
    pub id: BidId,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub amount: Money,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BidRecord {
    /// A fresh `pending` bid.
    pub fn pending(task_id: TaskId, user_id: UserId, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: BidId::new(),
            task_id,
            user_id,
            amount,
            status: BidStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The escrow payment of a task. At most one per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub task_id: TaskId,
    /// The bid whose amount this payment covers.
    pub bid_id: BidId,
    /// The poster.
    pub sender_id: UserId,
    /// The doer.
    pub receiver_id: UserId,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Opaque id correlating this row with the external processor.
    pub correlation_id: String,
    /// Raw callback fields kept for audit.
    pub verification_payload: Option<serde_json::Value>,
    /// When the processor confirmed capture. `None` for direct acceptance
    /// and for initiated-but-unconfirmed escrow.
    pub captured_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dispute raised on an engaged task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub id: DisputeId,
    pub task_id: TaskId,
    pub initiator_id: UserId,
    pub reason: String,
    pub status: DisputeStatus,
    /// Task status when the dispute was opened; restored on cancel.
    pub pre_dispute_status: TaskStatus,
    pub response: Option<String>,
    pub response_evidence: Vec<String>,
    pub responded_by: Option<UserId>,
    /// Admin notes recorded with the ruling.
    pub resolution: Option<String>,
    pub resolved_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    /// Set when the dispute leaves `OPEN`.
    pub closed_at: Option<DateTime<Utc>>,
}

/// Append-only message attached to an open dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpRecord {
    pub id: FollowUpId,
    pub dispute_id: DisputeId,
    pub sender_id: UserId,
    pub message: String,
    pub evidence: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Work delivered by the doer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub task_id: TaskId,
    pub doer_id: UserId,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Amount to add to a user's account balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceCredit {
    pub user_id: UserId,
    pub amount: Money,
}
