//! # Status Enumerations
//!
//! Closed status sets for every aggregate in the ledger. Each enum has a
//! canonical string form (`as_str`) used for persistence and a matching
//! `FromStr` that rejects anything outside the set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A persisted status string that does not belong to the closed set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} status: \"{value}\"")]
pub struct UnknownStatus {
    /// Which status enum was being parsed.
    pub kind: &'static str,
    /// The rejected value.
    pub value: String,
}

impl UnknownStatus {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ─── Task ────────────────────────────────────────────────────────────

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Accepting bids. No doer.
    Open,
    /// A bid was accepted and the doer is engaged.
    Assigned,
    /// The doer has started work.
    InProgress,
    /// Work submitted, awaiting the poster's review.
    UnderReview,
    /// Work approved and funds settled. Terminal.
    Completed,
    /// Withdrawn before assignment, or refunded after a dispute. Terminal.
    Cancelled,
    /// Settlement frozen by an open dispute.
    InDispute,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 7] = [
        Self::Open,
        Self::Assigned,
        Self::InProgress,
        Self::UnderReview,
        Self::Completed,
        Self::Cancelled,
        Self::InDispute,
    ];

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Assigned => "ASSIGNED",
            Self::InProgress => "IN_PROGRESS",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::InDispute => "IN_DISPUTE",
        }
    }

    /// Whether a task in this status must have a doer.
    ///
    /// `doer_id` is set iff the status is neither `OPEN` nor `CANCELLED`.
    pub fn requires_doer(&self) -> bool {
        !matches!(self, Self::Open | Self::Cancelled)
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether a dispute may be opened from this status.
    pub fn is_disputable(&self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress | Self::UnderReview)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus::new("task", s))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Bid ─────────────────────────────────────────────────────────────

/// Status of a bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    /// Awaiting the poster's decision.
    Pending,
    /// Chosen. At most one per task.
    Accepted,
    /// Lost to a sibling bid, or voided by a refund ruling.
    Rejected,
}

impl BidStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for BidStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownStatus::new("bid", other)),
        }
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Payment ─────────────────────────────────────────────────────────

/// Status of the escrow payment attached to a task.
///
/// Status machine: `PENDING → RELEASED`, or `PENDING → DISPUTED →
/// RELEASED | REFUNDED`. The only backward edge is `DISPUTED → PENDING`
/// when a dispute is withdrawn without a ruling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Funds owed or held in escrow, not yet settled.
    Pending,
    /// Settled to the doer. Terminal.
    Released,
    /// Held while a dispute is open.
    Disputed,
    /// Returned to the poster by a refund ruling. Terminal.
    Refunded,
}

impl PaymentStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Released => "RELEASED",
            Self::Disputed => "DISPUTED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Whether the payment has been settled one way or the other.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RELEASED" => Ok(Self::Released),
            "DISPUTED" => Ok(Self::Disputed),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(UnknownStatus::new("payment", other)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Dispute ─────────────────────────────────────────────────────────

/// An admin ruling on a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeOutcome {
    /// Escrowed funds go back to the poster.
    Refund,
    /// Escrowed funds go to the doer.
    Release,
}

impl DisputeOutcome {
    /// The dispute status recording this outcome.
    pub fn status(&self) -> DisputeStatus {
        match self {
            Self::Refund => DisputeStatus::ResolvedRefund,
            Self::Release => DisputeStatus::ResolvedRelease,
        }
    }
}

/// Status of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    /// Collecting responses and follow-ups.
    Open,
    /// Ruled in the poster's favour.
    ResolvedRefund,
    /// Ruled in the doer's favour.
    ResolvedRelease,
    /// Withdrawn without a ruling.
    Cancelled,
}

impl DisputeStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::ResolvedRefund => "RESOLVED_REFUND",
            Self::ResolvedRelease => "RESOLVED_RELEASE",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether the dispute still accepts responses, follow-ups and rulings.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// The ruling recorded by this status, if any.
    pub fn outcome(&self) -> Option<DisputeOutcome> {
        match self {
            Self::ResolvedRefund => Some(DisputeOutcome::Refund),
            Self::ResolvedRelease => Some(DisputeOutcome::Release),
            Self::Open | Self::Cancelled => None,
        }
    }
}

impl std::str::FromStr for DisputeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "RESOLVED_REFUND" => Ok(Self::ResolvedRefund),
            "RESOLVED_RELEASE" => Ok(Self::ResolvedRelease),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(UnknownStatus::new("dispute", other)),
        }
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
