//! # Engine Errors
//!
//! Every domain-rule violation is returned as a typed [`EngineError`];
//! nothing panics across the settlement boundary. Replays of operations
//! that already took effect are not errors: they come back as
//! [`Outcome::AlreadyProcessed`](crate::Outcome::AlreadyProcessed).

use gigflow_core::ValidationError;
use gigflow_ledger::{StoreError, TaskAggregate};
use gigflow_state::{PaymentStatus, Rejection, RejectionReason, TaskStatus};
use thiserror::Error;

/// Errors produced by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The caller is not the party or role the operation requires.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The operation is not legal from the current task, payment or
    /// dispute status.
    #[error(
        "{event} not allowed with task {task_status} (payment {}): {reason}",
        payment_label(.payment_status)
    )]
    InvalidState {
        /// The attempted operation.
        event: &'static str,
        /// Task status at the time of the attempt.
        task_status: TaskStatus,
        /// Payment status at the time of the attempt.
        payment_status: Option<PaymentStatus>,
        /// Rejection code.
        reason: RejectionReason,
    },

    /// An id did not resolve.
    #[error("{0} not found")]
    NotFound(String),

    /// The payment callback failed its authenticity check.
    #[error("payment callback signature invalid")]
    SignatureInvalid,

    /// A concurrent transaction already moved the aggregate. Safe to retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed input (amounts, empty text, callback fields).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Infrastructure failure. The operation had no effect.
    #[error("ledger store failure: {0}")]
    Store(#[source] StoreError),
}

fn payment_label(payment: &Option<PaymentStatus>) -> &'static str {
    payment.map(|p| p.as_str()).unwrap_or("NONE")
}

impl EngineError {
    /// An [`EngineError::InvalidState`] describing `agg` at the time of the attempt.
    pub(crate) fn invalid(event: &'static str, agg: &TaskAggregate, reason: RejectionReason) -> Self {
        Self::InvalidState {
            event,
            task_status: agg.task.status,
            payment_status: agg.payment_status(),
            reason,
        }
    }

    /// The rejection code, for invalid-state errors.
    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            Self::InvalidState { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl From<Rejection> for EngineError {
    fn from(r: Rejection) -> Self {
        Self::InvalidState {
            event: r.event.name(),
            task_status: r.from,
            payment_status: r.payment,
            reason: r.reason,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TaskNotFound(id) => Self::NotFound(id.to_string()),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Store(other),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}
