//! # Validation Errors
//!
//! Errors raised when constructing core values from untrusted input.

use thiserror::Error;

/// Rejected input for a core value type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Amount is zero or negative.
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(String),

    /// Amount string could not be parsed as a decimal.
    #[error("invalid monetary amount: \"{0}\"")]
    InvalidAmount(String),

    /// Amount carries more fractional digits than the ledger stores.
    #[error("amount {0} has more than {1} decimal places")]
    TooPrecise(String, u32),

    /// Identifier string is not a UUID.
    #[error("invalid {kind} identifier: \"{value}\"")]
    InvalidId {
        /// Which identifier namespace was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Unknown role name.
    #[error("unknown role: \"{0}\"")]
    UnknownRole(String),
}
