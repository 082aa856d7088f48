//! Ledger store errors.

use gigflow_core::TaskId;
use thiserror::Error;

/// Infrastructure failures raised by a [`LedgerStore`](crate::LedgerStore).
///
/// Domain-rule violations never appear here; they are decided by the
/// closure passed to `transact` and returned through its own error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The task addressed by a transaction does not exist.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// A uniqueness constraint fired or a concurrent writer got there first.
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// A stored row could not be mapped back into a record.
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),

    /// Balance arithmetic overflowed.
    #[error("balance overflow for {0}")]
    Overflow(String),

    /// Database driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations failed to apply.
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Map a driver error, turning unique violations into [`StoreError::Conflict`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return Self::Conflict(db.message().to_string());
            }
        }
        Self::Database(err)
    }
}
