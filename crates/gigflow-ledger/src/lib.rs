//! # gigflow-ledger — Ledger Store
//!
//! Durable storage for tasks, bids, escrow payments, disputes, follow-ups,
//! submissions and user balances.
//!
//! ## Transaction model
//!
//! Task is the root aggregate. Every mutation of a task and its children
//! goes through [`LedgerStore::transact`]: the store locks the task, loads
//! a fresh [`TaskAggregate`], hands it to a decision closure, and applies
//! the returned [`ChangeSet`] atomically. A closure that returns `Err`
//! leaves the ledger untouched. Preconditions are therefore always checked
//! against rows read inside the same transaction that writes.
//!
//! ## Backends
//!
//! - [`MemoryLedger`]: one mutex over all tables. Used in development and
//!   by the test suites.
//! - [`PgLedger`]: PostgreSQL via SQLx. The task row is locked with
//!   `SELECT ... FOR UPDATE`; `payments.task_id` carries a `UNIQUE`
//!   constraint so at most one payment per task exists even if a lock is
//!   bypassed.
//! - [`Ledger`]: either of the above, chosen at startup.

pub mod aggregate;
pub mod backend;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use aggregate::{ChangeSet, TaskAggregate};
pub use backend::Ledger;
pub use error::StoreError;
pub use memory::MemoryLedger;
pub use postgres::PgLedger;
pub use records::{
    BalanceCredit, BidRecord, DisputeRecord, FollowUpRecord, PaymentRecord, SubmissionRecord,
    TaskRecord,
};
pub use store::LedgerStore;
