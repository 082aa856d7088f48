//! # gigflow-core — Foundational Types
//!
//! Leaf crate of the gigflow workspace. Every other crate depends on it;
//! it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `TaskId`, `BidId`, `PaymentId`, `DisputeId`,
//!    `FollowUpId`, `SubmissionId`, `UserId` are distinct types. You cannot
//!    pass a `BidId` where a `TaskId` is expected.
//!
//! 2. **Decimal money.** [`Money`] wraps `rust_decimal::Decimal`. Amounts are
//!    never floats and are validated positive at construction.
//!
//! 3. **Explicit acting user.** Every engine call takes an [`ActingUser`]
//!    resolved once at the API boundary. There is no ambient session.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `gigflow-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod actor;
pub mod error;
pub mod identity;
pub mod money;

pub use actor::{ActingUser, Role};
pub use error::ValidationError;
pub use identity::{BidId, DisputeId, FollowUpId, PaymentId, SubmissionId, TaskId, UserId};
pub use money::Money;
