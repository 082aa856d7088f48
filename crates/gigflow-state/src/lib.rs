//! # gigflow-state — Assignment State Machine
//!
//! Pure logic for the assignment lifecycle. Nothing in this crate touches
//! storage or performs I/O; every function is deterministic and can be
//! tested in isolation.
//!
//! ## State Machines
//!
//! - **Task** ([`TaskStatus`]): `OPEN → ASSIGNED → IN_PROGRESS → UNDER_REVIEW
//!   → COMPLETED`, with `IN_DISPUTE` and `CANCELLED` branches.
//! - **Payment** ([`PaymentStatus`]): `PENDING → RELEASED`, or
//!   `PENDING → DISPUTED → RELEASED | REFUNDED`.
//! - **Bid** ([`BidStatus`]): `pending → accepted | rejected`.
//! - **Dispute** ([`DisputeStatus`]): `OPEN → RESOLVED_REFUND |
//!   RESOLVED_RELEASE | CANCELLED`.
//!
//! ## Design
//!
//! Task and payment status move together, so the core is a single
//! [`transition()`] over the pair `(TaskStatus, Option<PaymentStatus>)`
//! driven by a [`TaskEvent`]. Statuses are closed enums matched
//! exhaustively at every transition site; there are no string-typed
//! states and no fallthrough arms that guess a default.

pub mod machine;
pub mod status;

pub use machine::{transition, Rejection, RejectionReason, TaskEvent, Transition};
pub use status::{BidStatus, DisputeOutcome, DisputeStatus, PaymentStatus, TaskStatus, UnknownStatus};
