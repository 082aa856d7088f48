//! # API Route Modules
//!
//! - `tasks`: posting, bidding, direct acceptance, and the work loop.
//! - `payments`: escrow checkout initiation and the processor webhook.
//! - `disputes`: opening, responding, follow-ups, rulings, withdrawal.
//! - `users`: balance view.

pub mod disputes;
pub mod payments;
pub mod tasks;
pub mod users;
