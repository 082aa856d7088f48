//! # Bid Acceptance Service
//!
//! Task creation, bidding, cancellation before assignment, and the direct
//! `OPEN → ASSIGNED` path where the poster accepts a bid without an escrow
//! gate. Direct acceptance creates the task's payment row in `PENDING` (funds
//! owed, settled on approval), so a task accepted directly can never also be
//! escrow-confirmed, and vice versa: both paths require `OPEN` with no
//! captured payment, checked inside the same transaction.

use chrono::{DateTime, Utc};
use gigflow_core::{ActingUser, BidId, Money, PaymentId, TaskId, UserId};
use gigflow_ledger::{BidRecord, ChangeSet, LedgerStore, PaymentRecord, TaskAggregate, TaskRecord};
use gigflow_state::{transition, BidStatus, PaymentStatus, RejectionReason, TaskEvent, TaskStatus};
use uuid::Uuid;

use crate::engine::{require_poster, required_text, Engine};
use crate::error::EngineError;
use crate::events::DomainEvent;
use crate::outcome::Outcome;

/// Input for [`Engine::create_task`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub budget: Money,
    pub deadline: DateTime<Utc>,
}

impl<S: LedgerStore> Engine<S> {
    /// Post a new `OPEN` task owned by `actor`.
    pub async fn create_task(
        &self,
        actor: ActingUser,
        new: NewTask,
    ) -> Result<Outcome<TaskRecord>, EngineError> {
        let title = required_text(&new.title, "title")?;
        if new.budget.is_zero() {
            return Err(EngineError::Validation("budget must be positive".into()));
        }
        if new.deadline <= Utc::now() {
            return Err(EngineError::Validation("deadline must be in the future".into()));
        }

        let task = TaskRecord::open(actor.id, title, new.budget, new.deadline);
        self.store.insert_task(task.clone()).await?;
        tracing::info!(task = %task.id, poster = %actor.id, budget = %task.budget, "task created");

        let events = vec![DomainEvent::TaskCreated {
            task_id: task.id,
            poster_id: actor.id,
        }];
        Ok(Outcome::applied(task, events))
    }

    /// Place a bid on an `OPEN` task. One bid per user per task; posters
    /// cannot bid on their own task.
    pub async fn place_bid(
        &self,
        actor: ActingUser,
        task_id: TaskId,
        amount: Money,
    ) -> Result<Outcome<BidRecord>, EngineError> {
        if amount.is_zero() {
            return Err(EngineError::Validation("bid amount must be positive".into()));
        }

        let (bid, poster_id) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                if agg.task.status != TaskStatus::Open {
                    return Err(EngineError::invalid("PlaceBid", agg, RejectionReason::TaskNotOpen));
                }
                if agg.task.poster_id == actor.id {
                    return Err(EngineError::Unauthorized(
                        "a poster cannot bid on their own task".into(),
                    ));
                }
                if agg.has_bid_from(actor.id) {
                    return Err(EngineError::invalid(
                        "PlaceBid",
                        agg,
                        RejectionReason::BidAlreadyPlaced,
                    ));
                }
                let bid = BidRecord::pending(task_id, actor.id, amount);
                Ok((
                    ChangeSet::none().with_bid(bid.clone()),
                    (bid, agg.task.poster_id),
                ))
            })
            .await?;
        tracing::info!(task = %task_id, bid = %bid.id, bidder = %actor.id, amount = %amount, "bid placed");

        let events = vec![DomainEvent::BidPlaced {
            task_id,
            bid_id: bid.id,
            poster_id,
            bidder_id: actor.id,
            amount,
        }];
        Ok(Outcome::applied(bid, events))
    }

    /// Withdraw an `OPEN` task that has no payment row. Pending bids are
    /// rejected.
    pub async fn cancel_task(
        &self,
        actor: ActingUser,
        task_id: TaskId,
    ) -> Result<Outcome<TaskRecord>, EngineError> {
        let (task, bidders) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                require_poster(agg, actor, "cancel it")?;
                let next = transition(agg.task.status, agg.payment_status(), TaskEvent::TaskCancelled)?;

                let now = Utc::now();
                let mut task = agg.task.clone();
                task.status = next.task;
                task.updated_at = now;

                let mut bidders = Vec::new();
                let mut bids = Vec::new();
                for bid in agg.bids.iter().filter(|b| b.status == BidStatus::Pending) {
                    let mut bid = bid.clone();
                    bid.status = BidStatus::Rejected;
                    bid.updated_at = now;
                    bidders.push(bid.user_id);
                    bids.push(bid);
                }

                let changes = ChangeSet::none().with_task(task.clone()).with_bids(bids);
                Ok((changes, (task, bidders)))
            })
            .await?;
        tracing::info!(task = %task_id, poster = %actor.id, "task cancelled");

        let events = vec![DomainEvent::TaskCancelled {
            task_id,
            poster_id: actor.id,
            bidders,
        }];
        Ok(Outcome::applied(task, events))
    }

    /// Accept `bid_id` directly: the bid wins, every sibling is rejected,
    /// the task becomes `ASSIGNED` and a `PENDING` payment row for the bid
    /// amount is created.
    ///
    /// Of two racing accepts on the same task exactly one commits; the
    /// other re-reads the task inside its transaction, finds it no longer
    /// `OPEN`, and fails with `InvalidState`.
    pub async fn accept_bid(
        &self,
        actor: ActingUser,
        task_id: TaskId,
        bid_id: BidId,
    ) -> Result<Outcome<TaskRecord>, EngineError> {
        let (task, doer_id, rejected_bidders) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                let bid = agg
                    .bid(bid_id)
                    .ok_or_else(|| EngineError::NotFound(bid_id.to_string()))?;
                require_poster(agg, actor, "accept bids")?;
                let next = transition(agg.task.status, agg.payment_status(), TaskEvent::BidAccepted)?;
                check_winner(agg, bid, actor, "BidAccepted")?;

                let now = Utc::now();
                let (task, bids, rejected) = assign(agg, bid, next.task, now);
                let payment = PaymentRecord {
                    id: PaymentId::new(),
                    task_id,
                    bid_id: bid.id,
                    sender_id: agg.task.poster_id,
                    receiver_id: bid.user_id,
                    amount: bid.amount,
                    status: next.payment.unwrap_or(PaymentStatus::Pending),
                    correlation_id: Uuid::new_v4().to_string(),
                    verification_payload: None,
                    captured_at: None,
                    created_at: now,
                    updated_at: now,
                };

                let changes = ChangeSet::none()
                    .with_task(task.clone())
                    .with_bids(bids)
                    .with_payment(payment);
                Ok((changes, (task, bid.user_id, rejected)))
            })
            .await?;

        tracing::info!(task = %task_id, bid = %bid_id, doer = %doer_id, "bid accepted");

        let events = vec![DomainEvent::TaskAssigned {
            task_id,
            bid_id,
            poster_id: actor.id,
            doer_id,
            rejected_bidders,
        }];
        Ok(Outcome::applied(task, events))
    }
}

/// Guards on the bid chosen to win a task.
pub(crate) fn check_winner(
    agg: &TaskAggregate,
    bid: &BidRecord,
    actor: ActingUser,
    event: &'static str,
) -> Result<(), EngineError> {
    if bid.user_id == actor.id || bid.user_id == agg.task.poster_id {
        return Err(EngineError::invalid(event, agg, RejectionReason::SelfAcceptance));
    }
    if bid.status != BidStatus::Pending {
        return Err(EngineError::invalid(event, agg, RejectionReason::BidNotPending));
    }
    Ok(())
}

/// Task and bid rows after `winner` takes the task.
///
/// Returns the updated task, every bid whose row changes, and the users
/// whose pending bids were rejected.
pub(crate) fn assign(
    agg: &TaskAggregate,
    winner: &BidRecord,
    status: TaskStatus,
    now: DateTime<Utc>,
) -> (TaskRecord, Vec<BidRecord>, Vec<UserId>) {
    let mut task = agg.task.clone();
    task.status = status;
    task.doer_id = Some(winner.user_id);
    task.accepted_bid_id = Some(winner.id);
    task.updated_at = now;

    let mut bids = Vec::with_capacity(agg.bids.len());
    let mut rejected = Vec::new();
    for bid in &agg.bids {
        let mut bid = bid.clone();
        if bid.id == winner.id {
            bid.status = BidStatus::Accepted;
        } else if bid.status == BidStatus::Pending {
            bid.status = BidStatus::Rejected;
            rejected.push(bid.user_id);
        } else {
            continue;
        }
        bid.updated_at = now;
        bids.push(bid);
    }
    (task, bids, rejected)
}
