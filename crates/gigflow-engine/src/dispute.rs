//! # Dispute Resolution Service
//!
//! A dispute freezes settlement on an engaged task. While it is `OPEN` the
//! parties exchange one response and any number of follow-ups; it then
//! ends in an admin ruling or is withdrawn.
//!
//! ```text
//!   OPEN ──resolve(refund)──▶ RESOLVED_REFUND    task CANCELLED, payment REFUNDED
//!     │ ──resolve(release)─▶ RESOLVED_RELEASE   task COMPLETED, payment RELEASED, doer credited
//!     └──cancel───────────▶ CANCELLED          task restored, payment PENDING
//! ```
//!
//! Only the most recent dispute of a task can be open. Older disputes are
//! closed history and reject every mutation with `dispute_not_open`.

use chrono::Utc;
use gigflow_core::{ActingUser, DisputeId, FollowUpId, TaskId, UserId};
use gigflow_ledger::{
    BalanceCredit, ChangeSet, DisputeRecord, FollowUpRecord, LedgerStore, TaskAggregate,
};
use gigflow_state::{
    transition, BidStatus, DisputeOutcome, DisputeStatus, PaymentStatus, RejectionReason,
    TaskEvent,
};
use serde::{Deserialize, Serialize};

use crate::engine::{doer_of, payment_of, required_text, Engine};
use crate::error::EngineError;
use crate::events::DomainEvent;
use crate::outcome::Outcome;

/// Input for [`Engine::open_dispute`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDispute {
    pub reason: String,
}

/// An admin ruling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeRuling {
    pub outcome: DisputeOutcome,
    /// Recorded on the dispute as its resolution. May be empty.
    #[serde(default)]
    pub notes: String,
}

impl<S: LedgerStore> Engine<S> {
    /// Open a dispute on an `ASSIGNED`, `IN_PROGRESS` or `UNDER_REVIEW`
    /// task, by the poster or the doer. The task moves to `IN_DISPUTE` and
    /// the payment is marked `DISPUTED` until the dispute closes.
    pub async fn open_dispute(
        &self,
        actor: ActingUser,
        task_id: TaskId,
        new: NewDispute,
    ) -> Result<Outcome<DisputeRecord>, EngineError> {
        let reason = required_text(&new.reason, "reason")?;
        let (dispute, counterparty_id) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                require_party(agg, actor, "open a dispute")?;
                let next = transition(agg.task.status, agg.payment_status(), TaskEvent::DisputeOpened)?;
                let doer_id = doer_of(agg)?;
                let now = Utc::now();

                let mut task = agg.task.clone();
                task.status = next.task;
                task.updated_at = now;
                let mut payment = payment_of(agg)?.clone();
                payment.status = next.payment.unwrap_or(PaymentStatus::Disputed);
                payment.updated_at = now;
                let dispute = DisputeRecord {
                    id: DisputeId::new(),
                    task_id,
                    initiator_id: actor.id,
                    reason,
                    status: DisputeStatus::Open,
                    pre_dispute_status: agg.task.status,
                    response: None,
                    response_evidence: Vec::new(),
                    responded_by: None,
                    resolution: None,
                    resolved_by: None,
                    created_at: now,
                    closed_at: None,
                };

                let counterparty = counterparty(agg, actor.id, doer_id);
                let changes = ChangeSet::none()
                    .with_task(task)
                    .with_payment(payment)
                    .with_dispute(dispute.clone());
                Ok((changes, (dispute, counterparty)))
            })
            .await?;
        tracing::info!(
            task = %task_id,
            dispute = %dispute.id,
            initiator = %actor.id,
            from = %dispute.pre_dispute_status,
            "dispute opened"
        );

        let events = vec![DomainEvent::DisputeOpened {
            task_id,
            dispute_id: dispute.id,
            initiator_id: actor.id,
            counterparty_id,
        }];
        Ok(Outcome::applied(dispute, events))
    }

    /// The non-initiating party's single response.
    pub async fn respond(
        &self,
        actor: ActingUser,
        dispute_id: DisputeId,
        text: &str,
        evidence: Vec<String>,
    ) -> Result<Outcome<DisputeRecord>, EngineError> {
        let text = required_text(text, "response")?;
        let evidence = clean_evidence(evidence);
        let task_id = self.task_of_dispute(dispute_id).await?;

        let dispute = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                require_party(agg, actor, "respond to the dispute")?;
                let current = open_dispute_of(agg, dispute_id, "DisputeResponded")?;
                if current.initiator_id == actor.id {
                    return Err(EngineError::invalid(
                        "DisputeResponded",
                        agg,
                        RejectionReason::InitiatorCannotRespond,
                    ));
                }
                if current.response.is_some() {
                    return Err(EngineError::invalid(
                        "DisputeResponded",
                        agg,
                        RejectionReason::AlreadyResponded,
                    ));
                }
                let mut dispute = current.clone();
                dispute.response = Some(text);
                dispute.response_evidence = evidence;
                dispute.responded_by = Some(actor.id);
                Ok((ChangeSet::none().with_dispute(dispute.clone()), dispute))
            })
            .await?;
        tracing::info!(task = %task_id, dispute = %dispute_id, responder = %actor.id, "dispute response recorded");

        let events = vec![DomainEvent::DisputeResponded {
            task_id,
            dispute_id,
            responder_id: actor.id,
            initiator_id: dispute.initiator_id,
        }];
        Ok(Outcome::applied(dispute, events))
    }

    /// Append a message to an open dispute, by either party.
    pub async fn add_follow_up(
        &self,
        actor: ActingUser,
        dispute_id: DisputeId,
        message: &str,
        evidence: Vec<String>,
    ) -> Result<Outcome<FollowUpRecord>, EngineError> {
        let message = required_text(message, "message")?;
        let evidence = clean_evidence(evidence);
        let task_id = self.task_of_dispute(dispute_id).await?;

        let (follow_up, recipient_id) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                require_party(agg, actor, "follow up on the dispute")?;
                open_dispute_of(agg, dispute_id, "DisputeFollowUp")?;
                let doer_id = doer_of(agg)?;
                let follow_up = FollowUpRecord {
                    id: FollowUpId::new(),
                    dispute_id,
                    sender_id: actor.id,
                    message,
                    evidence,
                    created_at: Utc::now(),
                };
                let recipient = counterparty(agg, actor.id, doer_id);
                Ok((
                    ChangeSet::none().with_follow_up(follow_up.clone()),
                    (follow_up, recipient),
                ))
            })
            .await?;
        tracing::info!(task = %task_id, dispute = %dispute_id, sender = %actor.id, "dispute follow-up added");

        let events = vec![DomainEvent::DisputeFollowUp {
            task_id,
            dispute_id,
            sender_id: actor.id,
            recipient_id,
        }];
        Ok(Outcome::applied(follow_up, events))
    }

    /// Rule on an open dispute. Admins only.
    ///
    /// `release` pays the doer (credited exactly once) and completes the
    /// task. `refund` returns the escrow to the poster, cancels the task and
    /// clears its doer. Retrying the same ruling returns
    /// [`Outcome::AlreadyProcessed`]; a different ruling on a resolved
    /// dispute is rejected with `outcome_mismatch`.
    pub async fn resolve(
        &self,
        actor: ActingUser,
        dispute_id: DisputeId,
        ruling: DisputeRuling,
    ) -> Result<Outcome<DisputeRecord>, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Unauthorized(
                "only an admin may resolve disputes".into(),
            ));
        }
        let outcome = ruling.outcome;
        let notes = Some(ruling.notes.trim().to_string()).filter(|n| !n.is_empty());
        let event = match outcome {
            DisputeOutcome::Refund => TaskEvent::DisputeResolvedRefund,
            DisputeOutcome::Release => TaskEvent::DisputeResolvedRelease,
        };
        let task_id = self.task_of_dispute(dispute_id).await?;

        let (dispute, settled) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                let current = latest_dispute(agg, dispute_id, event.name())?;
                match current.status {
                    DisputeStatus::Open => {}
                    status if status.outcome() == Some(outcome) => {
                        return Ok((ChangeSet::none(), (current.clone(), None)));
                    }
                    DisputeStatus::ResolvedRefund | DisputeStatus::ResolvedRelease => {
                        return Err(EngineError::invalid(
                            event.name(),
                            agg,
                            RejectionReason::OutcomeMismatch,
                        ));
                    }
                    DisputeStatus::Cancelled => {
                        return Err(EngineError::invalid(
                            event.name(),
                            agg,
                            RejectionReason::DisputeNotOpen,
                        ));
                    }
                }

                let next = transition(agg.task.status, agg.payment_status(), event)?;
                let doer_id = doer_of(agg)?;
                let now = Utc::now();

                let mut payment = payment_of(agg)?.clone();
                payment.status = next.payment.unwrap_or(PaymentStatus::Disputed);
                payment.updated_at = now;
                let mut dispute = current.clone();
                dispute.status = outcome.status();
                dispute.resolution = notes;
                dispute.resolved_by = Some(actor.id);
                dispute.closed_at = Some(now);
                let mut task = agg.task.clone();
                task.status = next.task;
                task.updated_at = now;

                let mut changes = ChangeSet::none();
                match outcome {
                    DisputeOutcome::Release => {
                        changes = changes.with_credit(BalanceCredit {
                            user_id: doer_id,
                            amount: payment.amount,
                        });
                    }
                    DisputeOutcome::Refund => {
                        task.doer_id = None;
                        task.accepted_bid_id = None;
                        if let Some(accepted) = agg.accepted_bid() {
                            let mut bid = accepted.clone();
                            bid.status = BidStatus::Rejected;
                            bid.updated_at = now;
                            changes = changes.with_bid(bid);
                        }
                    }
                }
                let changes = changes
                    .with_task(task)
                    .with_payment(payment.clone())
                    .with_dispute(dispute.clone());
                Ok((
                    changes,
                    (dispute, Some((agg.task.poster_id, doer_id, payment.amount))),
                ))
            })
            .await?;

        let Some((poster_id, doer_id, amount)) = settled else {
            tracing::debug!(task = %task_id, dispute = %dispute_id, "dispute ruling replay ignored");
            return Ok(Outcome::AlreadyProcessed { value: dispute });
        };
        tracing::info!(
            task = %task_id,
            dispute = %dispute_id,
            admin = %actor.id,
            outcome = ?outcome,
            amount = %amount,
            "dispute resolved"
        );

        let events = vec![DomainEvent::DisputeResolved {
            task_id,
            dispute_id,
            outcome,
            poster_id,
            doer_id,
            amount,
        }];
        Ok(Outcome::applied(dispute, events))
    }

    /// Withdraw an open dispute, by either party or an admin. The task
    /// returns to the status it had when the dispute was opened and the
    /// payment to `PENDING`.
    pub async fn cancel_dispute(
        &self,
        actor: ActingUser,
        dispute_id: DisputeId,
    ) -> Result<Outcome<DisputeRecord>, EngineError> {
        let task_id = self.task_of_dispute(dispute_id).await?;
        let (dispute, poster_id, doer_id) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                if !actor.is_admin() {
                    require_party(agg, actor, "cancel the dispute")?;
                }
                let current = open_dispute_of(agg, dispute_id, "DisputeCancelled")?;
                let next = transition(
                    agg.task.status,
                    agg.payment_status(),
                    TaskEvent::DisputeCancelled {
                        restore: current.pre_dispute_status,
                    },
                )?;
                let doer_id = doer_of(agg)?;
                let now = Utc::now();

                let mut task = agg.task.clone();
                task.status = next.task;
                task.updated_at = now;
                let mut payment = payment_of(agg)?.clone();
                payment.status = next.payment.unwrap_or(PaymentStatus::Pending);
                payment.updated_at = now;
                let mut dispute = current.clone();
                dispute.status = DisputeStatus::Cancelled;
                dispute.closed_at = Some(now);

                let changes = ChangeSet::none()
                    .with_task(task)
                    .with_payment(payment)
                    .with_dispute(dispute.clone());
                Ok((changes, (dispute, agg.task.poster_id, doer_id)))
            })
            .await?;
        tracing::info!(
            task = %task_id,
            dispute = %dispute_id,
            actor = %actor.id,
            restored = %dispute.pre_dispute_status,
            "dispute cancelled"
        );

        let events = vec![DomainEvent::DisputeCancelled {
            task_id,
            dispute_id,
            restored: dispute.pre_dispute_status,
            poster_id,
            doer_id,
        }];
        Ok(Outcome::applied(dispute, events))
    }
}

fn require_party(agg: &TaskAggregate, actor: ActingUser, action: &str) -> Result<(), EngineError> {
    if !agg.is_party(actor.id) {
        return Err(EngineError::Unauthorized(format!(
            "only the poster or doer of {} may {action}",
            agg.task.id
        )));
    }
    Ok(())
}

/// The task's most recent dispute, which must be `dispute_id`.
fn latest_dispute<'a>(
    agg: &'a TaskAggregate,
    dispute_id: DisputeId,
    event: &'static str,
) -> Result<&'a DisputeRecord, EngineError> {
    agg.dispute
        .as_ref()
        .filter(|d| d.id == dispute_id)
        .ok_or_else(|| EngineError::invalid(event, agg, RejectionReason::DisputeNotOpen))
}

fn open_dispute_of<'a>(
    agg: &'a TaskAggregate,
    dispute_id: DisputeId,
    event: &'static str,
) -> Result<&'a DisputeRecord, EngineError> {
    let dispute = latest_dispute(agg, dispute_id, event)?;
    if !dispute.status.is_open() {
        return Err(EngineError::invalid(event, agg, RejectionReason::DisputeNotOpen));
    }
    Ok(dispute)
}

/// The other party of a poster/doer pair.
fn counterparty(agg: &TaskAggregate, user: UserId, doer_id: UserId) -> UserId {
    if user == agg.task.poster_id {
        doer_id
    } else {
        agg.task.poster_id
    }
}

fn clean_evidence(evidence: Vec<String>) -> Vec<String> {
    evidence
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}
