//! # Escrow Payment Service
//!
//! Pay-before-assign in two phases.
//!
//! 1. **Initiate**: the poster picks a bid. A `PENDING` payment row for the
//!    bid amount is created (or re-pointed, if the poster changes their mind
//!    before paying) with a fresh correlation id, and a signed checkout form
//!    is returned. The task stays `OPEN`.
//! 2. **Confirm**: the processor's webhook reports capture. After the
//!    status and signature checks, one transaction records the capture,
//!    accepts the bid, rejects its siblings and assigns the task.
//!
//! Webhooks may be delivered more than once. A replay for a payment that
//! was already captured and assigned returns `AlreadyProcessed` without
//! writing anything.

use chrono::Utc;
use gigflow_core::{ActingUser, BidId, Money, PaymentId, TaskId, UserId};
use gigflow_ledger::{ChangeSet, LedgerStore, PaymentRecord};
use gigflow_state::{transition, BidStatus, PaymentStatus, RejectionReason, TaskEvent, TaskStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::bids::{assign, check_winner};
use crate::engine::{require_poster, Engine};
use crate::error::EngineError;
use crate::events::DomainEvent;
use crate::outcome::Outcome;
use crate::processor::{CheckoutForm, CheckoutRequest};
use crate::signature::PaymentCallback;

/// Optional callback field carrying the captured amount.
const AMOUNT_FIELD: &str = "amount_gross";

/// Result of [`Engine::initiate_payment`].
#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub payment: PaymentRecord,
    pub form: CheckoutForm,
}

enum Confirmation {
    Replay(PaymentRecord),
    Captured {
        payment: PaymentRecord,
        bid_id: BidId,
        poster_id: UserId,
        doer_id: UserId,
        rejected: Vec<UserId>,
    },
}

impl<S: LedgerStore> Engine<S> {
    /// Start escrow for `bid_id` on an `OPEN` task.
    pub async fn initiate_payment(
        &self,
        actor: ActingUser,
        task_id: TaskId,
        bid_id: BidId,
    ) -> Result<Outcome<Checkout>, EngineError> {
        let (payment, item_name) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                let bid = agg
                    .bid(bid_id)
                    .ok_or_else(|| EngineError::NotFound(bid_id.to_string()))?;
                require_poster(agg, actor, "pay for it")?;
                if agg.task.status != TaskStatus::Open {
                    return Err(EngineError::invalid(
                        "InitiatePayment",
                        agg,
                        RejectionReason::TaskNotOpen,
                    ));
                }
                check_winner(agg, bid, actor, "InitiatePayment")?;

                let now = Utc::now();
                let correlation_id = Uuid::new_v4().to_string();
                let payment = match &agg.payment {
                    Some(existing) => {
                        if existing.status != PaymentStatus::Pending || existing.captured_at.is_some() {
                            return Err(EngineError::invalid(
                                "InitiatePayment",
                                agg,
                                RejectionReason::PaymentNotPending,
                            ));
                        }
                        let mut p = existing.clone();
                        p.bid_id = bid.id;
                        p.receiver_id = bid.user_id;
                        p.amount = bid.amount;
                        p.correlation_id = correlation_id;
                        p.updated_at = now;
                        p
                    }
                    None => PaymentRecord {
                        id: PaymentId::new(),
                        task_id,
                        bid_id: bid.id,
                        sender_id: agg.task.poster_id,
                        receiver_id: bid.user_id,
                        amount: bid.amount,
                        status: PaymentStatus::Pending,
                        correlation_id,
                        verification_payload: None,
                        captured_at: None,
                        created_at: now,
                        updated_at: now,
                    },
                };
                Ok((
                    ChangeSet::none().with_payment(payment.clone()),
                    (payment, agg.task.title.clone()),
                ))
            })
            .await?;

        let form = self.processor.checkout_form(&CheckoutRequest {
            correlation_id: payment.correlation_id.clone(),
            amount: payment.amount,
            item_name,
        });
        tracing::info!(
            task = %task_id,
            payment = %payment.id,
            bid = %bid_id,
            amount = %payment.amount,
            "escrow payment initiated"
        );

        let events = vec![DomainEvent::PaymentInitiated {
            task_id,
            payment_id: payment.id,
            poster_id: actor.id,
            amount: payment.amount,
        }];
        Ok(Outcome::applied(Checkout { payment, form }, events))
    }

    /// Apply a processor callback.
    ///
    /// Order of checks: the correlation id must resolve, the external
    /// status must be `complete`, and the signature must verify. Only then
    /// is the ledger touched.
    pub async fn confirm_callback(
        &self,
        callback: PaymentCallback,
    ) -> Result<Outcome<PaymentRecord>, EngineError> {
        let correlation_id = callback.correlation_id.clone();
        let task_id = self
            .store
            .task_for_correlation(&correlation_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("payment {correlation_id}")))?;

        if !callback.is_complete() {
            let agg = self
                .store
                .aggregate(task_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(task_id.to_string()))?;
            tracing::info!(
                task = %task_id,
                correlation = %correlation_id,
                status = %callback.external_status,
                "payment callback without capture"
            );
            return Err(EngineError::invalid(
                "PaymentConfirmed",
                &agg,
                RejectionReason::PaymentNotConfirmed,
            ));
        }

        if let Err(e) = self.processor.verify_callback(&callback) {
            tracing::warn!(task = %task_id, correlation = %correlation_id, error = %e, "payment callback signature rejected");
            return Err(EngineError::SignatureInvalid);
        }

        let captured_amount = callback
            .field(AMOUNT_FIELD)
            .map(|v| Money::parse(v).map_err(EngineError::from))
            .transpose()?;
        let audit = callback.audit_payload();
        let expected_correlation = correlation_id.clone();

        let confirmation = self
            .store
            .transact(task_id, move |agg| -> Result<_, EngineError> {
                let payment = agg
                    .payment
                    .as_ref()
                    .filter(|p| p.correlation_id == expected_correlation)
                    .ok_or_else(|| {
                        EngineError::Conflict(format!(
                            "payment for {} was re-initiated",
                            agg.task.id
                        ))
                    })?;

                // A capture is final: whatever the task went through since
                // (payout, refund), this correlation id has been applied.
                if payment.captured_at.is_some() {
                    return Ok((ChangeSet::none(), Confirmation::Replay(payment.clone())));
                }

                let next = transition(agg.task.status, Some(payment.status), TaskEvent::PaymentConfirmed)?;
                if let Some(amount) = captured_amount {
                    if amount != payment.amount {
                        return Err(EngineError::Validation(format!(
                            "captured {amount} does not match escrow amount {}",
                            payment.amount
                        )));
                    }
                }
                let bid = agg
                    .bid(payment.bid_id)
                    .ok_or_else(|| EngineError::NotFound(payment.bid_id.to_string()))?;
                if bid.status != BidStatus::Pending {
                    return Err(EngineError::invalid(
                        "PaymentConfirmed",
                        agg,
                        RejectionReason::BidNotPending,
                    ));
                }

                let now = Utc::now();
                let (task, bids, rejected) = assign(agg, bid, next.task, now);
                let mut captured = payment.clone();
                captured.status = next.payment.unwrap_or(PaymentStatus::Pending);
                captured.captured_at = Some(now);
                captured.verification_payload = Some(audit);
                captured.updated_at = now;

                let changes = ChangeSet::none()
                    .with_task(task)
                    .with_bids(bids)
                    .with_payment(captured.clone());
                Ok((
                    changes,
                    Confirmation::Captured {
                        payment: captured,
                        bid_id: bid.id,
                        poster_id: agg.task.poster_id,
                        doer_id: bid.user_id,
                        rejected,
                    },
                ))
            })
            .await?;

        match confirmation {
            Confirmation::Replay(payment) => {
                tracing::debug!(task = %task_id, correlation = %correlation_id, "payment callback replay ignored");
                Ok(Outcome::AlreadyProcessed { value: payment })
            }
            Confirmation::Captured {
                payment,
                bid_id,
                poster_id,
                doer_id,
                rejected,
            } => {
                tracing::info!(
                    task = %task_id,
                    payment = %payment.id,
                    doer = %doer_id,
                    amount = %payment.amount,
                    "escrow captured, task assigned"
                );
                let events = vec![
                    DomainEvent::PaymentCaptured {
                        task_id,
                        payment_id: payment.id,
                        poster_id,
                        doer_id,
                        amount: payment.amount,
                    },
                    DomainEvent::TaskAssigned {
                        task_id,
                        bid_id,
                        poster_id,
                        doer_id,
                        rejected_bidders: rejected,
                    },
                ];
                Ok(Outcome::applied(payment, events))
            }
        }
    }
}
