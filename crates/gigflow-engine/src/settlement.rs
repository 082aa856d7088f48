//! # Completion & Settlement Service
//!
//! Work moves `ASSIGNED → IN_PROGRESS → UNDER_REVIEW`, may bounce back to
//! `IN_PROGRESS` on a revision request, and ends with the poster's approval.
//! Approval is the single place outside dispute resolution where money is
//! credited: payment `PENDING → RELEASED`, task `COMPLETED` and the doer's
//! balance credit are one change set.

use chrono::Utc;
use gigflow_core::{ActingUser, SubmissionId, TaskId};
use gigflow_ledger::{BalanceCredit, ChangeSet, LedgerStore, SubmissionRecord, TaskRecord};
use gigflow_state::{transition, PaymentStatus, RejectionReason, TaskEvent, TaskStatus};
use serde_json::Value;

use crate::engine::{doer_of, payment_of, require_doer, require_poster, required_text, Engine};
use crate::error::EngineError;
use crate::events::DomainEvent;
use crate::outcome::Outcome;

impl<S: LedgerStore> Engine<S> {
    /// `ASSIGNED → IN_PROGRESS`, by the doer.
    pub async fn start_work(
        &self,
        actor: ActingUser,
        task_id: TaskId,
    ) -> Result<Outcome<TaskRecord>, EngineError> {
        let (task, poster_id) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                require_doer(agg, actor, "start work")?;
                let next = transition(agg.task.status, agg.payment_status(), TaskEvent::WorkStarted)?;
                let mut task = agg.task.clone();
                task.status = next.task;
                task.updated_at = Utc::now();
                Ok((ChangeSet::none().with_task(task.clone()), (task, agg.task.poster_id)))
            })
            .await?;
        tracing::info!(task = %task_id, doer = %actor.id, "work started");

        let events = vec![DomainEvent::WorkStarted {
            task_id,
            poster_id,
            doer_id: actor.id,
        }];
        Ok(Outcome::applied(task, events))
    }

    /// Deliver work for review, by the doer. Stores a submission row.
    pub async fn submit_work(
        &self,
        actor: ActingUser,
        task_id: TaskId,
        payload: Value,
    ) -> Result<Outcome<SubmissionRecord>, EngineError> {
        let (submission, poster_id) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                require_doer(agg, actor, "submit work")?;
                let next = transition(agg.task.status, agg.payment_status(), TaskEvent::WorkSubmitted)?;
                let now = Utc::now();
                let mut task = agg.task.clone();
                task.status = next.task;
                task.updated_at = now;
                let submission = SubmissionRecord {
                    id: SubmissionId::new(),
                    task_id,
                    doer_id: actor.id,
                    payload,
                    created_at: now,
                };
                let changes = ChangeSet::none()
                    .with_task(task)
                    .with_submission(submission.clone());
                Ok((changes, (submission, agg.task.poster_id)))
            })
            .await?;
        tracing::info!(task = %task_id, submission = %submission.id, doer = %actor.id, "work submitted");

        let events = vec![DomainEvent::WorkSubmitted {
            task_id,
            submission_id: submission.id,
            poster_id,
            doer_id: actor.id,
        }];
        Ok(Outcome::applied(submission, events))
    }

    /// `UNDER_REVIEW → IN_PROGRESS`, by the poster, with feedback for the doer.
    pub async fn request_revision(
        &self,
        actor: ActingUser,
        task_id: TaskId,
        feedback: &str,
    ) -> Result<Outcome<TaskRecord>, EngineError> {
        let feedback = required_text(feedback, "feedback")?;
        let (task, doer_id) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                require_poster(agg, actor, "request revisions")?;
                let next = transition(
                    agg.task.status,
                    agg.payment_status(),
                    TaskEvent::RevisionRequested,
                )?;
                let doer_id = doer_of(agg)?;
                let mut task = agg.task.clone();
                task.status = next.task;
                task.updated_at = Utc::now();
                Ok((ChangeSet::none().with_task(task.clone()), (task, doer_id)))
            })
            .await?;
        tracing::info!(task = %task_id, poster = %actor.id, "revision requested");

        let events = vec![DomainEvent::RevisionRequested {
            task_id,
            poster_id: actor.id,
            doer_id,
            feedback,
        }];
        Ok(Outcome::applied(task, events))
    }

    /// Approve reviewed work and release escrow to the doer.
    ///
    /// A retry after success finds the task `COMPLETED` with a `RELEASED`
    /// payment and returns [`Outcome::AlreadyProcessed`] without crediting
    /// again. An open dispute blocks approval.
    pub async fn approve_work(
        &self,
        actor: ActingUser,
        task_id: TaskId,
    ) -> Result<Outcome<TaskRecord>, EngineError> {
        let (task, settled) = self
            .store
            .transact(task_id, |agg| -> Result<_, EngineError> {
                require_poster(agg, actor, "approve work")?;
                if agg.task.status == TaskStatus::Completed
                    && agg.payment_status() == Some(PaymentStatus::Released)
                {
                    return Ok((ChangeSet::none(), (agg.task.clone(), None)));
                }
                if agg.open_dispute().is_some() {
                    return Err(EngineError::invalid(
                        "WorkApproved",
                        agg,
                        RejectionReason::DisputeOpen,
                    ));
                }
                let next = transition(agg.task.status, agg.payment_status(), TaskEvent::WorkApproved)?;
                let payment = payment_of(agg)?;
                let doer_id = doer_of(agg)?;

                let now = Utc::now();
                let mut task = agg.task.clone();
                task.status = next.task;
                task.updated_at = now;
                let mut released = payment.clone();
                released.status = next.payment.unwrap_or(PaymentStatus::Released);
                released.updated_at = now;

                let changes = ChangeSet::none()
                    .with_task(task.clone())
                    .with_payment(released.clone())
                    .with_credit(BalanceCredit {
                        user_id: doer_id,
                        amount: released.amount,
                    });
                Ok((changes, (task, Some((released, doer_id)))))
            })
            .await?;

        let Some((payment, doer_id)) = settled else {
            tracing::debug!(task = %task_id, "approval replay ignored");
            return Ok(Outcome::AlreadyProcessed { value: task });
        };
        tracing::info!(
            task = %task_id,
            payment = %payment.id,
            doer = %doer_id,
            amount = %payment.amount,
            "work approved, escrow released"
        );

        let events = vec![DomainEvent::TaskCompleted {
            task_id,
            payment_id: payment.id,
            poster_id: actor.id,
            doer_id,
            amount: payment.amount,
        }];
        Ok(Outcome::applied(task, events))
    }
}
