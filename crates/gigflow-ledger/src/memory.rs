//! # In-Memory Ledger
//!
//! All tables live behind one `parking_lot::Mutex`, so a transaction sees
//! and writes a consistent snapshot. The change set is validated against
//! the same uniqueness rules the SQL schema enforces before any table is
//! touched, which keeps application all-or-nothing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gigflow_core::{DisputeId, Money, TaskId, UserId};
use parking_lot::Mutex;

use crate::aggregate::{ChangeSet, TaskAggregate};
use crate::error::StoreError;
use crate::records::{
    BidRecord, DisputeRecord, FollowUpRecord, PaymentRecord, SubmissionRecord, TaskRecord,
};
use crate::store::LedgerStore;

#[derive(Debug, Default)]
struct Tables {
    tasks: HashMap<TaskId, TaskRecord>,
    bids: HashMap<TaskId, Vec<BidRecord>>,
    /// Keyed by task: the map key is the uniqueness constraint.
    payments: HashMap<TaskId, PaymentRecord>,
    correlations: HashMap<String, TaskId>,
    /// Per task, in opening order.
    disputes: HashMap<TaskId, Vec<DisputeRecord>>,
    dispute_tasks: HashMap<DisputeId, TaskId>,
    follow_ups: HashMap<DisputeId, Vec<FollowUpRecord>>,
    submissions: HashMap<TaskId, Vec<SubmissionRecord>>,
    balances: HashMap<UserId, Money>,
}

impl Tables {
    fn aggregate(&self, task_id: TaskId) -> Option<TaskAggregate> {
        let task = self.tasks.get(&task_id)?.clone();
        Some(TaskAggregate {
            task,
            bids: self.bids.get(&task_id).cloned().unwrap_or_default(),
            payment: self.payments.get(&task_id).cloned(),
            dispute: self
                .disputes
                .get(&task_id)
                .and_then(|d| d.last())
                .cloned(),
        })
    }

    /// Validate `changes` and compute the resulting balance, if any.
    fn check(
        &self,
        task_id: TaskId,
        changes: &ChangeSet,
    ) -> Result<Option<(UserId, Money)>, StoreError> {
        if let Some(task) = &changes.task {
            if task.id != task_id {
                return Err(StoreError::Conflict(format!(
                    "change set for {task_id} rewrites {}",
                    task.id
                )));
            }
        }
        if let Some(bid) = changes.bids.iter().find(|b| b.task_id != task_id) {
            return Err(StoreError::Conflict(format!(
                "{} does not belong to {task_id}",
                bid.id
            )));
        }
        if let Some(payment) = &changes.payment {
            if payment.task_id != task_id {
                return Err(StoreError::Conflict(format!(
                    "{} does not belong to {task_id}",
                    payment.id
                )));
            }
            if let Some(existing) = self.payments.get(&task_id) {
                if existing.id != payment.id {
                    return Err(StoreError::Conflict(format!(
                        "payment already exists for {task_id}"
                    )));
                }
            }
            if let Some(owner) = self.correlations.get(&payment.correlation_id) {
                if *owner != task_id {
                    return Err(StoreError::Conflict(format!(
                        "correlation id {} already in use",
                        payment.correlation_id
                    )));
                }
            }
        }
        if let Some(dispute) = &changes.dispute {
            if dispute.task_id != task_id {
                return Err(StoreError::Conflict(format!(
                    "{} does not belong to {task_id}",
                    dispute.id
                )));
            }
            let is_new = !self.dispute_tasks.contains_key(&dispute.id);
            let has_open = self
                .disputes
                .get(&task_id)
                .is_some_and(|d| d.iter().any(|x| x.status.is_open()));
            if is_new && has_open {
                return Err(StoreError::Conflict(format!(
                    "{task_id} already has an open dispute"
                )));
            }
        }
        if let Some(follow_up) = &changes.follow_up {
            let owner = self
                .dispute_tasks
                .get(&follow_up.dispute_id)
                .copied()
                .or_else(|| {
                    changes
                        .dispute
                        .as_ref()
                        .filter(|d| d.id == follow_up.dispute_id)
                        .map(|d| d.task_id)
                });
            if owner != Some(task_id) {
                return Err(StoreError::Conflict(format!(
                    "{} does not belong to {task_id}",
                    follow_up.dispute_id
                )));
            }
        }
        if let Some(submission) = &changes.submission {
            if submission.task_id != task_id {
                return Err(StoreError::Conflict(format!(
                    "{} does not belong to {task_id}",
                    submission.id
                )));
            }
        }
        changes
            .credit
            .map(|credit| {
                let current = self
                    .balances
                    .get(&credit.user_id)
                    .copied()
                    .unwrap_or_else(Money::zero);
                current
                    .checked_add(credit.amount)
                    .map(|total| (credit.user_id, total))
                    .ok_or_else(|| StoreError::Overflow(credit.user_id.to_string()))
            })
            .transpose()
    }

    fn apply(&mut self, task_id: TaskId, changes: ChangeSet, balance: Option<(UserId, Money)>) {
        if let Some(task) = changes.task {
            self.tasks.insert(task_id, task);
        }
        let bids = self.bids.entry(task_id).or_default();
        for bid in changes.bids {
            match bids.iter_mut().find(|b| b.id == bid.id) {
                Some(slot) => *slot = bid,
                None => bids.push(bid),
            }
        }
        if let Some(payment) = changes.payment {
            if let Some(previous) = self.payments.get(&task_id) {
                self.correlations.remove(&previous.correlation_id);
            }
            self.correlations
                .insert(payment.correlation_id.clone(), task_id);
            self.payments.insert(task_id, payment);
        }
        if let Some(dispute) = changes.dispute {
            self.dispute_tasks.insert(dispute.id, task_id);
            let disputes = self.disputes.entry(task_id).or_default();
            match disputes.iter_mut().find(|d| d.id == dispute.id) {
                Some(slot) => *slot = dispute,
                None => disputes.push(dispute),
            }
        }
        if let Some(follow_up) = changes.follow_up {
            self.follow_ups
                .entry(follow_up.dispute_id)
                .or_default()
                .push(follow_up);
        }
        if let Some(submission) = changes.submission {
            self.submissions.entry(task_id).or_default().push(submission);
        }
        if let Some((user, total)) = balance {
            self.balances.insert(user, total);
        }
    }

    fn transact<R, E, F>(&mut self, task_id: TaskId, decide: F) -> Result<R, E>
    where
        F: FnOnce(&TaskAggregate) -> Result<(ChangeSet, R), E>,
        E: From<StoreError>,
    {
        let aggregate = self
            .aggregate(task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;
        let (changes, value) = decide(&aggregate)?;
        let balance = self.check(task_id, &changes)?;
        self.apply(task_id, changes, balance);
        Ok(value)
    }
}

/// Ledger held entirely in process memory. Cloning shares the tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert_task(&self, task: TaskRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if tables.tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(format!("{} already exists", task.id)));
        }
        tables.tasks.insert(task.id, task);
        Ok(())
    }

    async fn transact<R, E, F>(&self, task_id: TaskId, decide: F) -> Result<R, E>
    where
        F: FnOnce(&TaskAggregate) -> Result<(ChangeSet, R), E> + Send,
        R: Send,
        E: From<StoreError> + Send,
    {
        self.tables.lock().transact(task_id, decide)
    }

    async fn aggregate(&self, task_id: TaskId) -> Result<Option<TaskAggregate>, StoreError> {
        Ok(self.tables.lock().aggregate(task_id))
    }

    async fn task_for_dispute(&self, dispute_id: DisputeId) -> Result<Option<TaskId>, StoreError> {
        Ok(self.tables.lock().dispute_tasks.get(&dispute_id).copied())
    }

    async fn task_for_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<TaskId>, StoreError> {
        Ok(self.tables.lock().correlations.get(correlation_id).copied())
    }

    async fn dispute(&self, dispute_id: DisputeId) -> Result<Option<DisputeRecord>, StoreError> {
        let tables = self.tables.lock();
        let found = tables
            .dispute_tasks
            .get(&dispute_id)
            .and_then(|task_id| tables.disputes.get(task_id))
            .and_then(|disputes| disputes.iter().find(|d| d.id == dispute_id))
            .cloned();
        Ok(found)
    }

    async fn follow_ups(&self, dispute_id: DisputeId) -> Result<Vec<FollowUpRecord>, StoreError> {
        Ok(self
            .tables
            .lock()
            .follow_ups
            .get(&dispute_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn submissions(&self, task_id: TaskId) -> Result<Vec<SubmissionRecord>, StoreError> {
        Ok(self
            .tables
            .lock()
            .submissions
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn balance(&self, user_id: UserId) -> Result<Money, StoreError> {
        Ok(self
            .tables
            .lock()
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or_else(Money::zero))
    }
}
