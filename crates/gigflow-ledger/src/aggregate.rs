//! # Task Aggregate and Change Sets
//!
//! [`TaskAggregate`] is the consistent snapshot a decision closure reads;
//! [`ChangeSet`] is what it asks the store to write. A change set touches
//! at most one task row, any number of that task's bid rows, one payment
//! row, one dispute row, one follow-up, one submission and one balance.

use gigflow_core::{BidId, UserId};
use gigflow_state::{BidStatus, PaymentStatus};

use crate::records::{
    BalanceCredit, BidRecord, DisputeRecord, FollowUpRecord, PaymentRecord, SubmissionRecord,
    TaskRecord,
};

/// A task with its bids, payment and most recent dispute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAggregate {
    pub task: TaskRecord,
    /// Bids in placement order.
    pub bids: Vec<BidRecord>,
    pub payment: Option<PaymentRecord>,
    /// The most recently opened dispute, open or not.
    pub dispute: Option<DisputeRecord>,
}

impl TaskAggregate {
    /// Look up one of the task's bids.
    pub fn bid(&self, id: BidId) -> Option<&BidRecord> {
        self.bids.iter().find(|b| b.id == id)
    }

    /// The accepted bid, if any.
    pub fn accepted_bid(&self) -> Option<&BidRecord> {
        self.bids.iter().find(|b| b.status == BidStatus::Accepted)
    }

    /// Whether `user` already bid on the task.
    pub fn has_bid_from(&self, user: UserId) -> bool {
        self.bids.iter().any(|b| b.user_id == user)
    }

    /// Status of the payment row, `None` when there is none.
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        self.payment.as_ref().map(|p| p.status)
    }

    /// The dispute currently holding settlement, if any.
    pub fn open_dispute(&self) -> Option<&DisputeRecord> {
        self.dispute.as_ref().filter(|d| d.status.is_open())
    }

    /// Whether `user` is the poster or the assigned doer.
    pub fn is_party(&self, user: UserId) -> bool {
        self.task.poster_id == user || self.task.doer_id == Some(user)
    }
}

/// Rows to write atomically when a decision closure succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub task: Option<TaskRecord>,
    pub bids: Vec<BidRecord>,
    pub payment: Option<PaymentRecord>,
    pub dispute: Option<DisputeRecord>,
    pub follow_up: Option<FollowUpRecord>,
    pub submission: Option<SubmissionRecord>,
    pub credit: Option<BalanceCredit>,
}

impl ChangeSet {
    /// A change set that writes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_task(mut self, task: TaskRecord) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_bid(mut self, bid: BidRecord) -> Self {
        self.bids.push(bid);
        self
    }

    pub fn with_bids(mut self, bids: impl IntoIterator<Item = BidRecord>) -> Self {
        self.bids.extend(bids);
        self
    }

    pub fn with_payment(mut self, payment: PaymentRecord) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn with_dispute(mut self, dispute: DisputeRecord) -> Self {
        self.dispute = Some(dispute);
        self
    }

    pub fn with_follow_up(mut self, follow_up: FollowUpRecord) -> Self {
        self.follow_up = Some(follow_up);
        self
    }

    pub fn with_submission(mut self, submission: SubmissionRecord) -> Self {
        self.submission = Some(submission);
        self
    }

    pub fn with_credit(mut self, credit: BalanceCredit) -> Self {
        self.credit = Some(credit);
        self
    }

    /// Whether applying this change set is a no-op.
    pub fn is_empty(&self) -> bool {
        self.task.is_none()
            && self.bids.is_empty()
            && self.payment.is_none()
            && self.dispute.is_none()
            && self.follow_up.is_none()
            && self.submission.is_none()
            && self.credit.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gigflow_core::Money;

    fn aggregate() -> TaskAggregate {
        let poster = UserId::new();
        let task = TaskRecord::open(poster, "Logo", Money::from_units(100), Utc::now());
        let bids = vec![
            BidRecord::pending(task.id, UserId::new(), Money::from_units(60)),
            BidRecord::pending(task.id, UserId::new(), Money::from_units(80)),
        ];
        TaskAggregate {
            task,
            bids,
            payment: None,
            dispute: None,
        }
    }

    #[test]
    fn bid_lookup_and_acceptance() {
        let mut agg = aggregate();
        let id = agg.bids[1].id;
        assert!(agg.bid(id).is_some());
        assert!(agg.accepted_bid().is_none());
        agg.bids[1].status = BidStatus::Accepted;
        assert_eq!(agg.accepted_bid().map(|b| b.id), Some(id));
    }

    #[test]
    fn parties_are_poster_and_doer() {
        let mut agg = aggregate();
        let doer = agg.bids[0].user_id;
        assert!(agg.is_party(agg.task.poster_id));
        assert!(!agg.is_party(doer));
        agg.task.doer_id = Some(doer);
        assert!(agg.is_party(doer));
    }

    #[test]
    fn change_set_emptiness() {
        assert!(ChangeSet::none().is_empty());
        let agg = aggregate();
        assert!(!ChangeSet::none().with_task(agg.task).is_empty());
    }
}
