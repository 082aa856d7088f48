//! # Domain Events and Dispatch
//!
//! Each committed operation returns the [`DomainEvent`]s it caused. The
//! caller hands them to an [`EventDispatcher`] after the transaction, which
//! fans them out to the notification and realtime collaborators. Delivery
//! is best-effort: failures are logged and never reach the caller.

use std::sync::Arc;

use async_trait::async_trait;
use gigflow_core::{BidId, DisputeId, Money, PaymentId, SubmissionId, TaskId, UserId};
use gigflow_state::{DisputeOutcome, TaskStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Something that happened to a task, after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskCreated {
        task_id: TaskId,
        poster_id: UserId,
    },
    BidPlaced {
        task_id: TaskId,
        bid_id: BidId,
        poster_id: UserId,
        bidder_id: UserId,
        amount: Money,
    },
    TaskCancelled {
        task_id: TaskId,
        poster_id: UserId,
        bidders: Vec<UserId>,
    },
    /// A bid won, by direct acceptance or confirmed escrow.
    TaskAssigned {
        task_id: TaskId,
        bid_id: BidId,
        poster_id: UserId,
        doer_id: UserId,
        rejected_bidders: Vec<UserId>,
    },
    PaymentInitiated {
        task_id: TaskId,
        payment_id: PaymentId,
        poster_id: UserId,
        amount: Money,
    },
    PaymentCaptured {
        task_id: TaskId,
        payment_id: PaymentId,
        poster_id: UserId,
        doer_id: UserId,
        amount: Money,
    },
    WorkStarted {
        task_id: TaskId,
        poster_id: UserId,
        doer_id: UserId,
    },
    WorkSubmitted {
        task_id: TaskId,
        submission_id: SubmissionId,
        poster_id: UserId,
        doer_id: UserId,
    },
    RevisionRequested {
        task_id: TaskId,
        poster_id: UserId,
        doer_id: UserId,
        feedback: String,
    },
    /// Work approved and escrow released to the doer.
    TaskCompleted {
        task_id: TaskId,
        payment_id: PaymentId,
        poster_id: UserId,
        doer_id: UserId,
        amount: Money,
    },
    DisputeOpened {
        task_id: TaskId,
        dispute_id: DisputeId,
        initiator_id: UserId,
        counterparty_id: UserId,
    },
    DisputeResponded {
        task_id: TaskId,
        dispute_id: DisputeId,
        responder_id: UserId,
        initiator_id: UserId,
    },
    DisputeFollowUp {
        task_id: TaskId,
        dispute_id: DisputeId,
        sender_id: UserId,
        recipient_id: UserId,
    },
    DisputeResolved {
        task_id: TaskId,
        dispute_id: DisputeId,
        outcome: DisputeOutcome,
        poster_id: UserId,
        doer_id: UserId,
        amount: Money,
    },
    DisputeCancelled {
        task_id: TaskId,
        dispute_id: DisputeId,
        restored: TaskStatus,
        poster_id: UserId,
        doer_id: UserId,
    },
}

impl DomainEvent {
    /// Event type string used for notifications and broadcasts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskCreated { .. } => "task_created",
            Self::BidPlaced { .. } => "bid_placed",
            Self::TaskCancelled { .. } => "task_cancelled",
            Self::TaskAssigned { .. } => "task_assigned",
            Self::PaymentInitiated { .. } => "payment_initiated",
            Self::PaymentCaptured { .. } => "payment_captured",
            Self::WorkStarted { .. } => "work_started",
            Self::WorkSubmitted { .. } => "work_submitted",
            Self::RevisionRequested { .. } => "revision_requested",
            Self::TaskCompleted { .. } => "task_completed",
            Self::DisputeOpened { .. } => "dispute_opened",
            Self::DisputeResponded { .. } => "dispute_responded",
            Self::DisputeFollowUp { .. } => "dispute_follow_up",
            Self::DisputeResolved { .. } => "dispute_resolved",
            Self::DisputeCancelled { .. } => "dispute_cancelled",
        }
    }

    /// The task the event belongs to.
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::TaskCreated { task_id, .. }
            | Self::BidPlaced { task_id, .. }
            | Self::TaskCancelled { task_id, .. }
            | Self::TaskAssigned { task_id, .. }
            | Self::PaymentInitiated { task_id, .. }
            | Self::PaymentCaptured { task_id, .. }
            | Self::WorkStarted { task_id, .. }
            | Self::WorkSubmitted { task_id, .. }
            | Self::RevisionRequested { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::DisputeOpened { task_id, .. }
            | Self::DisputeResponded { task_id, .. }
            | Self::DisputeFollowUp { task_id, .. }
            | Self::DisputeResolved { task_id, .. }
            | Self::DisputeCancelled { task_id, .. } => *task_id,
        }
    }

    /// Users to notify. The actor of the operation is not included.
    pub fn recipients(&self) -> Vec<UserId> {
        match self {
            Self::TaskCreated { .. } => Vec::new(),
            Self::BidPlaced { poster_id, .. } => vec![*poster_id],
            Self::TaskCancelled { bidders, .. } => bidders.clone(),
            Self::TaskAssigned {
                doer_id,
                rejected_bidders,
                ..
            } => std::iter::once(*doer_id)
                .chain(rejected_bidders.iter().copied())
                .collect(),
            Self::PaymentInitiated { .. } => Vec::new(),
            Self::PaymentCaptured { poster_id, .. } => vec![*poster_id],
            Self::WorkStarted { poster_id, .. } => vec![*poster_id],
            Self::WorkSubmitted { poster_id, .. } => vec![*poster_id],
            Self::RevisionRequested { doer_id, .. } => vec![*doer_id],
            Self::TaskCompleted { doer_id, .. } => vec![*doer_id],
            Self::DisputeOpened {
                counterparty_id, ..
            } => vec![*counterparty_id],
            Self::DisputeResponded { initiator_id, .. } => vec![*initiator_id],
            Self::DisputeFollowUp { recipient_id, .. } => vec![*recipient_id],
            Self::DisputeResolved {
                poster_id, doer_id, ..
            }
            | Self::DisputeCancelled {
                poster_id, doer_id, ..
            } => vec![*poster_id, *doer_id],
        }
    }

    /// JSON payload shared by notifications and broadcasts.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Notification requests for this event.
    pub fn notifications(&self) -> Vec<Notification> {
        let payload = self.payload();
        self.recipients()
            .into_iter()
            .map(|target_user_id| Notification {
                kind: self.kind(),
                target_user_id,
                payload: payload.clone(),
            })
            .collect()
    }

    /// Realtime broadcasts: the task channel plus each recipient's channel.
    pub fn broadcasts(&self) -> Vec<Broadcast> {
        let payload = self.payload();
        std::iter::once(format!("task:{}", self.task_id().as_uuid()))
            .chain(
                self.recipients()
                    .into_iter()
                    .map(|u| format!("user:{}", u.as_uuid())),
            )
            .map(|channel| Broadcast {
                channel,
                event_type: self.kind(),
                payload: payload.clone(),
            })
            .collect()
    }
}

/// A request to notify one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: &'static str,
    pub target_user_id: UserId,
    pub payload: serde_json::Value,
}

/// A realtime message for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Broadcast {
    pub channel: String,
    pub event_type: &'static str,
    pub payload: serde_json::Value,
}

/// A collaborator failed to accept a message.
#[derive(Error, Debug)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Notification delivery collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn emit(&self, notification: Notification) -> Result<(), DispatchError>;
}

/// Realtime channel collaborator.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, broadcast: Broadcast) -> Result<(), DispatchError>;
}

/// Notifier that writes each notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn emit(&self, notification: Notification) -> Result<(), DispatchError> {
        tracing::info!(
            kind = notification.kind,
            target = %notification.target_user_id,
            "notification"
        );
        Ok(())
    }
}

/// In-process broadcast hub. Subscribers receive every message published
/// after they subscribe; slow subscribers lag and drop old messages.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Broadcast>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Broadcaster for BroadcastHub {
    async fn publish(&self, broadcast: Broadcast) -> Result<(), DispatchError> {
        // No subscribers is not a failure.
        let _ = self.sender.send(broadcast);
        Ok(())
    }
}

/// Fans events out to the collaborators.
#[derive(Clone)]
pub struct EventDispatcher {
    notifier: Arc<dyn Notifier>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}

impl EventDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            notifier,
            broadcaster,
        }
    }

    /// Deliver every notification and broadcast. Never fails.
    pub async fn dispatch(&self, events: &[DomainEvent]) {
        for event in events {
            for notification in event.notifications() {
                if let Err(e) = self.notifier.emit(notification).await {
                    tracing::warn!(kind = event.kind(), error = %e, "notification dispatch failed");
                }
            }
            for broadcast in event.broadcasts() {
                if let Err(e) = self.broadcaster.publish(broadcast).await {
                    tracing::warn!(kind = event.kind(), error = %e, "broadcast dispatch failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn emit(&self, n: Notification) -> Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError("down".into()));
            }
            self.seen.lock().unwrap().push(n.kind);
            Ok(())
        }
    }

    fn assigned() -> DomainEvent {
        DomainEvent::TaskAssigned {
            task_id: TaskId::new(),
            bid_id: BidId::new(),
            poster_id: UserId::new(),
            doer_id: UserId::new(),
            rejected_bidders: vec![UserId::new(), UserId::new()],
        }
    }

    #[test]
    fn assignment_notifies_doer_and_losers() {
        let event = assigned();
        let notes = event.notifications();
        assert_eq!(notes.len(), 3);
        assert!(notes.iter().all(|n| n.kind == "task_assigned"));
    }

    #[test]
    fn broadcasts_hit_task_and_user_channels() {
        let event = assigned();
        let channels: Vec<String> = event.broadcasts().into_iter().map(|b| b.channel).collect();
        assert_eq!(channels.len(), 4);
        assert!(channels[0].starts_with("task:"));
        assert!(channels[1..].iter().all(|c| c.starts_with("user:")));
    }

    #[test]
    fn payload_is_tagged() {
        let payload = assigned().payload();
        assert_eq!(payload["type"], "task_assigned");
    }

    #[tokio::test]
    async fn hub_delivers_to_subscribers() {
        let hub = BroadcastHub::new(8);
        let mut rx = hub.subscribe();
        let dispatcher = EventDispatcher::new(Arc::new(TracingNotifier), Arc::new(hub));
        dispatcher.dispatch(&[assigned()]).await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type, "task_assigned");
    }

    #[tokio::test]
    async fn failing_notifier_does_not_stop_dispatch() {
        let hub = BroadcastHub::new(8);
        let mut rx = hub.subscribe();
        let notifier = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let dispatcher = EventDispatcher::new(notifier, Arc::new(hub));
        dispatcher.dispatch(&[assigned()]).await;
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn recorder_sees_each_recipient() {
        let notifier = Arc::new(Recorder::default());
        let dispatcher = EventDispatcher::new(notifier.clone(), Arc::new(BroadcastHub::default()));
        dispatcher.dispatch(&[assigned()]).await;
        assert_eq!(notifier.seen.lock().unwrap().len(), 3);
    }
}
