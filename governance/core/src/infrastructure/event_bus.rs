// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for governance notifications
//
// In-memory fan-out over a tokio broadcast channel. Publishing never blocks
// and never fails: a full channel drops the oldest events for slow receivers,
// and publishing with no subscribers is a no-op.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{GovernanceEvent, NotificationSink};
use crate::domain::ids::{DocumentId, PersonId};

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<GovernanceEvent>>,
}

impl EventBus {
    /// Capacity is how many events are buffered before slow receivers lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: GovernanceEvent) {
        debug!(?event, "Publishing governance event");
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Events concerning one document only.
    pub fn subscribe_document(&self, document_id: DocumentId) -> DocumentEventReceiver {
        DocumentEventReceiver {
            receiver: self.sender.subscribe(),
            document_id,
        }
    }

    /// Task assignment and overdue notices for one person.
    pub fn subscribe_assignee(&self, assignee: PersonId) -> AssigneeEventReceiver {
        AssigneeEventReceiver {
            receiver: self.sender.subscribe(),
            assignee,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for EventBus {
    fn notify(&self, event: GovernanceEvent) {
        self.publish(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<GovernanceEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<GovernanceEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<GovernanceEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

pub struct DocumentEventReceiver {
    receiver: broadcast::Receiver<GovernanceEvent>,
    document_id: DocumentId,
}

impl DocumentEventReceiver {
    pub async fn recv(&mut self) -> Result<GovernanceEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.document_id() == Some(self.document_id) {
                return Ok(event);
            }
        }
    }
}

pub struct AssigneeEventReceiver {
    receiver: broadcast::Receiver<GovernanceEvent>,
    assignee: PersonId,
}

impl AssigneeEventReceiver {
    pub async fn recv(&mut self) -> Result<GovernanceEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            let matches = match &event {
                GovernanceEvent::TaskAssigned { assignee, .. } | GovernanceEvent::TaskOverdue { assignee, .. } => {
                    *assignee == self.assignee
                }
                _ => false,
            };
            if matches {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::DocumentStatus;
    use crate::domain::ids::{TaskId, WorkflowInstanceId};
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let document_id = DocumentId::new();

        bus.notify(GovernanceEvent::DocumentStatusChanged {
            document_id,
            from: DocumentStatus::Draft,
            to: DocumentStatus::Active,
            changed_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            GovernanceEvent::DocumentStatusChanged { document_id: id, to, .. } => {
                assert_eq!(id, document_id);
                assert_eq!(to, DocumentStatus::Active);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_document_filtering() {
        let bus = EventBus::new(10);
        let wanted = DocumentId::new();
        let mut receiver = bus.subscribe_document(wanted);

        for document_id in [DocumentId::new(), wanted] {
            bus.publish(GovernanceEvent::WorkflowCancelled {
                instance_id: WorkflowInstanceId::new(),
                document_id,
                cancelled_at: Utc::now(),
            });
        }

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.document_id(), Some(wanted));
    }

    #[tokio::test]
    async fn test_assignee_filtering() {
        let bus = EventBus::new(10);
        let reviewer = PersonId::new();
        let mut receiver = bus.subscribe_assignee(reviewer);

        for assignee in [PersonId::new(), reviewer] {
            bus.publish(GovernanceEvent::TaskAssigned {
                task_id: TaskId::new(),
                instance_id: WorkflowInstanceId::new(),
                assignee,
                due_at: None,
                assigned_at: Utc::now(),
            });
        }

        match receiver.recv().await.unwrap() {
            GovernanceEvent::TaskAssigned { assignee, .. } => assert_eq!(assignee, reviewer),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new(1);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(GovernanceEvent::WorkflowCancelled {
            instance_id: WorkflowInstanceId::new(),
            document_id: DocumentId::new(),
            cancelled_at: Utc::now(),
        });
    }
}
