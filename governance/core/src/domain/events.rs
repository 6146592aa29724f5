// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Governance events and audit records
//!
//! Two outbound streams leave the core:
//!
//! - [`GovernanceEvent`]s go to a [`NotificationSink`]. Delivery is
//!   fire-and-forget and must never block or fail the operation that raised it.
//! - [`AuditEntry`]s go to an [`AuditSink`] for privileged or destructive
//!   operations. The acting person is taken from the [`Actor`] that
//!   performed the operation, never from request data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::actor::Actor;
use crate::domain::document::DocumentStatus;
use crate::domain::ids::{
    AuditEntryId, DocumentId, LegalHoldId, NodeId, PersonId, RetentionId, TaskId, VersionId, WorkflowInstanceId,
};
use crate::domain::retention::DispositionAction;
use crate::domain::workflow::StateName;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernanceEvent {
    DocumentCreated {
        document_id: DocumentId,
        folder_id: Option<NodeId>,
        created_by: PersonId,
        created_at: DateTime<Utc>,
    },
    VersionCreated {
        document_id: DocumentId,
        version_id: VersionId,
        version_number: u32,
        created_by: PersonId,
        created_at: DateTime<Utc>,
    },
    DocumentStatusChanged {
        document_id: DocumentId,
        from: DocumentStatus,
        to: DocumentStatus,
        changed_at: DateTime<Utc>,
    },
    WorkflowStarted {
        instance_id: WorkflowInstanceId,
        document_id: DocumentId,
        state: StateName,
        started_at: DateTime<Utc>,
    },
    TaskAssigned {
        task_id: TaskId,
        instance_id: WorkflowInstanceId,
        assignee: PersonId,
        due_at: Option<DateTime<Utc>>,
        assigned_at: DateTime<Utc>,
    },
    TaskOverdue {
        task_id: TaskId,
        instance_id: WorkflowInstanceId,
        assignee: PersonId,
        due_at: DateTime<Utc>,
    },
    WorkflowAdvanced {
        instance_id: WorkflowInstanceId,
        document_id: DocumentId,
        from: StateName,
        to: StateName,
        advanced_at: DateTime<Utc>,
    },
    WorkflowCompleted {
        instance_id: WorkflowInstanceId,
        document_id: DocumentId,
        final_state: StateName,
        completed_at: DateTime<Utc>,
    },
    WorkflowCancelled {
        instance_id: WorkflowInstanceId,
        document_id: DocumentId,
        cancelled_at: DateTime<Utc>,
    },
    RetentionExpired {
        retention_id: RetentionId,
        document_id: DocumentId,
        expires_at: DateTime<Utc>,
        detected_at: DateTime<Utc>,
    },
    RetentionHeld {
        retention_id: RetentionId,
        document_id: DocumentId,
        held_at: DateTime<Utc>,
    },
    DocumentDisposed {
        retention_id: RetentionId,
        document_id: DocumentId,
        action: DispositionAction,
        disposed_at: DateTime<Utc>,
    },
}

impl GovernanceEvent {
    /// Document the event concerns, when there is one.
    pub fn document_id(&self) -> Option<DocumentId> {
        match self {
            GovernanceEvent::DocumentCreated { document_id, .. }
            | GovernanceEvent::VersionCreated { document_id, .. }
            | GovernanceEvent::DocumentStatusChanged { document_id, .. }
            | GovernanceEvent::WorkflowStarted { document_id, .. }
            | GovernanceEvent::WorkflowAdvanced { document_id, .. }
            | GovernanceEvent::WorkflowCompleted { document_id, .. }
            | GovernanceEvent::WorkflowCancelled { document_id, .. }
            | GovernanceEvent::RetentionExpired { document_id, .. }
            | GovernanceEvent::RetentionHeld { document_id, .. }
            | GovernanceEvent::DocumentDisposed { document_id, .. } => Some(*document_id),
            GovernanceEvent::TaskAssigned { .. } | GovernanceEvent::TaskOverdue { .. } => None,
        }
    }
}

/// Non-blocking notification delivery.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: GovernanceEvent);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifications;

impl NotificationSink for NoopNotifications {
    fn notify(&self, _event: GovernanceEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    NodeMoved,
    NodeDeleted,
    AclGranted,
    AclRevoked,
    DocumentCheckedOut,
    DocumentCheckedIn,
    CheckoutCancelled,
    CheckoutForceUnlocked,
    VersionRetracted,
    DocumentStatusChanged,
    WorkflowStarted,
    WorkflowAdvanced,
    WorkflowTaskRejected,
    WorkflowCancelled,
    RetentionApplied,
    DocumentDisposed,
    DispositionHeld,
    LegalHoldCreated,
    LegalHoldPlaced,
    LegalHoldRemoved,
    LegalHoldReleased,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::NodeMoved => "node_moved",
            AuditAction::NodeDeleted => "node_deleted",
            AuditAction::AclGranted => "acl_granted",
            AuditAction::AclRevoked => "acl_revoked",
            AuditAction::DocumentCheckedOut => "document_checked_out",
            AuditAction::DocumentCheckedIn => "document_checked_in",
            AuditAction::CheckoutCancelled => "checkout_cancelled",
            AuditAction::CheckoutForceUnlocked => "checkout_force_unlocked",
            AuditAction::VersionRetracted => "version_retracted",
            AuditAction::DocumentStatusChanged => "document_status_changed",
            AuditAction::WorkflowStarted => "workflow_started",
            AuditAction::WorkflowAdvanced => "workflow_advanced",
            AuditAction::WorkflowTaskRejected => "workflow_task_rejected",
            AuditAction::WorkflowCancelled => "workflow_cancelled",
            AuditAction::RetentionApplied => "retention_applied",
            AuditAction::DocumentDisposed => "document_disposed",
            AuditAction::DispositionHeld => "disposition_held",
            AuditAction::LegalHoldCreated => "legal_hold_created",
            AuditAction::LegalHoldPlaced => "legal_hold_placed",
            AuditAction::LegalHoldRemoved => "legal_hold_removed",
            AuditAction::LegalHoldReleased => "legal_hold_released",
        }
    }
}

/// What an audit entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AuditSubject {
    Node(NodeId),
    Document(DocumentId),
    WorkflowInstance(WorkflowInstanceId),
    Retention(RetentionId),
    LegalHold(LegalHoldId),
    AclEntry(crate::domain::ids::AclEntryId),
}

impl AuditSubject {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditSubject::Node(_) => "node",
            AuditSubject::Document(_) => "document",
            AuditSubject::WorkflowInstance(_) => "workflow_instance",
            AuditSubject::Retention(_) => "retention",
            AuditSubject::LegalHold(_) => "legal_hold",
            AuditSubject::AclEntry(_) => "acl_entry",
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        match self {
            AuditSubject::Node(id) => id.as_uuid(),
            AuditSubject::Document(id) => id.as_uuid(),
            AuditSubject::WorkflowInstance(id) => id.as_uuid(),
            AuditSubject::Retention(id) => id.as_uuid(),
            AuditSubject::LegalHold(id) => id.as_uuid(),
            AuditSubject::AclEntry(id) => id.as_uuid(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    id: AuditEntryId,
    actor: PersonId,
    administrator: bool,
    subject: AuditSubject,
    action: AuditAction,
    detail: Value,
    recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor: &Actor, subject: AuditSubject, action: AuditAction) -> Self {
        Self {
            id: AuditEntryId::new(),
            actor: actor.id(),
            administrator: actor.is_administrator(),
            subject,
            action,
            detail: Value::Null,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn id(&self) -> AuditEntryId {
        self.id
    }

    pub fn actor(&self) -> PersonId {
        self.actor
    }

    pub fn by_administrator(&self) -> bool {
        self.administrator
    }

    pub fn subject(&self) -> AuditSubject {
        self.subject
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("audit write failed: {0}")]
    Write(String),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}
