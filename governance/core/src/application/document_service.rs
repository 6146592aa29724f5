// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Version & Checkout Manager
//!
//! Documents carry an append-only chain of versions and at most one
//! exclusive checkout. Storage enforces both rules:
//!
//! - one checkout row per document, so concurrent `checkout` calls race to a
//!   single winner and every loser gets `Conflict`;
//! - one version per `(document, number)`, and a check-in commits the new
//!   version, the document's current-version pointer and content attributes,
//!   and the checkout removal as one unit.
//!
//! The holder of a check-in is always the acting [`Actor`], never a value
//! taken from the request.

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::{record_audit, AuthorizationResolver};
use crate::domain::acl::{AclEntry, Permission, ResourceRef};
use crate::domain::actor::Actor;
use crate::domain::document::{
    CheckinCommit, Checkout, ContentAttributes, Document, DocumentStatus, NewDocument, Version,
};
use crate::domain::error::GovernanceError;
use crate::domain::events::{AuditAction, AuditEntry, AuditSink, AuditSubject, GovernanceEvent, NotificationSink};
use crate::domain::hierarchy::NodeKind;
use crate::domain::ids::{DocumentId, NodeId, VersionId};
use crate::domain::repository::{CheckoutRepository, DocumentRepository, NodeRepository, RepositoryError};

/// New content submitted by the checkout holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinRequest {
    pub content: ContentAttributes,
    #[serde(default)]
    pub change_summary: Option<String>,
}

pub struct DocumentService {
    documents: Arc<dyn DocumentRepository>,
    checkouts: Arc<dyn CheckoutRepository>,
    nodes: Arc<dyn NodeRepository>,
    resolver: Arc<AuthorizationResolver>,
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        checkouts: Arc<dyn CheckoutRepository>,
        nodes: Arc<dyn NodeRepository>,
        resolver: Arc<AuthorizationResolver>,
        notifications: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            documents,
            checkouts,
            nodes,
            resolver,
            notifications,
            audit,
        }
    }

    /// Create a draft document with version 1. The creator receives a direct
    /// `manage` grant in the same atomic write.
    pub async fn create(&self, actor: &Actor, draft: NewDocument) -> Result<Document, GovernanceError> {
        if let Some(folder_id) = draft.folder_id {
            self.require_folder(actor, folder_id).await?;
        }

        let (document, first_version) = Document::create(draft, actor.id())?;
        let owner = AclEntry::owner_of(document.id, actor.id());
        self.documents.create(&document, &first_version, &owner).await?;

        info!(document_id = %document.id, folder_id = ?document.folder_id, "Document created");
        self.notifications.notify(GovernanceEvent::DocumentCreated {
            document_id: document.id,
            folder_id: document.folder_id,
            created_by: actor.id(),
            created_at: document.created_at,
        });
        Ok(document)
    }

    pub async fn get(&self, actor: &Actor, id: DocumentId) -> Result<Document, GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Read).await?;
        self.load(id).await
    }

    /// Move through the draft / active / archived lifecycle. Marking a
    /// document deleted needs `delete`, deactivates it and drops any
    /// checkout.
    pub async fn update_status(
        &self,
        actor: &Actor,
        id: DocumentId,
        status: DocumentStatus,
    ) -> Result<Document, GovernanceError> {
        let needed = if status == DocumentStatus::Deleted {
            Permission::Delete
        } else {
            Permission::Write
        };
        self.resolver.require(actor, ResourceRef::Document(id), needed).await?;

        let mut document = self.load(id).await?;
        let previous = document.status;
        if previous == status {
            return Ok(document);
        }

        let released = if status == DocumentStatus::Deleted {
            self.checkouts.find_by_document(id).await?
        } else {
            None
        };

        let now = Utc::now();
        match status {
            DocumentStatus::Deleted => document.destroy(now),
            DocumentStatus::Archived => document.archive(now),
            DocumentStatus::Draft | DocumentStatus::Active => {
                document.status = status;
                document.updated_at = now;
            }
        }
        self.documents.update(&document).await?;

        info!(document_id = %id, from = previous.as_str(), to = status.as_str(), "Document status changed");
        self.notifications.notify(GovernanceEvent::DocumentStatusChanged {
            document_id: id,
            from: previous,
            to: status,
            changed_at: now,
        });
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::Document(id), AuditAction::DocumentStatusChanged).with_detail(
                json!({ "from": previous, "to": status, "released_checkout_of": released.map(|c| c.holder) }),
            ),
        )
        .await;
        Ok(document)
    }

    /// Refile a document. Needs `write` on the document and on the target.
    pub async fn move_to_folder(
        &self,
        actor: &Actor,
        id: DocumentId,
        folder: Option<NodeId>,
    ) -> Result<Document, GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Write).await?;
        if let Some(folder_id) = folder {
            self.require_folder(actor, folder_id).await?;
        }

        let mut document = self.load(id).await?;
        if document.folder_id == folder {
            return Ok(document);
        }
        document.folder_id = folder;
        document.updated_at = Utc::now();
        self.documents.update(&document).await?;

        info!(document_id = %id, folder_id = ?folder, "Document refiled");
        Ok(document)
    }

    /// File the document under a category node.
    pub async fn categorize(&self, actor: &Actor, id: DocumentId, category: NodeId) -> Result<(), GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Write).await?;
        let node = self
            .nodes
            .find_by_id(category)
            .await?
            .filter(|n| n.is_active)
            .ok_or_else(|| GovernanceError::NotFound(format!("category {}", category)))?;
        if node.kind != NodeKind::Category {
            return Err(GovernanceError::Validation(format!("node {} is not a category", category)));
        }
        self.documents.add_category(id, category).await?;
        Ok(())
    }

    pub async fn categories(&self, actor: &Actor, id: DocumentId) -> Result<Vec<NodeId>, GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Read).await?;
        Ok(self.documents.categories_of(id).await?)
    }

    /// Every version, oldest first, retracted ones included.
    pub async fn versions(&self, actor: &Actor, id: DocumentId) -> Result<Vec<Version>, GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Read).await?;
        Ok(self.documents.find_versions(id).await?)
    }

    /// Hide a superseded version. Content attributes never change; only the
    /// active flag does. The current version cannot be retracted.
    pub async fn retract_version(&self, actor: &Actor, version_id: VersionId) -> Result<Version, GovernanceError> {
        let version = self
            .documents
            .find_version(version_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("version {}", version_id)))?;
        self.resolver
            .require(actor, ResourceRef::Document(version.document_id), Permission::Manage)
            .await?;

        let document = self.load(version.document_id).await?;
        if document.current_version_id == version.id {
            return Err(GovernanceError::Validation(format!(
                "version {} is the current version of document {}",
                version.version_number, document.id
            )));
        }
        if !version.is_active {
            return Ok(version);
        }

        self.documents.set_version_active(version_id, false).await?;
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::Document(document.id), AuditAction::VersionRetracted)
                .with_detail(json!({ "version_id": version_id, "version_number": version.version_number })),
        )
        .await;
        Ok(Version {
            is_active: false,
            ..version
        })
    }

    /// Take the exclusive edit lock.
    pub async fn checkout(
        &self,
        actor: &Actor,
        id: DocumentId,
        reason: Option<String>,
    ) -> Result<Checkout, GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Write).await?;
        let document = self.load(id).await?;
        if !document.status.accepts_content() {
            return Err(GovernanceError::Validation(format!(
                "document {} is {} and cannot be edited",
                id,
                document.status.as_str()
            )));
        }

        let checkout = Checkout::new(id, actor.id(), reason);
        if let Err(e) = self.checkouts.acquire(&checkout).await {
            if matches!(e, RepositoryError::Conflict(_)) {
                counter!("governance_checkout_conflicts_total").increment(1);
            }
            return Err(e.into());
        }

        info!(document_id = %id, holder = %actor.id(), "Document checked out");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::Document(id), AuditAction::DocumentCheckedOut)
                .with_detail(json!({ "checkout_id": checkout.id, "reason": checkout.reason })),
        )
        .await;
        Ok(checkout)
    }

    /// Commit new content as the next version and release the lock. Only
    /// the actor holding the checkout may check in.
    pub async fn checkin(
        &self,
        actor: &Actor,
        id: DocumentId,
        request: CheckinRequest,
    ) -> Result<Version, GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Write).await?;
        request.content.validate()?;

        let commit = CheckinCommit {
            document_id: id,
            holder: actor.id(),
            version_id: VersionId::new(),
            content: request.content,
            change_summary: request.change_summary,
            committed_at: Utc::now(),
        };
        let version = match self.checkouts.commit_checkin(&commit).await {
            Ok(version) => version,
            Err(e) => {
                if matches!(e, RepositoryError::Conflict(_)) {
                    counter!("governance_checkout_conflicts_total").increment(1);
                }
                return Err(e.into());
            }
        };

        info!(document_id = %id, version_number = version.version_number, "Document checked in");
        self.notifications.notify(GovernanceEvent::VersionCreated {
            document_id: id,
            version_id: version.id,
            version_number: version.version_number,
            created_by: actor.id(),
            created_at: version.created_at,
        });
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::Document(id), AuditAction::DocumentCheckedIn).with_detail(json!({
                "version_id": version.id,
                "version_number": version.version_number,
                "checksum_sha256": version.content.checksum_sha256,
            })),
        )
        .await;
        Ok(version)
    }

    /// Give up one's own checkout without creating a version.
    pub async fn cancel_checkout(&self, actor: &Actor, id: DocumentId) -> Result<Checkout, GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Read).await?;
        let released = self.checkouts.release(id, Some(actor.id())).await?;

        info!(document_id = %id, "Checkout cancelled by holder");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::Document(id), AuditAction::CheckoutCancelled)
                .with_detail(json!({ "checkout_id": released.id })),
        )
        .await;
        Ok(released)
    }

    /// Break someone else's lock. Needs `manage`; always audited.
    pub async fn force_unlock(&self, actor: &Actor, id: DocumentId) -> Result<Checkout, GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Manage).await?;
        let released = self.checkouts.release(id, None).await?;

        warn!(
            document_id = %id,
            previous_holder = %released.holder,
            unlocked_by = %actor.id(),
            "Checkout forcibly released"
        );
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::Document(id), AuditAction::CheckoutForceUnlocked).with_detail(json!({
                "checkout_id": released.id,
                "previous_holder": released.holder,
                "acquired_at": released.acquired_at,
            })),
        )
        .await;
        Ok(released)
    }

    pub async fn get_checkout(&self, actor: &Actor, id: DocumentId) -> Result<Option<Checkout>, GovernanceError> {
        self.resolver.require(actor, ResourceRef::Document(id), Permission::Read).await?;
        Ok(self.checkouts.find_by_document(id).await?)
    }

    /// All outstanding checkouts, oldest first. Administrator-only.
    pub async fn list_checkouts(&self, actor: &Actor, limit: u32, offset: u32) -> Result<Vec<Checkout>, GovernanceError> {
        if !actor.is_administrator() {
            return Err(GovernanceError::Forbidden("listing all checkouts is administrator-only".to_string()));
        }
        Ok(self.checkouts.list(limit.min(500), offset).await?)
    }

    async fn load(&self, id: DocumentId) -> Result<Document, GovernanceError> {
        self.documents
            .find_by_id(id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("document {}", id)))
    }

    async fn require_folder(&self, actor: &Actor, folder_id: NodeId) -> Result<(), GovernanceError> {
        let folder = self
            .nodes
            .find_by_id(folder_id)
            .await?
            .filter(|n| n.is_active)
            .ok_or_else(|| GovernanceError::NotFound(format!("folder {}", folder_id)))?;
        if folder.kind != NodeKind::Folder {
            return Err(GovernanceError::Validation(format!("node {} is not a folder", folder_id)));
        }
        self.resolver.require(actor, ResourceRef::Folder(folder_id), Permission::Write).await
    }
}
