// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate, defined in the domain layer and
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `NodeRepository` | `Node` | `InMemoryGovernanceStore`, `PostgresNodeRepository` |
//! | `AclRepository` | `AclEntry` | `InMemoryGovernanceStore`, `PostgresAclRepository` |
//! | `DocumentRepository` | `Document`, `Version` | `InMemoryGovernanceStore`, `PostgresDocumentRepository` |
//! | `CheckoutRepository` | `Checkout` | `InMemoryGovernanceStore`, `PostgresDocumentRepository` |
//! | `WorkflowRepository` | `WorkflowDefinition`, `WorkflowInstance` | `InMemoryGovernanceStore`, `PostgresWorkflowRepository` |
//! | `RetentionRepository` | `RetentionPolicy`, `DocumentRetention` | `InMemoryGovernanceStore`, `PostgresRetentionRepository` |
//! | `LegalHoldRepository` | `LegalHold` | `InMemoryGovernanceStore`, `PostgresRetentionRepository` |
//!
//! Operations that must change several rows together (subtree relocation,
//! check-in, workflow decisions, disposition batches, hold placement) are
//! single repository calls so each implementation can run them inside one
//! transaction. Uniqueness rules (one checkout per document, one active
//! instance per document and definition, one grant per principal and
//! permission) are enforced by storage and reported as
//! [`RepositoryError::Conflict`], never by a read-then-write in the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::acl::{AclEntry, ResourceRef};
use crate::domain::document::{CheckinCommit, Checkout, Document, Version};
use crate::domain::hierarchy::{MaterializedPath, Node, NodeKind};
use crate::domain::ids::{
    AclEntryId, DocumentId, LegalHoldId, NodeId, PersonId, RetentionId, RetentionPolicyId, TaskId,
    VersionId, WorkflowDefinitionId, WorkflowInstanceId,
};
use crate::domain::retention::{
    DocumentRetention, HeldDocument, LegalHold, RetentionPolicy, Settlement, SweepCursor,
};
use crate::domain::workflow::{StateName, WorkflowDecision, WorkflowDefinition, WorkflowInstance, WorkflowTask};

/// Storage backend selection for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

/// A requested move of `node_id` (and its subtree) beneath `new_parent`.
///
/// Both paths are the values the caller observed; storage re-checks them
/// under lock and answers [`RepositoryError::StaleState`] if either changed.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRelocation {
    pub node_id: NodeId,
    pub from_path: MaterializedPath,
    pub new_parent: Option<(NodeId, MaterializedPath)>,
    pub at: DateTime<Utc>,
}

impl NodeRelocation {
    pub fn target_path(&self) -> MaterializedPath {
        match &self.new_parent {
            Some((_, parent_path)) => MaterializedPath::child_of(parent_path, self.node_id),
            None => MaterializedPath::root(self.node_id),
        }
    }
}

#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Insert a new node. Fails with `Conflict` when an active sibling
    /// already carries the same name.
    async fn insert(&self, node: &Node) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError>;

    async fn find_many(&self, ids: &[NodeId]) -> Result<Vec<Node>, RepositoryError>;

    /// Active direct children ordered by name.
    async fn find_children(&self, parent: NodeId) -> Result<Vec<Node>, RepositoryError>;

    /// Active roots of one kind ordered by name.
    async fn find_roots(&self, kind: NodeKind) -> Result<Vec<Node>, RepositoryError>;

    /// The node at `root` and every descendant, active or not, ordered by
    /// stored path. Served by a single prefix range query.
    async fn find_subtree(&self, root: &MaterializedPath) -> Result<Vec<Node>, RepositoryError>;

    /// Rewrite the paths of a whole subtree atomically. Returns rows touched.
    async fn relocate(&self, relocation: &NodeRelocation) -> Result<u64, RepositoryError>;

    /// Deactivate the node at `root` and every descendant atomically.
    async fn deactivate_subtree(&self, root: &MaterializedPath, at: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait AclRepository: Send + Sync {
    /// Fails with `Conflict` when an active entry for the same resource,
    /// principal and permission exists.
    async fn insert(&self, entry: &AclEntry) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: AclEntryId) -> Result<Option<AclEntry>, RepositoryError>;

    /// Soft-revoke. `NotFound` when absent or already inactive.
    async fn deactivate(&self, id: AclEntryId) -> Result<(), RepositoryError>;

    /// Active entries on one resource.
    async fn find_for_resource(&self, resource: ResourceRef) -> Result<Vec<AclEntry>, RepositoryError>;

    /// Active entries on any of the given folders, fetched in one round trip.
    async fn find_for_folders(&self, folders: &[NodeId]) -> Result<Vec<AclEntry>, RepositoryError>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a document, its first version and its owner's grant together.
    async fn create(&self, document: &Document, first_version: &Version, owner: &AclEntry) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError>;

    /// Persist metadata and lifecycle fields. Never touches the current
    /// version pointer or its denormalized content attributes. A document
    /// saved inactive loses any checkout in the same unit.
    async fn update(&self, document: &Document) -> Result<(), RepositoryError>;

    async fn find_in_folder(&self, folder: NodeId) -> Result<Vec<Document>, RepositoryError>;

    /// All versions ordered by version number.
    async fn find_versions(&self, document: DocumentId) -> Result<Vec<Version>, RepositoryError>;

    async fn find_version(&self, id: VersionId) -> Result<Option<Version>, RepositoryError>;

    async fn set_version_active(&self, id: VersionId, active: bool) -> Result<(), RepositoryError>;

    async fn add_category(&self, document: DocumentId, category: NodeId) -> Result<(), RepositoryError>;

    async fn categories_of(&self, document: DocumentId) -> Result<Vec<NodeId>, RepositoryError>;
}

#[async_trait]
pub trait CheckoutRepository: Send + Sync {
    /// Take the lock. `Conflict` when any checkout exists for the document.
    async fn acquire(&self, checkout: &Checkout) -> Result<(), RepositoryError>;

    async fn find_by_document(&self, document: DocumentId) -> Result<Option<Checkout>, RepositoryError>;

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<Checkout>, RepositoryError>;

    /// Drop the lock. With `holder` set, only that person's lock is removed
    /// (`Conflict` otherwise); with `None` any lock is removed. `NotFound`
    /// when there is no lock.
    async fn release(&self, document: DocumentId, holder: Option<PersonId>) -> Result<Checkout, RepositoryError>;

    /// Insert the next version, update the document's pointer and content
    /// attributes, and drop the checkout, all or nothing.
    async fn commit_checkin(&self, commit: &CheckinCommit) -> Result<Version, RepositoryError>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// `Conflict` on a duplicate definition name.
    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), RepositoryError>;

    async fn find_definition(&self, id: WorkflowDefinitionId) -> Result<Option<WorkflowDefinition>, RepositoryError>;

    async fn find_definition_by_name(&self, name: &str) -> Result<Option<WorkflowDefinition>, RepositoryError>;

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, RepositoryError>;

    /// `Conflict` when the document already has an active instance of the
    /// same definition.
    async fn start_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError>;

    async fn find_instance(&self, id: WorkflowInstanceId) -> Result<Option<WorkflowInstance>, RepositoryError>;

    async fn find_instances_for_document(&self, document: DocumentId) -> Result<Vec<WorkflowInstance>, RepositoryError>;

    /// Insert tasks provided the instance is still active at `expected_state`.
    async fn insert_tasks(
        &self,
        instance: WorkflowInstanceId,
        expected_state: &StateName,
        tasks: &[WorkflowTask],
    ) -> Result<(), RepositoryError>;

    async fn find_task(&self, id: TaskId) -> Result<Option<WorkflowTask>, RepositoryError>;

    async fn find_tasks(&self, instance: WorkflowInstanceId) -> Result<Vec<WorkflowTask>, RepositoryError>;

    /// Approve the task and move the instance, failing with `StaleState`
    /// unless the instance is active at `expected_state` and the task is
    /// still pending. Sibling pending tasks for the same source state are
    /// cancelled. Returns the updated instance.
    async fn apply_decision(&self, decision: &WorkflowDecision) -> Result<WorkflowInstance, RepositoryError>;

    /// `StaleState` unless the task is pending.
    async fn reject_task(
        &self,
        task: TaskId,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<WorkflowTask, RepositoryError>;

    /// Cancel an active instance and its pending tasks.
    async fn cancel_instance(&self, id: WorkflowInstanceId, at: DateTime<Utc>) -> Result<WorkflowInstance, RepositoryError>;

    /// Pending tasks past their due date, oldest due first.
    async fn find_overdue_tasks(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<WorkflowTask>, RepositoryError>;
}

#[async_trait]
pub trait RetentionRepository: Send + Sync {
    /// `Conflict` on a duplicate policy name.
    async fn save_policy(&self, policy: &RetentionPolicy) -> Result<(), RepositoryError>;

    async fn find_policy(&self, id: RetentionPolicyId) -> Result<Option<RetentionPolicy>, RepositoryError>;

    async fn list_policies(&self) -> Result<Vec<RetentionPolicy>, RepositoryError>;

    /// `Conflict` when the policy is already applied to the document. A
    /// record for a document under an active hold is stored as `held`.
    /// Returns the record as stored.
    async fn insert_retention(&self, record: &DocumentRetention) -> Result<DocumentRetention, RepositoryError>;

    async fn find_retention(&self, id: RetentionId) -> Result<Option<DocumentRetention>, RepositoryError>;

    async fn find_retentions_for_document(&self, document: DocumentId) -> Result<Vec<DocumentRetention>, RepositoryError>;

    /// Open records (`pending` or `eligible`) expired at `now`, ordered by
    /// `(expires_at, id)` and strictly after `after`.
    async fn find_sweep_candidates(
        &self,
        now: DateTime<Utc>,
        after: Option<SweepCursor>,
        limit: u32,
    ) -> Result<Vec<DocumentRetention>, RepositoryError>;

    /// Move expired `pending` records among `ids` to `eligible` in one
    /// transaction, leaving any whose document is under an active hold.
    /// Returns the records that changed.
    async fn mark_eligible(
        &self,
        ids: &[RetentionId],
        now: DateTime<Utc>,
    ) -> Result<Vec<DocumentRetention>, RepositoryError>;

    /// Settle a batch in one transaction. Each record is re-read under lock:
    /// an active hold on its document turns it `held`; otherwise an expired
    /// open record has its policy action applied to the document and is
    /// `completed`. Anything else is reported as skipped.
    async fn settle_batch(
        &self,
        ids: &[RetentionId],
        disposed_by: PersonId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Settlement>, RepositoryError>;
}

#[async_trait]
pub trait LegalHoldRepository: Send + Sync {
    async fn save_hold(&self, hold: &LegalHold) -> Result<(), RepositoryError>;

    async fn find_hold(&self, id: LegalHoldId) -> Result<Option<LegalHold>, RepositoryError>;

    async fn list_active_holds(&self) -> Result<Vec<LegalHold>, RepositoryError>;

    /// Attach a document to an active hold and mark its open retention
    /// records `held`. `Conflict` if already attached. Returns records held.
    async fn place(&self, held: &HeldDocument) -> Result<u64, RepositoryError>;

    /// Detach a document. Records return to `pending` when no other active
    /// hold still covers the document. Returns records restored.
    async fn remove(&self, hold: LegalHoldId, document: DocumentId) -> Result<u64, RepositoryError>;

    /// Deactivate a hold and restore records no longer covered by any
    /// active hold. Returns records restored.
    async fn release(&self, hold: LegalHoldId, at: DateTime<Utc>) -> Result<u64, RepositoryError>;

    async fn holds_for_document(&self, document: DocumentId) -> Result<Vec<LegalHold>, RepositoryError>;

    async fn documents_on_hold(&self, hold: LegalHoldId) -> Result<Vec<HeldDocument>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// A storage uniqueness rule rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An optimistic check failed: the row changed since it was read.
    #[error("Stale state: {0}")]
    StaleState(String),

    #[error("Integrity fault: {0}")]
    Integrity(String),

    /// Lock timeout, deadlock or serialization failure.
    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut => RepositoryError::Transient("connection pool timed out".to_string()),
            sqlx::Error::Database(db) => {
                if db.is_unique_violation() {
                    return RepositoryError::Conflict(db.message().to_string());
                }
                match db.code().as_deref() {
                    // serialization_failure, deadlock_detected, lock_not_available
                    Some("40001") | Some("40P01") | Some("55P03") => {
                        RepositoryError::Transient(db.message().to_string())
                    }
                    _ => RepositoryError::Database(db.to_string()),
                }
            }
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<crate::domain::error::GovernanceError> for RepositoryError {
    fn from(err: crate::domain::error::GovernanceError) -> Self {
        use crate::domain::error::GovernanceError;
        match err {
            GovernanceError::Integrity(msg) => RepositoryError::Integrity(msg),
            other => RepositoryError::Serialization(other.to_string()),
        }
    }
}
