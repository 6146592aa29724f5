// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory governance store
//!
//! One shared state behind a single lock implements every repository trait.
//! Multi-row operations (relocation, check-in, decisions, disposition
//! batches) take the write lock once, so they are as atomic as the
//! PostgreSQL transactions they stand in for. Nodes are also indexed by their
//! stored path key in a `BTreeMap` so subtree reads are a range scan.
//!
//! Used for development, tests and `storage.backend: in_memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::domain::acl::{AclEntry, ResourceRef};
use crate::domain::document::{CheckinCommit, Checkout, Document, Version};
use crate::domain::hierarchy::{MaterializedPath, Node, NodeKind};
use crate::domain::ids::{
    AclEntryId, DocumentId, LegalHoldId, NodeId, PersonId, RetentionId, RetentionPolicyId, TaskId,
    VersionId, WorkflowDefinitionId, WorkflowInstanceId,
};
use crate::domain::repository::{
    AclRepository, CheckoutRepository, DocumentRepository, LegalHoldRepository, NodeRelocation,
    NodeRepository, RepositoryError, RetentionRepository, WorkflowRepository,
};
use crate::domain::retention::{
    DispositionAction, DispositionOutcome, DispositionStatus, DocumentRetention, HeldDocument, LegalHold,
    RetentionPolicy, Settlement, SkipReason, SweepCursor,
};
use crate::domain::workflow::{
    InstanceStatus, StateName, TaskStatus, WorkflowDecision, WorkflowDefinition, WorkflowInstance, WorkflowTask,
};

#[derive(Default)]
struct StoreState {
    nodes: HashMap<NodeId, Node>,
    node_paths: BTreeMap<String, NodeId>,
    acl_entries: HashMap<AclEntryId, AclEntry>,
    documents: HashMap<DocumentId, Document>,
    versions: HashMap<VersionId, Version>,
    version_numbers: BTreeMap<(DocumentId, u32), VersionId>,
    document_categories: HashMap<DocumentId, BTreeSet<NodeId>>,
    checkouts: HashMap<DocumentId, Checkout>,
    definitions: HashMap<WorkflowDefinitionId, WorkflowDefinition>,
    instances: HashMap<WorkflowInstanceId, WorkflowInstance>,
    tasks: HashMap<TaskId, WorkflowTask>,
    policies: HashMap<RetentionPolicyId, RetentionPolicy>,
    retentions: HashMap<RetentionId, DocumentRetention>,
    holds: HashMap<LegalHoldId, LegalHold>,
    held_documents: BTreeMap<(LegalHoldId, DocumentId), HeldDocument>,
}

impl StoreState {
    fn subtree_ids(&self, root: &MaterializedPath) -> Vec<NodeId> {
        let (lo, hi) = root.key_range();
        self.node_paths.range(lo..hi).map(|(_, id)| *id).collect()
    }

    fn sibling_name_taken(&self, kind: NodeKind, parent: Option<NodeId>, name: &str, except: NodeId) -> bool {
        self.nodes.values().any(|n| {
            n.is_active && n.id != except && n.kind == kind && n.parent_id == parent && n.name == name
        })
    }

    fn document_is_held(&self, document: DocumentId) -> bool {
        self.held_documents
            .keys()
            .any(|(hold, doc)| *doc == document && self.holds.get(hold).map(|h| h.is_active).unwrap_or(false))
    }

    /// Return `held` records of `document` to `pending` unless still covered.
    fn restore_if_unheld(&mut self, document: DocumentId) -> u64 {
        if self.document_is_held(document) {
            return 0;
        }
        let mut restored = 0;
        for record in self.retentions.values_mut() {
            if record.document_id == document && record.status == DispositionStatus::Held {
                record.status = DispositionStatus::Pending;
                restored += 1;
            }
        }
        restored
    }
}

#[derive(Clone, Default)]
pub struct InMemoryGovernanceStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryGovernanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRepository for InMemoryGovernanceStore {
    async fn insert(&self, node: &Node) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if state.nodes.contains_key(&node.id) {
            return Err(RepositoryError::Conflict(format!("node {} already exists", node.id)));
        }
        if let Some(parent_id) = node.parent_id {
            let parent = state
                .nodes
                .get(&parent_id)
                .ok_or_else(|| RepositoryError::NotFound(format!("node {}", parent_id)))?;
            if !parent.is_active || MaterializedPath::child_of(&parent.path, node.id) != node.path {
                return Err(RepositoryError::StaleState(format!("node {} changed since it was read", parent_id)));
            }
        }
        if state.sibling_name_taken(node.kind, node.parent_id, &node.name, node.id) {
            return Err(RepositoryError::Conflict(format!(
                "a sibling named '{}' already exists",
                node.name
            )));
        }
        state.node_paths.insert(node.path.to_key(), node.id);
        state.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError> {
        Ok(self.state.read().nodes.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[NodeId]) -> Result<Vec<Node>, RepositoryError> {
        let state = self.state.read();
        Ok(ids.iter().filter_map(|id| state.nodes.get(id).cloned()).collect())
    }

    async fn find_children(&self, parent: NodeId) -> Result<Vec<Node>, RepositoryError> {
        let state = self.state.read();
        let mut children: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| n.is_active && n.parent_id == Some(parent))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn find_roots(&self, kind: NodeKind) -> Result<Vec<Node>, RepositoryError> {
        let state = self.state.read();
        let mut roots: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| n.is_active && n.kind == kind && n.parent_id.is_none())
            .cloned()
            .collect();
        roots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roots)
    }

    async fn find_subtree(&self, root: &MaterializedPath) -> Result<Vec<Node>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .subtree_ids(root)
            .into_iter()
            .filter_map(|id| state.nodes.get(&id).cloned())
            .collect())
    }

    async fn relocate(&self, relocation: &NodeRelocation) -> Result<u64, RepositoryError> {
        let mut state = self.state.write();

        let moved = state
            .nodes
            .get(&relocation.node_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("node {}", relocation.node_id)))?;
        if !moved.is_active || moved.path != relocation.from_path {
            return Err(RepositoryError::StaleState(format!("node {} changed since it was read", moved.id)));
        }
        let (kind, name) = (moved.kind, moved.name.clone());

        let new_parent_id = match &relocation.new_parent {
            Some((parent_id, expected_path)) => {
                let parent = state
                    .nodes
                    .get(parent_id)
                    .ok_or_else(|| RepositoryError::NotFound(format!("node {}", parent_id)))?;
                if !parent.is_active || &parent.path != expected_path {
                    return Err(RepositoryError::StaleState(format!("node {} changed since it was read", parent_id)));
                }
                if parent.path.contains(relocation.node_id) {
                    return Err(RepositoryError::StaleState(format!(
                        "node {} is now inside the subtree being moved",
                        parent_id
                    )));
                }
                Some(*parent_id)
            }
            None => None,
        };
        if state.sibling_name_taken(kind, new_parent_id, &name, relocation.node_id) {
            return Err(RepositoryError::Conflict(format!("a sibling named '{}' already exists", name)));
        }

        let target = relocation.target_path();
        let affected = state.subtree_ids(&relocation.from_path);
        for id in &affected {
            let Some(node) = state.nodes.get(id) else { continue };
            let old_key = node.path.to_key();
            let new_path = node.path.rebase(&relocation.from_path, &target).ok_or_else(|| {
                RepositoryError::Integrity(format!("node {} indexed under a foreign path", id))
            })?;
            state.node_paths.remove(&old_key);
            state.node_paths.insert(new_path.to_key(), *id);
            if let Some(node) = state.nodes.get_mut(id) {
                node.depth = new_path.depth();
                node.path = new_path;
                node.updated_at = relocation.at;
                if node.id == relocation.node_id {
                    node.parent_id = new_parent_id;
                }
            }
        }
        Ok(affected.len() as u64)
    }

    async fn deactivate_subtree(&self, root: &MaterializedPath, at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut state = self.state.write();
        let ids = state.subtree_ids(root);
        if ids.is_empty() {
            return Err(RepositoryError::NotFound(format!("node at {}", root)));
        }
        let mut changed = 0;
        for id in ids {
            if let Some(node) = state.nodes.get_mut(&id) {
                if node.is_active {
                    node.is_active = false;
                    node.updated_at = at;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl AclRepository for InMemoryGovernanceStore {
    async fn insert(&self, entry: &AclEntry) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let duplicate = state.acl_entries.values().any(|e| {
            e.is_active
                && e.resource == entry.resource
                && e.principal == entry.principal
                && e.permission == entry.permission
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "{} already holds {} on {}",
                entry.principal, entry.permission, entry.resource
            )));
        }
        state.acl_entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AclEntryId) -> Result<Option<AclEntry>, RepositoryError> {
        Ok(self.state.read().acl_entries.get(&id).cloned())
    }

    async fn deactivate(&self, id: AclEntryId) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        match state.acl_entries.get_mut(&id) {
            Some(entry) if entry.is_active => {
                entry.is_active = false;
                Ok(())
            }
            _ => Err(RepositoryError::NotFound(format!("acl entry {}", id))),
        }
    }

    async fn find_for_resource(&self, resource: ResourceRef) -> Result<Vec<AclEntry>, RepositoryError> {
        let state = self.state.read();
        let mut entries: Vec<AclEntry> = state
            .acl_entries
            .values()
            .filter(|e| e.is_active && e.resource == resource)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn find_for_folders(&self, folders: &[NodeId]) -> Result<Vec<AclEntry>, RepositoryError> {
        let wanted: BTreeSet<NodeId> = folders.iter().copied().collect();
        let state = self.state.read();
        Ok(state
            .acl_entries
            .values()
            .filter(|e| e.is_active && matches!(e.resource, ResourceRef::Folder(id) if wanted.contains(&id)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryGovernanceStore {
    async fn create(&self, document: &Document, first_version: &Version, owner: &AclEntry) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if state.documents.contains_key(&document.id) {
            return Err(RepositoryError::Conflict(format!("document {} already exists", document.id)));
        }
        state
            .version_numbers
            .insert((document.id, first_version.version_number), first_version.id);
        state.versions.insert(first_version.id, first_version.clone());
        state.documents.insert(document.id, document.clone());
        state.acl_entries.insert(owner.id, owner.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        Ok(self.state.read().documents.get(&id).cloned())
    }

    async fn update(&self, document: &Document) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let stored = state
            .documents
            .get_mut(&document.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("document {}", document.id)))?;
        stored.title = document.title.clone();
        stored.description = document.description.clone();
        stored.folder_id = document.folder_id;
        stored.content_type = document.content_type.clone();
        stored.classification = document.classification;
        stored.status = document.status;
        stored.is_active = document.is_active;
        stored.updated_at = document.updated_at;
        if !document.is_active {
            state.checkouts.remove(&document.id);
        }
        Ok(())
    }

    async fn find_in_folder(&self, folder: NodeId) -> Result<Vec<Document>, RepositoryError> {
        let state = self.state.read();
        let mut docs: Vec<Document> = state
            .documents
            .values()
            .filter(|d| d.is_active && d.folder_id == Some(folder))
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(docs)
    }

    async fn find_versions(&self, document: DocumentId) -> Result<Vec<Version>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .version_numbers
            .range((document, 0)..=(document, u32::MAX))
            .filter_map(|(_, id)| state.versions.get(id).cloned())
            .collect())
    }

    async fn find_version(&self, id: VersionId) -> Result<Option<Version>, RepositoryError> {
        Ok(self.state.read().versions.get(&id).cloned())
    }

    async fn set_version_active(&self, id: VersionId, active: bool) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let version = state
            .versions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("version {}", id)))?;
        version.is_active = active;
        Ok(())
    }

    async fn add_category(&self, document: DocumentId, category: NodeId) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if !state.documents.contains_key(&document) {
            return Err(RepositoryError::NotFound(format!("document {}", document)));
        }
        if !state.document_categories.entry(document).or_default().insert(category) {
            return Err(RepositoryError::Conflict(format!(
                "document {} is already filed under category {}",
                document, category
            )));
        }
        Ok(())
    }

    async fn categories_of(&self, document: DocumentId) -> Result<Vec<NodeId>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .document_categories
            .get(&document)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CheckoutRepository for InMemoryGovernanceStore {
    async fn acquire(&self, checkout: &Checkout) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if !state.documents.contains_key(&checkout.document_id) {
            return Err(RepositoryError::NotFound(format!("document {}", checkout.document_id)));
        }
        if state.checkouts.contains_key(&checkout.document_id) {
            return Err(RepositoryError::Conflict(format!(
                "document {} is already checked out",
                checkout.document_id
            )));
        }
        state.checkouts.insert(checkout.document_id, checkout.clone());
        Ok(())
    }

    async fn find_by_document(&self, document: DocumentId) -> Result<Option<Checkout>, RepositoryError> {
        Ok(self.state.read().checkouts.get(&document).cloned())
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<Checkout>, RepositoryError> {
        let state = self.state.read();
        let mut all: Vec<Checkout> = state.checkouts.values().cloned().collect();
        all.sort_by_key(|c| (c.acquired_at, c.id));
        Ok(all.into_iter().skip(offset as usize).take(limit as usize).collect())
    }

    async fn release(&self, document: DocumentId, holder: Option<PersonId>) -> Result<Checkout, RepositoryError> {
        let mut state = self.state.write();
        let current = state
            .checkouts
            .get(&document)
            .ok_or_else(|| RepositoryError::NotFound(format!("checkout for document {}", document)))?;
        if let Some(holder) = holder {
            if current.holder != holder {
                return Err(RepositoryError::Conflict(format!(
                    "document {} is checked out by another person",
                    document
                )));
            }
        }
        state
            .checkouts
            .remove(&document)
            .ok_or_else(|| RepositoryError::NotFound(format!("checkout for document {}", document)))
    }

    async fn commit_checkin(&self, commit: &CheckinCommit) -> Result<Version, RepositoryError> {
        let mut state = self.state.write();
        match state.checkouts.get(&commit.document_id) {
            None => {
                return Err(RepositoryError::Conflict(format!(
                    "document {} is not checked out",
                    commit.document_id
                )))
            }
            Some(checkout) if checkout.holder != commit.holder => {
                return Err(RepositoryError::Conflict(format!(
                    "document {} is checked out by another person",
                    commit.document_id
                )))
            }
            Some(_) => {}
        }

        let document = state
            .documents
            .get(&commit.document_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("document {}", commit.document_id)))?;
        let version = document.stage_version(
            commit.version_id,
            commit.content.clone(),
            commit.change_summary.clone(),
            commit.holder,
            commit.committed_at,
        );
        let key = (commit.document_id, version.version_number);
        if state.version_numbers.contains_key(&key) {
            return Err(RepositoryError::Conflict(format!(
                "version {} of document {} already exists",
                version.version_number, commit.document_id
            )));
        }

        state.version_numbers.insert(key, version.id);
        state.versions.insert(version.id, version.clone());
        if let Some(document) = state.documents.get_mut(&commit.document_id) {
            document.adopt(&version);
        }
        state.checkouts.remove(&commit.document_id);
        Ok(version)
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryGovernanceStore {
    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if state.definitions.values().any(|d| d.name == definition.name && d.id != definition.id) {
            return Err(RepositoryError::Conflict(format!(
                "workflow definition '{}' already exists",
                definition.name
            )));
        }
        state.definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn find_definition(&self, id: WorkflowDefinitionId) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.state.read().definitions.get(&id).cloned())
    }

    async fn find_definition_by_name(&self, name: &str) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.state.read().definitions.values().find(|d| d.name == name).cloned())
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut defs: Vec<WorkflowDefinition> = self.state.read().definitions.values().cloned().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(defs)
    }

    async fn start_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let running = state.instances.values().any(|i| {
            i.document_id == instance.document_id
                && i.definition_id == instance.definition_id
                && i.status == InstanceStatus::Active
        });
        if running {
            return Err(RepositoryError::Conflict(format!(
                "document {} already has an active instance of this workflow",
                instance.document_id
            )));
        }
        state.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn find_instance(&self, id: WorkflowInstanceId) -> Result<Option<WorkflowInstance>, RepositoryError> {
        Ok(self.state.read().instances.get(&id).cloned())
    }

    async fn find_instances_for_document(&self, document: DocumentId) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let mut found: Vec<WorkflowInstance> = self
            .state
            .read()
            .instances
            .values()
            .filter(|i| i.document_id == document)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.created_at);
        Ok(found)
    }

    async fn insert_tasks(
        &self,
        instance: WorkflowInstanceId,
        expected_state: &StateName,
        tasks: &[WorkflowTask],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let current = state
            .instances
            .get(&instance)
            .ok_or_else(|| RepositoryError::NotFound(format!("workflow instance {}", instance)))?;
        if !current.is_active() || &current.current_state != expected_state {
            return Err(RepositoryError::StaleState(format!(
                "workflow instance {} is no longer at '{}'",
                instance, expected_state
            )));
        }
        for task in tasks {
            state.tasks.insert(task.id, task.clone());
        }
        Ok(())
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<WorkflowTask>, RepositoryError> {
        Ok(self.state.read().tasks.get(&id).cloned())
    }

    async fn find_tasks(&self, instance: WorkflowInstanceId) -> Result<Vec<WorkflowTask>, RepositoryError> {
        let mut tasks: Vec<WorkflowTask> = self
            .state
            .read()
            .tasks
            .values()
            .filter(|t| t.instance_id == instance)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        Ok(tasks)
    }

    async fn apply_decision(&self, decision: &WorkflowDecision) -> Result<WorkflowInstance, RepositoryError> {
        let mut state = self.state.write();

        let instance = state
            .instances
            .get(&decision.instance_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("workflow instance {}", decision.instance_id)))?;
        if !instance.is_active() || instance.current_state != decision.expected_state {
            return Err(RepositoryError::StaleState(format!(
                "workflow instance {} is no longer at '{}'",
                decision.instance_id, decision.expected_state
            )));
        }
        let task_ok = state.tasks.get(&decision.task_id).map(|t| {
            t.is_pending()
                && t.instance_id == decision.instance_id
                && t.covers(&decision.expected_state, &decision.new_state)
        });
        if task_ok != Some(true) {
            return Err(RepositoryError::StaleState(format!("task {} is no longer open", decision.task_id)));
        }

        for task in state.tasks.values_mut() {
            if task.instance_id != decision.instance_id || !task.is_pending() {
                continue;
            }
            if task.id == decision.task_id {
                task.status = TaskStatus::Approved;
                task.comment = decision.comment.clone();
                task.decided_at = Some(decision.decided_at);
            } else if task.from_state == decision.expected_state || decision.completes {
                task.status = TaskStatus::Cancelled;
                task.decided_at = Some(decision.decided_at);
            }
        }

        let instance = state
            .instances
            .get_mut(&decision.instance_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("workflow instance {}", decision.instance_id)))?;
        instance.current_state = decision.new_state.clone();
        instance.updated_at = decision.decided_at;
        if decision.completes {
            instance.status = InstanceStatus::Completed;
        }
        Ok(instance.clone())
    }

    async fn reject_task(
        &self,
        task: TaskId,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<WorkflowTask, RepositoryError> {
        let mut state = self.state.write();
        let stored = state
            .tasks
            .get_mut(&task)
            .ok_or_else(|| RepositoryError::NotFound(format!("task {}", task)))?;
        if !stored.is_pending() {
            return Err(RepositoryError::StaleState(format!("task {} is no longer open", task)));
        }
        stored.status = TaskStatus::Rejected;
        stored.comment = comment;
        stored.decided_at = Some(at);
        Ok(stored.clone())
    }

    async fn cancel_instance(&self, id: WorkflowInstanceId, at: DateTime<Utc>) -> Result<WorkflowInstance, RepositoryError> {
        let mut state = self.state.write();
        let instance = state
            .instances
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("workflow instance {}", id)))?;
        if !instance.is_active() {
            return Err(RepositoryError::StaleState(format!("workflow instance {} is not active", id)));
        }
        instance.status = InstanceStatus::Cancelled;
        instance.updated_at = at;
        let cancelled = instance.clone();

        for task in state.tasks.values_mut() {
            if task.instance_id == id && task.is_pending() {
                task.status = TaskStatus::Cancelled;
                task.decided_at = Some(at);
            }
        }
        Ok(cancelled)
    }

    async fn find_overdue_tasks(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<WorkflowTask>, RepositoryError> {
        let mut overdue: Vec<WorkflowTask> = self
            .state
            .read()
            .tasks
            .values()
            .filter(|t| t.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|t| (t.due_at, t.id));
        overdue.truncate(limit as usize);
        Ok(overdue)
    }
}

/// Per-record decision computed before any mutation so a batch that hits an
/// integrity fault leaves the state untouched.
enum PlannedSettlement {
    Skip(Option<DocumentId>, SkipReason),
    Hold(DocumentId),
    Dispose(DocumentId, DispositionAction),
}

#[async_trait]
impl RetentionRepository for InMemoryGovernanceStore {
    async fn save_policy(&self, policy: &RetentionPolicy) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if state.policies.values().any(|p| p.name == policy.name && p.id != policy.id) {
            return Err(RepositoryError::Conflict(format!("retention policy '{}' already exists", policy.name)));
        }
        state.policies.insert(policy.id, policy.clone());
        Ok(())
    }

    async fn find_policy(&self, id: RetentionPolicyId) -> Result<Option<RetentionPolicy>, RepositoryError> {
        Ok(self.state.read().policies.get(&id).cloned())
    }

    async fn list_policies(&self) -> Result<Vec<RetentionPolicy>, RepositoryError> {
        let mut policies: Vec<RetentionPolicy> = self.state.read().policies.values().cloned().collect();
        policies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(policies)
    }

    async fn insert_retention(&self, record: &DocumentRetention) -> Result<DocumentRetention, RepositoryError> {
        let mut state = self.state.write();
        if state
            .retentions
            .values()
            .any(|r| r.document_id == record.document_id && r.policy_id == record.policy_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "policy {} is already applied to document {}",
                record.policy_id, record.document_id
            )));
        }
        let mut stored = record.clone();
        if stored.status.is_open() && state.document_is_held(stored.document_id) {
            stored.status = DispositionStatus::Held;
        }
        state.retentions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_retention(&self, id: RetentionId) -> Result<Option<DocumentRetention>, RepositoryError> {
        Ok(self.state.read().retentions.get(&id).cloned())
    }

    async fn find_retentions_for_document(&self, document: DocumentId) -> Result<Vec<DocumentRetention>, RepositoryError> {
        let mut found: Vec<DocumentRetention> = self
            .state
            .read()
            .retentions
            .values()
            .filter(|r| r.document_id == document)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.expires_at, r.id));
        Ok(found)
    }

    async fn find_sweep_candidates(
        &self,
        now: DateTime<Utc>,
        after: Option<SweepCursor>,
        limit: u32,
    ) -> Result<Vec<DocumentRetention>, RepositoryError> {
        let state = self.state.read();
        let mut candidates: Vec<DocumentRetention> = state
            .retentions
            .values()
            .filter(|r| r.status.is_open() && r.has_expired(now))
            .filter(|r| after.map(|cursor| cursor.precedes(r)).unwrap_or(true))
            .cloned()
            .collect();
        candidates.sort_by_key(|r| (r.expires_at, r.id));
        candidates.truncate(limit as usize);
        Ok(candidates)
    }

    async fn mark_eligible(
        &self,
        ids: &[RetentionId],
        now: DateTime<Utc>,
    ) -> Result<Vec<DocumentRetention>, RepositoryError> {
        let mut state = self.state.write();
        let mut marked = Vec::new();
        for id in ids {
            let Some(record) = state.retentions.get(id) else { continue };
            if !record.is_eligible(now) || state.document_is_held(record.document_id) {
                continue;
            }
            if let Some(record) = state.retentions.get_mut(id) {
                record.status = DispositionStatus::Eligible;
                marked.push(record.clone());
            }
        }
        Ok(marked)
    }

    async fn settle_batch(
        &self,
        ids: &[RetentionId],
        disposed_by: PersonId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Settlement>, RepositoryError> {
        let mut state = self.state.write();

        let mut plan = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(record) = state.retentions.get(id) else {
                plan.push((*id, PlannedSettlement::Skip(None, SkipReason::Missing)));
                continue;
            };
            let document = record.document_id;
            let step = if record.status == DispositionStatus::Completed {
                PlannedSettlement::Skip(Some(document), SkipReason::AlreadySettled)
            } else if !record.has_expired(now) {
                PlannedSettlement::Skip(Some(document), SkipReason::NotExpired)
            } else if state.document_is_held(document) {
                PlannedSettlement::Hold(document)
            } else {
                let policy = state.policies.get(&record.policy_id).ok_or_else(|| {
                    RepositoryError::Integrity(format!(
                        "retention record {} references missing policy {}",
                        id, record.policy_id
                    ))
                })?;
                if !state.documents.contains_key(&document) {
                    return Err(RepositoryError::Integrity(format!(
                        "retention record {} references missing document {}",
                        id, document
                    )));
                }
                PlannedSettlement::Dispose(document, policy.action)
            };
            plan.push((*id, step));
        }

        let mut settlements = Vec::with_capacity(plan.len());
        for (id, step) in plan {
            let settlement = match step {
                PlannedSettlement::Skip(document_id, reason) => Settlement {
                    retention_id: id,
                    document_id,
                    outcome: DispositionOutcome::Skipped { reason },
                },
                PlannedSettlement::Hold(document_id) => {
                    if let Some(record) = state.retentions.get_mut(&id) {
                        record.status = DispositionStatus::Held;
                    }
                    Settlement {
                        retention_id: id,
                        document_id: Some(document_id),
                        outcome: DispositionOutcome::Held,
                    }
                }
                PlannedSettlement::Dispose(document_id, action) => {
                    if let Some(document) = state.documents.get_mut(&document_id) {
                        match action {
                            DispositionAction::Archive => document.archive(now),
                            DispositionAction::Destroy => document.destroy(now),
                            DispositionAction::Retain => {}
                        }
                    }
                    if action == DispositionAction::Destroy {
                        state.checkouts.remove(&document_id);
                    }
                    if let Some(record) = state.retentions.get_mut(&id) {
                        record.status = DispositionStatus::Completed;
                        record.disposed_at = Some(now);
                        record.disposed_by = Some(disposed_by);
                    }
                    Settlement {
                        retention_id: id,
                        document_id: Some(document_id),
                        outcome: DispositionOutcome::Completed { action },
                    }
                }
            };
            settlements.push(settlement);
        }
        Ok(settlements)
    }
}

#[async_trait]
impl LegalHoldRepository for InMemoryGovernanceStore {
    async fn save_hold(&self, hold: &LegalHold) -> Result<(), RepositoryError> {
        self.state.write().holds.insert(hold.id, hold.clone());
        Ok(())
    }

    async fn find_hold(&self, id: LegalHoldId) -> Result<Option<LegalHold>, RepositoryError> {
        Ok(self.state.read().holds.get(&id).cloned())
    }

    async fn list_active_holds(&self) -> Result<Vec<LegalHold>, RepositoryError> {
        let mut holds: Vec<LegalHold> = self.state.read().holds.values().filter(|h| h.is_active).cloned().collect();
        holds.sort_by_key(|h| h.created_at);
        Ok(holds)
    }

    async fn place(&self, held: &HeldDocument) -> Result<u64, RepositoryError> {
        let mut state = self.state.write();
        match state.holds.get(&held.hold_id) {
            None => return Err(RepositoryError::NotFound(format!("legal hold {}", held.hold_id))),
            Some(hold) if !hold.is_active => {
                return Err(RepositoryError::StaleState(format!("legal hold {} has been released", held.hold_id)))
            }
            Some(_) => {}
        }
        if !state.documents.contains_key(&held.document_id) {
            return Err(RepositoryError::NotFound(format!("document {}", held.document_id)));
        }
        let key = (held.hold_id, held.document_id);
        if state.held_documents.contains_key(&key) {
            return Err(RepositoryError::Conflict(format!(
                "document {} is already under hold {}",
                held.document_id, held.hold_id
            )));
        }
        state.held_documents.insert(key, held.clone());

        let mut marked = 0;
        for record in state.retentions.values_mut() {
            if record.document_id == held.document_id && record.status.is_open() {
                record.status = DispositionStatus::Held;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn remove(&self, hold: LegalHoldId, document: DocumentId) -> Result<u64, RepositoryError> {
        let mut state = self.state.write();
        if state.held_documents.remove(&(hold, document)).is_none() {
            return Err(RepositoryError::NotFound(format!("document {} under hold {}", document, hold)));
        }
        Ok(state.restore_if_unheld(document))
    }

    async fn release(&self, hold: LegalHoldId, at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut state = self.state.write();
        let stored = state
            .holds
            .get_mut(&hold)
            .ok_or_else(|| RepositoryError::NotFound(format!("legal hold {}", hold)))?;
        if !stored.is_active {
            return Err(RepositoryError::StaleState(format!("legal hold {} has already been released", hold)));
        }
        stored.is_active = false;
        stored.released_at = Some(at);

        let documents: Vec<DocumentId> = state
            .held_documents
            .keys()
            .filter(|(h, _)| *h == hold)
            .map(|(_, d)| *d)
            .collect();
        Ok(documents.into_iter().map(|d| state.restore_if_unheld(d)).sum())
    }

    async fn holds_for_document(&self, document: DocumentId) -> Result<Vec<LegalHold>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .held_documents
            .keys()
            .filter(|(_, d)| *d == document)
            .filter_map(|(h, _)| state.holds.get(h))
            .filter(|h| h.is_active)
            .cloned()
            .collect())
    }

    async fn documents_on_hold(&self, hold: LegalHoldId) -> Result<Vec<HeldDocument>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .held_documents
            .range((hold, DocumentId::from_uuid(uuid::Uuid::nil()))..)
            .take_while(|((h, _), _)| *h == hold)
            .map(|(_, held)| held.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::{Classification, ContentAttributes, Document, NewDocument};
    use crate::domain::retention::NewRetentionPolicy;
    use chrono::Duration;

    fn folder_tree(store: &InMemoryGovernanceStore) -> (Node, Node, Node) {
        let owner = PersonId::new();
        let root = Node::new_root(NodeKind::Folder, "Legal", owner).unwrap();
        let child = Node::new_child(&root, "Contracts", owner).unwrap();
        let grandchild = Node::new_child(&child, "2026", owner).unwrap();
        let mut state = store.state.write();
        for node in [&root, &child, &grandchild] {
            state.node_paths.insert(node.path.to_key(), node.id);
            state.nodes.insert(node.id, node.clone());
        }
        (root, child, grandchild)
    }

    fn content(tag: &str) -> ContentAttributes {
        ContentAttributes::new(format!("s3://bucket/{}", tag), "f".repeat(64), 10, "text/plain", "a.txt").unwrap()
    }

    async fn stored_document(store: &InMemoryGovernanceStore) -> Document {
        let owner = PersonId::new();
        let (doc, v1) = Document::create(
            NewDocument {
                title: "Policy".to_string(),
                description: None,
                folder_id: None,
                content_type: None,
                classification: Classification::Internal,
                content: content("v1"),
            },
            owner,
        )
        .unwrap();
        DocumentRepository::create(store, &doc, &v1, &AclEntry::owner_of(doc.id, owner))
            .await
            .unwrap();
        doc
    }

    #[tokio::test]
    async fn test_subtree_is_prefix_scan() {
        let store = InMemoryGovernanceStore::new();
        let (root, child, grandchild) = folder_tree(&store);
        let other = Node::new_root(NodeKind::Folder, "Finance", PersonId::new()).unwrap();
        NodeRepository::insert(&store, &other).await.unwrap();

        let subtree = store.find_subtree(&child.path).await.unwrap();
        let ids: Vec<NodeId> = subtree.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![child.id, grandchild.id]);
        assert_eq!(store.find_subtree(&root.path).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_sibling_name_conflicts() {
        let store = InMemoryGovernanceStore::new();
        let (root, _, _) = folder_tree(&store);
        let dup = Node::new_child(&root, "Contracts", PersonId::new()).unwrap();
        assert!(matches!(NodeRepository::insert(&store, &dup).await, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_relocate_rejects_stale_path() {
        let store = InMemoryGovernanceStore::new();
        let (root, child, grandchild) = folder_tree(&store);
        let elsewhere = Node::new_root(NodeKind::Folder, "Archive", PersonId::new()).unwrap();
        NodeRepository::insert(&store, &elsewhere).await.unwrap();

        let stale = NodeRelocation {
            node_id: grandchild.id,
            from_path: MaterializedPath::child_of(&root.path, grandchild.id),
            new_parent: Some((elsewhere.id, elsewhere.path.clone())),
            at: Utc::now(),
        };
        assert!(matches!(store.relocate(&stale).await, Err(RepositoryError::StaleState(_))));

        let fresh = NodeRelocation {
            from_path: grandchild.path.clone(),
            ..stale
        };
        assert_eq!(store.relocate(&fresh).await.unwrap(), 1);
        let moved = NodeRepository::find_by_id(&store, grandchild.id).await.unwrap().unwrap();
        assert_eq!(moved.parent_id, Some(elsewhere.id));
        assert!(moved.verify_lineage(Some(&elsewhere)).is_ok());
        assert_eq!(store.find_subtree(&child.path).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkin_requires_holder_and_is_atomic() {
        let store = InMemoryGovernanceStore::new();
        let doc = stored_document(&store).await;
        let holder = PersonId::new();
        store.acquire(&Checkout::new(doc.id, holder, None)).await.unwrap();
        assert!(matches!(
            store.acquire(&Checkout::new(doc.id, PersonId::new(), None)).await,
            Err(RepositoryError::Conflict(_))
        ));

        let mut commit = CheckinCommit {
            document_id: doc.id,
            holder: PersonId::new(),
            version_id: VersionId::new(),
            content: content("v2"),
            change_summary: None,
            committed_at: Utc::now(),
        };
        assert!(matches!(store.commit_checkin(&commit).await, Err(RepositoryError::Conflict(_))));
        assert_eq!(store.find_versions(doc.id).await.unwrap().len(), 1);

        commit.holder = holder;
        let v2 = store.commit_checkin(&commit).await.unwrap();
        assert_eq!(v2.version_number, 2);
        let reloaded = DocumentRepository::find_by_id(&store, doc.id).await.unwrap().unwrap();
        assert!(reloaded.is_consistent_with(&v2));
        assert!(store.find_by_document(doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_held_document_settles_as_held() {
        let store = InMemoryGovernanceStore::new();
        let doc = stored_document(&store).await;
        let policy = RetentionPolicy::new(NewRetentionPolicy {
            name: "short".to_string(),
            description: None,
            retention_days: 1,
            action: DispositionAction::Destroy,
            content_type: None,
            category_id: None,
        })
        .unwrap();
        store.save_policy(&policy).await.unwrap();
        let record = store
            .insert_retention(&DocumentRetention::apply(&policy, doc.id, Utc::now() - Duration::days(2)))
            .await
            .unwrap();

        let hold = LegalHold::new("Litigation 42", None, None, PersonId::new()).unwrap();
        store.save_hold(&hold).await.unwrap();
        let marked = store
            .place(&HeldDocument {
                hold_id: hold.id,
                document_id: doc.id,
                added_by: hold.created_by,
                added_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(marked, 1);

        let settled = store.settle_batch(&[record.id], PersonId::new(), Utc::now()).await.unwrap();
        assert_eq!(settled[0].outcome, DispositionOutcome::Held);
        let reloaded = DocumentRepository::find_by_id(&store, doc.id).await.unwrap().unwrap();
        assert!(reloaded.is_active);

        assert_eq!(LegalHoldRepository::release(&store, hold.id, Utc::now()).await.unwrap(), 1);
        let settled = store.settle_batch(&[record.id], PersonId::new(), Utc::now()).await.unwrap();
        assert_eq!(
            settled[0].outcome,
            DispositionOutcome::Completed { action: DispositionAction::Destroy }
        );
    }
}
