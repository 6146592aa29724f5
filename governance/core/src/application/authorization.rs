// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Authorization Resolver
//!
//! Decides whether an actor holds a permission on a document or folder.
//!
//! # Resolution order
//!
//! 1. Global administrators are granted everything.
//! 2. Active entries directly on the resource, matched against the actor's
//!    person id and each of their roles.
//! 3. Folder entries along the ancestry path, nearest folder first. For a
//!    document the walk starts at its folder; for a folder, at its parent.
//! 4. Anything else is denied.
//!
//! `manage` implies `read`, `write` and `delete` at every step. The ancestry
//! comes from the stored materialized path, so the walk is bounded by the
//! resource's depth and all folder entries are fetched in one query.
//!
//! No decision is cached across calls.

use std::sync::Arc;
use tracing::debug;

use crate::application::surface;
use crate::domain::acl::{AclEntry, Permission, ResourceRef};
use crate::domain::actor::Actor;
use crate::domain::error::GovernanceError;
use crate::domain::hierarchy::{MaterializedPath, Node};
use crate::domain::ids::NodeId;
use crate::domain::repository::{AclRepository, DocumentRepository, NodeRepository};

/// What the resolver needs to know about a resource.
struct ResourceScope {
    resource: ResourceRef,
    /// Folders whose entries apply, nearest first.
    chain: Vec<NodeId>,
    /// False for deleted documents and for anything beneath an inactive folder.
    active: bool,
}

/// Every entry relevant to one resource, split by where it was found.
struct ApplicableEntries {
    direct: Vec<AclEntry>,
    /// Folder entries in walk order.
    inherited: Vec<Vec<AclEntry>>,
}

impl ApplicableEntries {
    fn grants(&self, actor: &Actor, requested: Permission) -> bool {
        if self.direct.iter().any(|e| e.grants(actor, requested)) {
            return true;
        }
        for level in &self.inherited {
            if level.iter().any(|e| e.grants(actor, requested)) {
                return true;
            }
        }
        false
    }
}

pub struct AuthorizationResolver {
    nodes: Arc<dyn NodeRepository>,
    acl: Arc<dyn AclRepository>,
    documents: Arc<dyn DocumentRepository>,
}

impl AuthorizationResolver {
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        acl: Arc<dyn AclRepository>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self { nodes, acl, documents }
    }

    /// Whether `actor` may perform `permission` on `resource`. A resource
    /// that does not exist, or is inactive, is never accessible to a
    /// non-administrator.
    pub async fn can_access(
        &self,
        actor: &Actor,
        resource: ResourceRef,
        permission: Permission,
    ) -> Result<bool, GovernanceError> {
        let Some(scope) = self.scope(resource).await? else {
            return Ok(false);
        };
        if actor.is_administrator() {
            return Ok(true);
        }
        if !scope.active {
            return Ok(false);
        }
        let entries = self.applicable(&scope).await?;
        let granted = entries.grants(actor, permission);
        debug!(
            actor = %actor.id(),
            resource = %scope.resource,
            permission = permission.as_str(),
            granted,
            "Resolved access"
        );
        Ok(granted)
    }

    /// Fail unless `actor` holds `permission`.
    ///
    /// An actor who cannot even read the resource gets `NotFound`, exactly as
    /// if it did not exist. `Forbidden` is reserved for actors who can see the
    /// resource but lack the requested permission.
    pub async fn require(
        &self,
        actor: &Actor,
        resource: ResourceRef,
        permission: Permission,
    ) -> Result<(), GovernanceError> {
        let hidden = || GovernanceError::NotFound(resource.to_string());

        let scope = self.scope(resource).await?.ok_or_else(hidden)?;
        if actor.is_administrator() {
            return Ok(());
        }
        if !scope.active {
            return Err(hidden());
        }

        let entries = self.applicable(&scope).await?;
        if entries.grants(actor, permission) {
            return Ok(());
        }
        if permission != Permission::Read && entries.grants(actor, Permission::Read) {
            debug!(actor = %actor.id(), resource = %resource, permission = permission.as_str(), "Access denied");
            return Err(GovernanceError::Forbidden(format!(
                "{} permission required on {}",
                permission, resource
            )));
        }
        Err(hidden())
    }

    async fn scope(&self, resource: ResourceRef) -> Result<Option<ResourceScope>, GovernanceError> {
        match resource {
            ResourceRef::Document(id) => {
                let Some(document) = self.documents.find_by_id(id).await? else {
                    return Ok(None);
                };
                let mut scope = ResourceScope {
                    resource,
                    chain: Vec::new(),
                    active: document.is_active,
                };
                if let Some(folder_id) = document.folder_id {
                    let folder = self.nodes.find_by_id(folder_id).await?.ok_or_else(|| {
                        surface(GovernanceError::Integrity(format!(
                            "document {} references missing folder {}",
                            id, folder_id
                        )))
                    })?;
                    self.ensure_lineage(&folder.path).await?;
                    scope.active &= folder.is_active;
                    scope.chain = folder.path.nearest_first().collect();
                }
                Ok(Some(scope))
            }
            ResourceRef::Folder(id) => {
                let Some(folder) = self.nodes.find_by_id(id).await? else {
                    return Ok(None);
                };
                self.ensure_lineage(&folder.path).await?;
                Ok(Some(ResourceScope {
                    resource,
                    chain: folder.path.ancestors_nearest_first().collect(),
                    active: folder.is_active,
                }))
            }
        }
    }

    /// Every node named by `path` must exist; a gap means the stored tree is
    /// corrupt and no access decision can be trusted.
    async fn ensure_lineage(&self, path: &MaterializedPath) -> Result<(), GovernanceError> {
        if path.len() < 2 {
            return Ok(());
        }
        let found: Vec<Node> = self.nodes.find_many(path.ids()).await?;
        if found.len() != path.len() {
            let missing: Vec<String> = path
                .ids()
                .iter()
                .filter(|id| !found.iter().any(|n| n.id == **id))
                .map(|id| id.to_string())
                .collect();
            return Err(surface(GovernanceError::Integrity(format!(
                "ancestry {} references missing nodes [{}]",
                path,
                missing.join(", ")
            ))));
        }
        Ok(())
    }

    async fn applicable(&self, scope: &ResourceScope) -> Result<ApplicableEntries, GovernanceError> {
        let direct = self.acl.find_for_resource(scope.resource).await?;
        let mut folder_entries = self.acl.find_for_folders(&scope.chain).await?;

        let mut inherited = Vec::with_capacity(scope.chain.len());
        for folder in &scope.chain {
            let (here, rest): (Vec<AclEntry>, Vec<AclEntry>) = folder_entries
                .into_iter()
                .partition(|e| e.resource == ResourceRef::Folder(*folder));
            inherited.push(here);
            folder_entries = rest;
        }
        Ok(ApplicableEntries { direct, inherited })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::acl::{GrantRequest, Principal};
    use crate::domain::document::{Classification, ContentAttributes, Document, NewDocument};
    use crate::domain::hierarchy::NodeKind;
    use crate::domain::ids::{PersonId, RoleId};
    use crate::infrastructure::repositories::InMemoryGovernanceStore;

    fn resolver(store: &InMemoryGovernanceStore) -> AuthorizationResolver {
        AuthorizationResolver::new(Arc::new(store.clone()), Arc::new(store.clone()), Arc::new(store.clone()))
    }

    async fn document_in(store: &InMemoryGovernanceStore, folder: Option<NodeId>, owner: PersonId) -> Document {
        let content = ContentAttributes::new("blob://x", "a".repeat(64), 1, "text/plain", "x.txt").unwrap();
        let (doc, v1) = Document::create(
            NewDocument {
                title: "Memo".to_string(),
                description: None,
                folder_id: folder,
                content_type: None,
                classification: Classification::Internal,
                content,
            },
            owner,
        )
        .unwrap();
        DocumentRepository::create(store, &doc, &v1, &AclEntry::owner_of(doc.id, owner))
            .await
            .unwrap();
        doc
    }

    async fn grant(store: &InMemoryGovernanceStore, resource: ResourceRef, principal: Principal, permission: Permission) {
        let entry = AclEntry::new(
            &GrantRequest {
                resource,
                principal,
                permission,
                inherited: false,
            },
            PersonId::new(),
        )
        .unwrap();
        AclRepository::insert(store, &entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_owner_manage_implies_all() {
        let store = InMemoryGovernanceStore::new();
        let owner = PersonId::new();
        let doc = document_in(&store, None, owner).await;
        let resolver = resolver(&store);
        let actor = Actor::new(owner, []);

        for p in [Permission::Read, Permission::Write, Permission::Delete, Permission::Manage] {
            assert!(resolver.can_access(&actor, ResourceRef::Document(doc.id), p).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_folder_grant_reaches_nested_documents() {
        let store = InMemoryGovernanceStore::new();
        let root = Node::new_root(NodeKind::Folder, "Legal", PersonId::new()).unwrap();
        let child = Node::new_child(&root, "Contracts", root.created_by).unwrap();
        NodeRepository::insert(&store, &root).await.unwrap();
        NodeRepository::insert(&store, &child).await.unwrap();
        let doc = document_in(&store, Some(child.id), PersonId::new()).await;

        let role = RoleId::new();
        grant(&store, ResourceRef::Folder(root.id), Principal::Role(role), Permission::Read).await;

        let resolver = resolver(&store);
        let member = Actor::new(PersonId::new(), [role]);
        let outsider = Actor::new(PersonId::new(), [RoleId::new()]);

        assert!(resolver
            .can_access(&member, ResourceRef::Document(doc.id), Permission::Read)
            .await
            .unwrap());
        assert!(!resolver
            .can_access(&member, ResourceRef::Document(doc.id), Permission::Write)
            .await
            .unwrap());
        assert!(!resolver
            .can_access(&outsider, ResourceRef::Document(doc.id), Permission::Read)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_require_hides_unreadable_resources() {
        let store = InMemoryGovernanceStore::new();
        let doc = document_in(&store, None, PersonId::new()).await;
        let reader = PersonId::new();
        grant(&store, ResourceRef::Document(doc.id), Principal::Person(reader), Permission::Read).await;
        let resolver = resolver(&store);

        let err = resolver
            .require(&Actor::new(PersonId::new(), []), ResourceRef::Document(doc.id), Permission::Write)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::NotFound(_)));

        let err = resolver
            .require(&Actor::new(reader, []), ResourceRef::Document(doc.id), Permission::Write)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_missing_ancestor_is_an_integrity_fault() {
        let store = InMemoryGovernanceStore::new();
        let ghost = Node::new_root(NodeKind::Folder, "Ghost", PersonId::new()).unwrap();
        let mut orphan = Node::new_child(&ghost, "Orphan", ghost.created_by).unwrap();
        orphan.parent_id = None;
        NodeRepository::insert(&store, &orphan).await.unwrap();

        let err = resolver(&store)
            .can_access(&Actor::new(PersonId::new(), []), ResourceRef::Folder(orphan.id), Permission::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_administrator_bypasses_entries() {
        let store = InMemoryGovernanceStore::new();
        let doc = document_in(&store, None, PersonId::new()).await;
        assert!(resolver(&store)
            .can_access(&Actor::administrator(PersonId::new()), ResourceRef::Document(doc.id), Permission::Manage)
            .await
            .unwrap());
    }
}
