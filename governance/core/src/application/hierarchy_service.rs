// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Hierarchy Engine
//!
//! Folder and category trees addressed by materialized path.
//!
//! - Folders are governed by ACLs: creating beneath a folder needs `write`
//!   on it, moving needs `manage` on the node and `write` on the new parent,
//!   deleting needs `delete`. Only administrators create or move to the root.
//! - Categories are a shared taxonomy: readable by everyone, changed by
//!   administrators only.
//!
//! Moves and deletes are single repository calls that rewrite or deactivate
//! the whole subtree atomically. Any stored lineage that contradicts itself
//! is surfaced as an integrity fault, never repaired on the fly.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::{record_audit, surface, AuthorizationResolver};
use crate::domain::acl::{Permission, ResourceRef};
use crate::domain::actor::Actor;
use crate::domain::error::GovernanceError;
use crate::domain::events::{AuditAction, AuditEntry, AuditSink, AuditSubject};
use crate::domain::hierarchy::{Node, NodeKind};
use crate::domain::ids::NodeId;
use crate::domain::repository::{NodeRelocation, NodeRepository};

pub struct HierarchyService {
    nodes: Arc<dyn NodeRepository>,
    resolver: Arc<AuthorizationResolver>,
    audit: Arc<dyn AuditSink>,
}

impl HierarchyService {
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        resolver: Arc<AuthorizationResolver>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { nodes, resolver, audit }
    }

    /// Create a root (no `parent`) or a child node. A child always takes its
    /// parent's kind; asking for a different one is a validation error.
    pub async fn create(
        &self,
        actor: &Actor,
        kind: NodeKind,
        parent: Option<NodeId>,
        name: &str,
    ) -> Result<Node, GovernanceError> {
        let node = match parent {
            None => {
                if !actor.is_administrator() {
                    return Err(GovernanceError::Forbidden(format!(
                        "only administrators create root {}s",
                        kind.as_str()
                    )));
                }
                Node::new_root(kind, name, actor.id())?
            }
            Some(parent_id) => {
                let parent = self.active_node(parent_id).await?;
                if parent.kind != kind {
                    return Err(GovernanceError::Validation(format!(
                        "cannot create a {} beneath {} {}",
                        kind.as_str(),
                        parent.kind.as_str(),
                        parent.id
                    )));
                }
                self.authorize_change(actor, &parent, Permission::Write).await?;
                self.verify(&parent).await?;
                Node::new_child(&parent, name, actor.id())?
            }
        };

        self.nodes.insert(&node).await?;
        info!(node_id = %node.id, kind = node.kind.as_str(), depth = node.depth, "Node created");
        Ok(node)
    }

    pub async fn get(&self, actor: &Actor, id: NodeId) -> Result<Node, GovernanceError> {
        let node = self.active_node(id).await?;
        if node.kind == NodeKind::Folder {
            self.resolver.require(actor, ResourceRef::Folder(id), Permission::Read).await?;
        }
        Ok(node)
    }

    /// Active direct children, ordered by name.
    pub async fn children(&self, actor: &Actor, id: NodeId) -> Result<Vec<Node>, GovernanceError> {
        self.get(actor, id).await?;
        Ok(self.nodes.find_children(id).await?)
    }

    /// Active roots of `kind`. Folder roots are filtered to those the actor
    /// can read.
    pub async fn roots(&self, actor: &Actor, kind: NodeKind) -> Result<Vec<Node>, GovernanceError> {
        let roots = self.nodes.find_roots(kind).await?;
        if kind == NodeKind::Category || actor.is_administrator() {
            return Ok(roots);
        }
        let mut visible = Vec::with_capacity(roots.len());
        for root in roots {
            if self
                .resolver
                .can_access(actor, ResourceRef::Folder(root.id), Permission::Read)
                .await?
            {
                visible.push(root);
            }
        }
        Ok(visible)
    }

    /// Proper ancestors, root first.
    pub async fn ancestors(&self, actor: &Actor, id: NodeId) -> Result<Vec<Node>, GovernanceError> {
        let node = self.get(actor, id).await?;
        let ancestor_ids = &node.path.ids()[..node.path.len() - 1];
        let found = self.nodes.find_many(ancestor_ids).await?;

        let mut by_id: HashMap<NodeId, Node> = found.into_iter().map(|n| (n.id, n)).collect();
        let mut ordered = Vec::with_capacity(ancestor_ids.len());
        for ancestor in ancestor_ids {
            let node = by_id.remove(ancestor).ok_or_else(|| {
                surface(GovernanceError::Integrity(format!(
                    "node {} lists missing ancestor {}",
                    id, ancestor
                )))
            })?;
            ordered.push(node);
        }
        Ok(ordered)
    }

    /// The node and all of its active descendants, ordered by path. One
    /// range scan over stored paths.
    pub async fn subtree(&self, actor: &Actor, id: NodeId) -> Result<Vec<Node>, GovernanceError> {
        let node = self.get(actor, id).await?;
        let nodes = self.nodes.find_subtree(&node.path).await?;
        Ok(nodes.into_iter().filter(|n| n.is_active).collect())
    }

    /// Move `id` and its subtree beneath `new_parent`, or to the root.
    pub async fn move_node(
        &self,
        actor: &Actor,
        id: NodeId,
        new_parent: Option<NodeId>,
    ) -> Result<Node, GovernanceError> {
        let node = self.active_node(id).await?;
        self.authorize_change(actor, &node, Permission::Manage).await?;
        self.verify(&node).await?;

        if node.parent_id == new_parent {
            return Ok(node);
        }

        let target = match new_parent {
            None => {
                if !actor.is_administrator() {
                    return Err(GovernanceError::Forbidden("only administrators move nodes to the root".to_string()));
                }
                None
            }
            Some(parent_id) => {
                let parent = self.active_node(parent_id).await?;
                if parent.kind != node.kind {
                    return Err(GovernanceError::Validation(format!(
                        "cannot move a {} beneath a {}",
                        node.kind.as_str(),
                        parent.kind.as_str()
                    )));
                }
                if parent.path.contains(node.id) {
                    return Err(GovernanceError::Validation(format!(
                        "cannot move node {} into its own subtree",
                        node.id
                    )));
                }
                self.authorize_change(actor, &parent, Permission::Write).await?;
                self.verify(&parent).await?;
                Some((parent.id, parent.path))
            }
        };

        let relocation = NodeRelocation {
            node_id: node.id,
            from_path: node.path.clone(),
            new_parent: target,
            at: Utc::now(),
        };
        let rewritten = self.nodes.relocate(&relocation).await?;
        let moved = self
            .nodes
            .find_by_id(id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("node {}", id)))?;

        info!(node_id = %id, rewritten, new_path = %moved.path, "Subtree moved");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::Node(id), AuditAction::NodeMoved).with_detail(json!({
                "from": relocation.from_path.to_key(),
                "to": moved.path.to_key(),
                "nodes_rewritten": rewritten,
            })),
        )
        .await;
        Ok(moved)
    }

    /// Soft-delete `id` together with every descendant.
    pub async fn delete(&self, actor: &Actor, id: NodeId) -> Result<u64, GovernanceError> {
        let node = self.active_node(id).await?;
        self.authorize_change(actor, &node, Permission::Delete).await?;

        let deactivated = self.nodes.deactivate_subtree(&node.path, Utc::now()).await?;

        info!(node_id = %id, deactivated, "Subtree deactivated");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::Node(id), AuditAction::NodeDeleted)
                .with_detail(json!({ "nodes_deactivated": deactivated })),
        )
        .await;
        Ok(deactivated)
    }

    /// Check every node of the subtree at `id` against its parent row.
    /// Returns how many nodes were checked, or the first fault found.
    ///
    /// Inactive subtrees can be checked too, so this is administrator-only.
    pub async fn check_integrity(&self, actor: &Actor, id: NodeId) -> Result<usize, GovernanceError> {
        if !actor.is_administrator() {
            return Err(GovernanceError::Forbidden("integrity checks are administrator-only".to_string()));
        }
        let root = self
            .nodes
            .find_by_id(id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("node {}", id)))?;
        let subtree = self.nodes.find_subtree(&root.path).await?;
        let by_id: HashMap<NodeId, &Node> = subtree.iter().map(|n| (n.id, n)).collect();

        for node in &subtree {
            let parent = match node.parent_id {
                None => None,
                Some(pid) => match by_id.get(&pid) {
                    Some(p) => Some((*p).clone()),
                    None => self.nodes.find_by_id(pid).await?,
                },
            };
            if let Err(fault) = node.verify_lineage(parent.as_ref()) {
                warn!(root = %id, node_id = %node.id, "Subtree failed integrity check");
                return Err(surface(fault));
            }
        }
        Ok(subtree.len())
    }

    async fn active_node(&self, id: NodeId) -> Result<Node, GovernanceError> {
        self.nodes
            .find_by_id(id)
            .await?
            .filter(|n| n.is_active)
            .ok_or_else(|| GovernanceError::NotFound(format!("node {}", id)))
    }

    /// Check `node` against its stored parent before building paths on it.
    async fn verify(&self, node: &Node) -> Result<(), GovernanceError> {
        let parent = match node.parent_id {
            Some(pid) => self.nodes.find_by_id(pid).await?,
            None => None,
        };
        node.verify_lineage(parent.as_ref()).map_err(surface)
    }

    async fn authorize_change(&self, actor: &Actor, node: &Node, permission: Permission) -> Result<(), GovernanceError> {
        match node.kind {
            NodeKind::Folder => self.resolver.require(actor, ResourceRef::Folder(node.id), permission).await,
            NodeKind::Category if actor.is_administrator() => Ok(()),
            NodeKind::Category => Err(GovernanceError::Forbidden("categories are administrator-managed".to_string())),
        }
    }
}
