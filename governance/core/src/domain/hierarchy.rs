// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Hierarchy Domain Model
//!
//! Folders (which hold documents) and categories (a classification taxonomy)
//! share one representation: a [`Node`] carrying a materialized path, the
//! ordered list of ids from its root down to itself.
//!
//! # Invariants
//!
//! - `path` ends with the node's own id
//! - for a non-root node, `path == parent.path + [id]`
//! - `depth == path.len() - 1`
//! - an inactive node never has an active descendant
//!
//! The stored form of a path is `/<uuid>/<uuid>/`; descendants of a node are
//! exactly the rows whose key starts with the node's key, which makes subtree
//! reads a single prefix range scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::GovernanceError;
use crate::domain::ids::{NodeId, PersonId};

pub const MAX_NODE_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Folder,
    Category,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Folder => "folder",
            NodeKind::Category => "category",
        }
    }
}

impl FromStr for NodeKind {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "folder" => Ok(NodeKind::Folder),
            "category" => Ok(NodeKind::Category),
            other => Err(GovernanceError::Validation(format!("unknown node kind '{}'", other))),
        }
    }
}

/// Root-to-self id sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterializedPath(Vec<NodeId>);

impl MaterializedPath {
    pub fn root(id: NodeId) -> Self {
        Self(vec![id])
    }

    pub fn child_of(parent: &MaterializedPath, id: NodeId) -> Self {
        let mut ids = Vec::with_capacity(parent.0.len() + 1);
        ids.extend_from_slice(&parent.0);
        ids.push(id);
        Self(ids)
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> u32 {
        self.0.len().saturating_sub(1) as u32
    }

    pub fn leaf(&self) -> Option<NodeId> {
        self.0.last().copied()
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        if self.0.len() < 2 {
            None
        } else {
            Some(self.0[self.0.len() - 2])
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    pub fn starts_with(&self, prefix: &MaterializedPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Ids from the leaf up to the root, leaf included.
    pub fn nearest_first(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().rev().copied()
    }

    /// Ids of proper ancestors, nearest first.
    pub fn ancestors_nearest_first(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().rev().skip(1).copied()
    }

    /// Replace `old_prefix` with `new_prefix`, keeping the remainder intact.
    pub fn rebase(&self, old_prefix: &MaterializedPath, new_prefix: &MaterializedPath) -> Option<Self> {
        if !self.starts_with(old_prefix) {
            return None;
        }
        let mut ids = new_prefix.0.clone();
        ids.extend_from_slice(&self.0[old_prefix.0.len()..]);
        Some(Self(ids))
    }

    /// Storage key, `/<uuid>/<uuid>/`.
    pub fn to_key(&self) -> String {
        let mut key = String::with_capacity(1 + self.0.len() * 37);
        key.push('/');
        for id in &self.0 {
            key.push_str(&id.to_string());
            key.push('/');
        }
        key
    }

    /// Half-open key range `[lo, hi)` covering this node and every
    /// descendant. Keys end in `/`, so bumping that final byte to `0` bounds
    /// the prefix under byte-wise ordering.
    pub fn key_range(&self) -> (String, String) {
        let lo = self.to_key();
        let mut hi = lo.clone();
        hi.pop();
        hi.push('0');
        (lo, hi)
    }

    pub fn from_key(key: &str) -> Result<Self, GovernanceError> {
        let inner = key
            .strip_prefix('/')
            .and_then(|k| k.strip_suffix('/'))
            .ok_or_else(|| GovernanceError::Integrity(format!("malformed stored path '{}'", key)))?;
        if inner.is_empty() {
            return Err(GovernanceError::Integrity("stored path is empty".to_string()));
        }
        let ids = inner
            .split('/')
            .map(|segment| {
                uuid::Uuid::parse_str(segment)
                    .map(NodeId::from_uuid)
                    .map_err(|_| GovernanceError::Integrity(format!("malformed stored path '{}'", key)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(ids))
    }
}

impl std::fmt::Display for MaterializedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_key())
    }
}

pub fn validate_node_name(name: &str) -> Result<(), GovernanceError> {
    if name.trim().is_empty() {
        return Err(GovernanceError::Validation("node name cannot be empty".to_string()));
    }
    if name.len() > MAX_NODE_NAME_LEN {
        return Err(GovernanceError::Validation(format!(
            "node name exceeds {} characters",
            MAX_NODE_NAME_LEN
        )));
    }
    if name.contains('/') {
        return Err(GovernanceError::Validation("node name cannot contain '/'".to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub parent_id: Option<NodeId>,
    pub path: MaterializedPath,
    pub depth: u32,
    pub is_active: bool,
    pub created_by: PersonId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new_root(kind: NodeKind, name: impl Into<String>, created_by: PersonId) -> Result<Self, GovernanceError> {
        let name = name.into();
        validate_node_name(&name)?;
        let id = NodeId::new();
        let now = Utc::now();
        Ok(Self {
            id,
            kind,
            name,
            parent_id: None,
            path: MaterializedPath::root(id),
            depth: 0,
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    /// Create a node beneath `parent`. The parent must be active and of the
    /// same kind.
    pub fn new_child(parent: &Node, name: impl Into<String>, created_by: PersonId) -> Result<Self, GovernanceError> {
        let name = name.into();
        validate_node_name(&name)?;
        if !parent.is_active {
            return Err(GovernanceError::NotFound(format!("{} {}", parent.kind.as_str(), parent.id)));
        }
        let id = NodeId::new();
        let path = MaterializedPath::child_of(&parent.path, id);
        let now = Utc::now();
        Ok(Self {
            id,
            kind: parent.kind,
            name,
            parent_id: Some(parent.id),
            depth: path.depth(),
            path,
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check this node's stored lineage against its parent row.
    ///
    /// `parent` must be the row found for `self.parent_id` (or `None` when the
    /// lookup came back empty). Returns a description of the first
    /// contradiction found.
    pub fn verify_lineage(&self, parent: Option<&Node>) -> Result<(), GovernanceError> {
        let fault = |detail: String| Err(GovernanceError::Integrity(format!("node {}: {}", self.id, detail)));

        if self.path.leaf() != Some(self.id) {
            return fault(format!("path {} does not end with the node itself", self.path));
        }
        if self.depth != self.path.depth() {
            return fault(format!("depth {} disagrees with path length {}", self.depth, self.path.len()));
        }
        match (self.parent_id, parent) {
            (None, _) => {
                if self.path.len() != 1 {
                    return fault("root node carries a multi-segment path".to_string());
                }
            }
            (Some(declared), None) => {
                return fault(format!("declared parent {} cannot be found", declared));
            }
            (Some(declared), Some(parent)) => {
                if parent.id != declared {
                    return fault(format!("parent row {} does not match declared parent {}", parent.id, declared));
                }
                if parent.kind != self.kind {
                    return fault(format!("parent {} is a {}", parent.id, parent.kind.as_str()));
                }
                if self.path != MaterializedPath::child_of(&parent.path, self.id) {
                    return fault(format!("path {} is not parent path {} plus self", self.path, parent.path));
                }
                if self.is_active && !parent.is_active {
                    return fault(format!("active beneath inactive parent {}", parent.id));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(name: &str) -> Node {
        Node::new_root(NodeKind::Folder, name, PersonId::new()).unwrap()
    }

    #[test]
    fn test_root_has_depth_zero_and_self_path() {
        let root = folder("Legal");
        assert_eq!(root.depth, 0);
        assert_eq!(root.path.ids(), &[root.id]);
        assert!(root.verify_lineage(None).is_ok());
    }

    #[test]
    fn test_child_extends_parent_path() {
        let root = folder("Legal");
        let child = Node::new_child(&root, "Contracts", root.created_by).unwrap();
        let grandchild = Node::new_child(&child, "2026", root.created_by).unwrap();

        assert_eq!(grandchild.depth, 2);
        assert_eq!(grandchild.path.ids(), &[root.id, child.id, grandchild.id]);
        assert_eq!(grandchild.path.parent_id(), Some(child.id));
        assert!(grandchild.verify_lineage(Some(&child)).is_ok());
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_node_name("").is_err());
        assert!(validate_node_name("a/b").is_err());
        assert!(validate_node_name(&"x".repeat(MAX_NODE_NAME_LEN + 1)).is_err());
        assert!(validate_node_name("Quarterly Reports").is_ok());
    }

    #[test]
    fn test_missing_parent_is_integrity_fault() {
        let root = folder("Legal");
        let child = Node::new_child(&root, "Contracts", root.created_by).unwrap();
        let err = child.verify_lineage(None).unwrap_err();
        assert!(matches!(err, GovernanceError::Integrity(msg) if msg.contains("cannot be found")));
    }

    #[test]
    fn test_active_child_of_inactive_parent_is_integrity_fault() {
        let mut root = folder("Legal");
        let child = Node::new_child(&root, "Contracts", root.created_by).unwrap();
        root.is_active = false;
        assert!(matches!(child.verify_lineage(Some(&root)), Err(GovernanceError::Integrity(_))));
    }

    #[test]
    fn test_key_round_trip_and_prefix_semantics() {
        let root = folder("Legal");
        let child = Node::new_child(&root, "Contracts", root.created_by).unwrap();

        let key = child.path.to_key();
        assert!(key.starts_with(&root.path.to_key()));
        let (lo, hi) = root.path.key_range();
        assert!(lo <= key && key < hi);
        let (lo, hi) = child.path.key_range();
        assert!(!(lo <= root.path.to_key() && root.path.to_key() < hi));
        assert_eq!(MaterializedPath::from_key(&key).unwrap(), child.path);
        assert!(MaterializedPath::from_key("no-slashes").is_err());
        assert!(MaterializedPath::from_key("//").is_err());
    }

    #[test]
    fn test_rebase_moves_suffix_under_new_prefix() {
        let a = folder("A");
        let b = folder("B");
        let a1 = Node::new_child(&a, "A1", a.created_by).unwrap();
        let a11 = Node::new_child(&a1, "A11", a.created_by).unwrap();

        let moved_prefix = MaterializedPath::child_of(&b.path, a1.id);
        let rebased = a11.path.rebase(&a1.path, &moved_prefix).unwrap();
        assert_eq!(rebased.ids(), &[b.id, a1.id, a11.id]);
        assert!(b.path.rebase(&a1.path, &moved_prefix).is_none());
    }

    #[test]
    fn test_ancestors_are_nearest_first() {
        let root = folder("Legal");
        let child = Node::new_child(&root, "Contracts", root.created_by).unwrap();
        let leaf = Node::new_child(&child, "2026", root.created_by).unwrap();

        let ancestors: Vec<NodeId> = leaf.path.ancestors_nearest_first().collect();
        assert_eq!(ancestors, vec![child.id, root.id]);
    }
}
