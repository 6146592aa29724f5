// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Access Control Domain Model
//!
//! An [`AclEntry`] grants one [`Permission`] on one [`ResourceRef`] to one
//! [`Principal`]. Principals are either a person or a role, never a pair of
//! loose type/id columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::error::GovernanceError;
use crate::domain::ids::{AclEntryId, DocumentId, NodeId, PersonId, RoleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    Person(PersonId),
    Role(RoleId),
}

impl Principal {
    pub fn kind(&self) -> &'static str {
        match self {
            Principal::Person(_) => "person",
            Principal::Role(_) => "role",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Principal::Person(id) => id.as_uuid(),
            Principal::Role(id) => id.as_uuid(),
        }
    }

    pub fn from_parts(kind: &str, id: Uuid) -> Result<Self, GovernanceError> {
        match kind {
            "person" => Ok(Principal::Person(PersonId::from_uuid(id))),
            "role" => Ok(Principal::Role(RoleId::from_uuid(id))),
            other => Err(GovernanceError::Validation(format!("unknown principal kind '{}'", other))),
        }
    }

    pub fn matches(&self, actor: &Actor) -> bool {
        match self {
            Principal::Person(id) => actor.id() == *id,
            Principal::Role(role) => actor.has_role(*role),
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Delete,
    Manage,
}

impl Permission {
    /// Whether holding `self` is sufficient for `requested`.
    /// Manage implies every other permission; nothing else implies anything.
    pub fn implies(self, requested: Permission) -> bool {
        self == requested || self == Permission::Manage
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
            Permission::Manage => "manage",
        }
    }
}

impl FromStr for Permission {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "delete" => Ok(Permission::Delete),
            "manage" => Ok(Permission::Manage),
            other => Err(GovernanceError::Validation(format!("unknown permission '{}'", other))),
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything an ACL entry can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResourceRef {
    Document(DocumentId),
    Folder(NodeId),
}

impl ResourceRef {
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceRef::Document(_) => "document",
            ResourceRef::Folder(_) => "folder",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ResourceRef::Document(id) => id.as_uuid(),
            ResourceRef::Folder(id) => id.as_uuid(),
        }
    }

    pub fn from_parts(kind: &str, id: Uuid) -> Result<Self, GovernanceError> {
        match kind {
            "document" => Ok(ResourceRef::Document(DocumentId::from_uuid(id))),
            "folder" => Ok(ResourceRef::Folder(NodeId::from_uuid(id))),
            other => Err(GovernanceError::Validation(format!("unknown resource kind '{}'", other))),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclEntry {
    pub id: AclEntryId,
    pub resource: ResourceRef,
    pub principal: Principal,
    pub permission: Permission,
    /// Folder entries only: whether the grant applies to the folder's contents.
    pub inherited: bool,
    pub granted_by: PersonId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl AclEntry {
    pub fn new(request: &GrantRequest, granted_by: PersonId) -> Result<Self, GovernanceError> {
        if request.inherited && matches!(request.resource, ResourceRef::Document(_)) {
            return Err(GovernanceError::Validation(
                "only folder entries can be inherited".to_string(),
            ));
        }
        Ok(Self {
            id: AclEntryId::new(),
            resource: request.resource,
            principal: request.principal,
            permission: request.permission,
            inherited: request.inherited,
            granted_by,
            is_active: true,
            created_at: Utc::now(),
        })
    }

    /// Owner entry written alongside a newly created document.
    pub fn owner_of(document: DocumentId, owner: PersonId) -> Self {
        Self {
            id: AclEntryId::new(),
            resource: ResourceRef::Document(document),
            principal: Principal::Person(owner),
            permission: Permission::Manage,
            inherited: false,
            granted_by: owner,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Whether this entry, on its own, lets `actor` perform `requested`.
    pub fn grants(&self, actor: &Actor, requested: Permission) -> bool {
        self.is_active && self.principal.matches(actor) && self.permission.implies(requested)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRequest {
    pub resource: ResourceRef,
    pub principal: Principal,
    pub permission: Permission,
    #[serde(default)]
    pub inherited: bool,
}
