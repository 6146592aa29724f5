// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Actor and Identity Provider contract
//!
//! An [`Actor`] is the authenticated caller of a governance operation. Audit
//! entries take the actor by reference so the recorded "who" cannot be
//! supplied from outside.
//!
//! Administrator actors are only minted inside the crate: by an identity
//! provider resolving a member of an administrator role, or as the system
//! actor of the batch driver. `Actor` is not deserializable, so a request
//! body can never claim administrator rights.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Caller identity, role membership, administrator flag

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::domain::acl::Principal;
use crate::domain::error::GovernanceError;
use crate::domain::ids::{PersonId, RoleId};

/// ```compile_fail
/// use aegis_governance_core::domain::actor::Actor;
/// let claimed: Actor = serde_json::from_str(r#"{"id":"00000000-0000-0000-0000-000000000001","roles":[],"administrator":true}"#).unwrap();
/// ```
///
/// ```compile_fail
/// use aegis_governance_core::domain::{actor::Actor, ids::PersonId};
/// let admin = Actor::administrator(PersonId::new());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    id: PersonId,
    roles: BTreeSet<RoleId>,
    administrator: bool,
}

impl Actor {
    pub fn new(id: PersonId, roles: impl IntoIterator<Item = RoleId>) -> Self {
        Self {
            id,
            roles: roles.into_iter().collect(),
            administrator: false,
        }
    }

    pub(crate) fn administrator(id: PersonId) -> Self {
        Self {
            id,
            roles: BTreeSet::new(),
            administrator: true,
        }
    }

    /// Identity used by scheduled jobs such as the disposition sweep.
    pub(crate) fn system() -> Self {
        Self::administrator(PersonId::from_uuid(uuid::Uuid::nil()))
    }

    pub(crate) fn with_administrator(mut self, administrator: bool) -> Self {
        self.administrator = administrator;
        self
    }

    pub fn id(&self) -> PersonId {
        self.id
    }

    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }

    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a RoleId>) -> bool {
        roles.into_iter().any(|r| self.roles.contains(r))
    }

    pub fn is_administrator(&self) -> bool {
        self.administrator
    }

    /// Every principal this actor acts as: the person plus each role.
    pub fn principals(&self) -> impl Iterator<Item = Principal> + '_ {
        std::iter::once(Principal::Person(self.id)).chain(self.roles.iter().copied().map(Principal::Role))
    }
}

/// External identity provider.
///
/// Authentication itself is out of scope; the core only consumes the
/// resolved identity and role memberships.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve an opaque credential into an actor.
    async fn authenticate(&self, credential: &str) -> Result<Actor, GovernanceError>;

    async fn roles_of(&self, person: PersonId) -> Result<BTreeSet<RoleId>, GovernanceError>;

    async fn members_of(&self, role: RoleId) -> Result<Vec<PersonId>, GovernanceError>;

    async fn principal_exists(&self, principal: &Principal) -> Result<bool, GovernanceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principals_cover_person_and_roles() {
        let person = PersonId::new();
        let (a, b) = (RoleId::new(), RoleId::new());
        let actor = Actor::new(person, [a, b]);

        let principals: Vec<Principal> = actor.principals().collect();
        assert_eq!(principals.len(), 3);
        assert!(principals.contains(&Principal::Person(person)));
        assert!(principals.contains(&Principal::Role(a)));
        assert!(!actor.is_administrator());
    }

    #[test]
    fn test_system_actor_is_administrator() {
        assert!(Actor::system().is_administrator());
    }

    #[test]
    fn test_public_constructor_never_grants_administrator() {
        let actor = Actor::new(PersonId::new(), [RoleId::new()]);
        assert!(!actor.is_administrator());
    }

    #[test]
    fn test_serialized_actor_carries_administrator_flag() {
        let json = serde_json::to_value(Actor::system()).unwrap();
        assert_eq!(json["administrator"], serde_json::json!(true));
    }
}
