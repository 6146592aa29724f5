// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Static Identity Provider
//!
//! A registry-backed [`IdentityProvider`]: people, their bearer credentials
//! and role memberships are registered up front. Members of any configured
//! administrator role authenticate as global administrators.
//!
//! Suitable for development, tests and single-tenant deployments where the
//! directory is small; production deployments plug in their own provider.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::domain::acl::Principal;
use crate::domain::actor::{Actor, IdentityProvider};
use crate::domain::error::GovernanceError;
use crate::domain::ids::{PersonId, RoleId};

#[derive(Default)]
struct Directory {
    credentials: HashMap<String, PersonId>,
    memberships: HashMap<PersonId, BTreeSet<RoleId>>,
    roles: BTreeSet<RoleId>,
    admin_roles: BTreeSet<RoleId>,
}

#[derive(Clone, Default)]
pub struct StaticIdentityProvider {
    directory: Arc<RwLock<Directory>>,
}

impl StaticIdentityProvider {
    pub fn new(admin_roles: impl IntoIterator<Item = RoleId>) -> Self {
        let provider = Self::default();
        {
            let mut dir = provider.directory.write();
            dir.admin_roles = admin_roles.into_iter().collect();
            let admin_roles = dir.admin_roles.clone();
            dir.roles.extend(admin_roles);
        }
        provider
    }

    pub fn register_role(&self, role: RoleId) {
        self.directory.write().roles.insert(role);
    }

    /// Register a person with a bearer credential and their roles.
    pub fn register_person(
        &self,
        person: PersonId,
        credential: impl Into<String>,
        roles: impl IntoIterator<Item = RoleId>,
    ) {
        let mut dir = self.directory.write();
        let roles: BTreeSet<RoleId> = roles.into_iter().collect();
        dir.roles.extend(roles.iter().copied());
        dir.memberships.insert(person, roles);
        dir.credentials.insert(credential.into(), person);
    }

    /// Actor for a registered person, without going through a credential.
    pub fn actor_for(&self, person: PersonId) -> Result<Actor, GovernanceError> {
        let dir = self.directory.read();
        let roles = dir
            .memberships
            .get(&person)
            .ok_or_else(|| GovernanceError::NotFound(format!("person {}", person)))?;
        let administrator = roles.iter().any(|r| dir.admin_roles.contains(r));
        Ok(Actor::new(person, roles.iter().copied()).with_administrator(administrator))
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, credential: &str) -> Result<Actor, GovernanceError> {
        let person = self.directory.read().credentials.get(credential).copied();
        match person {
            Some(person) => self.actor_for(person),
            None => {
                debug!("Rejected unknown credential");
                Err(GovernanceError::Forbidden("invalid credential".to_string()))
            }
        }
    }

    async fn roles_of(&self, person: PersonId) -> Result<BTreeSet<RoleId>, GovernanceError> {
        Ok(self.directory.read().memberships.get(&person).cloned().unwrap_or_default())
    }

    async fn members_of(&self, role: RoleId) -> Result<Vec<PersonId>, GovernanceError> {
        let dir = self.directory.read();
        let mut members: Vec<PersonId> = dir
            .memberships
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(person, _)| *person)
            .collect();
        members.sort();
        Ok(members)
    }

    async fn principal_exists(&self, principal: &Principal) -> Result<bool, GovernanceError> {
        let dir = self.directory.read();
        Ok(match principal {
            Principal::Person(person) => dir.memberships.contains_key(person),
            Principal::Role(role) => dir.roles.contains(role),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admin_role_members_authenticate_as_administrators() {
        let admins = RoleId::new();
        let clerks = RoleId::new();
        let provider = StaticIdentityProvider::new([admins]);
        let (alice, bob) = (PersonId::new(), PersonId::new());
        provider.register_person(alice, "alice-token", [admins]);
        provider.register_person(bob, "bob-token", [clerks]);

        assert!(provider.authenticate("alice-token").await.unwrap().is_administrator());
        let bob_actor = provider.authenticate("bob-token").await.unwrap();
        assert!(!bob_actor.is_administrator());
        assert!(bob_actor.has_role(clerks));
        assert!(matches!(provider.authenticate("nope").await, Err(GovernanceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_membership_queries() {
        let reviewers = RoleId::new();
        let provider = StaticIdentityProvider::new([]);
        let (a, b) = (PersonId::new(), PersonId::new());
        provider.register_person(a, "a", [reviewers]);
        provider.register_person(b, "b", []);

        assert_eq!(provider.members_of(reviewers).await.unwrap(), vec![a]);
        assert!(provider.principal_exists(&Principal::Role(reviewers)).await.unwrap());
        assert!(!provider.principal_exists(&Principal::Role(RoleId::new())).await.unwrap());
        assert!(provider.principal_exists(&Principal::Person(b)).await.unwrap());
    }
}
