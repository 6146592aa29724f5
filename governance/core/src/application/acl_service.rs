// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! ACL administration
//!
//! Grants and revocations require `manage` on the resource. Handing out
//! `manage` itself (or taking it away) is reserved for administrators unless
//! the `allow_manage_delegation` setting is on.
//!
//! Principals come from the identity provider, which may live in another
//! subsystem; their existence is checked here at grant time and nowhere else.

use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::application::settings_cache::CachedSettings;
use crate::application::{record_audit, AuthorizationResolver};
use crate::domain::acl::{AclEntry, GrantRequest, Permission, ResourceRef};
use crate::domain::actor::{Actor, IdentityProvider};
use crate::domain::error::GovernanceError;
use crate::domain::events::{AuditAction, AuditEntry, AuditSink, AuditSubject};
use crate::domain::ids::AclEntryId;
use crate::domain::repository::AclRepository;

pub struct AclService {
    acl: Arc<dyn AclRepository>,
    resolver: Arc<AuthorizationResolver>,
    identity: Arc<dyn IdentityProvider>,
    settings: Arc<CachedSettings>,
    audit: Arc<dyn AuditSink>,
}

impl AclService {
    pub fn new(
        acl: Arc<dyn AclRepository>,
        resolver: Arc<AuthorizationResolver>,
        identity: Arc<dyn IdentityProvider>,
        settings: Arc<CachedSettings>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            acl,
            resolver,
            identity,
            settings,
            audit,
        }
    }

    pub async fn grant(&self, actor: &Actor, request: GrantRequest) -> Result<AclEntry, GovernanceError> {
        self.resolver.require(actor, request.resource, Permission::Manage).await?;
        self.check_delegation(actor, request.permission).await?;

        if !self.identity.principal_exists(&request.principal).await? {
            return Err(GovernanceError::Validation(format!("unknown principal {}", request.principal)));
        }

        let entry = AclEntry::new(&request, actor.id())?;
        self.acl.insert(&entry).await?;

        info!(
            entry_id = %entry.id,
            resource = %entry.resource,
            principal = %entry.principal,
            permission = entry.permission.as_str(),
            "Access granted"
        );
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::AclEntry(entry.id), AuditAction::AclGranted).with_detail(json!({
                "resource": entry.resource,
                "principal": entry.principal,
                "permission": entry.permission,
                "inherited": entry.inherited,
            })),
        )
        .await;
        Ok(entry)
    }

    pub async fn revoke(&self, actor: &Actor, entry_id: AclEntryId) -> Result<(), GovernanceError> {
        let entry = self
            .acl
            .find_by_id(entry_id)
            .await?
            .filter(|e| e.is_active)
            .ok_or_else(|| GovernanceError::NotFound(format!("acl entry {}", entry_id)))?;

        self.resolver.require(actor, entry.resource, Permission::Manage).await?;
        self.check_delegation(actor, entry.permission).await?;

        self.acl.deactivate(entry_id).await?;

        info!(entry_id = %entry_id, resource = %entry.resource, "Access revoked");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::AclEntry(entry_id), AuditAction::AclRevoked).with_detail(json!({
                "resource": entry.resource,
                "principal": entry.principal,
                "permission": entry.permission,
            })),
        )
        .await;
        Ok(())
    }

    /// Active entries placed directly on `resource`.
    pub async fn entries(&self, actor: &Actor, resource: ResourceRef) -> Result<Vec<AclEntry>, GovernanceError> {
        self.resolver.require(actor, resource, Permission::Manage).await?;
        Ok(self.acl.find_for_resource(resource).await?)
    }

    async fn check_delegation(&self, actor: &Actor, permission: Permission) -> Result<(), GovernanceError> {
        if permission != Permission::Manage || actor.is_administrator() {
            return Ok(());
        }
        if self.settings.get().await?.allow_manage_delegation {
            return Ok(());
        }
        Err(GovernanceError::Forbidden(
            "only administrators may grant or revoke manage".to_string(),
        ))
    }
}
