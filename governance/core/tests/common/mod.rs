// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use aegis_governance_core::application::GovernanceCore;
use aegis_governance_core::domain::acl::{GrantRequest, Permission, Principal, ResourceRef};
use aegis_governance_core::domain::actor::Actor;
use aegis_governance_core::domain::document::{Classification, ContentAttributes, Document, NewDocument};
use aegis_governance_core::domain::ids::{NodeId, PersonId, RoleId};
use aegis_governance_core::domain::settings::GovernanceSettings;
use aegis_governance_core::infrastructure::audit::InMemoryAuditSink;
use aegis_governance_core::infrastructure::identity::StaticIdentityProvider;

pub struct Harness {
    pub core: GovernanceCore,
    pub identity: StaticIdentityProvider,
    pub audit: InMemoryAuditSink,
    pub admin: Actor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(GovernanceSettings::default())
    }

    pub fn with_settings(settings: GovernanceSettings) -> Self {
        let admin_role = RoleId::new();
        let identity = StaticIdentityProvider::new([admin_role]);
        let audit = InMemoryAuditSink::new();
        let core = GovernanceCore::in_memory(Arc::new(identity.clone()), settings, Arc::new(audit.clone()));

        let admin_id = PersonId::new();
        identity.register_person(admin_id, format!("admin-{}", admin_id), [admin_role]);
        let admin = identity.actor_for(admin_id).expect("admin registered");

        Self {
            core,
            identity,
            audit,
            admin,
        }
    }

    pub fn role(&self) -> RoleId {
        let role = RoleId::new();
        self.identity.register_role(role);
        role
    }

    pub fn person(&self, roles: &[RoleId]) -> Actor {
        let id = PersonId::new();
        self.identity
            .register_person(id, format!("token-{}", id), roles.iter().copied());
        self.identity.actor_for(id).expect("person registered")
    }

    pub async fn folder(&self, parent: Option<NodeId>, name: &str) -> NodeId {
        self.core
            .hierarchy
            .create(&self.admin, aegis_governance_core::domain::hierarchy::NodeKind::Folder, parent, name)
            .await
            .expect("folder created")
            .id
    }

    pub async fn grant(&self, resource: ResourceRef, principal: Principal, permission: Permission) {
        self.core
            .acl
            .grant(
                &self.admin,
                GrantRequest {
                    resource,
                    principal,
                    permission,
                    inherited: false,
                },
            )
            .await
            .expect("grant applied");
    }

    pub async fn document(&self, owner: &Actor, folder: Option<NodeId>) -> Document {
        self.core
            .documents
            .create(owner, draft(folder, content('0')))
            .await
            .expect("document created")
    }
}

pub fn content(tag: char) -> ContentAttributes {
    ContentAttributes::new(
        format!("blob://content/{}", tag),
        tag.to_string().repeat(64),
        128,
        "application/pdf",
        "file.pdf",
    )
    .expect("valid content")
}

pub fn draft(folder: Option<NodeId>, content: ContentAttributes) -> NewDocument {
    NewDocument {
        title: "Board minutes".to_string(),
        description: None,
        folder_id: folder,
        content_type: Some("minutes".to_string()),
        classification: Classification::Confidential,
        content,
    }
}
