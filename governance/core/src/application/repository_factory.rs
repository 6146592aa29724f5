// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations for the configured storage
//! backend and wires them into the governance services.
//!
//! The in-memory backend hands every trait the same [`InMemoryGovernanceStore`]
//! so that cross-aggregate operations (document creation with its owner
//! grant, disposition touching documents and retention records) stay atomic
//! there as well.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Composition root for the governance core

use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::application::{
    AclService, AuthorizationResolver, CachedSettings, DispositionService, DocumentService, HierarchyService,
    WorkflowEngine,
};
use crate::domain::actor::IdentityProvider;
use crate::domain::config::{AuditSinkKind, GovernanceConfigManifest, StorageBackendKind};
use crate::domain::events::AuditSink;
use crate::domain::repository::{
    AclRepository, CheckoutRepository, DocumentRepository, LegalHoldRepository, NodeRepository, PostgresConfig,
    RetentionRepository, StorageBackend, WorkflowRepository,
};
use crate::domain::settings::{GovernanceSettings, SettingsSource, StaticSettingsSource};
use crate::infrastructure::audit::{PostgresAuditSink, TracingAuditSink};
use crate::infrastructure::db::Database;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::repositories::{
    InMemoryGovernanceStore, PostgresAclRepository, PostgresDocumentRepository, PostgresNodeRepository,
    PostgresRetentionRepository, PostgresWorkflowRepository,
};
use crate::infrastructure::settings::PostgresSettingsSource;

/// One handle per repository trait.
#[derive(Clone)]
pub struct GovernanceRepositories {
    pub nodes: Arc<dyn NodeRepository>,
    pub acl: Arc<dyn AclRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub checkouts: Arc<dyn CheckoutRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub retention: Arc<dyn RetentionRepository>,
    pub holds: Arc<dyn LegalHoldRepository>,
}

impl GovernanceRepositories {
    pub fn in_memory() -> Self {
        Self::from_store(InMemoryGovernanceStore::new())
    }

    /// Share an existing store, e.g. one a test has seeded directly.
    pub fn from_store(store: InMemoryGovernanceStore) -> Self {
        Self {
            nodes: Arc::new(store.clone()),
            acl: Arc::new(store.clone()),
            documents: Arc::new(store.clone()),
            checkouts: Arc::new(store.clone()),
            workflows: Arc::new(store.clone()),
            retention: Arc::new(store.clone()),
            holds: Arc::new(store),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        let documents = Arc::new(PostgresDocumentRepository::new(pool.clone()));
        let retention = Arc::new(PostgresRetentionRepository::new(pool.clone()));
        Self {
            nodes: Arc::new(PostgresNodeRepository::new(pool.clone())),
            acl: Arc::new(PostgresAclRepository::new(pool.clone())),
            documents: documents.clone(),
            checkouts: documents,
            workflows: Arc::new(PostgresWorkflowRepository::new(pool)),
            retention: retention.clone(),
            holds: retention,
        }
    }
}

/// Creates the repositories for the configured backend. The PostgreSQL
/// backend needs a connected pool.
pub fn create_repositories(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> anyhow::Result<GovernanceRepositories> {
    match backend {
        StorageBackend::InMemory => Ok(GovernanceRepositories::in_memory()),
        StorageBackend::PostgreSQL(_) => {
            let pool = pool.context("PostgreSQL storage backend selected without a connection pool")?;
            Ok(GovernanceRepositories::postgres(pool))
        }
    }
}

/// Creates the settings source: the `governance_settings` table when backed
/// by PostgreSQL, otherwise the manifest values.
pub fn create_settings_source(
    backend: &StorageBackend,
    pool: Option<PgPool>,
    defaults: GovernanceSettings,
) -> Arc<dyn SettingsSource> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresSettingsSource::new(pool, defaults)),
        _ => Arc::new(StaticSettingsSource::new(defaults)),
    }
}

/// Creates the audit sink named by `spec.audit.sink`.
pub fn create_audit_sink(kind: AuditSinkKind, pool: Option<PgPool>) -> anyhow::Result<Arc<dyn AuditSink>> {
    match kind {
        AuditSinkKind::Tracing => Ok(Arc::new(TracingAuditSink)),
        AuditSinkKind::Postgres => {
            let pool = pool.context("audit sink 'postgres' requires the postgres storage backend")?;
            Ok(Arc::new(PostgresAuditSink::new(pool)))
        }
    }
}

/// Every governance service, wired to one set of repositories.
#[derive(Clone)]
pub struct GovernanceCore {
    pub repositories: GovernanceRepositories,
    pub resolver: Arc<AuthorizationResolver>,
    pub hierarchy: Arc<HierarchyService>,
    pub acl: Arc<AclService>,
    pub documents: Arc<DocumentService>,
    pub workflows: Arc<WorkflowEngine>,
    pub disposition: Arc<DispositionService>,
    pub settings: Arc<CachedSettings>,
    pub events: Arc<EventBus>,
    pub identity: Arc<dyn IdentityProvider>,
    pub database: Option<Database>,
}

impl GovernanceCore {
    pub fn new(
        repositories: GovernanceRepositories,
        identity: Arc<dyn IdentityProvider>,
        settings_source: Arc<dyn SettingsSource>,
        settings_ttl: Duration,
        audit: Arc<dyn AuditSink>,
        events: Arc<EventBus>,
    ) -> Self {
        let r = &repositories;
        let settings = Arc::new(CachedSettings::new(settings_source, settings_ttl));
        let resolver = Arc::new(AuthorizationResolver::new(
            r.nodes.clone(),
            r.acl.clone(),
            r.documents.clone(),
        ));

        let hierarchy = Arc::new(HierarchyService::new(r.nodes.clone(), resolver.clone(), audit.clone()));
        let acl = Arc::new(AclService::new(
            r.acl.clone(),
            resolver.clone(),
            identity.clone(),
            settings.clone(),
            audit.clone(),
        ));
        let documents = Arc::new(DocumentService::new(
            r.documents.clone(),
            r.checkouts.clone(),
            r.nodes.clone(),
            resolver.clone(),
            events.clone(),
            audit.clone(),
        ));
        let workflows = Arc::new(WorkflowEngine::new(
            r.workflows.clone(),
            resolver.clone(),
            identity.clone(),
            events.clone(),
            audit.clone(),
        ));
        let disposition = Arc::new(DispositionService::new(
            r.retention.clone(),
            r.holds.clone(),
            r.documents.clone(),
            r.nodes.clone(),
            resolver.clone(),
            settings.clone(),
            events.clone(),
            audit,
        ));

        Self {
            repositories,
            resolver,
            hierarchy,
            acl,
            documents,
            workflows,
            disposition,
            settings,
            events,
            identity,
            database: None,
        }
    }

    /// In-memory core with fixed settings.
    pub fn in_memory(
        identity: Arc<dyn IdentityProvider>,
        settings: GovernanceSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::new(
            GovernanceRepositories::in_memory(),
            identity,
            Arc::new(StaticSettingsSource::new(settings)),
            Duration::from_secs(60),
            audit,
            Arc::new(EventBus::with_default_capacity()),
        )
    }

    /// Build the core described by a config manifest, connecting to
    /// PostgreSQL when the manifest asks for it.
    pub async fn from_manifest(
        manifest: &GovernanceConfigManifest,
        identity: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        manifest.validate()?;
        let storage = &manifest.spec.storage;

        let (backend, database) = match storage.backend {
            StorageBackendKind::InMemory => (StorageBackend::InMemory, None),
            StorageBackendKind::Postgres => {
                let url = storage
                    .database_url
                    .clone()
                    .context("spec.storage.database_url is required for the postgres backend")?;
                let database = Database::new(&url, storage.max_connections)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                let backend = StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: url,
                    max_connections: storage.max_connections,
                });
                (backend, Some(database))
            }
        };
        let pool = database.as_ref().map(|db| db.get_pool().clone());

        let repositories = create_repositories(&backend, pool.clone())?;
        let settings_source = create_settings_source(&backend, pool.clone(), manifest.settings());
        let audit = create_audit_sink(manifest.spec.audit.sink, pool)?;

        info!(
            backend = ?storage.backend,
            audit_sink = ?manifest.spec.audit.sink,
            "Governance core initialised"
        );

        let mut core = Self::new(
            repositories,
            identity,
            settings_source,
            Duration::from_secs(manifest.spec.settings_cache.ttl_seconds),
            audit,
            Arc::new(EventBus::with_default_capacity()),
        );
        core.database = database;
        Ok(core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::NodeKind;
    use crate::infrastructure::identity::StaticIdentityProvider;

    #[tokio::test]
    async fn test_in_memory_manifest_builds_core() {
        let manifest = GovernanceConfigManifest::default();
        let core = GovernanceCore::from_manifest(&manifest, Arc::new(StaticIdentityProvider::new([])))
            .await
            .unwrap();
        assert!(core.database.is_none());

        let admin = crate::domain::actor::Actor::system();
        let root = core.hierarchy.create(&admin, NodeKind::Folder, None, "Legal").await.unwrap();
        let children = core.repositories.nodes.find_children(root.id).await.unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn test_postgres_backend_requires_pool() {
        let backend = StorageBackend::PostgreSQL(PostgresConfig {
            connection_string: "postgres://localhost/governance".to_string(),
            max_connections: 5,
        });
        assert!(create_repositories(&backend, None).is_err());
        assert!(create_audit_sink(AuditSinkKind::Postgres, None).is_err());
    }
}
