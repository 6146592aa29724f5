// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits declared in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve governance aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresNodeRepository** - folder and category trees
//! - **PostgresAclRepository** - access control entries
//! - **PostgresDocumentRepository** - documents, versions, checkouts
//! - **PostgresWorkflowRepository** - approval definitions, instances, tasks
//! - **PostgresRetentionRepository** - retention policies, records, legal holds
//!
//! ## In-Memory Store
//!
//! - **InMemoryGovernanceStore** - one lock-guarded state implementing every
//!   trait, for tests and `storage.backend: in_memory`
//!
//! # Usage
//!
//! ```no_run
//! # async fn example(database_url: &str) -> anyhow::Result<()> {
//! use sqlx::PgPool;
//! use aegis_governance_core::infrastructure::repositories::PostgresNodeRepository;
//!
//! let pool = PgPool::connect(database_url).await?;
//! let nodes = PostgresNodeRepository::new(pool);
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod postgres_acl;
pub mod postgres_document;
pub mod postgres_node;
pub mod postgres_retention;
pub mod postgres_workflow;

pub use memory::InMemoryGovernanceStore;
pub use postgres_acl::PostgresAclRepository;
pub use postgres_document::PostgresDocumentRepository;
pub use postgres_node::PostgresNodeRepository;
pub use postgres_retention::PostgresRetentionRepository;
pub use postgres_workflow::PostgresWorkflowRepository;
