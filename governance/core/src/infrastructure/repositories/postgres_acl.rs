// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres ACL Repository
//!
//! A partial unique index on active grants turns a duplicate grant into a
//! unique violation, surfaced as `RepositoryError::Conflict`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::acl::{AclEntry, Principal, ResourceRef};
use crate::domain::ids::{AclEntryId, NodeId, PersonId};
use crate::domain::repository::{AclRepository, RepositoryError};

const ACL_COLUMNS: &str = "id, resource_kind, resource_id, principal_kind, principal_id, permission, inherited, granted_by, is_active, created_at";

pub struct PostgresAclRepository {
    pool: PgPool,
}

impl PostgresAclRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_acl_row(row: &PgRow) -> Result<AclEntry, RepositoryError> {
    let resource_kind: String = row.try_get("resource_kind")?;
    let principal_kind: String = row.try_get("principal_kind")?;
    let permission: String = row.try_get("permission")?;
    Ok(AclEntry {
        id: AclEntryId::from_uuid(row.try_get("id")?),
        resource: ResourceRef::from_parts(&resource_kind, row.try_get("resource_id")?)?,
        principal: Principal::from_parts(&principal_kind, row.try_get("principal_id")?)?,
        permission: permission.parse()?,
        inherited: row.try_get("inherited")?,
        granted_by: PersonId::from_uuid(row.try_get("granted_by")?),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Shared with the document repository, which writes the owner grant in the
/// same transaction as the document.
pub(crate) async fn insert_acl_entry<'c, E>(executor: E, entry: &AclEntry) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO acl_entries (
            id, resource_kind, resource_id, principal_kind, principal_id,
            permission, inherited, granted_by, is_active, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.resource.kind())
    .bind(entry.resource.id())
    .bind(entry.principal.kind())
    .bind(entry.principal.id())
    .bind(entry.permission.as_str())
    .bind(entry.inherited)
    .bind(entry.granted_by.as_uuid())
    .bind(entry.is_active)
    .bind(entry.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl AclRepository for PostgresAclRepository {
    async fn insert(&self, entry: &AclEntry) -> Result<(), RepositoryError> {
        insert_acl_entry(&self.pool, entry).await
    }

    async fn find_by_id(&self, id: AclEntryId) -> Result<Option<AclEntry>, RepositoryError> {
        let sql = format!("SELECT {} FROM acl_entries WHERE id = $1", ACL_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_acl_row).transpose()
    }

    async fn deactivate(&self, id: AclEntryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE acl_entries SET is_active = FALSE WHERE id = $1 AND is_active")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("acl entry {}", id)));
        }
        Ok(())
    }

    async fn find_for_resource(&self, resource: ResourceRef) -> Result<Vec<AclEntry>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM acl_entries WHERE resource_kind = $1 AND resource_id = $2 AND is_active ORDER BY created_at",
            ACL_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(resource.kind())
            .bind(resource.id())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(parse_acl_row).collect()
    }

    async fn find_for_folders(&self, folders: &[NodeId]) -> Result<Vec<AclEntry>, RepositoryError> {
        if folders.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = folders.iter().map(|f| f.as_uuid()).collect();
        let sql = format!(
            "SELECT {} FROM acl_entries WHERE resource_kind = 'folder' AND resource_id = ANY($1) AND is_active",
            ACL_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(&ids).fetch_all(&self.pool).await?;
        rows.iter().map(parse_acl_row).collect()
    }
}
