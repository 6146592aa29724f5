// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Document Repository
//!
//! Documents, their immutable versions and the checkout lock. The current
//! version's content attributes are denormalized onto `documents`; check-in
//! rewrites both inside one transaction so they never disagree.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `DocumentRepository` and `CheckoutRepository`

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::postgres_acl::insert_acl_entry;
use crate::domain::acl::AclEntry;
use crate::domain::document::{CheckinCommit, Checkout, ContentAttributes, Document, Version};
use crate::domain::ids::{CheckoutId, DocumentId, NodeId, PersonId, VersionId};
use crate::domain::repository::{CheckoutRepository, DocumentRepository, RepositoryError};

const DOCUMENT_COLUMNS: &str = "id, title, description, folder_id, content_type, classification, status, \
     current_version_id, version_number, content_locator, checksum_sha256, size_bytes, media_type, file_name, \
     created_by, is_active, created_at, updated_at";

const VERSION_COLUMNS: &str = "id, document_id, version_number, content_locator, checksum_sha256, size_bytes, \
     media_type, file_name, change_summary, created_by, is_active, created_at";

pub struct PostgresDocumentRepository {
    pool: PgPool,
}

impl PostgresDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_content(row: &PgRow) -> Result<ContentAttributes, RepositoryError> {
    let size: i64 = row.try_get("size_bytes")?;
    Ok(ContentAttributes {
        locator: row.try_get("content_locator")?,
        checksum_sha256: row.try_get::<String, _>("checksum_sha256")?.trim().to_string(),
        size_bytes: u64::try_from(size)
            .map_err(|_| RepositoryError::Integrity(format!("negative content size {}", size)))?,
        media_type: row.try_get("media_type")?,
        file_name: row.try_get("file_name")?,
    })
}

fn parse_number(row: &PgRow) -> Result<u32, RepositoryError> {
    let number: i32 = row.try_get("version_number")?;
    u32::try_from(number).map_err(|_| RepositoryError::Integrity(format!("invalid version number {}", number)))
}

fn parse_document_row(row: &PgRow) -> Result<Document, RepositoryError> {
    let classification: String = row.try_get("classification")?;
    let status: String = row.try_get("status")?;
    Ok(Document {
        id: DocumentId::from_uuid(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        folder_id: row.try_get::<Option<Uuid>, _>("folder_id")?.map(NodeId::from_uuid),
        content_type: row.try_get("content_type")?,
        classification: classification.parse()?,
        status: status.parse()?,
        current_version_id: VersionId::from_uuid(row.try_get("current_version_id")?),
        version_number: parse_number(row)?,
        content: parse_content(row)?,
        created_by: PersonId::from_uuid(row.try_get("created_by")?),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_version_row(row: &PgRow) -> Result<Version, RepositoryError> {
    Ok(Version {
        id: VersionId::from_uuid(row.try_get("id")?),
        document_id: DocumentId::from_uuid(row.try_get("document_id")?),
        version_number: parse_number(row)?,
        content: parse_content(row)?,
        change_summary: row.try_get("change_summary")?,
        created_by: PersonId::from_uuid(row.try_get("created_by")?),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_checkout_row(row: &PgRow) -> Result<Checkout, RepositoryError> {
    Ok(Checkout {
        id: CheckoutId::from_uuid(row.try_get("id")?),
        document_id: DocumentId::from_uuid(row.try_get("document_id")?),
        holder: PersonId::from_uuid(row.try_get("holder_id")?),
        reason: row.try_get("reason")?,
        acquired_at: row.try_get("acquired_at")?,
    })
}

async fn insert_version<'c, E>(executor: E, version: &Version) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO document_versions (
            id, document_id, version_number, content_locator, checksum_sha256, size_bytes,
            media_type, file_name, change_summary, created_by, is_active, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(version.id.as_uuid())
    .bind(version.document_id.as_uuid())
    .bind(version.version_number as i32)
    .bind(&version.content.locator)
    .bind(&version.content.checksum_sha256)
    .bind(version.content.size_bytes as i64)
    .bind(&version.content.media_type)
    .bind(&version.content.file_name)
    .bind(&version.change_summary)
    .bind(version.created_by.as_uuid())
    .bind(version.is_active)
    .bind(version.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl DocumentRepository for PostgresDocumentRepository {
    async fn create(&self, document: &Document, first_version: &Version, owner: &AclEntry) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // current_version_id is checked at commit, so the document row can
        // go in before its first version.
        sqlx::query(
            r#"
            INSERT INTO documents (
                id, title, description, folder_id, content_type, classification, status,
                current_version_id, version_number, content_locator, checksum_sha256, size_bytes,
                media_type, file_name, created_by, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(document.id.as_uuid())
        .bind(&document.title)
        .bind(&document.description)
        .bind(document.folder_id.map(|f| f.as_uuid()))
        .bind(&document.content_type)
        .bind(document.classification.as_str())
        .bind(document.status.as_str())
        .bind(document.current_version_id.as_uuid())
        .bind(document.version_number as i32)
        .bind(&document.content.locator)
        .bind(&document.content.checksum_sha256)
        .bind(document.content.size_bytes as i64)
        .bind(&document.content.media_type)
        .bind(&document.content.file_name)
        .bind(document.created_by.as_uuid())
        .bind(document.is_active)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_version(&mut *tx, first_version).await?;
        insert_acl_entry(&mut *tx, owner).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, RepositoryError> {
        let sql = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_document_row).transpose()
    }

    async fn update(&self, document: &Document) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET title = $2, description = $3, folder_id = $4, content_type = $5,
                classification = $6, status = $7, is_active = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(document.id.as_uuid())
        .bind(&document.title)
        .bind(&document.description)
        .bind(document.folder_id.map(|f| f.as_uuid()))
        .bind(&document.content_type)
        .bind(document.classification.as_str())
        .bind(document.status.as_str())
        .bind(document.is_active)
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("document {}", document.id)));
        }
        if !document.is_active {
            sqlx::query("DELETE FROM checkouts WHERE document_id = $1")
                .bind(document.id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_in_folder(&self, folder: NodeId) -> Result<Vec<Document>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM documents WHERE folder_id = $1 AND is_active ORDER BY title",
            DOCUMENT_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(folder.as_uuid()).fetch_all(&self.pool).await?;
        rows.iter().map(parse_document_row).collect()
    }

    async fn find_versions(&self, document: DocumentId) -> Result<Vec<Version>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM document_versions WHERE document_id = $1 ORDER BY version_number",
            VERSION_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(document.as_uuid()).fetch_all(&self.pool).await?;
        rows.iter().map(parse_version_row).collect()
    }

    async fn find_version(&self, id: VersionId) -> Result<Option<Version>, RepositoryError> {
        let sql = format!("SELECT {} FROM document_versions WHERE id = $1", VERSION_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_version_row).transpose()
    }

    async fn set_version_active(&self, id: VersionId, active: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE document_versions SET is_active = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(active)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("version {}", id)));
        }
        Ok(())
    }

    async fn add_category(&self, document: DocumentId, category: NodeId) -> Result<(), RepositoryError> {
        let exists = sqlx::query("SELECT 1 FROM documents WHERE id = $1")
            .bind(document.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound(format!("document {}", document)));
        }

        sqlx::query("INSERT INTO document_categories (document_id, category_id) VALUES ($1, $2)")
            .bind(document.as_uuid())
            .bind(category.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn categories_of(&self, document: DocumentId) -> Result<Vec<NodeId>, RepositoryError> {
        let rows = sqlx::query("SELECT category_id FROM document_categories WHERE document_id = $1 ORDER BY category_id")
            .bind(document.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| Ok(NodeId::from_uuid(row.try_get("category_id")?)))
            .collect()
    }
}

#[async_trait]
impl CheckoutRepository for PostgresDocumentRepository {
    async fn acquire(&self, checkout: &Checkout) -> Result<(), RepositoryError> {
        let exists = sqlx::query("SELECT 1 FROM documents WHERE id = $1")
            .bind(checkout.document_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound(format!("document {}", checkout.document_id)));
        }

        // uq_checkout_document decides concurrent acquirers.
        sqlx::query(
            r#"
            INSERT INTO checkouts (id, document_id, holder_id, reason, acquired_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(checkout.id.as_uuid())
        .bind(checkout.document_id.as_uuid())
        .bind(checkout.holder.as_uuid())
        .bind(&checkout.reason)
        .bind(checkout.acquired_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_document(&self, document: DocumentId) -> Result<Option<Checkout>, RepositoryError> {
        let row = sqlx::query("SELECT id, document_id, holder_id, reason, acquired_at FROM checkouts WHERE document_id = $1")
            .bind(document.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_checkout_row).transpose()
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<Checkout>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, holder_id, reason, acquired_at
            FROM checkouts
            ORDER BY acquired_at, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_checkout_row).collect()
    }

    async fn release(&self, document: DocumentId, holder: Option<PersonId>) -> Result<Checkout, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, document_id, holder_id, reason, acquired_at FROM checkouts WHERE document_id = $1 FOR UPDATE",
        )
        .bind(document.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("checkout for document {}", document)))?;
        let current = parse_checkout_row(&row)?;

        if let Some(holder) = holder {
            if current.holder != holder {
                return Err(RepositoryError::Conflict(format!(
                    "document {} is checked out by another person",
                    document
                )));
            }
        }

        sqlx::query("DELETE FROM checkouts WHERE id = $1")
            .bind(current.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(current)
    }

    async fn commit_checkin(&self, commit: &CheckinCommit) -> Result<Version, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Lock order: checkout, then document.
        let holder: Option<Uuid> = sqlx::query("SELECT holder_id FROM checkouts WHERE document_id = $1 FOR UPDATE")
            .bind(commit.document_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.try_get("holder_id"))
            .transpose()?;
        match holder {
            None => {
                return Err(RepositoryError::Conflict(format!(
                    "document {} is not checked out",
                    commit.document_id
                )))
            }
            Some(h) if h != commit.holder.as_uuid() => {
                return Err(RepositoryError::Conflict(format!(
                    "document {} is checked out by another person",
                    commit.document_id
                )))
            }
            Some(_) => {}
        }

        let sql = format!("SELECT {} FROM documents WHERE id = $1 FOR UPDATE", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(commit.document_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("document {}", commit.document_id)))?;
        let mut document = parse_document_row(&row)?;

        let version = document.stage_version(
            commit.version_id,
            commit.content.clone(),
            commit.change_summary.clone(),
            commit.holder,
            commit.committed_at,
        );
        insert_version(&mut *tx, &version).await?;
        document.adopt(&version);

        sqlx::query(
            r#"
            UPDATE documents
            SET current_version_id = $2, version_number = $3, content_locator = $4,
                checksum_sha256 = $5, size_bytes = $6, media_type = $7, file_name = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(document.id.as_uuid())
        .bind(document.current_version_id.as_uuid())
        .bind(document.version_number as i32)
        .bind(&document.content.locator)
        .bind(&document.content.checksum_sha256)
        .bind(document.content.size_bytes as i64)
        .bind(&document.content.media_type)
        .bind(&document.content.file_name)
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM checkouts WHERE document_id = $1")
            .bind(commit.document_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(version)
    }
}
