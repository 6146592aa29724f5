// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Retention Repository
//!
//! Retention policies, per-document retention records and legal holds.
//!
//! Lock order is document rows first, then retention records. Placing a hold
//! and settling a disposition batch both follow it, so a hold placed while a
//! sweep runs either lands before the batch reads it or waits for the batch
//! to commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::ids::{DocumentId, LegalHoldId, NodeId, PersonId, RetentionId, RetentionPolicyId};
use crate::domain::repository::{LegalHoldRepository, RepositoryError, RetentionRepository};
use crate::domain::retention::{
    DispositionAction, DispositionOutcome, DispositionStatus, DocumentRetention, HeldDocument, LegalHold,
    RetentionPolicy, Settlement, SkipReason, SweepCursor,
};

const POLICY_COLUMNS: &str = "id, name, description, retention_days, action, content_type, category_id, is_active, created_at";
const RETENTION_COLUMNS: &str = "id, document_id, policy_id, expires_at, status, disposed_at, disposed_by, created_at";
const HOLD_COLUMNS: &str = "id, name, description, reference_number, created_by, is_active, created_at, released_at";

/// Records still `held` go back to `pending` once no active hold covers
/// their document.
const RESTORE_UNHELD: &str = r#"
    UPDATE document_retentions r
    SET status = 'pending'
    WHERE r.status = 'held'
      AND r.document_id = ANY($1)
      AND NOT EXISTS (
          SELECT 1
          FROM legal_hold_documents hd
          JOIN legal_holds h ON h.id = hd.hold_id
          WHERE hd.document_id = r.document_id AND h.is_active
      )
"#;

pub struct PostgresRetentionRepository {
    pool: PgPool,
}

impl PostgresRetentionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_policy_row(row: &PgRow) -> Result<RetentionPolicy, RepositoryError> {
    let days: i32 = row.try_get("retention_days")?;
    let action: String = row.try_get("action")?;
    Ok(RetentionPolicy {
        id: RetentionPolicyId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        retention_days: u32::try_from(days)
            .map_err(|_| RepositoryError::Integrity(format!("invalid retention period {}", days)))?,
        action: action.parse()?,
        content_type: row.try_get("content_type")?,
        category_id: row.try_get::<Option<Uuid>, _>("category_id")?.map(NodeId::from_uuid),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_retention_row(row: &PgRow) -> Result<DocumentRetention, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(DocumentRetention {
        id: RetentionId::from_uuid(row.try_get("id")?),
        document_id: DocumentId::from_uuid(row.try_get("document_id")?),
        policy_id: RetentionPolicyId::from_uuid(row.try_get("policy_id")?),
        expires_at: row.try_get("expires_at")?,
        status: status.parse()?,
        disposed_at: row.try_get("disposed_at")?,
        disposed_by: row.try_get::<Option<Uuid>, _>("disposed_by")?.map(PersonId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

fn parse_hold_row(row: &PgRow) -> Result<LegalHold, RepositoryError> {
    Ok(LegalHold {
        id: LegalHoldId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        reference_number: row.try_get("reference_number")?,
        created_by: PersonId::from_uuid(row.try_get("created_by")?),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        released_at: row.try_get("released_at")?,
    })
}

fn parse_held_row(row: &PgRow) -> Result<HeldDocument, RepositoryError> {
    Ok(HeldDocument {
        hold_id: LegalHoldId::from_uuid(row.try_get("hold_id")?),
        document_id: DocumentId::from_uuid(row.try_get("document_id")?),
        added_by: PersonId::from_uuid(row.try_get("added_by")?),
        added_at: row.try_get("added_at")?,
    })
}

/// Documents among `documents` covered by at least one active hold.
async fn held_among(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    documents: &[Uuid],
) -> Result<HashSet<Uuid>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT hd.document_id
        FROM legal_hold_documents hd
        JOIN legal_holds h ON h.id = hd.hold_id
        WHERE h.is_active AND hd.document_id = ANY($1)
        "#,
    )
    .bind(documents)
    .fetch_all(&mut **tx)
    .await?;
    rows.iter().map(|row| Ok(row.try_get("document_id")?)).collect()
}

enum PlannedSettlement {
    Skip(Option<DocumentId>, SkipReason),
    Hold(DocumentId),
    Dispose(DocumentId, DispositionAction),
}

#[async_trait]
impl RetentionRepository for PostgresRetentionRepository {
    async fn save_policy(&self, policy: &RetentionPolicy) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO retention_policies (
                id, name, description, retention_days, action, content_type, category_id, is_active, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                retention_days = EXCLUDED.retention_days,
                action = EXCLUDED.action,
                content_type = EXCLUDED.content_type,
                category_id = EXCLUDED.category_id,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(policy.id.as_uuid())
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(policy.retention_days as i32)
        .bind(policy.action.as_str())
        .bind(&policy.content_type)
        .bind(policy.category_id.map(|c| c.as_uuid()))
        .bind(policy.is_active)
        .bind(policy.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_policy(&self, id: RetentionPolicyId) -> Result<Option<RetentionPolicy>, RepositoryError> {
        let sql = format!("SELECT {} FROM retention_policies WHERE id = $1", POLICY_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_policy_row).transpose()
    }

    async fn list_policies(&self) -> Result<Vec<RetentionPolicy>, RepositoryError> {
        let sql = format!("SELECT {} FROM retention_policies ORDER BY name", POLICY_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(parse_policy_row).collect()
    }

    async fn insert_retention(&self, record: &DocumentRetention) -> Result<DocumentRetention, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let document = sqlx::query("SELECT id FROM documents WHERE id = $1 FOR SHARE")
            .bind(record.document_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        if document.is_none() {
            return Err(RepositoryError::NotFound(format!("document {}", record.document_id)));
        }

        let mut stored = record.clone();
        if stored.status.is_open() && !held_among(&mut tx, &[record.document_id.as_uuid()]).await?.is_empty() {
            stored.status = DispositionStatus::Held;
        }

        sqlx::query(
            r#"
            INSERT INTO document_retentions (
                id, document_id, policy_id, expires_at, status, disposed_at, disposed_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(stored.document_id.as_uuid())
        .bind(stored.policy_id.as_uuid())
        .bind(stored.expires_at)
        .bind(stored.status.as_str())
        .bind(stored.disposed_at)
        .bind(stored.disposed_by.map(|p| p.as_uuid()))
        .bind(stored.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn find_retention(&self, id: RetentionId) -> Result<Option<DocumentRetention>, RepositoryError> {
        let sql = format!("SELECT {} FROM document_retentions WHERE id = $1", RETENTION_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_retention_row).transpose()
    }

    async fn find_retentions_for_document(&self, document: DocumentId) -> Result<Vec<DocumentRetention>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM document_retentions WHERE document_id = $1 ORDER BY expires_at, id",
            RETENTION_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(document.as_uuid()).fetch_all(&self.pool).await?;
        rows.iter().map(parse_retention_row).collect()
    }

    async fn find_sweep_candidates(
        &self,
        now: DateTime<Utc>,
        after: Option<SweepCursor>,
        limit: u32,
    ) -> Result<Vec<DocumentRetention>, RepositoryError> {
        let rows = match after {
            Some(cursor) => {
                let sql = format!(
                    "SELECT {} FROM document_retentions \
                     WHERE status IN ('pending', 'eligible') AND expires_at <= $1 \
                       AND (expires_at, id) > ($2, $3) \
                     ORDER BY expires_at, id LIMIT $4",
                    RETENTION_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(now)
                    .bind(cursor.expires_at)
                    .bind(cursor.id.as_uuid())
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM document_retentions \
                     WHERE status IN ('pending', 'eligible') AND expires_at <= $1 \
                     ORDER BY expires_at, id LIMIT $2",
                    RETENTION_COLUMNS
                );
                sqlx::query(&sql).bind(now).bind(limit as i64).fetch_all(&self.pool).await?
            }
        };
        rows.iter().map(parse_retention_row).collect()
    }

    async fn mark_eligible(
        &self,
        ids: &[RetentionId],
        now: DateTime<Utc>,
    ) -> Result<Vec<DocumentRetention>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw_ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let sql = format!(
            r#"
            UPDATE document_retentions r
            SET status = 'eligible'
            WHERE r.id = ANY($1)
              AND r.status = 'pending'
              AND r.expires_at <= $2
              AND NOT EXISTS (
                  SELECT 1
                  FROM legal_hold_documents hd
                  JOIN legal_holds h ON h.id = hd.hold_id
                  WHERE hd.document_id = r.document_id AND h.is_active
              )
            RETURNING {}
            "#,
            RETENTION_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(&raw_ids).bind(now).fetch_all(&self.pool).await?;
        let mut marked: Vec<DocumentRetention> = rows.iter().map(parse_retention_row).collect::<Result<_, _>>()?;
        marked.sort_by_key(|r| (r.expires_at, r.id));
        Ok(marked)
    }

    async fn settle_batch(
        &self,
        ids: &[RetentionId],
        disposed_by: PersonId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Settlement>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw_ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let mut tx = self.pool.begin().await?;

        let owners = sqlx::query("SELECT DISTINCT document_id FROM document_retentions WHERE id = ANY($1)")
            .bind(&raw_ids)
            .fetch_all(&mut *tx)
            .await?;
        let mut documents: Vec<Uuid> = owners
            .iter()
            .map(|row| row.try_get("document_id"))
            .collect::<Result<_, _>>()?;
        documents.sort();

        let locked_documents = sqlx::query("SELECT id FROM documents WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&documents)
            .fetch_all(&mut *tx)
            .await?;
        let existing_documents: HashSet<Uuid> = locked_documents
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<_, _>>()?;

        let sql = format!(
            "SELECT {} FROM document_retentions WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            RETENTION_COLUMNS
        );
        let records: HashMap<RetentionId, DocumentRetention> = sqlx::query(&sql)
            .bind(&raw_ids)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| parse_retention_row(row).map(|r| (r.id, r)))
            .collect::<Result<_, _>>()?;

        let held = held_among(&mut tx, &documents).await?;

        let policy_ids: Vec<Uuid> = records.values().map(|r| r.policy_id.as_uuid()).collect();
        let policy_sql = format!("SELECT {} FROM retention_policies WHERE id = ANY($1)", POLICY_COLUMNS);
        let policies: HashMap<RetentionPolicyId, RetentionPolicy> = sqlx::query(&policy_sql)
            .bind(&policy_ids)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| parse_policy_row(row).map(|p| (p.id, p)))
            .collect::<Result<_, _>>()?;

        let mut plan = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(record) = records.get(id) else {
                plan.push((*id, PlannedSettlement::Skip(None, SkipReason::Missing)));
                continue;
            };
            let document = record.document_id;
            let step = if record.status == DispositionStatus::Completed {
                PlannedSettlement::Skip(Some(document), SkipReason::AlreadySettled)
            } else if !record.has_expired(now) {
                PlannedSettlement::Skip(Some(document), SkipReason::NotExpired)
            } else if held.contains(&document.as_uuid()) {
                PlannedSettlement::Hold(document)
            } else {
                let policy = policies.get(&record.policy_id).ok_or_else(|| {
                    RepositoryError::Integrity(format!(
                        "retention record {} references missing policy {}",
                        id, record.policy_id
                    ))
                })?;
                if !existing_documents.contains(&document.as_uuid()) {
                    return Err(RepositoryError::Integrity(format!(
                        "retention record {} references missing document {}",
                        id, document
                    )));
                }
                PlannedSettlement::Dispose(document, policy.action)
            };
            plan.push((*id, step));
        }

        let mut settlements = Vec::with_capacity(plan.len());
        for (id, step) in plan {
            let settlement = match step {
                PlannedSettlement::Skip(document_id, reason) => Settlement {
                    retention_id: id,
                    document_id,
                    outcome: DispositionOutcome::Skipped { reason },
                },
                PlannedSettlement::Hold(document_id) => {
                    sqlx::query("UPDATE document_retentions SET status = 'held' WHERE id = $1")
                        .bind(id.as_uuid())
                        .execute(&mut *tx)
                        .await?;
                    Settlement {
                        retention_id: id,
                        document_id: Some(document_id),
                        outcome: DispositionOutcome::Held,
                    }
                }
                PlannedSettlement::Dispose(document_id, action) => {
                    match action {
                        DispositionAction::Archive => {
                            sqlx::query("UPDATE documents SET status = 'archived', updated_at = $2 WHERE id = $1")
                                .bind(document_id.as_uuid())
                                .bind(now)
                                .execute(&mut *tx)
                                .await?;
                        }
                        DispositionAction::Destroy => {
                            sqlx::query(
                                "UPDATE documents SET status = 'deleted', is_active = FALSE, updated_at = $2 WHERE id = $1",
                            )
                            .bind(document_id.as_uuid())
                            .bind(now)
                            .execute(&mut *tx)
                            .await?;
                            sqlx::query("DELETE FROM checkouts WHERE document_id = $1")
                                .bind(document_id.as_uuid())
                                .execute(&mut *tx)
                                .await?;
                        }
                        DispositionAction::Retain => {}
                    }
                    sqlx::query(
                        "UPDATE document_retentions SET status = 'completed', disposed_at = $2, disposed_by = $3 WHERE id = $1",
                    )
                    .bind(id.as_uuid())
                    .bind(now)
                    .bind(disposed_by.as_uuid())
                    .execute(&mut *tx)
                    .await?;
                    Settlement {
                        retention_id: id,
                        document_id: Some(document_id),
                        outcome: DispositionOutcome::Completed { action },
                    }
                }
            };
            settlements.push(settlement);
        }

        tx.commit().await?;
        Ok(settlements)
    }
}

#[async_trait]
impl LegalHoldRepository for PostgresRetentionRepository {
    async fn save_hold(&self, hold: &LegalHold) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO legal_holds (id, name, description, reference_number, created_by, is_active, created_at, released_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(hold.id.as_uuid())
        .bind(&hold.name)
        .bind(&hold.description)
        .bind(&hold.reference_number)
        .bind(hold.created_by.as_uuid())
        .bind(hold.is_active)
        .bind(hold.created_at)
        .bind(hold.released_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_hold(&self, id: LegalHoldId) -> Result<Option<LegalHold>, RepositoryError> {
        let sql = format!("SELECT {} FROM legal_holds WHERE id = $1", HOLD_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_hold_row).transpose()
    }

    async fn list_active_holds(&self) -> Result<Vec<LegalHold>, RepositoryError> {
        let sql = format!("SELECT {} FROM legal_holds WHERE is_active ORDER BY created_at", HOLD_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(parse_hold_row).collect()
    }

    async fn place(&self, held: &HeldDocument) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let hold = sqlx::query("SELECT is_active FROM legal_holds WHERE id = $1 FOR SHARE")
            .bind(held.hold_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("legal hold {}", held.hold_id)))?;
        let active: bool = hold.try_get("is_active")?;
        if !active {
            return Err(RepositoryError::StaleState(format!("legal hold {} has been released", held.hold_id)));
        }

        let document = sqlx::query("SELECT id FROM documents WHERE id = $1 FOR UPDATE")
            .bind(held.document_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        if document.is_none() {
            return Err(RepositoryError::NotFound(format!("document {}", held.document_id)));
        }

        sqlx::query(
            "INSERT INTO legal_hold_documents (hold_id, document_id, added_by, added_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(held.hold_id.as_uuid())
        .bind(held.document_id.as_uuid())
        .bind(held.added_by.as_uuid())
        .bind(held.added_at)
        .execute(&mut *tx)
        .await?;

        let marked = sqlx::query(
            "UPDATE document_retentions SET status = 'held' WHERE document_id = $1 AND status IN ('pending', 'eligible')",
        )
        .bind(held.document_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(marked.rows_affected())
    }

    async fn remove(&self, hold: LegalHoldId, document: DocumentId) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM documents WHERE id = $1 FOR UPDATE")
            .bind(document.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        let removed = sqlx::query("DELETE FROM legal_hold_documents WHERE hold_id = $1 AND document_id = $2")
            .bind(hold.as_uuid())
            .bind(document.as_uuid())
            .execute(&mut *tx)
            .await?;
        if removed.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("document {} under hold {}", document, hold)));
        }

        let restored = sqlx::query(RESTORE_UNHELD)
            .bind(vec![document.as_uuid()])
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(restored.rows_affected())
    }

    async fn release(&self, hold: LegalHoldId, at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT is_active FROM legal_holds WHERE id = $1 FOR UPDATE")
            .bind(hold.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("legal hold {}", hold)))?;
        let active: bool = row.try_get("is_active")?;
        if !active {
            return Err(RepositoryError::StaleState(format!("legal hold {} has already been released", hold)));
        }

        let documents: Vec<Uuid> = sqlx::query(
            r#"
            SELECT d.id
            FROM documents d
            JOIN legal_hold_documents hd ON hd.document_id = d.id
            WHERE hd.hold_id = $1
            ORDER BY d.id
            FOR UPDATE OF d
            "#,
        )
        .bind(hold.as_uuid())
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| row.try_get("id"))
        .collect::<Result<_, _>>()?;

        sqlx::query("UPDATE legal_holds SET is_active = FALSE, released_at = $2 WHERE id = $1")
            .bind(hold.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await?;

        let restored = sqlx::query(RESTORE_UNHELD).bind(&documents).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(restored.rows_affected())
    }

    async fn holds_for_document(&self, document: DocumentId) -> Result<Vec<LegalHold>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT h.id, h.name, h.description, h.reference_number, h.created_by, h.is_active, h.created_at, h.released_at
            FROM legal_holds h
            JOIN legal_hold_documents hd ON hd.hold_id = h.id
            WHERE hd.document_id = $1 AND h.is_active
            ORDER BY h.created_at
            "#,
        )
        .bind(document.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_hold_row).collect()
    }

    async fn documents_on_hold(&self, hold: LegalHoldId) -> Result<Vec<HeldDocument>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT hold_id, document_id, added_by, added_at FROM legal_hold_documents WHERE hold_id = $1 ORDER BY document_id",
        )
        .bind(hold.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_held_row).collect()
    }
}
