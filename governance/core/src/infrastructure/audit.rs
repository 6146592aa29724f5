// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Sinks
//!
//! Implementations of [`AuditSink`]:
//!
//! - [`TracingAuditSink`] writes each entry as a structured event on the
//!   `audit` tracing target, so any subscriber (stdout JSON, Loki) captures it.
//! - [`InMemoryAuditSink`] keeps entries for inspection in tests.
//! - [`PostgresAuditSink`] appends to the `audit_log` table.
//!
//! Callers never propagate a sink failure into the governance operation that
//! produced the entry; see `application::record_audit`.

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::domain::events::{AuditAction, AuditEntry, AuditError, AuditSink};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        info!(
            target: "audit",
            audit_id = %entry.id(),
            actor = %entry.actor(),
            administrator = entry.by_administrator(),
            action = entry.action().as_str(),
            subject_kind = entry.subject().kind(),
            subject_id = %entry.subject().id(),
            detail = %entry.detail(),
            "governance audit"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn entries_for(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.entries.lock().iter().filter(|e| e.action() == action).cloned().collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, actor_id, administrator, action, subject_kind, subject_id, detail, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id().as_uuid())
        .bind(entry.actor().as_uuid())
        .bind(entry.by_administrator())
        .bind(entry.action().as_str())
        .bind(entry.subject().kind())
        .bind(entry.subject().id())
        .bind(entry.detail())
        .bind(entry.recorded_at())
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Write(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::Actor;
    use crate::domain::events::AuditSubject;
    use crate::domain::ids::{DocumentId, PersonId};

    #[tokio::test]
    async fn test_in_memory_sink_filters_by_action() {
        let sink = InMemoryAuditSink::new();
        let actor = Actor::new(PersonId::new(), []);
        let doc = AuditSubject::Document(DocumentId::new());

        sink.record(AuditEntry::new(&actor, doc, AuditAction::DocumentCheckedOut)).await.unwrap();
        sink.record(AuditEntry::new(&actor, doc, AuditAction::DocumentCheckedIn)).await.unwrap();

        assert_eq!(sink.entries().len(), 2);
        let checkins = sink.entries_for(AuditAction::DocumentCheckedIn);
        assert_eq!(checkins.len(), 1);
        assert_eq!(checkins[0].actor(), actor.id());
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let actor = Actor::system();
        let entry = AuditEntry::new(&actor, AuditSubject::Document(DocumentId::new()), AuditAction::DocumentDisposed);
        assert!(TracingAuditSink.record(entry).await.is_ok());
    }
}
