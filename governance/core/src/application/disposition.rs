// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Retention & Disposition Engine
//!
//! Retention policies are attached to documents as [`DocumentRetention`]
//! records. The sweep walks expired open records in `(expires_at, id)` order
//! one bounded page at a time. Each page first has its expired `pending`
//! records marked `eligible` (announced as `RetentionExpired`), then is
//! settled in a single repository transaction. Inside that transaction
//! every record is re-read under lock, so a legal hold placed after the page
//! was fetched still wins: the record turns `held` and the document is left
//! alone.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::settings_cache::CachedSettings;
use crate::application::{record_audit, surface, AuthorizationResolver};
use crate::domain::acl::{Permission, ResourceRef};
use crate::domain::actor::Actor;
use crate::domain::error::GovernanceError;
use crate::domain::events::{AuditAction, AuditEntry, AuditSink, AuditSubject, GovernanceEvent, NotificationSink};
use crate::domain::hierarchy::{MaterializedPath, NodeKind};
use crate::domain::ids::{DocumentId, LegalHoldId, RetentionId, RetentionPolicyId};
use crate::domain::repository::{
    DocumentRepository, LegalHoldRepository, NodeRepository, RepositoryError, RetentionRepository,
};
use crate::domain::retention::{
    DispositionAction, DispositionOutcome, DispositionStatus, DocumentRetention, HeldDocument, LegalHold,
    NewRetentionPolicy, RetentionPolicy, Settlement, SweepCursor,
};

/// Totals for one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub batches: u32,
    pub examined: usize,
    /// Records that turned `eligible` during this pass.
    pub expired: usize,
    pub archived: usize,
    pub destroyed: usize,
    pub retained: usize,
    pub held: usize,
    pub skipped: usize,
}

impl SweepReport {
    pub fn completed(&self) -> usize {
        self.archived + self.destroyed + self.retained
    }

    fn tally(&mut self, settlement: &Settlement) {
        self.examined += 1;
        match settlement.outcome {
            DispositionOutcome::Completed { action } => match action {
                DispositionAction::Archive => self.archived += 1,
                DispositionAction::Destroy => self.destroyed += 1,
                DispositionAction::Retain => self.retained += 1,
            },
            DispositionOutcome::Held => self.held += 1,
            DispositionOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

pub struct DispositionService {
    retention: Arc<dyn RetentionRepository>,
    holds: Arc<dyn LegalHoldRepository>,
    documents: Arc<dyn DocumentRepository>,
    nodes: Arc<dyn NodeRepository>,
    resolver: Arc<AuthorizationResolver>,
    settings: Arc<CachedSettings>,
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
}

impl DispositionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        retention: Arc<dyn RetentionRepository>,
        holds: Arc<dyn LegalHoldRepository>,
        documents: Arc<dyn DocumentRepository>,
        nodes: Arc<dyn NodeRepository>,
        resolver: Arc<AuthorizationResolver>,
        settings: Arc<CachedSettings>,
        notifications: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            retention,
            holds,
            documents,
            nodes,
            resolver,
            settings,
            notifications,
            audit,
        }
    }

    // ---- policies ----

    pub async fn create_policy(
        &self,
        actor: &Actor,
        request: NewRetentionPolicy,
    ) -> Result<RetentionPolicy, GovernanceError> {
        require_admin(actor, "creating retention policies")?;
        if let Some(category) = request.category_id {
            let node = self
                .nodes
                .find_by_id(category)
                .await?
                .filter(|n| n.is_active)
                .ok_or_else(|| GovernanceError::NotFound(format!("category {}", category)))?;
            if node.kind != NodeKind::Category {
                return Err(GovernanceError::Validation(format!("node {} is not a category", category)));
            }
        }

        let policy = RetentionPolicy::new(request)?;
        self.retention.save_policy(&policy).await?;
        info!(
            policy_id = %policy.id,
            name = %policy.name,
            retention_days = policy.retention_days,
            action = policy.action.as_str(),
            "Retention policy created"
        );
        Ok(policy)
    }

    pub async fn list_policies(&self) -> Result<Vec<RetentionPolicy>, GovernanceError> {
        Ok(self.retention.list_policies().await?)
    }

    /// Attach one policy to a document. The retention clock starts at
    /// `start`, or now when omitted.
    pub async fn apply_policy(
        &self,
        actor: &Actor,
        document_id: DocumentId,
        policy_id: RetentionPolicyId,
        start: Option<DateTime<Utc>>,
    ) -> Result<DocumentRetention, GovernanceError> {
        self.resolver
            .require(actor, ResourceRef::Document(document_id), Permission::Manage)
            .await?;
        let policy = self
            .retention
            .find_policy(policy_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| GovernanceError::NotFound(format!("retention policy {}", policy_id)))?;

        let record = DocumentRetention::apply(&policy, document_id, start.unwrap_or_else(Utc::now));
        let stored = self.retention.insert_retention(&record).await?;
        self.after_apply(actor, &policy, &stored).await;
        Ok(stored)
    }

    /// Attach every active policy whose scope covers the document. Policies
    /// already applied are left as they are.
    pub async fn apply_matching_policies(
        &self,
        actor: &Actor,
        document_id: DocumentId,
    ) -> Result<Vec<DocumentRetention>, GovernanceError> {
        self.resolver
            .require(actor, ResourceRef::Document(document_id), Permission::Manage)
            .await?;
        let document = self
            .documents
            .find_by_id(document_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("document {}", document_id)))?;

        let category_ids = self.documents.categories_of(document_id).await?;
        let category_paths: Vec<MaterializedPath> = self
            .nodes
            .find_many(&category_ids)
            .await?
            .into_iter()
            .filter(|n| n.is_active)
            .map(|n| n.path)
            .collect();

        let now = Utc::now();
        let mut applied = Vec::new();
        for policy in self.retention.list_policies().await? {
            if !policy.matches(document.content_type.as_deref(), &category_paths) {
                continue;
            }
            let record = DocumentRetention::apply(&policy, document_id, now);
            match self.retention.insert_retention(&record).await {
                Ok(stored) => {
                    self.after_apply(actor, &policy, &stored).await;
                    applied.push(stored);
                }
                Err(RepositoryError::Conflict(_)) => {
                    debug!(document_id = %document_id, policy_id = %policy.id, "Policy already applied");
                }
                Err(e) => return Err(surface(e)),
            }
        }
        Ok(applied)
    }

    pub async fn retentions_for_document(
        &self,
        actor: &Actor,
        document_id: DocumentId,
    ) -> Result<Vec<DocumentRetention>, GovernanceError> {
        self.resolver
            .require(actor, ResourceRef::Document(document_id), Permission::Read)
            .await?;
        Ok(self.retention.find_retentions_for_document(document_id).await?)
    }

    // ---- disposition ----

    /// Expired records free of any hold, oldest first. Pending records among
    /// them are marked `eligible` on the way.
    pub async fn find_eligible(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<DocumentRetention>, GovernanceError> {
        let page = self.retention.find_sweep_candidates(now, None, limit).await?;
        let ids: Vec<RetentionId> = page.iter().map(|r| r.id).collect();
        let marked = self.mark_expired(&ids, now).await?;

        Ok(page
            .into_iter()
            .map(|mut record| {
                if marked.contains(&record.id) {
                    record.status = DispositionStatus::Eligible;
                }
                record
            })
            .filter(|record| record.status == DispositionStatus::Eligible)
            .collect())
    }

    /// Settle one record now. A document under hold is reported as `Held`,
    /// not as an error.
    pub async fn dispose(&self, actor: &Actor, retention_id: RetentionId) -> Result<Settlement, GovernanceError> {
        let record = self
            .retention
            .find_retention(retention_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("retention record {}", retention_id)))?;
        self.resolver
            .require(actor, ResourceRef::Document(record.document_id), Permission::Manage)
            .await?;

        let now = Utc::now();
        if record.status == DispositionStatus::Completed {
            return Err(GovernanceError::Conflict(format!(
                "retention record {} is already completed",
                retention_id
            )));
        }
        if !record.has_expired(now) {
            return Err(GovernanceError::Validation(format!(
                "retention record {} expires at {}",
                retention_id, record.expires_at
            )));
        }

        let settlement = self
            .retention
            .settle_batch(&[retention_id], actor.id(), now)
            .await
            .map_err(surface)?
            .into_iter()
            .next()
            .ok_or_else(|| GovernanceError::NotFound(format!("retention record {}", retention_id)))?;
        self.publish(actor, &settlement, now).await;
        Ok(settlement)
    }

    /// One full pass over expired open records, committed per batch.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, GovernanceError> {
        let system = Actor::system();
        let batch_size = self.settings.get().await?.disposition_batch_size.max(1);

        let mut report = SweepReport::default();
        let mut cursor: Option<SweepCursor> = None;
        loop {
            let page = self.retention.find_sweep_candidates(now, cursor, batch_size).await?;
            let Some(last) = page.last() else { break };
            cursor = Some(SweepCursor::from(last));

            let ids: Vec<RetentionId> = page.iter().map(|r| r.id).collect();
            report.expired += self.mark_expired(&ids, now).await?.len();
            let settlements = self
                .retention
                .settle_batch(&ids, system.id(), now)
                .await
                .map_err(surface)?;
            report.batches += 1;
            for settlement in &settlements {
                report.tally(settlement);
                self.publish(&system, settlement, now).await;
            }
            debug!(batch = report.batches, size = ids.len(), "Disposition batch committed");

            if page.len() < batch_size as usize {
                break;
            }
        }

        if report.examined > 0 {
            info!(
                batches = report.batches,
                expired = report.expired,
                archived = report.archived,
                destroyed = report.destroyed,
                retained = report.retained,
                held = report.held,
                skipped = report.skipped,
                "Disposition sweep finished"
            );
        }
        Ok(report)
    }

    // ---- legal holds ----

    pub async fn create_hold(
        &self,
        actor: &Actor,
        name: &str,
        description: Option<String>,
        reference_number: Option<String>,
    ) -> Result<LegalHold, GovernanceError> {
        require_admin(actor, "managing legal holds")?;
        let hold = LegalHold::new(name, description, reference_number, actor.id())?;
        self.holds.save_hold(&hold).await?;

        info!(hold_id = %hold.id, name = %hold.name, "Legal hold created");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::LegalHold(hold.id), AuditAction::LegalHoldCreated)
                .with_detail(json!({ "name": hold.name, "reference_number": hold.reference_number })),
        )
        .await;
        Ok(hold)
    }

    /// Attach a document to a hold. Returns how many retention records
    /// became `held`.
    pub async fn place_hold(
        &self,
        actor: &Actor,
        hold_id: LegalHoldId,
        document_id: DocumentId,
    ) -> Result<u64, GovernanceError> {
        require_admin(actor, "managing legal holds")?;
        let held = HeldDocument {
            hold_id,
            document_id,
            added_by: actor.id(),
            added_at: Utc::now(),
        };
        let affected = self.holds.place(&held).await?;

        info!(hold_id = %hold_id, document_id = %document_id, records_held = affected, "Document placed on hold");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::LegalHold(hold_id), AuditAction::LegalHoldPlaced)
                .with_detail(json!({ "document_id": document_id, "records_held": affected })),
        )
        .await;
        Ok(affected)
    }

    /// Detach a document from a hold. Returns how many retention records
    /// went back to `pending`.
    pub async fn remove_hold(
        &self,
        actor: &Actor,
        hold_id: LegalHoldId,
        document_id: DocumentId,
    ) -> Result<u64, GovernanceError> {
        require_admin(actor, "managing legal holds")?;
        let restored = self.holds.remove(hold_id, document_id).await?;

        info!(hold_id = %hold_id, document_id = %document_id, records_restored = restored, "Document removed from hold");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::LegalHold(hold_id), AuditAction::LegalHoldRemoved)
                .with_detail(json!({ "document_id": document_id, "records_restored": restored })),
        )
        .await;
        Ok(restored)
    }

    pub async fn release_hold(&self, actor: &Actor, hold_id: LegalHoldId) -> Result<u64, GovernanceError> {
        require_admin(actor, "managing legal holds")?;
        let restored = self.holds.release(hold_id, Utc::now()).await?;

        warn!(hold_id = %hold_id, records_restored = restored, "Legal hold released");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::LegalHold(hold_id), AuditAction::LegalHoldReleased)
                .with_detail(json!({ "records_restored": restored })),
        )
        .await;
        Ok(restored)
    }

    pub async fn active_holds(&self, actor: &Actor) -> Result<Vec<LegalHold>, GovernanceError> {
        require_admin(actor, "listing legal holds")?;
        Ok(self.holds.list_active_holds().await?)
    }

    pub async fn holds_for_document(&self, actor: &Actor, document_id: DocumentId) -> Result<Vec<LegalHold>, GovernanceError> {
        require_admin(actor, "listing legal holds")?;
        Ok(self.holds.holds_for_document(document_id).await?)
    }

    pub async fn documents_on_hold(&self, actor: &Actor, hold_id: LegalHoldId) -> Result<Vec<HeldDocument>, GovernanceError> {
        require_admin(actor, "listing legal holds")?;
        Ok(self.holds.documents_on_hold(hold_id).await?)
    }

    /// Flag expired pending records as `eligible` and announce each one.
    /// Returns the ids that changed.
    async fn mark_expired(&self, ids: &[RetentionId], now: DateTime<Utc>) -> Result<HashSet<RetentionId>, GovernanceError> {
        let marked = self.retention.mark_eligible(ids, now).await.map_err(surface)?;
        for record in &marked {
            counter!("governance_retentions_expired_total").increment(1);
            debug!(retention_id = %record.id, document_id = %record.document_id, "Retention expired");
            self.notifications.notify(GovernanceEvent::RetentionExpired {
                retention_id: record.id,
                document_id: record.document_id,
                expires_at: record.expires_at,
                detected_at: now,
            });
        }
        Ok(marked.into_iter().map(|r| r.id).collect())
    }

    async fn after_apply(&self, actor: &Actor, policy: &RetentionPolicy, record: &DocumentRetention) {
        info!(
            retention_id = %record.id,
            document_id = %record.document_id,
            policy = %policy.name,
            expires_at = %record.expires_at,
            status = record.status.as_str(),
            "Retention policy applied"
        );
        if record.status == DispositionStatus::Held {
            self.notifications.notify(GovernanceEvent::RetentionHeld {
                retention_id: record.id,
                document_id: record.document_id,
                held_at: record.created_at,
            });
        }
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::Retention(record.id), AuditAction::RetentionApplied).with_detail(
                json!({ "document_id": record.document_id, "policy_id": policy.id, "expires_at": record.expires_at }),
            ),
        )
        .await;
    }

    async fn publish(&self, actor: &Actor, settlement: &Settlement, now: DateTime<Utc>) {
        let Some(document_id) = settlement.document_id else {
            debug!(retention_id = %settlement.retention_id, "Retention record vanished before settlement");
            return;
        };
        match settlement.outcome {
            DispositionOutcome::Completed { action } => {
                counter!("governance_dispositions_total", "outcome" => action.as_str()).increment(1);
                info!(
                    retention_id = %settlement.retention_id,
                    document_id = %document_id,
                    action = action.as_str(),
                    "Document disposed"
                );
                self.notifications.notify(GovernanceEvent::DocumentDisposed {
                    retention_id: settlement.retention_id,
                    document_id,
                    action,
                    disposed_at: now,
                });
                record_audit(
                    self.audit.as_ref(),
                    AuditEntry::new(actor, AuditSubject::Document(document_id), AuditAction::DocumentDisposed)
                        .with_detail(json!({ "retention_id": settlement.retention_id, "action": action })),
                )
                .await;
            }
            DispositionOutcome::Held => {
                counter!("governance_dispositions_total", "outcome" => "held").increment(1);
                info!(retention_id = %settlement.retention_id, document_id = %document_id, "Disposition blocked by legal hold");
                self.notifications.notify(GovernanceEvent::RetentionHeld {
                    retention_id: settlement.retention_id,
                    document_id,
                    held_at: now,
                });
                record_audit(
                    self.audit.as_ref(),
                    AuditEntry::new(actor, AuditSubject::Document(document_id), AuditAction::DispositionHeld)
                        .with_detail(json!({ "retention_id": settlement.retention_id })),
                )
                .await;
            }
            DispositionOutcome::Skipped { reason } => {
                debug!(retention_id = %settlement.retention_id, ?reason, "Retention record skipped");
            }
        }
    }
}

fn require_admin(actor: &Actor, what: &str) -> Result<(), GovernanceError> {
    if actor.is_administrator() {
        Ok(())
    } else {
        Err(GovernanceError::Forbidden(format!("{} is administrator-only", what)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::acl::AclEntry;
    use crate::domain::document::{Classification, ContentAttributes, Document, DocumentStatus, NewDocument};
    use crate::domain::events::NoopNotifications;
    use crate::domain::ids::PersonId;
    use crate::domain::settings::{GovernanceSettings, StaticSettingsSource};
    use crate::infrastructure::audit::InMemoryAuditSink;
    use crate::infrastructure::repositories::InMemoryGovernanceStore;
    use std::time::Duration;

    fn service(store: &InMemoryGovernanceStore, batch: u32) -> DispositionService {
        let settings = GovernanceSettings {
            disposition_batch_size: batch,
            ..GovernanceSettings::default()
        };
        DispositionService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(AuthorizationResolver::new(
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store.clone()),
            )),
            Arc::new(CachedSettings::new(
                Arc::new(StaticSettingsSource::new(settings)),
                Duration::from_secs(60),
            )),
            Arc::new(NoopNotifications),
            Arc::new(InMemoryAuditSink::new()),
        )
    }

    async fn document(store: &InMemoryGovernanceStore) -> DocumentId {
        let owner = PersonId::new();
        let content = ContentAttributes::new("blob://r", "c".repeat(64), 9, "application/pdf", "r.pdf").unwrap();
        let (doc, v1) = Document::create(
            NewDocument {
                title: "Record".to_string(),
                description: None,
                folder_id: None,
                content_type: Some("invoice".to_string()),
                classification: Classification::Internal,
                content,
            },
            owner,
        )
        .unwrap();
        DocumentRepository::create(store, &doc, &v1, &AclEntry::owner_of(doc.id, owner))
            .await
            .unwrap();
        doc.id
    }

    async fn policy(svc: &DispositionService, name: &str, days: u32, action: DispositionAction) -> RetentionPolicy {
        svc.create_policy(
            &Actor::system(),
            NewRetentionPolicy {
                name: name.to_string(),
                description: None,
                retention_days: days,
                action,
                content_type: None,
                category_id: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_pages_through_every_batch() {
        let store = InMemoryGovernanceStore::new();
        let svc = service(&store, 2);
        let admin = Actor::system();
        let archive = policy(&svc, "archive-now", 0, DispositionAction::Archive).await;

        let mut docs = Vec::new();
        for _ in 0..5 {
            let id = document(&store).await;
            svc.apply_policy(&admin, id, archive.id, None).await.unwrap();
            docs.push(id);
        }

        let report = svc.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.expired, 5);
        assert_eq!(report.archived, 5);
        assert_eq!(report.batches, 3);
        for id in docs {
            let doc = DocumentRepository::find_by_id(&store, id).await.unwrap().unwrap();
            assert_eq!(doc.status, DocumentStatus::Archived);
        }

        let again = svc.sweep(Utc::now()).await.unwrap();
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn test_hold_blocks_manual_dispose_until_removed() {
        let store = InMemoryGovernanceStore::new();
        let svc = service(&store, 10);
        let admin = Actor::system();
        let destroy = policy(&svc, "destroy-now", 0, DispositionAction::Destroy).await;
        let doc = document(&store).await;
        let record = svc.apply_policy(&admin, doc, destroy.id, None).await.unwrap();

        let hold = svc.create_hold(&admin, "litigation", None, Some("LIT-7".to_string())).await.unwrap();
        assert_eq!(svc.place_hold(&admin, hold.id, doc).await.unwrap(), 1);

        let settlement = svc.dispose(&admin, record.id).await.unwrap();
        assert_eq!(settlement.outcome, DispositionOutcome::Held);
        assert!(svc.find_eligible(Utc::now(), 10).await.unwrap().is_empty());

        assert_eq!(svc.remove_hold(&admin, hold.id, doc).await.unwrap(), 1);
        assert_eq!(svc.find_eligible(Utc::now(), 10).await.unwrap().len(), 1);

        let settlement = svc.dispose(&admin, record.id).await.unwrap();
        assert_eq!(
            settlement.outcome,
            DispositionOutcome::Completed { action: DispositionAction::Destroy }
        );
        let err = svc.dispose(&admin, record.id).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Conflict(_) | GovernanceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unexpired_record_is_not_disposable() {
        let store = InMemoryGovernanceStore::new();
        let svc = service(&store, 10);
        let admin = Actor::system();
        let keep = policy(&svc, "keep-a-year", 365, DispositionAction::Retain).await;
        let doc = document(&store).await;
        let record = svc.apply_policy(&admin, doc, keep.id, None).await.unwrap();

        let err = svc.dispose(&admin, record.id).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
        assert_eq!(svc.sweep(Utc::now()).await.unwrap().examined, 0);
    }

    #[tokio::test]
    async fn test_holds_are_admin_only() {
        let store = InMemoryGovernanceStore::new();
        let svc = service(&store, 10);
        let user = Actor::new(PersonId::new(), []);
        let err = svc.create_hold(&user, "audit", None, None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Forbidden(_)));
    }
}
