// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Retention & Legal Hold Domain Model
//!
//! A [`RetentionPolicy`] says how long a class of documents is kept and what
//! happens afterwards. Applying a policy to a document produces a
//! [`DocumentRetention`] record with a concrete expiry. A [`LegalHold`]
//! freezes every document attached to it; while any active hold covers a
//! document, none of its retention records may be disposed.
//!
//! Record lifecycle: `pending -> eligible -> completed`, with `held` entered
//! from `pending`/`eligible` when a hold is found and left (back to
//! `pending`) when the last hold is lifted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::GovernanceError;
use crate::domain::hierarchy::MaterializedPath;
use crate::domain::ids::{DocumentId, LegalHoldId, NodeId, PersonId, RetentionId, RetentionPolicyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionAction {
    /// Keep indefinitely; the record completes without touching the document.
    Retain,
    Archive,
    Destroy,
}

impl DispositionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispositionAction::Retain => "retain",
            DispositionAction::Archive => "archive",
            DispositionAction::Destroy => "destroy",
        }
    }
}

impl FromStr for DispositionAction {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retain" => Ok(DispositionAction::Retain),
            "archive" => Ok(DispositionAction::Archive),
            "destroy" => Ok(DispositionAction::Destroy),
            other => Err(GovernanceError::Validation(format!("unknown disposition action '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionStatus {
    Pending,
    Eligible,
    Held,
    Completed,
}

impl DispositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispositionStatus::Pending => "pending",
            DispositionStatus::Eligible => "eligible",
            DispositionStatus::Held => "held",
            DispositionStatus::Completed => "completed",
        }
    }

    /// Statuses the disposition sweep picks up.
    pub fn is_open(&self) -> bool {
        matches!(self, DispositionStatus::Pending | DispositionStatus::Eligible)
    }
}

impl FromStr for DispositionStatus {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DispositionStatus::Pending),
            "eligible" => Ok(DispositionStatus::Eligible),
            "held" => Ok(DispositionStatus::Held),
            "completed" => Ok(DispositionStatus::Completed),
            other => Err(GovernanceError::Validation(format!("unknown disposition status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub id: RetentionPolicyId,
    pub name: String,
    pub description: Option<String>,
    pub retention_days: u32,
    pub action: DispositionAction,
    /// Applies only to documents of this content type.
    pub content_type: Option<String>,
    /// Applies only to documents filed under this category or a descendant.
    pub category_id: Option<NodeId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRetentionPolicy {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub retention_days: u32,
    pub action: DispositionAction,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub category_id: Option<NodeId>,
}

impl RetentionPolicy {
    pub fn new(request: NewRetentionPolicy) -> Result<Self, GovernanceError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(GovernanceError::Validation("policy name cannot be empty".to_string()));
        }
        Ok(Self {
            id: RetentionPolicyId::new(),
            name,
            description: request.description,
            retention_days: request.retention_days,
            action: request.action,
            content_type: request.content_type,
            category_id: request.category_id,
            is_active: true,
            created_at: Utc::now(),
        })
    }

    pub fn expiry_from(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + Duration::days(i64::from(self.retention_days))
    }

    /// Whether the policy's scope covers a document with this content type
    /// filed under categories with these paths.
    pub fn matches(&self, content_type: Option<&str>, category_paths: &[MaterializedPath]) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(wanted) = &self.content_type {
            if content_type != Some(wanted.as_str()) {
                return false;
            }
        }
        match self.category_id {
            None => true,
            Some(category) => category_paths.iter().any(|path| path.contains(category)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRetention {
    pub id: RetentionId,
    pub document_id: DocumentId,
    pub policy_id: RetentionPolicyId,
    pub expires_at: DateTime<Utc>,
    pub status: DispositionStatus,
    pub disposed_at: Option<DateTime<Utc>>,
    pub disposed_by: Option<PersonId>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRetention {
    pub fn apply(policy: &RetentionPolicy, document_id: DocumentId, start: DateTime<Utc>) -> Self {
        Self {
            id: RetentionId::new(),
            document_id,
            policy_id: policy.id,
            expires_at: policy.expiry_from(start),
            status: DispositionStatus::Pending,
            disposed_at: None,
            disposed_by: None,
            created_at: Utc::now(),
        }
    }

    /// Eligible iff the expiry has passed and the record is still pending.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == DispositionStatus::Pending && now >= self.expires_at
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Keyset position in the disposition sweep, ordered by `(expires_at, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepCursor {
    pub expires_at: DateTime<Utc>,
    pub id: RetentionId,
}

impl From<&DocumentRetention> for SweepCursor {
    fn from(record: &DocumentRetention) -> Self {
        Self {
            expires_at: record.expires_at,
            id: record.id,
        }
    }
}

impl SweepCursor {
    /// Whether `record` sorts strictly after this cursor.
    pub fn precedes(&self, record: &DocumentRetention) -> bool {
        (record.expires_at, record.id) > (self.expires_at, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalHold {
    pub id: LegalHoldId,
    pub name: String,
    pub description: Option<String>,
    pub reference_number: Option<String>,
    pub created_by: PersonId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl LegalHold {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        reference_number: Option<String>,
        created_by: PersonId,
    ) -> Result<Self, GovernanceError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GovernanceError::Validation("legal hold name cannot be empty".to_string()));
        }
        Ok(Self {
            id: LegalHoldId::new(),
            name,
            description,
            reference_number,
            created_by,
            is_active: true,
            created_at: Utc::now(),
            released_at: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldDocument {
    pub hold_id: LegalHoldId,
    pub document_id: DocumentId,
    pub added_by: PersonId,
    pub added_at: DateTime<Utc>,
}

/// Why a settlement attempt left a record untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotExpired,
    AlreadySettled,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispositionOutcome {
    Completed { action: DispositionAction },
    Held,
    Skipped { reason: SkipReason },
}

/// Result of settling one record inside a disposition batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub retention_id: RetentionId,
    pub document_id: Option<DocumentId>,
    pub outcome: DispositionOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::{Node, NodeKind};

    fn policy(days: u32) -> RetentionPolicy {
        RetentionPolicy::new(NewRetentionPolicy {
            name: "contracts-7y".to_string(),
            description: None,
            retention_days: days,
            action: DispositionAction::Destroy,
            content_type: Some("contract".to_string()),
            category_id: None,
        })
        .unwrap()
    }

    #[test]
    fn test_eligibility_is_inclusive_at_expiry() {
        let start = Utc::now();
        let record = DocumentRetention::apply(&policy(30), DocumentId::new(), start);
        assert!(!record.is_eligible(start));
        assert!(record.is_eligible(record.expires_at));
        assert!(record.is_eligible(record.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_non_pending_is_never_eligible() {
        let start = Utc::now() - Duration::days(100);
        let mut record = DocumentRetention::apply(&policy(1), DocumentId::new(), start);
        record.status = DispositionStatus::Held;
        assert!(!record.is_eligible(Utc::now()));
        record.status = DispositionStatus::Completed;
        assert!(!record.is_eligible(Utc::now()));
    }

    #[test]
    fn test_zero_day_policy_expires_at_start() {
        let start = Utc::now();
        let record = DocumentRetention::apply(&policy(0), DocumentId::new(), start);
        assert_eq!(record.expires_at, start);
        assert!(record.is_eligible(start));
    }

    #[test]
    fn test_blank_policy_name_rejected() {
        assert!(RetentionPolicy::new(NewRetentionPolicy {
            name: "   ".to_string(),
            description: None,
            retention_days: 30,
            action: DispositionAction::Archive,
            content_type: None,
            category_id: None,
        })
        .is_err());
    }

    #[test]
    fn test_category_scope_matches_descendants() {
        let owner = PersonId::new();
        let finance = Node::new_root(NodeKind::Category, "Finance", owner).unwrap();
        let invoices = Node::new_child(&finance, "Invoices", owner).unwrap();
        let hr = Node::new_root(NodeKind::Category, "HR", owner).unwrap();

        let mut scoped = policy(10);
        scoped.category_id = Some(finance.id);

        assert!(scoped.matches(Some("contract"), &[invoices.path.clone()]));
        assert!(!scoped.matches(Some("contract"), &[hr.path.clone()]));
        assert!(!scoped.matches(Some("memo"), &[invoices.path]));
        assert!(!scoped.matches(Some("contract"), &[]));
    }

    #[test]
    fn test_cursor_orders_by_expiry_then_id() {
        let now = Utc::now();
        let a = DocumentRetention::apply(&policy(1), DocumentId::new(), now);
        let mut b = a.clone();
        b.id = RetentionId::new();
        let cursor = SweepCursor::from(&a);
        assert!(!cursor.precedes(&a));
        assert_eq!(cursor.precedes(&b), b.id > a.id);
    }
}
