// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Document, Version and Checkout
//!
//! A [`Document`] carries a denormalized copy of its current [`Version`]'s
//! content attributes plus a pointer to that version. The copy and the pointer
//! are only ever changed together, by [`Document::adopt`], and only inside the
//! same storage transaction that inserts the version.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Aggregate Root:** Document (owns Versions and at most one Checkout)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::GovernanceError;
use crate::domain::ids::{CheckoutId, DocumentId, NodeId, PersonId, VersionId};

pub const MAX_TITLE_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Active,
    Archived,
    Deleted,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Active => "active",
            DocumentStatus::Archived => "archived",
            DocumentStatus::Deleted => "deleted",
        }
    }

    /// Archived and deleted documents accept no new content.
    pub fn accepts_content(&self) -> bool {
        matches!(self, DocumentStatus::Draft | DocumentStatus::Active)
    }
}

impl FromStr for DocumentStatus {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DocumentStatus::Draft),
            "active" => Ok(DocumentStatus::Active),
            "archived" => Ok(DocumentStatus::Archived),
            "deleted" => Ok(DocumentStatus::Deleted),
            other => Err(GovernanceError::Validation(format!("unknown document status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Public => "public",
            Classification::Internal => "internal",
            Classification::Confidential => "confidential",
            Classification::Restricted => "restricted",
        }
    }
}

impl Default for Classification {
    fn default() -> Self {
        Classification::Internal
    }
}

impl FromStr for Classification {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Classification::Public),
            "internal" => Ok(Classification::Internal),
            "confidential" => Ok(Classification::Confidential),
            "restricted" => Ok(Classification::Restricted),
            other => Err(GovernanceError::Validation(format!("unknown classification '{}'", other))),
        }
    }
}

/// Attributes of a stored content blob. The bytes themselves live in an
/// external object store addressed by `locator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAttributes {
    pub locator: String,
    pub checksum_sha256: String,
    pub size_bytes: u64,
    pub media_type: String,
    pub file_name: String,
}

impl ContentAttributes {
    pub fn new(
        locator: impl Into<String>,
        checksum_sha256: impl Into<String>,
        size_bytes: u64,
        media_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Result<Self, GovernanceError> {
        let attrs = Self {
            locator: locator.into(),
            checksum_sha256: checksum_sha256.into().to_ascii_lowercase(),
            size_bytes,
            media_type: media_type.into(),
            file_name: file_name.into(),
        };
        attrs.validate()?;
        Ok(attrs)
    }

    pub fn validate(&self) -> Result<(), GovernanceError> {
        if self.locator.trim().is_empty() {
            return Err(GovernanceError::Validation("content locator cannot be empty".to_string()));
        }
        if self.checksum_sha256.len() != 64 || !self.checksum_sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GovernanceError::Validation(
                "checksum must be a 64 character hex sha256 digest".to_string(),
            ));
        }
        if !self.media_type.contains('/') {
            return Err(GovernanceError::Validation(format!("invalid media type '{}'", self.media_type)));
        }
        if self.file_name.trim().is_empty() {
            return Err(GovernanceError::Validation("file name cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub document_id: DocumentId,
    /// Starts at 1, gapless per document.
    pub version_number: u32,
    pub content: ContentAttributes,
    pub change_summary: Option<String>,
    pub created_by: PersonId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub description: Option<String>,
    pub folder_id: Option<NodeId>,
    pub content_type: Option<String>,
    pub classification: Classification,
    pub status: DocumentStatus,
    pub current_version_id: VersionId,
    pub version_number: u32,
    pub content: ContentAttributes,
    pub created_by: PersonId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a document together with its first version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub folder_id: Option<NodeId>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub classification: Classification,
    pub content: ContentAttributes,
}

impl Document {
    /// Build a draft document and its version 1.
    pub fn create(draft: NewDocument, created_by: PersonId) -> Result<(Document, Version), GovernanceError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(GovernanceError::Validation("document title cannot be empty".to_string()));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(GovernanceError::Validation(format!("title exceeds {} characters", MAX_TITLE_LEN)));
        }
        draft.content.validate()?;

        let now = Utc::now();
        let id = DocumentId::new();
        let first = Version {
            id: VersionId::new(),
            document_id: id,
            version_number: 1,
            content: draft.content.clone(),
            change_summary: Some("Initial version".to_string()),
            created_by,
            is_active: true,
            created_at: now,
        };
        let document = Document {
            id,
            title,
            description: draft.description,
            folder_id: draft.folder_id,
            content_type: draft.content_type,
            classification: draft.classification,
            status: DocumentStatus::Draft,
            current_version_id: first.id,
            version_number: 1,
            content: draft.content,
            created_by,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        Ok((document, first))
    }

    /// The version that would follow the current one.
    pub fn stage_version(
        &self,
        id: VersionId,
        content: ContentAttributes,
        change_summary: Option<String>,
        created_by: PersonId,
        at: DateTime<Utc>,
    ) -> Version {
        Version {
            id,
            document_id: self.id,
            version_number: self.version_number + 1,
            content,
            change_summary,
            created_by,
            is_active: true,
            created_at: at,
        }
    }

    /// Point the document at `version` and copy its content attributes.
    pub fn adopt(&mut self, version: &Version) {
        self.current_version_id = version.id;
        self.version_number = version.version_number;
        self.content = version.content.clone();
        self.updated_at = version.created_at;
    }

    pub fn is_consistent_with(&self, version: &Version) -> bool {
        self.current_version_id == version.id
            && self.version_number == version.version_number
            && self.content == version.content
    }

    /// Apply a disposition effect.
    pub fn archive(&mut self, at: DateTime<Utc>) {
        self.status = DocumentStatus::Archived;
        self.updated_at = at;
    }

    pub fn destroy(&mut self, at: DateTime<Utc>) {
        self.status = DocumentStatus::Deleted;
        self.is_active = false;
        self.updated_at = at;
    }
}

/// Exclusive edit lock. At most one exists per document; storage enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    pub id: CheckoutId,
    pub document_id: DocumentId,
    pub holder: PersonId,
    pub reason: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

impl Checkout {
    pub fn new(document_id: DocumentId, holder: PersonId, reason: Option<String>) -> Self {
        Self {
            id: CheckoutId::new(),
            document_id,
            holder,
            reason,
            acquired_at: Utc::now(),
        }
    }
}

/// Everything a check-in commits in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckinCommit {
    pub document_id: DocumentId,
    pub holder: PersonId,
    pub version_id: VersionId,
    pub content: ContentAttributes,
    pub change_summary: Option<String>,
    pub committed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(tag: &str) -> ContentAttributes {
        ContentAttributes::new(
            format!("s3://governance/{}", tag),
            "a".repeat(64),
            1024,
            "application/pdf",
            format!("{}.pdf", tag),
        )
        .unwrap()
    }

    fn draft(title: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            description: None,
            folder_id: None,
            content_type: Some("contract".to_string()),
            classification: Classification::Confidential,
            content: content("v1"),
        }
    }

    #[test]
    fn test_create_starts_at_version_one() {
        let (doc, v1) = Document::create(draft("MSA"), PersonId::new()).unwrap();
        assert_eq!(v1.version_number, 1);
        assert_eq!(doc.status, DocumentStatus::Draft);
        assert!(doc.is_consistent_with(&v1));
    }

    #[test]
    fn test_adopt_keeps_denormalized_copy_in_step() {
        let author = PersonId::new();
        let (mut doc, v1) = Document::create(draft("MSA"), author).unwrap();
        let v2 = doc.stage_version(VersionId::new(), content("v2"), None, author, Utc::now());
        assert_eq!(v2.version_number, 2);
        assert!(!doc.is_consistent_with(&v2));

        doc.adopt(&v2);
        assert!(doc.is_consistent_with(&v2));
        assert!(!doc.is_consistent_with(&v1));
        assert_eq!(doc.content.locator, "s3://governance/v2");
    }

    #[test]
    fn test_blank_title_rejected() {
        assert!(matches!(
            Document::create(draft("   "), PersonId::new()),
            Err(GovernanceError::Validation(_))
        ));
    }

    #[test]
    fn test_content_checksum_must_be_sha256_hex() {
        let err = ContentAttributes::new("s3://x", "abc", 1, "text/plain", "x.txt").unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(msg) if msg.contains("sha256")));
    }

    #[test]
    fn test_destroy_deactivates() {
        let (mut doc, _) = Document::create(draft("MSA"), PersonId::new()).unwrap();
        doc.destroy(Utc::now());
        assert_eq!(doc.status, DocumentStatus::Deleted);
        assert!(!doc.is_active);
        assert!(!doc.status.accepts_content());
    }
}
