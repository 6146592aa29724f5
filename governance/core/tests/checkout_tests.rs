// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use aegis_governance_core::application::CheckinRequest;
use aegis_governance_core::domain::acl::{Permission, Principal, ResourceRef};
use aegis_governance_core::domain::document::DocumentStatus;
use aegis_governance_core::domain::error::GovernanceError;
use aegis_governance_core::domain::events::AuditAction;
use aegis_governance_core::domain::repository::CheckoutRepository;
use common::{content, Harness};
use serde_json::json;

fn checkin(tag: char, summary: &str) -> CheckinRequest {
    CheckinRequest {
        content: content(tag),
        change_summary: Some(summary.to_string()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_admit_one_holder() {
    let h = Harness::new();
    let editors = h.role();
    let owner = h.person(&[editors]);
    let doc = h.document(&owner, None).await;
    h.grant(ResourceRef::Document(doc.id), Principal::Role(editors), Permission::Write)
        .await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let editor = h.person(&[editors]);
        let documents = h.core.documents.clone();
        handles.push(tokio::spawn(async move {
            documents.checkout(&editor, doc.id, None).await
        }));
    }

    let mut acquired = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => acquired += 1,
            Err(GovernanceError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(acquired, 1);
    assert_eq!(conflicts, 15);
}

#[tokio::test]
async fn test_checkin_by_non_holder_conflicts_and_holder_succeeds() {
    let h = Harness::new();
    let editors = h.role();
    let x = h.person(&[editors]);
    let y = h.person(&[editors]);
    let doc = h.document(&x, None).await;
    h.grant(ResourceRef::Document(doc.id), Principal::Role(editors), Permission::Write)
        .await;

    h.core.documents.checkout(&x, doc.id, Some("annual review".into())).await.unwrap();
    assert!(matches!(
        h.core.documents.checkout(&y, doc.id, None).await,
        Err(GovernanceError::Conflict(_))
    ));
    assert!(matches!(
        h.core.documents.checkin(&y, doc.id, checkin('a', "not mine")).await,
        Err(GovernanceError::Conflict(_))
    ));

    let version = h.core.documents.checkin(&x, doc.id, checkin('b', "revised")).await.unwrap();
    assert_eq!(version.version_number, 2);
    assert_eq!(version.content.checksum_sha256, "b".repeat(64));

    let stored = h.core.documents.get(&x, doc.id).await.unwrap();
    assert_eq!(stored.current_version_id, version.id);
    assert_eq!(stored.version_number, 2);
    assert!(h.core.documents.get_checkout(&x, doc.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_version_numbers_stay_gapless() {
    let h = Harness::new();
    let owner = h.person(&[]);
    let doc = h.document(&owner, None).await;

    for (i, tag) in ['1', '2', '3', '4'].into_iter().enumerate() {
        h.core.documents.checkout(&owner, doc.id, None).await.unwrap();
        let version = h
            .core
            .documents
            .checkin(&owner, doc.id, checkin(tag, &format!("edit {}", i)))
            .await
            .unwrap();
        assert_eq!(version.version_number, i as u32 + 2);
    }

    let numbers: Vec<u32> = h
        .core
        .documents
        .versions(&owner, doc.id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version_number)
        .collect();
    let mut sorted = numbers.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_editors_produce_gapless_versions() {
    const EDITORS: u32 = 8;
    let h = Harness::new();
    let editors = h.role();
    let owner = h.person(&[]);
    let doc = h.document(&owner, None).await;
    h.grant(ResourceRef::Document(doc.id), Principal::Role(editors), Permission::Write)
        .await;

    let mut handles = Vec::new();
    for i in 0..EDITORS {
        let editor = h.person(&[editors]);
        let documents = h.core.documents.clone();
        handles.push(tokio::spawn(async move {
            loop {
                match documents.checkout(&editor, doc.id, None).await {
                    Ok(_) => break,
                    Err(GovernanceError::Conflict(_)) => tokio::task::yield_now().await,
                    Err(other) => return Err(other),
                }
            }
            let tag = char::from_digit(i, 10).unwrap_or('x');
            documents
                .checkin(&editor, doc.id, checkin(tag, &format!("editor {}", i)))
                .await
                .map(|v| v.version_number)
        }));
    }

    let mut committed = Vec::new();
    for handle in handles {
        committed.push(handle.await.unwrap().unwrap());
    }
    committed.sort_unstable();
    assert_eq!(committed, (2..=EDITORS + 1).collect::<Vec<_>>());

    let numbers: Vec<u32> = h
        .core
        .documents
        .versions(&owner, doc.id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version_number)
        .collect();
    assert_eq!(numbers, (1..=EDITORS + 1).collect::<Vec<_>>());
    assert_eq!(h.core.documents.get(&owner, doc.id).await.unwrap().version_number, EDITORS + 1);
}

#[tokio::test]
async fn test_checkin_without_checkout_conflicts() {
    let h = Harness::new();
    let owner = h.person(&[]);
    let doc = h.document(&owner, None).await;

    let err = h
        .core
        .documents
        .checkin(&owner, doc.id, checkin('c', "no lock"))
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Conflict(_)));
    assert_eq!(h.core.documents.versions(&owner, doc.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_releases_without_a_version() {
    let h = Harness::new();
    let owner = h.person(&[]);
    let doc = h.document(&owner, None).await;

    h.core.documents.checkout(&owner, doc.id, None).await.unwrap();
    h.core.documents.cancel_checkout(&owner, doc.id).await.unwrap();

    assert_eq!(h.core.documents.versions(&owner, doc.id).await.unwrap().len(), 1);
    h.core.documents.checkout(&owner, doc.id, None).await.unwrap();
}

#[tokio::test]
async fn test_cancel_by_someone_else_conflicts() {
    let h = Harness::new();
    let editors = h.role();
    let x = h.person(&[editors]);
    let y = h.person(&[editors]);
    let doc = h.document(&x, None).await;
    h.grant(ResourceRef::Document(doc.id), Principal::Role(editors), Permission::Read)
        .await;

    h.core.documents.checkout(&x, doc.id, None).await.unwrap();
    assert!(matches!(
        h.core.documents.cancel_checkout(&y, doc.id).await,
        Err(GovernanceError::Conflict(_))
    ));
    assert_eq!(
        h.core.documents.get_checkout(&y, doc.id).await.unwrap().map(|c| c.holder),
        Some(x.id())
    );
}

#[tokio::test]
async fn test_force_unlock_is_audited_with_previous_holder() {
    let h = Harness::new();
    let owner = h.person(&[]);
    let doc = h.document(&owner, None).await;
    h.core.documents.checkout(&owner, doc.id, None).await.unwrap();

    let released = h.core.documents.force_unlock(&h.admin, doc.id).await.unwrap();
    assert_eq!(released.holder, owner.id());

    let entries = h.audit.entries_for(AuditAction::CheckoutForceUnlocked);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor(), h.admin.id());
    assert_eq!(entries[0].detail()["previous_holder"], json!(owner.id()));

    assert!(matches!(
        h.core.documents.force_unlock(&h.admin, doc.id).await,
        Err(GovernanceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_deleting_a_document_drops_its_checkout() {
    let h = Harness::new();
    let owner = h.person(&[]);
    let doc = h.document(&owner, None).await;
    h.core.documents.checkout(&owner, doc.id, None).await.unwrap();

    let deleted = h
        .core
        .documents
        .update_status(&owner, doc.id, DocumentStatus::Deleted)
        .await
        .unwrap();
    assert!(!deleted.is_active);
    assert!(h
        .core
        .repositories
        .checkouts
        .find_by_document(doc.id)
        .await
        .unwrap()
        .is_none());
    assert!(h.core.documents.list_checkouts(&h.admin, 10, 0).await.unwrap().is_empty());

    let entry = h.audit.entries_for(AuditAction::DocumentStatusChanged).pop().unwrap();
    assert_eq!(entry.detail()["released_checkout_of"], json!(owner.id()));
}

#[tokio::test]
async fn test_retracted_version_drops_out_of_history() {
    let h = Harness::new();
    let owner = h.person(&[]);
    let doc = h.document(&owner, None).await;
    let first = doc.current_version_id;

    h.core.documents.checkout(&owner, doc.id, None).await.unwrap();
    h.core.documents.checkin(&owner, doc.id, checkin('d', "second")).await.unwrap();

    let retracted = h.core.documents.retract_version(&owner, first).await.unwrap();
    assert!(!retracted.is_active);
    let versions = h.core.documents.versions(&owner, doc.id).await.unwrap();
    assert!(versions.iter().all(|v| v.id != first || !v.is_active));
}
