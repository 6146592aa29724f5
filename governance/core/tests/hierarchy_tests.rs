// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Folder and category tree behaviour through the hierarchy service.

mod common;

use aegis_governance_core::domain::acl::{Permission, Principal, ResourceRef};
use aegis_governance_core::domain::error::GovernanceError;
use aegis_governance_core::domain::hierarchy::{Node, NodeKind};
use common::Harness;

fn assert_lineage(node: &Node, parent: Option<&Node>) {
    match parent {
        Some(parent) => {
            assert_eq!(node.path.ids()[..node.path.len() - 1], parent.path.ids()[..]);
            assert_eq!(node.path.leaf(), Some(node.id));
        }
        None => assert_eq!(node.path.ids(), &[node.id]),
    }
    assert_eq!(node.depth as usize, node.path.len() - 1);
}

#[tokio::test]
async fn test_paths_follow_parents_after_move() {
    let h = Harness::new();
    let hierarchy = &h.core.hierarchy;

    let legal = hierarchy.create(&h.admin, NodeKind::Folder, None, "Legal").await.unwrap();
    let contracts = hierarchy
        .create(&h.admin, NodeKind::Folder, Some(legal.id), "Contracts")
        .await
        .unwrap();
    let signed = hierarchy
        .create(&h.admin, NodeKind::Folder, Some(contracts.id), "Signed")
        .await
        .unwrap();
    let finance = hierarchy.create(&h.admin, NodeKind::Folder, None, "Finance").await.unwrap();

    assert_lineage(&signed, Some(&contracts));

    let moved = hierarchy.move_node(&h.admin, contracts.id, Some(finance.id)).await.unwrap();
    assert_lineage(&moved, Some(&finance));

    let signed = hierarchy.get(&h.admin, signed.id).await.unwrap();
    assert_lineage(&signed, Some(&moved));
    assert_eq!(signed.depth, 2);

    let ancestors = hierarchy.ancestors(&h.admin, signed.id).await.unwrap();
    let names: Vec<&str> = ancestors.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["Finance", "Contracts"]);

    assert!(hierarchy.children(&h.admin, legal.id).await.unwrap().is_empty());
    assert_eq!(hierarchy.check_integrity(&h.admin, finance.id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_delete_deactivates_whole_subtree() {
    let h = Harness::new();
    let hierarchy = &h.core.hierarchy;

    let root = h.folder(None, "Archive").await;
    let a = h.folder(Some(root), "2024").await;
    let b = h.folder(Some(a), "Q1").await;
    let c = h.folder(Some(b), "January").await;
    let sibling = h.folder(None, "Drafts").await;

    assert_eq!(hierarchy.delete(&h.admin, a).await.unwrap(), 3);

    for gone in [a, b, c] {
        let err = hierarchy.get(&h.admin, gone).await.unwrap_err();
        assert!(matches!(err, GovernanceError::NotFound(_)));
    }
    assert_eq!(hierarchy.subtree(&h.admin, root).await.unwrap().len(), 1);
    assert!(hierarchy.get(&h.admin, sibling).await.is_ok());
}

#[tokio::test]
async fn test_move_rules() {
    let h = Harness::new();
    let hierarchy = &h.core.hierarchy;

    let top = h.folder(None, "Top").await;
    let child = h.folder(Some(top), "Child").await;
    let category = hierarchy.create(&h.admin, NodeKind::Category, None, "Invoices").await.unwrap();

    let err = hierarchy.move_node(&h.admin, top, Some(child)).await.unwrap_err();
    assert!(matches!(err, GovernanceError::Validation(_)));

    let err = hierarchy.move_node(&h.admin, child, Some(category.id)).await.unwrap_err();
    assert!(matches!(err, GovernanceError::Validation(_)));

    let err = hierarchy.move_node(&h.admin, child, Some(child)).await.unwrap_err();
    assert!(matches!(err, GovernanceError::Validation(_)));
}

#[tokio::test]
async fn test_folder_writers_create_children_but_not_roots() {
    let h = Harness::new();
    let editors = h.role();
    let editor = h.person(&[editors]);
    let hierarchy = &h.core.hierarchy;

    let shared = h.folder(None, "Shared").await;
    h.grant(ResourceRef::Folder(shared), Principal::Role(editors), Permission::Write)
        .await;

    let team = hierarchy
        .create(&editor, NodeKind::Folder, Some(shared), "Team")
        .await
        .unwrap();
    assert_eq!(team.depth, 1);

    let err = hierarchy.create(&editor, NodeKind::Folder, None, "Mine").await.unwrap_err();
    assert!(matches!(err, GovernanceError::Forbidden(_)));

    let outsider = h.person(&[]);
    let err = hierarchy
        .create(&outsider, NodeKind::Folder, Some(shared), "Sneaky")
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::NotFound(_)));
}

#[tokio::test]
async fn test_roots_hide_unreadable_folders() {
    let h = Harness::new();
    let readers = h.role();
    let reader = h.person(&[readers]);

    let visible = h.folder(None, "Public").await;
    h.folder(None, "Private").await;
    h.grant(ResourceRef::Folder(visible), Principal::Role(readers), Permission::Read)
        .await;

    let roots = h.core.hierarchy.roots(&reader, NodeKind::Folder).await.unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].id, visible);
    assert_eq!(h.core.hierarchy.roots(&h.admin, NodeKind::Folder).await.unwrap().len(), 2);
}
