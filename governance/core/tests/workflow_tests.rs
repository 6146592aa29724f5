// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use std::time::Duration;

use aegis_governance_core::application::workflow_engine::TaskAssignment;
use aegis_governance_core::domain::acl::{Permission, Principal, ResourceRef};
use aegis_governance_core::domain::actor::Actor;
use aegis_governance_core::domain::error::GovernanceError;
use aegis_governance_core::domain::events::GovernanceEvent;
use aegis_governance_core::domain::ids::{DocumentId, RoleId, WorkflowDefinitionId};
use aegis_governance_core::domain::workflow::{InstanceStatus, StateName, TaskStatus};
use common::Harness;

fn state(name: &str) -> StateName {
    StateName::new(name).unwrap()
}

fn contract_review(legal: RoleId, board: RoleId) -> String {
    format!(
        r#"
apiVersion: 100monkeys.ai/v1
kind: GovernanceWorkflow
metadata:
  name: contract-review
  description: Legal review followed by board approval
spec:
  initial_state: draft
  states:
    draft:
      transitions:
        - target: legal_review
          roles: ["{legal}"]
    legal_review:
      transitions:
        - target: board_approval
          roles: ["{legal}"]
        - target: draft
          roles: ["{legal}"]
    board_approval:
      transitions:
        - target: approved
          roles: ["{board}"]
    approved:
      terminal: true
"#
    )
}

struct Scenario {
    h: Harness,
    legal: RoleId,
    board: RoleId,
    owner: Actor,
    document: DocumentId,
    definition: WorkflowDefinitionId,
}

async fn scenario() -> Scenario {
    let h = Harness::new();
    let legal = h.role();
    let board = h.role();
    let owner = h.person(&[]);
    let doc = h.document(&owner, None).await;
    for role in [legal, board] {
        h.grant(ResourceRef::Document(doc.id), Principal::Role(role), Permission::Read)
            .await;
    }
    let definition = h
        .core
        .workflows
        .register_yaml(&h.admin, &contract_review(legal, board))
        .await
        .unwrap();

    Scenario {
        h,
        legal,
        board,
        owner,
        document: doc.id,
        definition: definition.id,
    }
}

fn assign(to: &str, assignee: Option<&Actor>) -> TaskAssignment {
    TaskAssignment {
        to_state: state(to),
        assignee: assignee.map(|a| a.id()),
        due_at: None,
    }
}

#[tokio::test]
async fn test_advance_needs_both_role_and_assignment() {
    let s = scenario().await;
    let assigned = s.h.person(&[s.legal]);
    let colleague = s.h.person(&[s.legal]);
    let bystander = s.h.person(&[]);
    s.h.grant(ResourceRef::Document(s.document), Principal::Person(bystander.id()), Permission::Read)
        .await;
    s.h.grant(ResourceRef::Document(s.document), Principal::Person(assigned.id()), Permission::Read)
        .await;

    let instance = s.h.core.workflows.start(&s.owner, s.document, s.definition).await.unwrap();
    s.h.core
        .workflows
        .open_task(&s.owner, instance.id, assign("legal_review", Some(&assigned)))
        .await
        .unwrap();

    // Role without assignment.
    assert!(matches!(
        s.h.core.workflows.advance(&colleague, instance.id, &state("legal_review"), None).await,
        Err(GovernanceError::Forbidden(_))
    ));
    // Assignment without role.
    let role_dropped = Actor::new(assigned.id(), []);
    assert!(matches!(
        s.h.core.workflows.advance(&role_dropped, instance.id, &state("legal_review"), None).await,
        Err(GovernanceError::Forbidden(_))
    ));
    // Neither.
    assert!(matches!(
        s.h.core.workflows.advance(&bystander, instance.id, &state("legal_review"), None).await,
        Err(GovernanceError::Forbidden(_))
    ));
    // Both.
    let moved = s
        .h
        .core
        .workflows
        .advance(&assigned, instance.id, &state("legal_review"), None)
        .await
        .unwrap();
    assert_eq!(moved.current_state, state("legal_review"));
}

#[tokio::test]
async fn test_full_route_to_completion() {
    let s = scenario().await;
    let lawyer = s.h.person(&[s.legal]);
    let director = s.h.person(&[s.board]);
    let engine = &s.h.core.workflows;

    let instance = engine.start(&s.owner, s.document, s.definition).await.unwrap();
    for (to, decider) in [
        ("legal_review", &lawyer),
        ("board_approval", &lawyer),
        ("approved", &director),
    ] {
        engine
            .open_task(&s.owner, instance.id, assign(to, Some(decider)))
            .await
            .unwrap();
        engine.advance(decider, instance.id, &state(to), None).await.unwrap();
    }

    let done = engine.get(&s.owner, instance.id).await.unwrap();
    assert_eq!(done.status, InstanceStatus::Completed);
    assert_eq!(done.current_state, state("approved"));

    let tasks = engine.tasks(&s.owner, instance.id).await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Approved));

    // Completed instances free the document for a new run.
    engine.start(&s.owner, s.document, s.definition).await.unwrap();
}

#[tokio::test]
async fn test_undefined_transition_is_invalid() {
    let s = scenario().await;
    let lawyer = s.h.person(&[s.legal]);
    let instance = s.h.core.workflows.start(&s.owner, s.document, s.definition).await.unwrap();

    let err = s
        .h
        .core
        .workflows
        .open_task(&s.owner, instance.id, assign("approved", Some(&lawyer)))
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Validation(_)));

    let err = s
        .h
        .core
        .workflows
        .advance(&lawyer, instance.id, &state("approved"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_approvers_produce_one_advance() {
    let s = scenario().await;
    let reviewers: Vec<Actor> = (0..6).map(|_| s.h.person(&[s.legal])).collect();
    let instance = s.h.core.workflows.start(&s.owner, s.document, s.definition).await.unwrap();
    let opened = s
        .h
        .core
        .workflows
        .open_task(&s.owner, instance.id, assign("legal_review", None))
        .await
        .unwrap();
    assert_eq!(opened.len(), reviewers.len());

    let instance_id = instance.id;
    let mut handles = Vec::new();
    for reviewer in reviewers {
        let engine = s.h.core.workflows.clone();
        handles.push(tokio::spawn(async move {
            engine.advance(&reviewer, instance_id, &state("legal_review"), None).await
        }));
    }

    let mut advanced = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => advanced += 1,
            Err(GovernanceError::Conflict(_)) | Err(GovernanceError::Validation(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(advanced, 1);

    let current = s.h.core.workflows.get(&s.owner, instance.id).await.unwrap();
    assert_eq!(current.current_state, state("legal_review"));
}

#[tokio::test]
async fn test_assignee_is_notified() {
    let s = scenario().await;
    let director = s.h.person(&[s.board]);
    let lawyer = s.h.person(&[s.legal]);
    let mut inbox = s.h.core.events.subscribe_assignee(director.id());
    let engine = &s.h.core.workflows;

    let instance = engine.start(&s.owner, s.document, s.definition).await.unwrap();
    engine
        .open_task(&s.owner, instance.id, assign("legal_review", Some(&lawyer)))
        .await
        .unwrap();
    engine.advance(&lawyer, instance.id, &state("legal_review"), None).await.unwrap();
    engine
        .open_task(&s.owner, instance.id, assign("board_approval", Some(&lawyer)))
        .await
        .unwrap();
    engine.advance(&lawyer, instance.id, &state("board_approval"), None).await.unwrap();
    let opened = engine
        .open_task(&s.owner, instance.id, assign("approved", Some(&director)))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
        .await
        .expect("notification delivered")
        .unwrap();
    match event {
        GovernanceEvent::TaskAssigned { task_id, assignee, .. } => {
            assert_eq!(task_id, opened[0].id);
            assert_eq!(assignee, director.id());
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_send_back_to_draft() {
    let s = scenario().await;
    let lawyer = s.h.person(&[s.legal]);
    let engine = &s.h.core.workflows;

    let instance = engine.start(&s.owner, s.document, s.definition).await.unwrap();
    engine
        .open_task(&s.owner, instance.id, assign("legal_review", Some(&lawyer)))
        .await
        .unwrap();
    engine.advance(&lawyer, instance.id, &state("legal_review"), None).await.unwrap();
    engine
        .open_task(&s.owner, instance.id, assign("draft", Some(&lawyer)))
        .await
        .unwrap();

    let back = engine
        .advance(&lawyer, instance.id, &state("draft"), Some("missing indemnity clause".into()))
        .await
        .unwrap();
    assert_eq!(back.current_state, state("draft"));
    assert_eq!(back.status, InstanceStatus::Active);
}
