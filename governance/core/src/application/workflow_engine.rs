// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Engine
//!
//! Drives per-document state machines described by a [`WorkflowDefinition`].
//! A transition is decided through tasks: [`WorkflowEngine::open_task`]
//! assigns the transition to one person or to every member of its role pool,
//! and [`WorkflowEngine::advance`] applies it.
//!
//! `advance` succeeds only for an actor who holds one of the transition's
//! roles *and* is the assignee of a pending task for that transition. The
//! decision is applied with an optimistic check on the instance's current
//! state, so two approvers racing on the same step produce one advance and
//! one `Conflict`.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::{record_audit, surface, AuthorizationResolver};
use crate::domain::acl::{Permission, ResourceRef};
use crate::domain::actor::{Actor, IdentityProvider};
use crate::domain::error::GovernanceError;
use crate::domain::events::{AuditAction, AuditEntry, AuditSink, AuditSubject, GovernanceEvent, NotificationSink};
use crate::domain::ids::{DocumentId, PersonId, TaskId, WorkflowDefinitionId, WorkflowInstanceId};
use crate::domain::repository::WorkflowRepository;
use crate::domain::workflow::{
    StateName, Transition, WorkflowDecision, WorkflowDefinition, WorkflowInstance, WorkflowTask,
};

/// Who should decide the next transition of an instance.
///
/// With `assignee: None` one task is opened per member of the transition's
/// authorized roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub to_state: StateName,
    #[serde(default)]
    pub assignee: Option<PersonId>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowRepository>,
    resolver: Arc<AuthorizationResolver>,
    identity: Arc<dyn IdentityProvider>,
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        resolver: Arc<AuthorizationResolver>,
        identity: Arc<dyn IdentityProvider>,
        notifications: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            workflows,
            resolver,
            identity,
            notifications,
            audit,
        }
    }

    /// Store a validated definition. Names are unique.
    pub async fn register_definition(
        &self,
        actor: &Actor,
        definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, GovernanceError> {
        if !actor.is_administrator() {
            return Err(GovernanceError::Forbidden(
                "registering workflow definitions is administrator-only".to_string(),
            ));
        }
        self.workflows.save_definition(&definition).await?;
        info!(
            definition_id = %definition.id,
            name = %definition.name,
            states = definition.states.len(),
            "Workflow definition registered"
        );
        Ok(definition)
    }

    /// Parse a `GovernanceWorkflow` manifest and register it.
    pub async fn register_yaml(&self, actor: &Actor, yaml: &str) -> Result<WorkflowDefinition, GovernanceError> {
        let definition = WorkflowDefinition::from_yaml_str(yaml)?;
        self.register_definition(actor, definition).await
    }

    pub async fn definitions(&self) -> Result<Vec<WorkflowDefinition>, GovernanceError> {
        Ok(self.workflows.list_definitions().await?)
    }

    pub async fn definition_by_name(&self, name: &str) -> Result<WorkflowDefinition, GovernanceError> {
        self.workflows
            .find_definition_by_name(name)
            .await?
            .filter(|d| d.is_active)
            .ok_or_else(|| GovernanceError::NotFound(format!("workflow definition '{}'", name)))
    }

    /// Begin a workflow on a document at the definition's initial state.
    pub async fn start(
        &self,
        actor: &Actor,
        document_id: DocumentId,
        definition_id: WorkflowDefinitionId,
    ) -> Result<WorkflowInstance, GovernanceError> {
        self.resolver
            .require(actor, ResourceRef::Document(document_id), Permission::Write)
            .await?;
        let definition = self
            .workflows
            .find_definition(definition_id)
            .await?
            .filter(|d| d.is_active)
            .ok_or_else(|| GovernanceError::NotFound(format!("workflow definition {}", definition_id)))?;

        let instance = WorkflowInstance::start(&definition, document_id, actor.id());
        self.workflows.start_instance(&instance).await?;

        info!(
            instance_id = %instance.id,
            document_id = %document_id,
            workflow = %definition.name,
            state = %instance.current_state,
            "Workflow started"
        );
        self.notifications.notify(GovernanceEvent::WorkflowStarted {
            instance_id: instance.id,
            document_id,
            state: instance.current_state.clone(),
            started_at: instance.created_at,
        });
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::WorkflowInstance(instance.id), AuditAction::WorkflowStarted)
                .with_detail(json!({ "document_id": document_id, "workflow": definition.name })),
        )
        .await;
        Ok(instance)
    }

    /// Open tasks for the transition from the instance's current state to
    /// `assignment.to_state`. People who already hold a pending task for that
    /// transition are not assigned twice.
    pub async fn open_task(
        &self,
        actor: &Actor,
        instance_id: WorkflowInstanceId,
        assignment: TaskAssignment,
    ) -> Result<Vec<WorkflowTask>, GovernanceError> {
        let instance = self.instance(instance_id).await?;
        self.resolver
            .require(actor, ResourceRef::Document(instance.document_id), Permission::Write)
            .await?;
        ensure_active(&instance)?;

        let definition = self.definition_of(&instance).await?;
        let transition = lookup_transition(&definition, &instance.current_state, &assignment.to_state)?;

        let candidates = match assignment.assignee {
            Some(person) => {
                let roles = self.identity.roles_of(person).await?;
                if roles.is_disjoint(&transition.roles) {
                    return Err(GovernanceError::Validation(format!(
                        "assignee {} holds none of the roles authorized for '{}' -> '{}'",
                        person, instance.current_state, assignment.to_state
                    )));
                }
                BTreeSet::from([person])
            }
            None => {
                let mut pool = BTreeSet::new();
                for role in &transition.roles {
                    pool.extend(self.identity.members_of(*role).await?);
                }
                if pool.is_empty() {
                    return Err(GovernanceError::Validation(format!(
                        "no one holds a role authorized for '{}' -> '{}'",
                        instance.current_state, assignment.to_state
                    )));
                }
                pool
            }
        };

        let already: BTreeSet<PersonId> = self
            .workflows
            .find_tasks(instance.id)
            .await?
            .into_iter()
            .filter(|t| t.is_pending() && t.covers(&instance.current_state, &assignment.to_state))
            .map(|t| t.assignee)
            .collect();
        let tasks: Vec<WorkflowTask> = candidates
            .difference(&already)
            .map(|person| WorkflowTask::assign(&instance, assignment.to_state.clone(), *person, assignment.due_at))
            .collect();
        if tasks.is_empty() {
            return Err(GovernanceError::Conflict(format!(
                "'{}' -> '{}' is already assigned to everyone requested",
                instance.current_state, assignment.to_state
            )));
        }

        self.workflows
            .insert_tasks(instance.id, &instance.current_state, &tasks)
            .await?;

        for task in &tasks {
            self.notifications.notify(GovernanceEvent::TaskAssigned {
                task_id: task.id,
                instance_id: instance.id,
                assignee: task.assignee,
                due_at: task.due_at,
                assigned_at: task.created_at,
            });
        }
        info!(
            instance_id = %instance.id,
            to_state = %assignment.to_state,
            assigned = tasks.len(),
            "Workflow tasks opened"
        );
        Ok(tasks)
    }

    /// Move an instance to `target`, closing the actor's task as approved.
    pub async fn advance(
        &self,
        actor: &Actor,
        instance_id: WorkflowInstanceId,
        target: &StateName,
        comment: Option<String>,
    ) -> Result<WorkflowInstance, GovernanceError> {
        let instance = self.instance(instance_id).await?;
        self.resolver
            .require(actor, ResourceRef::Document(instance.document_id), Permission::Read)
            .await?;
        ensure_active(&instance)?;

        let definition = self.definition_of(&instance).await?;
        let transition = lookup_transition(&definition, &instance.current_state, target)?;

        let pending: Vec<WorkflowTask> = self
            .workflows
            .find_tasks(instance.id)
            .await?
            .into_iter()
            .filter(|t| t.is_pending() && t.covers(&instance.current_state, target))
            .collect();
        if pending.is_empty() {
            return Err(GovernanceError::Validation(format!(
                "no open task for '{}' -> '{}' on instance {}",
                instance.current_state, target, instance.id
            )));
        }

        let holds_role = actor.has_any_role(&transition.roles);
        let task = pending.iter().find(|t| t.assignee == actor.id());
        let task = match (holds_role, task) {
            (true, Some(task)) => task,
            _ => {
                debug!(
                    instance_id = %instance.id,
                    actor = %actor.id(),
                    holds_role,
                    is_assignee = task.is_some(),
                    "Workflow advance refused"
                );
                return Err(GovernanceError::Forbidden(format!(
                    "actor may not decide '{}' -> '{}'",
                    instance.current_state, target
                )));
            }
        };

        let decision = WorkflowDecision {
            instance_id: instance.id,
            task_id: task.id,
            expected_state: instance.current_state.clone(),
            new_state: target.clone(),
            completes: definition.is_terminal(target),
            comment: comment.clone(),
            decided_at: Utc::now(),
        };
        let updated = self.workflows.apply_decision(&decision).await?;
        counter!("governance_workflow_decisions_total", "decision" => "approved").increment(1);

        info!(
            instance_id = %updated.id,
            from = %decision.expected_state,
            to = %updated.current_state,
            status = updated.status.as_str(),
            "Workflow advanced"
        );
        self.notifications.notify(GovernanceEvent::WorkflowAdvanced {
            instance_id: updated.id,
            document_id: updated.document_id,
            from: decision.expected_state.clone(),
            to: updated.current_state.clone(),
            advanced_at: decision.decided_at,
        });
        if decision.completes {
            self.notifications.notify(GovernanceEvent::WorkflowCompleted {
                instance_id: updated.id,
                document_id: updated.document_id,
                final_state: updated.current_state.clone(),
                completed_at: decision.decided_at,
            });
        }
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::WorkflowInstance(updated.id), AuditAction::WorkflowAdvanced)
                .with_detail(json!({
                    "task_id": task.id,
                    "from": decision.expected_state,
                    "to": updated.current_state,
                    "comment": comment,
                })),
        )
        .await;
        Ok(updated)
    }

    /// Record a rejection on one's own task. The instance does not move.
    pub async fn reject(
        &self,
        actor: &Actor,
        task_id: TaskId,
        comment: Option<String>,
    ) -> Result<WorkflowTask, GovernanceError> {
        let task = self
            .workflows
            .find_task(task_id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("task {}", task_id)))?;
        let instance = self.instance(task.instance_id).await?;
        self.resolver
            .require(actor, ResourceRef::Document(instance.document_id), Permission::Read)
            .await?;
        if task.assignee != actor.id() {
            return Err(GovernanceError::Forbidden(format!("task {} is assigned to someone else", task_id)));
        }

        let rejected = self.workflows.reject_task(task_id, comment, Utc::now()).await?;
        counter!("governance_workflow_decisions_total", "decision" => "rejected").increment(1);

        info!(task_id = %task_id, instance_id = %instance.id, "Workflow task rejected");
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::WorkflowInstance(instance.id), AuditAction::WorkflowTaskRejected)
                .with_detail(json!({
                    "task_id": task_id,
                    "from": rejected.from_state,
                    "to": rejected.to_state,
                    "comment": rejected.comment,
                })),
        )
        .await;
        Ok(rejected)
    }

    /// Stop an active instance. Needs `manage` on the document.
    pub async fn cancel(&self, actor: &Actor, instance_id: WorkflowInstanceId) -> Result<WorkflowInstance, GovernanceError> {
        let instance = self.instance(instance_id).await?;
        self.resolver
            .require(actor, ResourceRef::Document(instance.document_id), Permission::Manage)
            .await?;
        ensure_active(&instance)?;

        let now = Utc::now();
        let cancelled = self.workflows.cancel_instance(instance_id, now).await?;

        info!(instance_id = %instance_id, state = %cancelled.current_state, "Workflow cancelled");
        self.notifications.notify(GovernanceEvent::WorkflowCancelled {
            instance_id,
            document_id: cancelled.document_id,
            cancelled_at: now,
        });
        record_audit(
            self.audit.as_ref(),
            AuditEntry::new(actor, AuditSubject::WorkflowInstance(instance_id), AuditAction::WorkflowCancelled)
                .with_detail(json!({ "state": cancelled.current_state })),
        )
        .await;
        Ok(cancelled)
    }

    pub async fn get(&self, actor: &Actor, instance_id: WorkflowInstanceId) -> Result<WorkflowInstance, GovernanceError> {
        let instance = self.instance(instance_id).await?;
        self.resolver
            .require(actor, ResourceRef::Document(instance.document_id), Permission::Read)
            .await?;
        Ok(instance)
    }

    pub async fn tasks(&self, actor: &Actor, instance_id: WorkflowInstanceId) -> Result<Vec<WorkflowTask>, GovernanceError> {
        let instance = self.get(actor, instance_id).await?;
        Ok(self.workflows.find_tasks(instance.id).await?)
    }

    pub async fn instances_for_document(
        &self,
        actor: &Actor,
        document_id: DocumentId,
    ) -> Result<Vec<WorkflowInstance>, GovernanceError> {
        self.resolver
            .require(actor, ResourceRef::Document(document_id), Permission::Read)
            .await?;
        Ok(self.workflows.find_instances_for_document(document_id).await?)
    }

    /// Pending tasks past due at `now`, oldest due first.
    pub async fn overdue_tasks(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<WorkflowTask>, GovernanceError> {
        Ok(self.workflows.find_overdue_tasks(now, limit).await?)
    }

    /// Publish a `TaskOverdue` notification per overdue task. Used by the
    /// batch driver; returns how many were flagged.
    pub async fn flag_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<usize, GovernanceError> {
        let overdue = self.overdue_tasks(now, limit).await?;
        for task in &overdue {
            let Some(due_at) = task.due_at else { continue };
            self.notifications.notify(GovernanceEvent::TaskOverdue {
                task_id: task.id,
                instance_id: task.instance_id,
                assignee: task.assignee,
                due_at,
            });
        }
        if !overdue.is_empty() {
            counter!("governance_workflow_overdue_tasks_total").increment(overdue.len() as u64);
            info!(count = overdue.len(), "Flagged overdue workflow tasks");
        }
        Ok(overdue.len())
    }

    async fn instance(&self, id: WorkflowInstanceId) -> Result<WorkflowInstance, GovernanceError> {
        self.workflows
            .find_instance(id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("workflow instance {}", id)))
    }

    async fn definition_of(&self, instance: &WorkflowInstance) -> Result<WorkflowDefinition, GovernanceError> {
        self.workflows
            .find_definition(instance.definition_id)
            .await?
            .ok_or_else(|| {
                surface(GovernanceError::Integrity(format!(
                    "instance {} refers to missing workflow definition {}",
                    instance.id, instance.definition_id
                )))
            })
    }
}

fn ensure_active(instance: &WorkflowInstance) -> Result<(), GovernanceError> {
    if instance.is_active() {
        Ok(())
    } else {
        Err(GovernanceError::Conflict(format!(
            "workflow instance {} is {}",
            instance.id,
            instance.status.as_str()
        )))
    }
}

fn lookup_transition<'a>(
    definition: &'a WorkflowDefinition,
    from: &StateName,
    to: &StateName,
) -> Result<&'a Transition, GovernanceError> {
    definition.transition(from, to).ok_or_else(|| {
        GovernanceError::Validation(format!(
            "workflow '{}' has no transition '{}' -> '{}'",
            definition.name, from, to
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::acl::{AclEntry, GrantRequest, Principal};
    use crate::domain::document::{Classification, ContentAttributes, Document, NewDocument};
    use crate::domain::events::NoopNotifications;
    use crate::domain::ids::RoleId;
    use crate::domain::repository::{AclRepository, DocumentRepository};
    use crate::domain::workflow::{InstanceStatus, StateSpec, TaskStatus};
    use crate::infrastructure::audit::InMemoryAuditSink;
    use crate::infrastructure::identity::StaticIdentityProvider;
    use crate::infrastructure::repositories::InMemoryGovernanceStore;
    use std::collections::HashMap;

    fn state(name: &str) -> StateName {
        StateName::new(name).unwrap()
    }

    fn review_flow(reviewer: RoleId) -> WorkflowDefinition {
        let route = |target: &str| Transition {
            target: state(target),
            roles: BTreeSet::from([reviewer]),
        };
        WorkflowDefinition::new(
            "review",
            None,
            state("draft"),
            HashMap::from([
                (state("draft"), StateSpec { transitions: vec![route("review")], terminal: false }),
                (state("review"), StateSpec { transitions: vec![route("approved")], terminal: false }),
                (state("approved"), StateSpec { transitions: vec![], terminal: true }),
            ]),
        )
        .unwrap()
    }

    struct Fixture {
        store: InMemoryGovernanceStore,
        engine: WorkflowEngine,
        identity: StaticIdentityProvider,
        owner: Actor,
        reviewer_role: RoleId,
        document: DocumentId,
        definition: WorkflowDefinitionId,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryGovernanceStore::new();
        let identity = StaticIdentityProvider::new([]);
        let reviewer_role = RoleId::new();
        identity.register_role(reviewer_role);

        let owner_id = PersonId::new();
        identity.register_person(owner_id, "owner", []);
        let owner = identity.actor_for(owner_id).unwrap();

        let content = ContentAttributes::new("blob://x", "b".repeat(64), 3, "text/plain", "x.txt").unwrap();
        let (doc, v1) = Document::create(
            NewDocument {
                title: "Contract".to_string(),
                description: None,
                folder_id: None,
                content_type: None,
                classification: Classification::Confidential,
                content,
            },
            owner_id,
        )
        .unwrap();
        DocumentRepository::create(&store, &doc, &v1, &AclEntry::owner_of(doc.id, owner_id))
            .await
            .unwrap();
        let read = AclEntry::new(
            &GrantRequest {
                resource: ResourceRef::Document(doc.id),
                principal: Principal::Role(reviewer_role),
                permission: Permission::Read,
                inherited: false,
            },
            owner_id,
        )
        .unwrap();
        AclRepository::insert(&store, &read).await.unwrap();

        let resolver = Arc::new(AuthorizationResolver::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        ));
        let engine = WorkflowEngine::new(
            Arc::new(store.clone()),
            resolver,
            Arc::new(identity.clone()),
            Arc::new(NoopNotifications),
            Arc::new(InMemoryAuditSink::new()),
        );
        let definition = engine
            .register_definition(&Actor::system(), review_flow(reviewer_role))
            .await
            .unwrap();

        Fixture {
            store,
            engine,
            identity,
            owner,
            reviewer_role,
            document: doc.id,
            definition: definition.id,
        }
    }

    fn reviewer(f: &Fixture, credential: &str) -> Actor {
        let id = PersonId::new();
        f.identity.register_person(id, credential, [f.reviewer_role]);
        f.identity.actor_for(id).unwrap()
    }

    #[tokio::test]
    async fn test_advance_requires_assigned_task() {
        let f = fixture().await;
        let alice = reviewer(&f, "alice");
        let bob = reviewer(&f, "bob");
        let instance = f.engine.start(&f.owner, f.document, f.definition).await.unwrap();

        let err = f.engine.advance(&alice, instance.id, &state("review"), None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));

        f.engine
            .open_task(
                &f.owner,
                instance.id,
                TaskAssignment { to_state: state("review"), assignee: Some(alice.id()), due_at: None },
            )
            .await
            .unwrap();

        let err = f.engine.advance(&bob, instance.id, &state("review"), None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Forbidden(_)));

        let advanced = f.engine.advance(&alice, instance.id, &state("review"), None).await.unwrap();
        assert_eq!(advanced.current_state, state("review"));
        assert_eq!(advanced.status, InstanceStatus::Active);
    }

    #[tokio::test]
    async fn test_assignee_without_role_is_forbidden() {
        let f = fixture().await;
        let alice = reviewer(&f, "alice");
        let instance = f.engine.start(&f.owner, f.document, f.definition).await.unwrap();
        f.engine
            .open_task(
                &f.owner,
                instance.id,
                TaskAssignment { to_state: state("review"), assignee: Some(alice.id()), due_at: None },
            )
            .await
            .unwrap();

        // Read held personally, so only the role check can refuse.
        let personal_read = AclEntry::new(
            &GrantRequest {
                resource: ResourceRef::Document(f.document),
                principal: Principal::Person(alice.id()),
                permission: Permission::Read,
                inherited: false,
            },
            f.owner.id(),
        )
        .unwrap();
        AclRepository::insert(&f.store, &personal_read).await.unwrap();

        let stripped = Actor::new(alice.id(), []);
        let err = f.engine.advance(&stripped, instance.id, &state("review"), None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Forbidden(_)));

        let advanced = f.engine.advance(&alice, instance.id, &state("review"), None).await.unwrap();
        assert_eq!(advanced.current_state, state("review"));
    }

    #[tokio::test]
    async fn test_fan_out_and_completion() {
        let f = fixture().await;
        let alice = reviewer(&f, "alice");
        let bob = reviewer(&f, "bob");
        let instance = f.engine.start(&f.owner, f.document, f.definition).await.unwrap();

        let tasks = f
            .engine
            .open_task(&f.owner, instance.id, TaskAssignment { to_state: state("review"), assignee: None, due_at: None })
            .await
            .unwrap();
        assert_eq!(tasks.len(), 2);

        f.engine.advance(&bob, instance.id, &state("review"), None).await.unwrap();
        let tasks = f.engine.tasks(&alice, instance.id).await.unwrap();
        let alice_task = tasks.iter().find(|t| t.assignee == alice.id()).unwrap();
        assert_eq!(alice_task.status, TaskStatus::Cancelled);

        f.engine
            .open_task(
                &f.owner,
                instance.id,
                TaskAssignment { to_state: state("approved"), assignee: Some(alice.id()), due_at: None },
            )
            .await
            .unwrap();
        let done = f
            .engine
            .advance(&alice, instance.id, &state("approved"), Some("ok".to_string()))
            .await
            .unwrap();
        assert_eq!(done.status, InstanceStatus::Completed);

        let err = f.engine.advance(&alice, instance.id, &state("approved"), None).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_open_task_rejects_unauthorized_assignee() {
        let f = fixture().await;
        let outsider = PersonId::new();
        f.identity.register_person(outsider, "outsider", []);
        let instance = f.engine.start(&f.owner, f.document, f.definition).await.unwrap();

        let err = f
            .engine
            .open_task(
                &f.owner,
                instance.id,
                TaskAssignment { to_state: state("review"), assignee: Some(outsider), due_at: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reject_keeps_state_and_overdue_is_reported() {
        let f = fixture().await;
        let alice = reviewer(&f, "alice");
        let instance = f.engine.start(&f.owner, f.document, f.definition).await.unwrap();
        let due = Utc::now() - chrono::Duration::hours(1);
        let tasks = f
            .engine
            .open_task(
                &f.owner,
                instance.id,
                TaskAssignment { to_state: state("review"), assignee: Some(alice.id()), due_at: Some(due) },
            )
            .await
            .unwrap();

        assert_eq!(f.engine.flag_overdue(Utc::now(), 10).await.unwrap(), 1);

        let rejected = f.engine.reject(&alice, tasks[0].id, Some("incomplete".to_string())).await.unwrap();
        assert_eq!(rejected.status, TaskStatus::Rejected);
        assert_eq!(f.engine.get(&alice, instance.id).await.unwrap().current_state, state("draft"));
        assert_eq!(f.engine.flag_overdue(Utc::now(), 10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_one_active_instance_per_document_and_cancel() {
        let f = fixture().await;
        let instance = f.engine.start(&f.owner, f.document, f.definition).await.unwrap();
        let err = f.engine.start(&f.owner, f.document, f.definition).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Conflict(_)));

        let cancelled = f.engine.cancel(&f.owner, instance.id).await.unwrap();
        assert_eq!(cancelled.status, InstanceStatus::Cancelled);
        f.engine.start(&f.owner, f.document, f.definition).await.unwrap();
    }
}
