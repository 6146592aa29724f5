// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Approval Workflow Domain Model
//!
//! Approval routes are declarative state machines. A definition names its
//! states, the initial state, which states are terminal, and for every
//! transition the set of roles allowed to take it. An instance tracks one
//! document's progress through one definition; tasks are the individual
//! assignments a person must decide on.
//!
//! # Architectural Context
//!
//! - **Aggregate Root:** WorkflowDefinition (immutable once registered)
//! - **Aggregate Root:** WorkflowInstance (owns its Tasks)
//!
//! # Design Principles
//!
//! 1. **Self-Validating:** `WorkflowDefinition::new` enforces structure
//! 2. **Manifest Format:** definitions load from `kind: GovernanceWorkflow` YAML

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::error::GovernanceError;
use crate::domain::ids::{DocumentId, PersonId, RoleId, TaskId, WorkflowDefinitionId, WorkflowInstanceId};

pub const WORKFLOW_API_VERSION: &str = "100monkeys.ai/v1";
pub const WORKFLOW_KIND: &str = "GovernanceWorkflow";

/// Unique name for a state within a definition (e.g. "draft", "legal_review")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateName(String);

impl StateName {
    pub fn new(name: impl Into<String>) -> Result<Self, WorkflowError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WorkflowError::InvalidStateName("State name cannot be empty".to_string()));
        }
        if name.len() > 100 {
            return Err(WorkflowError::InvalidStateName(format!("State name '{}' is too long", name)));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StateName {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StateName> for String {
    fn from(value: StateName) -> Self {
        value.0
    }
}

impl std::fmt::Display for StateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub target: StateName,
    /// Roles whose members may approve this transition.
    pub roles: BTreeSet<RoleId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSpec {
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowDefinitionId,
    pub name: String,
    pub description: Option<String>,
    pub initial_state: StateName,
    pub states: HashMap<StateName, StateSpec>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// # Invariants
    /// - at least one state
    /// - `initial_state` exists and is not terminal
    /// - every transition target exists
    /// - terminal states have no outgoing transitions
    /// - every transition names at least one role
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        initial_state: StateName,
        states: HashMap<StateName, StateSpec>,
    ) -> Result<Self, WorkflowError> {
        let name = name.into();
        Self::validate_name(&name)?;

        if states.is_empty() {
            return Err(WorkflowError::NoStates);
        }

        let initial = states
            .get(&initial_state)
            .ok_or_else(|| WorkflowError::InitialStateNotFound(initial_state.clone()))?;
        if initial.terminal {
            return Err(WorkflowError::InitialStateIsTerminal(initial_state.clone()));
        }

        for (state_name, state) in &states {
            if state.terminal && !state.transitions.is_empty() {
                return Err(WorkflowError::TerminalStateHasTransitions(state_name.clone()));
            }
            let mut seen = BTreeSet::new();
            for transition in &state.transitions {
                if !states.contains_key(&transition.target) {
                    return Err(WorkflowError::TransitionTargetNotFound {
                        from_state: state_name.clone(),
                        target: transition.target.clone(),
                    });
                }
                if transition.roles.is_empty() {
                    return Err(WorkflowError::TransitionWithoutRoles {
                        from_state: state_name.clone(),
                        target: transition.target.clone(),
                    });
                }
                if !seen.insert(&transition.target) {
                    return Err(WorkflowError::DuplicateTransition {
                        from_state: state_name.clone(),
                        target: transition.target.clone(),
                    });
                }
            }
        }

        Ok(Self {
            id: WorkflowDefinitionId::new(),
            name,
            description,
            initial_state,
            states,
            is_active: true,
            created_at: Utc::now(),
        })
    }

    pub fn validate_name(name: &str) -> Result<(), WorkflowError> {
        if name.is_empty() {
            return Err(WorkflowError::InvalidDefinitionName("Name cannot be empty".to_string()));
        }
        if name.len() > 63 {
            return Err(WorkflowError::InvalidDefinitionName(format!(
                "Name '{}' exceeds 63 characters",
                name
            )));
        }
        if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(WorkflowError::InvalidDefinitionName(format!(
                "Name '{}' must be lowercase alphanumeric with hyphens",
                name
            )));
        }
        Ok(())
    }

    /// Load and validate a `kind: GovernanceWorkflow` manifest.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, WorkflowError> {
        let manifest: WorkflowManifest =
            serde_yaml::from_str(yaml).map_err(|e| WorkflowError::Parse(e.to_string()))?;
        if manifest.api_version != WORKFLOW_API_VERSION {
            return Err(WorkflowError::InvalidApiVersion(manifest.api_version));
        }
        if manifest.kind != WORKFLOW_KIND {
            return Err(WorkflowError::InvalidKind(manifest.kind));
        }
        Self::new(
            manifest.metadata.name,
            manifest.metadata.description,
            manifest.spec.initial_state,
            manifest.spec.states,
        )
    }

    pub fn state(&self, name: &StateName) -> Option<&StateSpec> {
        self.states.get(name)
    }

    pub fn transition(&self, from: &StateName, to: &StateName) -> Option<&Transition> {
        self.states.get(from)?.transitions.iter().find(|t| &t.target == to)
    }

    pub fn is_terminal(&self, state: &StateName) -> bool {
        self.states.get(state).map(|s| s.terminal).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowManifest {
    api_version: String,
    kind: String,
    metadata: WorkflowManifestMetadata,
    spec: WorkflowManifestSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkflowManifestMetadata {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkflowManifestSpec {
    initial_state: StateName,
    states: HashMap<StateName, StateSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Active,
    Completed,
    Cancelled,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Active => "active",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for InstanceStatus {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(InstanceStatus::Active),
            "completed" => Ok(InstanceStatus::Completed),
            "cancelled" => Ok(InstanceStatus::Cancelled),
            other => Err(GovernanceError::Validation(format!("unknown instance status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    pub definition_id: WorkflowDefinitionId,
    pub document_id: DocumentId,
    pub current_state: StateName,
    pub status: InstanceStatus,
    pub started_by: PersonId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn start(definition: &WorkflowDefinition, document_id: DocumentId, started_by: PersonId) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowInstanceId::new(),
            definition_id: definition.id,
            document_id,
            current_state: definition.initial_state.clone(),
            status: InstanceStatus::Active,
            started_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == InstanceStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Approved => "approved",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "approved" => Ok(TaskStatus::Approved),
            "rejected" => Ok(TaskStatus::Rejected),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(GovernanceError::Validation(format!("unknown task status '{}'", other))),
        }
    }
}

/// One person's assignment to decide one transition of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub id: TaskId,
    pub instance_id: WorkflowInstanceId,
    pub assignee: PersonId,
    pub from_state: StateName,
    pub to_state: StateName,
    pub status: TaskStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowTask {
    pub fn assign(
        instance: &WorkflowInstance,
        to_state: StateName,
        assignee: PersonId,
        due_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            instance_id: instance.id,
            assignee,
            from_state: instance.current_state.clone(),
            to_state,
            status: TaskStatus::Pending,
            due_at,
            comment: None,
            decided_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.due_at.map(|due| due < now).unwrap_or(false)
    }

    pub fn covers(&self, from: &StateName, to: &StateName) -> bool {
        &self.from_state == from && &self.to_state == to
    }
}

/// An approved advance, applied atomically with an optimistic state check.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDecision {
    pub instance_id: WorkflowInstanceId,
    pub task_id: TaskId,
    pub expected_state: StateName,
    pub new_state: StateName,
    pub completes: bool,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("Workflow must have at least one state")]
    NoStates,

    #[error("Initial state '{0}' not found in workflow states")]
    InitialStateNotFound(StateName),

    #[error("Initial state '{0}' cannot be terminal")]
    InitialStateIsTerminal(StateName),

    #[error("Transition target '{target}' not found (from state '{from_state}')")]
    TransitionTargetNotFound { from_state: StateName, target: StateName },

    #[error("Transition '{from_state}' -> '{target}' names no roles")]
    TransitionWithoutRoles { from_state: StateName, target: StateName },

    #[error("Transition '{from_state}' -> '{target}' declared twice")]
    DuplicateTransition { from_state: StateName, target: StateName },

    #[error("Terminal state '{0}' cannot have transitions")]
    TerminalStateHasTransitions(StateName),

    #[error("Invalid workflow name: {0}")]
    InvalidDefinitionName(String),

    #[error("Invalid state name: {0}")]
    InvalidStateName(String),

    #[error("Invalid API version: expected '100monkeys.ai/v1', got '{0}'")]
    InvalidApiVersion(String),

    #[error("Invalid kind: expected 'GovernanceWorkflow', got '{0}'")]
    InvalidKind(String),

    #[error("Workflow manifest parse error: {0}")]
    Parse(String),
}

impl From<WorkflowError> for GovernanceError {
    fn from(err: WorkflowError) -> Self {
        GovernanceError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(name: &str) -> StateName {
        StateName::new(name).unwrap()
    }

    fn route(target: &str, role: RoleId) -> Transition {
        Transition {
            target: state(target),
            roles: BTreeSet::from([role]),
        }
    }

    fn two_step(role: RoleId) -> HashMap<StateName, StateSpec> {
        HashMap::from([
            (state("draft"), StateSpec { transitions: vec![route("review", role)], terminal: false }),
            (state("review"), StateSpec { transitions: vec![route("approved", role)], terminal: false }),
            (state("approved"), StateSpec { transitions: vec![], terminal: true }),
        ])
    }

    #[test]
    fn test_valid_definition() {
        let role = RoleId::new();
        let def = WorkflowDefinition::new("contract-approval", None, state("draft"), two_step(role)).unwrap();
        assert!(def.transition(&state("draft"), &state("review")).is_some());
        assert!(def.transition(&state("draft"), &state("approved")).is_none());
        assert!(def.is_terminal(&state("approved")));
        assert!(!def.is_terminal(&state("nowhere")));
    }

    #[test]
    fn test_missing_initial_state() {
        let err = WorkflowDefinition::new("x", None, state("nowhere"), two_step(RoleId::new())).unwrap_err();
        assert!(matches!(err, WorkflowError::InitialStateNotFound(_)));
    }

    #[test]
    fn test_dangling_transition_target() {
        let role = RoleId::new();
        let mut states = two_step(role);
        states.insert(state("review"), StateSpec { transitions: vec![route("limbo", role)], terminal: false });
        let err = WorkflowDefinition::new("x", None, state("draft"), states).unwrap_err();
        assert!(matches!(err, WorkflowError::TransitionTargetNotFound { .. }));
    }

    #[test]
    fn test_transition_requires_roles() {
        let mut states = two_step(RoleId::new());
        states.insert(
            state("draft"),
            StateSpec {
                transitions: vec![Transition { target: state("review"), roles: BTreeSet::new() }],
                terminal: false,
            },
        );
        let err = WorkflowDefinition::new("x", None, state("draft"), states).unwrap_err();
        assert!(matches!(err, WorkflowError::TransitionWithoutRoles { .. }));
    }

    #[test]
    fn test_terminal_initial_state_rejected() {
        let states = HashMap::from([(state("done"), StateSpec { transitions: vec![], terminal: true })]);
        let err = WorkflowDefinition::new("x", None, state("done"), states).unwrap_err();
        assert!(matches!(err, WorkflowError::InitialStateIsTerminal(_)));
    }

    #[test]
    fn test_from_yaml_manifest() {
        let role = RoleId::new();
        let yaml = format!(
            r#"
apiVersion: 100monkeys.ai/v1
kind: GovernanceWorkflow
metadata:
  name: policy-sign-off
  description: Two-step sign-off
spec:
  initial_state: draft
  states:
    draft:
      transitions:
        - target: signed
          roles: ["{role}"]
    signed:
      terminal: true
"#
        );
        let def = WorkflowDefinition::from_yaml_str(&yaml).unwrap();
        assert_eq!(def.name, "policy-sign-off");
        let transition = def.transition(&state("draft"), &state("signed")).unwrap();
        assert!(transition.roles.contains(&role));
    }

    #[test]
    fn test_yaml_wrong_kind() {
        let yaml = "apiVersion: 100monkeys.ai/v1\nkind: Workflow\nmetadata: {name: x}\nspec: {initial_state: a, states: {a: {}}}\n";
        assert!(matches!(WorkflowDefinition::from_yaml_str(yaml), Err(WorkflowError::InvalidKind(_))));
    }

    #[test]
    fn test_overdue_only_while_pending() {
        let def = WorkflowDefinition::new("x", None, state("draft"), two_step(RoleId::new())).unwrap();
        let instance = WorkflowInstance::start(&def, DocumentId::new(), PersonId::new());
        let past = Utc::now() - chrono::Duration::hours(1);
        let mut task = WorkflowTask::assign(&instance, state("review"), PersonId::new(), Some(past));
        assert!(task.is_overdue(Utc::now()));
        task.status = TaskStatus::Approved;
        assert!(!task.is_overdue(Utc::now()));
    }
}
