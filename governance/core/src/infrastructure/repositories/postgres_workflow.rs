// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Workflow Repository
//!
//! Definitions keep their state map as JSONB. Instances and tasks are plain
//! rows; every state change re-reads the instance `FOR UPDATE` and compares
//! its current state with the one the caller decided against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::ids::{DocumentId, PersonId, TaskId, WorkflowDefinitionId, WorkflowInstanceId};
use crate::domain::repository::{RepositoryError, WorkflowRepository};
use crate::domain::workflow::{
    InstanceStatus, StateName, TaskStatus, WorkflowDecision, WorkflowDefinition, WorkflowInstance, WorkflowTask,
};

const DEFINITION_COLUMNS: &str = "id, name, description, initial_state, states, is_active, created_at";
const INSTANCE_COLUMNS: &str = "id, definition_id, document_id, current_state, status, started_by, created_at, updated_at";
const TASK_COLUMNS: &str =
    "id, instance_id, assignee_id, from_state, to_state, status, due_at, comment, decided_at, created_at";

pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn state_column(row: &PgRow, column: &str) -> Result<StateName, RepositoryError> {
    let raw: String = row.try_get(column)?;
    StateName::new(raw).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn parse_definition_row(row: &PgRow) -> Result<WorkflowDefinition, RepositoryError> {
    let states: serde_json::Value = row.try_get("states")?;
    Ok(WorkflowDefinition {
        id: WorkflowDefinitionId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        initial_state: state_column(row, "initial_state")?,
        states: serde_json::from_value(states)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_instance_row(row: &PgRow) -> Result<WorkflowInstance, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(WorkflowInstance {
        id: WorkflowInstanceId::from_uuid(row.try_get("id")?),
        definition_id: WorkflowDefinitionId::from_uuid(row.try_get("definition_id")?),
        document_id: DocumentId::from_uuid(row.try_get("document_id")?),
        current_state: state_column(row, "current_state")?,
        status: status.parse::<InstanceStatus>()?,
        started_by: PersonId::from_uuid(row.try_get("started_by")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_task_row(row: &PgRow) -> Result<WorkflowTask, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(WorkflowTask {
        id: TaskId::from_uuid(row.try_get("id")?),
        instance_id: WorkflowInstanceId::from_uuid(row.try_get("instance_id")?),
        assignee: PersonId::from_uuid(row.try_get("assignee_id")?),
        from_state: state_column(row, "from_state")?,
        to_state: state_column(row, "to_state")?,
        status: status.parse::<TaskStatus>()?,
        due_at: row.try_get("due_at")?,
        comment: row.try_get("comment")?,
        decided_at: row.try_get("decided_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl PostgresWorkflowRepository {
    async fn lock_instance(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: WorkflowInstanceId,
    ) -> Result<WorkflowInstance, RepositoryError> {
        let sql = format!("SELECT {} FROM workflow_instances WHERE id = $1 FOR UPDATE", INSTANCE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("workflow instance {}", id)))?;
        parse_instance_row(&row)
    }
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let states = serde_json::to_value(&definition.states)?;
        sqlx::query(
            r#"
            INSERT INTO workflow_definitions (id, name, description, initial_state, states, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                initial_state = EXCLUDED.initial_state,
                states = EXCLUDED.states,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(definition.id.as_uuid())
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(definition.initial_state.as_str())
        .bind(states)
        .bind(definition.is_active)
        .bind(definition.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_definition(&self, id: WorkflowDefinitionId) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let sql = format!("SELECT {} FROM workflow_definitions WHERE id = $1", DEFINITION_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_definition_row).transpose()
    }

    async fn find_definition_by_name(&self, name: &str) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let sql = format!("SELECT {} FROM workflow_definitions WHERE name = $1", DEFINITION_COLUMNS);
        let row = sqlx::query(&sql).bind(name).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_definition_row).transpose()
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let sql = format!("SELECT {} FROM workflow_definitions ORDER BY name", DEFINITION_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(parse_definition_row).collect()
    }

    async fn start_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        // uq_workflow_instance_active rejects a second active run.
        sqlx::query(
            r#"
            INSERT INTO workflow_instances (
                id, definition_id, document_id, current_state, status, started_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(instance.id.as_uuid())
        .bind(instance.definition_id.as_uuid())
        .bind(instance.document_id.as_uuid())
        .bind(instance.current_state.as_str())
        .bind(instance.status.as_str())
        .bind(instance.started_by.as_uuid())
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_instance(&self, id: WorkflowInstanceId) -> Result<Option<WorkflowInstance>, RepositoryError> {
        let sql = format!("SELECT {} FROM workflow_instances WHERE id = $1", INSTANCE_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_instance_row).transpose()
    }

    async fn find_instances_for_document(&self, document: DocumentId) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM workflow_instances WHERE document_id = $1 ORDER BY created_at",
            INSTANCE_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(document.as_uuid()).fetch_all(&self.pool).await?;
        rows.iter().map(parse_instance_row).collect()
    }

    async fn insert_tasks(
        &self,
        instance: WorkflowInstanceId,
        expected_state: &StateName,
        tasks: &[WorkflowTask],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::lock_instance(&mut tx, instance).await?;
        if !current.is_active() || &current.current_state != expected_state {
            return Err(RepositoryError::StaleState(format!(
                "workflow instance {} is no longer at '{}'",
                instance, expected_state
            )));
        }

        for task in tasks {
            sqlx::query(
                r#"
                INSERT INTO workflow_tasks (
                    id, instance_id, assignee_id, from_state, to_state, status, due_at, comment, decided_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(task.id.as_uuid())
            .bind(task.instance_id.as_uuid())
            .bind(task.assignee.as_uuid())
            .bind(task.from_state.as_str())
            .bind(task.to_state.as_str())
            .bind(task.status.as_str())
            .bind(task.due_at)
            .bind(&task.comment)
            .bind(task.decided_at)
            .bind(task.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<WorkflowTask>, RepositoryError> {
        let sql = format!("SELECT {} FROM workflow_tasks WHERE id = $1", TASK_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_task_row).transpose()
    }

    async fn find_tasks(&self, instance: WorkflowInstanceId) -> Result<Vec<WorkflowTask>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM workflow_tasks WHERE instance_id = $1 ORDER BY created_at, id",
            TASK_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(instance.as_uuid()).fetch_all(&self.pool).await?;
        rows.iter().map(parse_task_row).collect()
    }

    async fn apply_decision(&self, decision: &WorkflowDecision) -> Result<WorkflowInstance, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut instance = Self::lock_instance(&mut tx, decision.instance_id).await?;
        if !instance.is_active() || instance.current_state != decision.expected_state {
            return Err(RepositoryError::StaleState(format!(
                "workflow instance {} is no longer at '{}'",
                decision.instance_id, decision.expected_state
            )));
        }

        let sql = format!("SELECT {} FROM workflow_tasks WHERE id = $1 FOR UPDATE", TASK_COLUMNS);
        let task = sqlx::query(&sql)
            .bind(decision.task_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(parse_task_row)
            .transpose()?;
        let task_open = task
            .map(|t| {
                t.is_pending()
                    && t.instance_id == decision.instance_id
                    && t.covers(&decision.expected_state, &decision.new_state)
            })
            .unwrap_or(false);
        if !task_open {
            return Err(RepositoryError::StaleState(format!("task {} is no longer open", decision.task_id)));
        }

        sqlx::query("UPDATE workflow_tasks SET status = 'approved', comment = $2, decided_at = $3 WHERE id = $1")
            .bind(decision.task_id.as_uuid())
            .bind(&decision.comment)
            .bind(decision.decided_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE workflow_tasks
            SET status = 'cancelled', decided_at = $4
            WHERE instance_id = $1 AND status = 'pending' AND id <> $2
              AND (from_state = $3 OR $5)
            "#,
        )
        .bind(decision.instance_id.as_uuid())
        .bind(decision.task_id.as_uuid())
        .bind(decision.expected_state.as_str())
        .bind(decision.decided_at)
        .bind(decision.completes)
        .execute(&mut *tx)
        .await?;

        instance.current_state = decision.new_state.clone();
        instance.updated_at = decision.decided_at;
        if decision.completes {
            instance.status = InstanceStatus::Completed;
        }
        sqlx::query("UPDATE workflow_instances SET current_state = $2, status = $3, updated_at = $4 WHERE id = $1")
            .bind(instance.id.as_uuid())
            .bind(instance.current_state.as_str())
            .bind(instance.status.as_str())
            .bind(instance.updated_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(instance)
    }

    async fn reject_task(
        &self,
        task: TaskId,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<WorkflowTask, RepositoryError> {
        let sql = format!(
            "UPDATE workflow_tasks SET status = 'rejected', comment = $2, decided_at = $3 \
             WHERE id = $1 AND status = 'pending' RETURNING {}",
            TASK_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(task.as_uuid())
            .bind(&comment)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => parse_task_row(&row),
            None => match self.find_task(task).await? {
                Some(_) => Err(RepositoryError::StaleState(format!("task {} is no longer open", task))),
                None => Err(RepositoryError::NotFound(format!("task {}", task))),
            },
        }
    }

    async fn cancel_instance(&self, id: WorkflowInstanceId, at: DateTime<Utc>) -> Result<WorkflowInstance, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut instance = Self::lock_instance(&mut tx, id).await?;
        if !instance.is_active() {
            return Err(RepositoryError::StaleState(format!("workflow instance {} is not active", id)));
        }
        instance.status = InstanceStatus::Cancelled;
        instance.updated_at = at;

        sqlx::query("UPDATE workflow_instances SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(instance.status.as_str())
            .bind(at)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE workflow_tasks SET status = 'cancelled', decided_at = $2 WHERE instance_id = $1 AND status = 'pending'",
        )
        .bind(id.as_uuid())
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(instance)
    }

    async fn find_overdue_tasks(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<WorkflowTask>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM workflow_tasks WHERE status = 'pending' AND due_at < $1 ORDER BY due_at, id LIMIT $2",
            TASK_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(now).bind(limit as i64).fetch_all(&self.pool).await?;
        rows.iter().map(parse_task_row).collect()
    }
}
