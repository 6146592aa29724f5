// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Node Repository
//!
//! Folder and category hierarchy over the `nodes` table. Paths are stored as
//! `/<uuid>/<uuid>/` in a byte-collated column so a subtree is one range scan
//! on the unique path index.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `NodeRepository`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::hierarchy::{MaterializedPath, Node, NodeKind};
use crate::domain::ids::{NodeId, PersonId};
use crate::domain::repository::{NodeRelocation, NodeRepository, RepositoryError};

const NODE_COLUMNS: &str = "id, kind, name, parent_id, path, depth, is_active, created_by, created_at, updated_at";

pub struct PostgresNodeRepository {
    pool: PgPool,
}

impl PostgresNodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_node_row(row: &PgRow) -> Result<Node, RepositoryError> {
    let kind: String = row.try_get("kind")?;
    let path: String = row.try_get("path")?;
    let depth: i32 = row.try_get("depth")?;
    Ok(Node {
        id: NodeId::from_uuid(row.try_get("id")?),
        kind: kind.parse::<NodeKind>()?,
        name: row.try_get("name")?,
        parent_id: row.try_get::<Option<Uuid>, _>("parent_id")?.map(NodeId::from_uuid),
        path: MaterializedPath::from_key(&path)?,
        depth: u32::try_from(depth)
            .map_err(|_| RepositoryError::Integrity(format!("negative depth {} stored for node", depth)))?,
        is_active: row.try_get("is_active")?,
        created_by: PersonId::from_uuid(row.try_get("created_by")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl NodeRepository for PostgresNodeRepository {
    async fn insert(&self, node: &Node) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Pin the parent so a concurrent move or delete of it serializes with us.
        if let Some(parent_id) = node.parent_id {
            let parent = sqlx::query("SELECT path, is_active FROM nodes WHERE id = $1 FOR SHARE")
                .bind(parent_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(format!("node {}", parent_id)))?;
            let parent_path: String = parent.try_get("path")?;
            let parent_active: bool = parent.try_get("is_active")?;
            let expected = MaterializedPath::child_of(&MaterializedPath::from_key(&parent_path)?, node.id);
            if !parent_active || expected != node.path {
                return Err(RepositoryError::StaleState(format!("node {} changed since it was read", parent_id)));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO nodes (id, kind, name, parent_id, path, depth, is_active, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(node.id.as_uuid())
        .bind(node.kind.as_str())
        .bind(&node.name)
        .bind(node.parent_id.map(|p| p.as_uuid()))
        .bind(node.path.to_key())
        .bind(node.depth as i32)
        .bind(node.is_active)
        .bind(node.created_by.as_uuid())
        .bind(node.created_at)
        .bind(node.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, RepositoryError> {
        let sql = format!("SELECT {} FROM nodes WHERE id = $1", NODE_COLUMNS);
        let row = sqlx::query(&sql).bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_node_row).transpose()
    }

    async fn find_many(&self, ids: &[NodeId]) -> Result<Vec<Node>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let sql = format!("SELECT {} FROM nodes WHERE id = ANY($1)", NODE_COLUMNS);
        let rows = sqlx::query(&sql).bind(&uuids).fetch_all(&self.pool).await?;
        rows.iter().map(parse_node_row).collect()
    }

    async fn find_children(&self, parent: NodeId) -> Result<Vec<Node>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE parent_id = $1 AND is_active ORDER BY name",
            NODE_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(parent.as_uuid()).fetch_all(&self.pool).await?;
        rows.iter().map(parse_node_row).collect()
    }

    async fn find_roots(&self, kind: NodeKind) -> Result<Vec<Node>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE parent_id IS NULL AND kind = $1 AND is_active ORDER BY name",
            NODE_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(kind.as_str()).fetch_all(&self.pool).await?;
        rows.iter().map(parse_node_row).collect()
    }

    async fn find_subtree(&self, root: &MaterializedPath) -> Result<Vec<Node>, RepositoryError> {
        let (lo, hi) = root.key_range();
        let sql = format!(
            "SELECT {} FROM nodes WHERE path >= $1 AND path < $2 ORDER BY path",
            NODE_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(lo).bind(hi).fetch_all(&self.pool).await?;
        rows.iter().map(parse_node_row).collect()
    }

    async fn relocate(&self, relocation: &NodeRelocation) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut lock_ids = vec![relocation.node_id.as_uuid()];
        if let Some((parent_id, _)) = &relocation.new_parent {
            lock_ids.push(parent_id.as_uuid());
        }
        lock_ids.sort();
        let locked = sqlx::query("SELECT id, path, is_active FROM nodes WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&lock_ids)
            .fetch_all(&mut *tx)
            .await?;
        let current_path = |id: NodeId| -> Result<Option<(MaterializedPath, bool)>, RepositoryError> {
            for row in &locked {
                let row_id: Uuid = row.try_get("id")?;
                if row_id == id.as_uuid() {
                    let path: String = row.try_get("path")?;
                    return Ok(Some((MaterializedPath::from_key(&path)?, row.try_get("is_active")?)));
                }
            }
            Ok(None)
        };

        match current_path(relocation.node_id)? {
            None => return Err(RepositoryError::NotFound(format!("node {}", relocation.node_id))),
            Some((path, active)) if !active || path != relocation.from_path => {
                return Err(RepositoryError::StaleState(format!(
                    "node {} changed since it was read",
                    relocation.node_id
                )))
            }
            Some(_) => {}
        }
        if let Some((parent_id, expected_path)) = &relocation.new_parent {
            match current_path(*parent_id)? {
                None => return Err(RepositoryError::NotFound(format!("node {}", parent_id))),
                Some((path, active)) if !active || &path != expected_path => {
                    return Err(RepositoryError::StaleState(format!("node {} changed since it was read", parent_id)))
                }
                Some((path, _)) if path.contains(relocation.node_id) => {
                    return Err(RepositoryError::StaleState(format!(
                        "node {} is now inside the subtree being moved",
                        parent_id
                    )))
                }
                Some(_) => {}
            }
        }

        // Lock the whole subtree before rewriting it so inserts beneath any
        // descendant either finish first or observe the new paths.
        let (lo, hi) = relocation.from_path.key_range();
        sqlx::query("SELECT id FROM nodes WHERE path >= $1 AND path < $2 FOR UPDATE")
            .bind(&lo)
            .bind(&hi)
            .fetch_all(&mut *tx)
            .await?;

        let target = relocation.target_path();
        let depth_delta = target.depth() as i32 - relocation.from_path.depth() as i32;
        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET path = $1 || substr(path, $2),
                depth = depth + $3,
                updated_at = $4
            WHERE path >= $5 AND path < $6
            "#,
        )
        .bind(target.to_key())
        .bind(lo.len() as i32 + 1)
        .bind(depth_delta)
        .bind(relocation.at)
        .bind(&lo)
        .bind(&hi)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE nodes SET parent_id = $1 WHERE id = $2")
            .bind(relocation.new_parent.as_ref().map(|(p, _)| p.as_uuid()))
            .bind(relocation.node_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn deactivate_subtree(&self, root: &MaterializedPath, at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let (lo, hi) = root.key_range();
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM nodes WHERE path = $1 FOR UPDATE")
            .bind(&lo)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound(format!("node at {}", root)));
        }

        let result = sqlx::query(
            "UPDATE nodes SET is_active = FALSE, updated_at = $1 WHERE path >= $2 AND path < $3 AND is_active",
        )
        .bind(at)
        .bind(&lo)
        .bind(&hi)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
