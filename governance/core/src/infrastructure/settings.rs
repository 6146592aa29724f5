// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL-backed settings source
//!
//! Operators change runtime tunables by writing the `governance` row of the
//! `governance_settings` table. Until that row exists the manifest-derived
//! defaults apply.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::debug;

use crate::domain::error::GovernanceError;
use crate::domain::repository::RepositoryError;
use crate::domain::settings::{GovernanceSettings, SettingsSource};

const SETTINGS_KEY: &str = "governance";

pub struct PostgresSettingsSource {
    pool: PgPool,
    fallback: GovernanceSettings,
}

impl PostgresSettingsSource {
    pub fn new(pool: PgPool, fallback: GovernanceSettings) -> Self {
        Self { pool, fallback }
    }

    /// Overwrite the stored settings row.
    pub async fn store(&self, settings: &GovernanceSettings) -> Result<(), GovernanceError> {
        let value = serde_json::to_value(settings).map_err(RepositoryError::from)?;
        sqlx::query(
            r#"
            INSERT INTO governance_settings (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(SETTINGS_KEY)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }
}

#[async_trait]
impl SettingsSource for PostgresSettingsSource {
    async fn load(&self) -> Result<GovernanceSettings, GovernanceError> {
        let row = sqlx::query("SELECT value FROM governance_settings WHERE key = $1")
            .bind(SETTINGS_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("value").map_err(RepositoryError::from)?;
                Ok(serde_json::from_value(value).map_err(RepositoryError::from)?)
            }
            None => {
                debug!("No stored governance settings, using configured defaults");
                Ok(self.fallback.clone())
            }
        }
    }
}
