// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Commands
//!
//! `aegis-gov db migrate` applies the governance schema migrations embedded
//! in the core crate.
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! aegis-gov db migrate
//!
//! # Preview migrations without applying
//! aegis-gov db migrate --dry-run
//! ```
//!
//! # Environment
//!
//! The database URL comes from the configuration manifest or
//! `AEGIS_GOV_DATABASE_URL`.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashSet;
use std::path::PathBuf;

use aegis_governance_core::domain::config::GovernanceConfigManifest;
use aegis_governance_core::infrastructure::db::MIGRATOR;

#[derive(Subcommand)]
pub enum DbCommand {
    /// Apply pending schema migrations
    Migrate {
        /// Perform a dry run without applying changes
        #[arg(long)]
        dry_run: bool,
    },
}

pub async fn handle_command(command: DbCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        DbCommand::Migrate { dry_run } => migrate(config_override, dry_run).await,
    }
}

async fn migrate(config_override: Option<PathBuf>, dry_run: bool) -> Result<()> {
    println!("{}", "AEGIS Governance schema".bold().green());

    let manifest =
        GovernanceConfigManifest::load_or_default(config_override).context("Failed to load configuration")?;
    let database_url = manifest
        .spec
        .storage
        .database_url
        .clone()
        .context("No database URL configured. Set spec.storage.database_url or AEGIS_GOV_DATABASE_URL.")?;

    println!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    // The bookkeeping table does not exist before the first run.
    let applied: HashSet<i64> = sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success")
        .fetch_all(&pool)
        .await
        .map(|versions| versions.into_iter().collect())
        .unwrap_or_default();

    let pending: Vec<_> = MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration() && !applied.contains(&m.version))
        .collect();
    println!(
        "Migration status: {} applied, {} pending.",
        applied.len(),
        pending.len()
    );

    if pending.is_empty() {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if dry_run {
        println!("Pending migrations (dry run):");
        for migration in &pending {
            println!("  - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    MIGRATOR.run(&pool).await.context("Failed to apply migrations")?;
    println!("{}", "✓ Database updated successfully.".green());
    Ok(())
}
