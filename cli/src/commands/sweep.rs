// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Periodic Batch Driver
//!
//! `aegis-gov sweep` settles expired retention records and flags overdue
//! workflow tasks. One pass by default; `--watch` repeats on the configured
//! interval until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # One pass
//! aegis-gov sweep
//!
//! # Every 5 minutes until Ctrl-C
//! aegis-gov sweep --watch --interval 300
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use aegis_governance_core::application::{GovernanceCore, SweepReport};
use aegis_governance_core::domain::config::{GovernanceConfigManifest, StorageBackendKind};
use aegis_governance_core::domain::error::GovernanceError;
use aegis_governance_core::infrastructure::identity::StaticIdentityProvider;

#[derive(Args)]
pub struct SweepCommand {
    /// Keep sweeping on an interval until interrupted
    #[arg(long)]
    watch: bool,

    /// Seconds between passes (default: spec.disposition.sweep_interval_seconds)
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Maximum overdue tasks flagged per pass
    #[arg(long, default_value_t = 500)]
    overdue_limit: u32,

    /// Print each pass summary as JSON
    #[arg(long)]
    json: bool,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub disposition: SweepReport,
    pub overdue_tasks: usize,
}

pub async fn execute(cmd: SweepCommand, config_override: Option<PathBuf>) -> Result<()> {
    let manifest =
        GovernanceConfigManifest::load_or_default(config_override).context("Failed to load configuration")?;
    if manifest.spec.storage.backend == StorageBackendKind::InMemory {
        warn!("Sweeping the in-memory store; nothing persists between runs");
    }

    let identity = Arc::new(StaticIdentityProvider::new(
        manifest.spec.identity.admin_roles.iter().copied(),
    ));
    let core = GovernanceCore::from_manifest(&manifest, identity)
        .await
        .context("Failed to initialise governance core")?;

    if !cmd.watch {
        let summary = run_pass(&core, cmd.overdue_limit).await?;
        print_summary(&summary, cmd.json);
        return Ok(());
    }

    let seconds = cmd
        .interval
        .unwrap_or(manifest.spec.disposition.sweep_interval_seconds)
        .max(1);
    info!(interval_seconds = seconds, "Starting sweep loop");
    let mut ticker = tokio::time::interval(Duration::from_secs(seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_pass(&core, cmd.overdue_limit).await {
                    Ok(summary) => print_summary(&summary, cmd.json),
                    Err(e) if e.is_retryable() => warn!(error = %e, "Sweep pass hit a transient storage error; retrying next tick"),
                    Err(e) => error!(kind = e.kind(), error = %e, "Sweep pass failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; stopping sweep loop");
                break;
            }
        }
    }
    Ok(())
}

/// One disposition sweep followed by one overdue-task scan.
pub async fn run_pass(core: &GovernanceCore, overdue_limit: u32) -> Result<PassSummary, GovernanceError> {
    let now = Utc::now();
    let disposition = core.disposition.sweep(now).await?;
    let overdue_tasks = core.workflows.flag_overdue(now, overdue_limit).await?;
    Ok(PassSummary {
        disposition,
        overdue_tasks,
    })
}

fn print_summary(summary: &PassSummary, as_json: bool) {
    let report = &summary.disposition;
    if as_json {
        println!(
            "{}",
            json!({
                "at": Utc::now(),
                "disposition": report,
                "overdue_tasks": summary.overdue_tasks,
            })
        );
        return;
    }

    println!("{}", "Sweep pass".bold());
    println!("  Batches:   {}", report.batches);
    println!("  Examined:  {}", report.examined);
    println!("  Expired:   {}", report.expired);
    println!(
        "  Completed: {} (archived {}, destroyed {}, retained {})",
        report.completed().to_string().green(),
        report.archived,
        report.destroyed,
        report.retained
    );
    if report.held > 0 {
        println!("  Held:      {}", report.held.to_string().yellow());
    } else {
        println!("  Held:      0");
    }
    println!("  Skipped:   {}", report.skipped);
    println!("  Overdue workflow tasks: {}", summary.overdue_tasks);
}
