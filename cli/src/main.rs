// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Governance CLI
//!
//! The `aegis-gov` binary is the operator tool and periodic batch driver for
//! the governance core.
//!
//! ## Commands
//!
//! - `aegis-gov sweep [--watch]` - Retention disposition sweep and overdue task scan
//! - `aegis-gov config show|validate|generate` - Configuration management
//! - `aegis-gov workflow validate <FILE>` - Check a workflow definition manifest
//! - `aegis-gov db migrate [--dry-run]` - Apply schema migrations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use aegis_governance::commands::{self, ConfigCommand, DbCommand, SweepCommand, WorkflowCommand};

/// AEGIS Governance - content hierarchy, access, versioning, workflow and retention
#[derive(Parser)]
#[command(name = "aegis-gov")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AEGIS_GOV_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AEGIS_GOV_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the disposition sweep and overdue task scan
    #[command(name = "sweep")]
    Sweep {
        #[command(flatten)]
        command: SweepCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Workflow definition tools
    #[command(name = "workflow")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Database schema management
    #[command(name = "db")]
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Some(Commands::Sweep { command }) => commands::sweep::execute(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Workflow { command }) => commands::workflow::handle_command(command).await,
        Some(Commands::Db { command }) => commands::db::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
