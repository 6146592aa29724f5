// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};
use url::Url;

use aegis_governance_core::domain::config::{GovernanceConfigManifest, StorageBackendKind};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./aegis-governance.yaml)
        #[arg(short, long, default_value = "./aegis-governance.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config =
        GovernanceConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AEGIS_GOV_CONFIG_PATH: {}",
            std::env::var("AEGIS_GOV_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aegis-governance.yaml");
        println!("  4. ~/.aegis/governance.yaml");
        println!("  5. /etc/aegis/governance.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config).context("Failed to render configuration")?);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Storage:".bold());
    match spec.storage.backend {
        StorageBackendKind::InMemory => println!("  Backend: in_memory"),
        StorageBackendKind::Postgres => {
            println!("  Backend: postgres");
            println!(
                "  Database URL: {}",
                spec.storage
                    .database_url
                    .as_deref()
                    .map(redact_url)
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  Max connections: {}", spec.storage.max_connections);
        }
    }
    println!();

    println!("{}", "Disposition:".bold());
    println!("  Sweep interval: {}s", spec.disposition.sweep_interval_seconds);
    println!("  Batch size: {}", spec.disposition.batch_size);
    println!();

    println!("{}", "Access:".bold());
    println!("  Manage delegation: {}", spec.access.allow_manage_delegation);
    println!("  Administrator roles: {}", spec.identity.admin_roles.len());
    println!("  Settings cache TTL: {}s", spec.settings_cache.ttl_seconds);
    println!("  Audit sink: {:?}", spec.audit.sink);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GovernanceConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let sample = sample_config(with_examples);
    std::fs::write(output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());
    Ok(())
}

pub fn sample_config(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/governance-with-examples.yaml")
    } else {
        include_str!("../../templates/governance-minimal.yaml")
    }
}

/// Hide the password part of a connection URL. Input that does not parse
/// as a URL with a host is withheld entirely.
fn redact_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return "(unparseable URL hidden)".to_string();
    };
    if parsed.host_str().is_none() {
        return "(unparseable URL hidden)".to_string();
    }
    if parsed.password().is_some() && parsed.set_password(Some("****")).is_err() {
        return "(unparseable URL hidden)".to_string();
    }
    parsed.to_string()
}
