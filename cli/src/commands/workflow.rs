// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow definition commands
//!
//! Commands: validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use aegis_governance_core::domain::workflow::WorkflowDefinition;

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Parse and validate a GovernanceWorkflow manifest
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: WorkflowCommand) -> Result<()> {
    match command {
        WorkflowCommand::Validate { file } => validate(file).await,
    }
}

async fn validate(file: PathBuf) -> Result<()> {
    let yaml = std::fs::read_to_string(&file).with_context(|| format!("Failed to read {:?}", file))?;
    let definition = WorkflowDefinition::from_yaml_str(&yaml)
        .with_context(|| format!("Invalid workflow definition in {:?}", file))?;

    println!("{}", format!("✓ Workflow '{}' is valid", definition.name).green());
    let mut states: Vec<_> = definition.states.iter().collect();
    states.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    for (name, state) in states {
        let marker = if name == &definition.initial_state {
            " (initial)"
        } else if state.terminal {
            " (terminal)"
        } else {
            ""
        };
        println!("  {}{}", name.as_str().bold(), marker);
        for transition in &state.transitions {
            println!(
                "    -> {} [{} role(s)]",
                transition.target.as_str(),
                transition.roles.len()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_governance_core::domain::workflow::StateName;

    const CONTRACT_REVIEW: &str = include_str!("../../templates/workflow-contract-review.yaml");

    #[test]
    fn test_contract_review_template_is_valid() {
        let definition = WorkflowDefinition::from_yaml_str(CONTRACT_REVIEW).unwrap();
        assert_eq!(definition.name, "contract-review");
        let approved = StateName::new("approved").unwrap();
        assert!(definition.is_terminal(&approved));
        let review = StateName::new("legal_review").unwrap();
        assert_eq!(definition.state(&review).unwrap().transitions.len(), 2);
    }

    #[tokio::test]
    async fn test_validate_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.yaml");
        std::fs::write(&path, CONTRACT_REVIEW).unwrap();
        validate(path).await.unwrap();

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, CONTRACT_REVIEW.replace("initial_state: draft", "initial_state: nowhere")).unwrap();
        assert!(validate(broken).await.is_err());
    }
}
