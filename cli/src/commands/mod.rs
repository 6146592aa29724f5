// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the AEGIS governance CLI

pub mod config;
pub mod db;
pub mod sweep;
pub mod workflow;

pub use self::config::ConfigCommand;
pub use self::db::DbCommand;
pub use self::sweep::SweepCommand;
pub use self::workflow::WorkflowCommand;
