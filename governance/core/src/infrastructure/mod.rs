// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure Layer
//!
//! Adapters behind the domain contracts: persistence, the notification bus,
//! audit sinks, identity lookup and runtime settings.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements domain interfaces against external systems

pub mod audit;
pub mod db;
pub mod event_bus;
pub mod identity;
pub mod repositories;
pub mod settings;
