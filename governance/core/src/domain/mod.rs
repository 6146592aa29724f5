// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Entities, value objects and the persistence/collaborator contracts of the
//! governance bounded context.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure governance model, no I/O

pub mod ids;
pub mod error;
pub mod actor;
pub mod hierarchy;
pub mod acl;
pub mod document;
pub mod workflow;
pub mod retention;
pub mod events;
pub mod settings;
pub mod config;
pub mod repository;
