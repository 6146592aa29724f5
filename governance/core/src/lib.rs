// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS Governance Core
//!
//! Content governance for documents held in a folder hierarchy: who may touch
//! them, which revision is current, which approval route they are on, and when
//! they must be archived or destroyed.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Hierarchy, authorization, versioning, workflow and retention engines

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
