// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Runtime governance settings
//!
//! Tunables that may change while the process runs. They are read through
//! `application::settings_cache::CachedSettings`, never straight from a
//! [`SettingsSource`], so a burst of requests after expiry triggers one
//! reload rather than one per request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::error::GovernanceError;
use crate::domain::ids::RoleId;

pub const DEFAULT_DISPOSITION_BATCH_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceSettings {
    /// Whether holders of `manage` may grant `manage` to others.
    #[serde(default)]
    pub allow_manage_delegation: bool,

    #[serde(default = "default_batch_size")]
    pub disposition_batch_size: u32,

    /// Members of these roles are treated as global administrators.
    #[serde(default)]
    pub admin_roles: BTreeSet<RoleId>,
}

fn default_batch_size() -> u32 {
    DEFAULT_DISPOSITION_BATCH_SIZE
}

impl Default for GovernanceSettings {
    fn default() -> Self {
        Self {
            allow_manage_delegation: false,
            disposition_batch_size: DEFAULT_DISPOSITION_BATCH_SIZE,
            admin_roles: BTreeSet::new(),
        }
    }
}

#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load(&self) -> Result<GovernanceSettings, GovernanceError>;
}

/// Fixed settings, typically taken from the config manifest.
#[derive(Debug, Clone, Default)]
pub struct StaticSettingsSource {
    settings: GovernanceSettings,
}

impl StaticSettingsSource {
    pub fn new(settings: GovernanceSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SettingsSource for StaticSettingsSource {
    async fn load(&self) -> Result<GovernanceSettings, GovernanceError> {
        Ok(self.settings.clone())
    }
}
