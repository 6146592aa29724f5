// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Governance Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing how a
// governance node is wired:
// - storage backend (in-memory or PostgreSQL)
// - disposition sweep cadence and batch size
// - access-control and identity tunables
// - settings cache TTL and audit sink
// - logging

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::domain::ids::RoleId;
use crate::domain::settings::{GovernanceSettings, DEFAULT_DISPOSITION_BATCH_SIZE};

pub const CONFIG_API_VERSION: &str = "100monkeys.ai/v1";
pub const CONFIG_KIND: &str = "GovernanceConfig";

/// Top-level governance configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GovernanceConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GovernanceConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceConfigSpec {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub disposition: DispositionConfig,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub settings_cache: SettingsCacheConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackendKind,

    /// PostgreSQL connection URL (required when backend is postgres)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispositionConfig {
    /// Seconds between sweeps in `aegis-gov sweep --watch`
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Records settled per storage transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for DispositionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub allow_manage_delegation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub admin_roles: BTreeSet<RoleId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsCacheConfig {
    #[serde(default = "default_settings_ttl")]
    pub ttl_seconds: u64,
}

impl Default for SettingsCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_settings_ttl(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    Tracing,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_sink")]
    pub sink: AuditSinkKind,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: default_audit_sink(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or text
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_backend() -> StorageBackendKind {
    StorageBackendKind::InMemory
}

fn default_max_connections() -> u32 {
    5
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_batch_size() -> u32 {
    DEFAULT_DISPOSITION_BATCH_SIZE
}

fn default_settings_ttl() -> u64 {
    60
}

fn default_audit_sink() -> AuditSinkKind {
    AuditSinkKind::Tracing
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for GovernanceConfigManifest {
    fn default() -> Self {
        Self {
            api_version: CONFIG_API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ManifestMetadata {
                name: "aegis-governance".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GovernanceConfigSpec::default(),
        }
    }
}

impl GovernanceConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_GOV_CONFIG_PATH environment variable
    /// 2. ./aegis-governance.yaml (working directory)
    /// 3. ~/.aegis/governance.yaml (user home)
    /// 4. /etc/aegis/governance.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_GOV_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-governance.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("governance.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/aegis/governance.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("AEGIS_GOV_DATABASE_URL") {
            tracing::info!("Environment override: AEGIS_GOV_DATABASE_URL (backend=postgres)");
            self.spec.storage.backend = StorageBackendKind::Postgres;
            self.spec.storage.database_url = Some(url);
        }

        if let Ok(val) = std::env::var("AEGIS_GOV_SWEEP_BATCH_SIZE") {
            match val.parse::<u32>() {
                Ok(size) if size > 0 => {
                    tracing::info!("Environment override: AEGIS_GOV_SWEEP_BATCH_SIZE={}", size);
                    self.spec.disposition.batch_size = size;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for AEGIS_GOV_SWEEP_BATCH_SIZE: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("AEGIS_GOV_ALLOW_MANAGE_DELEGATION") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: AEGIS_GOV_ALLOW_MANAGE_DELEGATION=true");
                    self.spec.access.allow_manage_delegation = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: AEGIS_GOV_ALLOW_MANAGE_DELEGATION=false");
                    self.spec.access.allow_manage_delegation = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for AEGIS_GOV_ALLOW_MANAGE_DELEGATION: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != CONFIG_API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, CONFIG_API_VERSION);
        }

        if self.kind != CONFIG_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, CONFIG_KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let storage = &self.spec.storage;
        if storage.backend == StorageBackendKind::Postgres {
            match storage.database_url.as_deref() {
                None | Some("") => anyhow::bail!("spec.storage.database_url is required for the postgres backend"),
                Some(raw) => {
                    let parsed = url::Url::parse(raw)
                        .map_err(|e| anyhow::anyhow!("spec.storage.database_url is not a valid URL: {}", e))?;
                    if !matches!(parsed.scheme(), "postgres" | "postgresql") || parsed.host_str().map_or(true, str::is_empty) {
                        anyhow::bail!("spec.storage.database_url must be a postgres:// URL with a host");
                    }
                }
            }
        }
        if storage.max_connections == 0 {
            anyhow::bail!("spec.storage.max_connections must be at least 1");
        }

        if self.spec.disposition.batch_size == 0 {
            anyhow::bail!("spec.disposition.batch_size must be at least 1");
        }
        if self.spec.disposition.sweep_interval_seconds == 0 {
            anyhow::bail!("spec.disposition.sweep_interval_seconds must be at least 1");
        }

        if self.spec.audit.sink == AuditSinkKind::Postgres && storage.backend != StorageBackendKind::Postgres {
            anyhow::bail!("spec.audit.sink 'postgres' requires the postgres storage backend");
        }

        match self.spec.observability.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Invalid log level '{}'", other),
        }

        Ok(())
    }

    /// Initial runtime settings derived from this manifest.
    pub fn settings(&self) -> GovernanceSettings {
        GovernanceSettings {
            allow_manage_delegation: self.spec.access.allow_manage_delegation,
            disposition_batch_size: self.spec.disposition.batch_size,
            admin_roles: self.spec.identity.admin_roles.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_manifest() {
        let manifest = GovernanceConfigManifest::default();
        assert_eq!(manifest.api_version, "100monkeys.ai/v1");
        assert_eq!(manifest.kind, "GovernanceConfig");
        assert_eq!(manifest.spec.storage.backend, StorageBackendKind::InMemory);
        assert!(!manifest.spec.access.allow_manage_delegation);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: GovernanceConfig
metadata:
  name: records-node
spec:
  storage:
    backend: postgres
    database_url: postgres://aegis@localhost/governance
  disposition:
    batch_size: 25
"#;
        let manifest = GovernanceConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.storage.max_connections, 5);
        assert_eq!(manifest.spec.disposition.batch_size, 25);
        assert_eq!(manifest.spec.disposition.sweep_interval_seconds, 3600);
        assert_eq!(manifest.spec.settings_cache.ttl_seconds, 60);
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.settings().disposition_batch_size, 25);
    }

    #[test]
    fn test_validation() {
        let mut manifest = GovernanceConfigManifest::default();
        manifest.spec.storage.backend = StorageBackendKind::Postgres;
        assert!(manifest.validate().is_err());

        manifest.spec.storage.database_url = Some("mysql://nope".to_string());
        assert!(manifest.validate().is_err());

        manifest.spec.storage.database_url = Some("postgres:///gov".to_string());
        assert!(manifest.validate().is_err());

        manifest.spec.storage.database_url = Some("not a url".to_string());
        assert!(manifest.validate().is_err());

        manifest.spec.storage.database_url = Some("postgres://localhost/gov".to_string());
        assert!(manifest.validate().is_ok());

        manifest.spec.disposition.batch_size = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = GovernanceConfigManifest::default();
        manifest.spec.audit.sink = AuditSinkKind::Postgres;
        assert!(manifest.validate().is_err());

        let mut manifest = GovernanceConfigManifest::default();
        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let mut manifest = GovernanceConfigManifest::default();
        manifest.spec.identity.admin_roles.insert(RoleId::new());
        manifest.spec.access.allow_manage_delegation = true;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governance.yaml");
        manifest.to_yaml_file(&path).unwrap();

        let loaded = GovernanceConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(loaded.spec.identity.admin_roles, manifest.spec.identity.admin_roles);
        assert!(loaded.settings().allow_manage_delegation);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(GovernanceConfigManifest::load_or_default(Some(missing)).is_err());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "apiVersion: [unterminated").unwrap();
        assert!(GovernanceConfigManifest::from_yaml_file(file.path()).is_err());
    }
}
