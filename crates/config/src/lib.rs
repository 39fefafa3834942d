//! Configuration loading, validation, and management for the spancost exporter.
//!
//! Loads configuration from `~/.spancost/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Attribute keys searched for the acting user, in priority order.
pub const DEFAULT_USER_ID_ATTRIBUTES: &[&str] = &[
    "ai.telemetry.metadata.userId",
    "ai.telemetry.metadata.user_id",
    "ai.user.id",
    "gen_ai.user.id",
    "app.user.id",
    "user.id",
    "userId",
];

/// Attribute keys searched for the acting workspace, in priority order.
pub const DEFAULT_WORKSPACE_ID_ATTRIBUTES: &[&str] = &[
    "ai.telemetry.metadata.workspaceId",
    "ai.telemetry.metadata.workspace_id",
    "ai.workspace.id",
    "app.workspace.id",
    "workspace.id",
    "workspaceId",
];

/// The exporter configuration.
///
/// Maps directly to `~/.spancost/config.toml`:
///
/// ```toml
/// include_attributes = false
/// price_catalog = "/etc/spancost/prices.json"
///
/// [model_mapping]
/// "my-gpt4-deployment" = "gpt-4o"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Span attribute keys that carry a per-call user id
    #[serde(default = "default_user_id_attributes")]
    pub user_id_attributes: Vec<String>,

    /// Span attribute keys that carry a per-call workspace id
    #[serde(default = "default_workspace_id_attributes")]
    pub workspace_id_attributes: Vec<String>,

    /// Deployment/proxy model name → catalog model id
    #[serde(default)]
    pub model_mapping: BTreeMap<String, String>,

    /// Copy raw span attributes onto every emitted record (debugging aid)
    #[serde(default)]
    pub include_attributes: bool,

    /// Path to a price catalog JSON file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_catalog: Option<PathBuf>,
}

fn default_user_id_attributes() -> Vec<String> {
    DEFAULT_USER_ID_ATTRIBUTES.iter().map(|k| k.to_string()).collect()
}
fn default_workspace_id_attributes() -> Vec<String> {
    DEFAULT_WORKSPACE_ID_ATTRIBUTES
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl ExporterConfig {
    /// Load configuration from the default path (~/.spancost/config.toml).
    ///
    /// Environment variables override file values:
    /// - `SPANCOST_INCLUDE_ATTRIBUTES` (`1`/`true`/`yes` or `0`/`false`/`no`)
    /// - `SPANCOST_PRICE_CATALOG` (path to a catalog JSON file)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup("SPANCOST_INCLUDE_ATTRIBUTES") {
            self.include_attributes = parse_flag(&raw).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "SPANCOST_INCLUDE_ATTRIBUTES must be a boolean, got {raw:?}"
                ))
            })?;
        }

        if let Some(path) = lookup("SPANCOST_PRICE_CATALOG") {
            if !path.trim().is_empty() {
                self.price_catalog = Some(PathBuf::from(path));
            }
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".spancost")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id_attributes.is_empty() {
            return Err(ConfigError::ValidationError(
                "user_id_attributes must list at least one key".into(),
            ));
        }

        if self.workspace_id_attributes.is_empty() {
            return Err(ConfigError::ValidationError(
                "workspace_id_attributes must list at least one key".into(),
            ));
        }

        if let Some(key) = self
            .user_id_attributes
            .iter()
            .chain(&self.workspace_id_attributes)
            .find(|k| k.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(format!(
                "attribute keys must not be blank (got {key:?})"
            )));
        }

        for (from, to) in &self.model_mapping {
            if from.trim().is_empty() || to.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "model_mapping entries must not be blank ({from:?} -> {to:?})"
                )));
            }
        }

        Ok(())
    }

    /// Read the configured price catalog file, if any.
    ///
    /// Returns the raw JSON text; parsing belongs to the catalog type.
    pub fn read_price_catalog(&self) -> Result<Option<String>, ConfigError> {
        let Some(path) = &self.price_catalog else {
            return Ok(None);
        };

        std::fs::read_to_string(path)
            .map(Some)
            .map_err(|e| ConfigError::ReadError {
                path: path.clone(),
                reason: e.to_string(),
            })
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            user_id_attributes: default_user_id_attributes(),
            workspace_id_attributes: default_workspace_id_attributes(),
            model_mapping: BTreeMap::new(),
            include_attributes: false,
            price_catalog: None,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
