//! Configuration file loading and management
//!
//! This module handles loading and parsing the tool configuration from
//! `$XDG_CONFIG_HOME/modforge/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use modforge_core::LifecycleConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main modforge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Where mods live and which ones to skip
    #[serde(default)]
    pub mods: ModsConfig,
    /// Lifecycle manager settings
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    /// Report rendering
    #[serde(default)]
    pub output: OutputConfig,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "warn"
    pub log_level: String,
}

/// Mod directory settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModsConfig {
    /// Root directory holding one sub-directory per mod.
    /// If None, uses XDG_DATA_HOME/modforge/mods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Mod ids that are ignored as if absent
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Lifecycle manager settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleSettings {
    /// Longest a mod's initialize hook may take, in milliseconds.
    /// 0 disables the limit. Default: 5000
    pub init_timeout_ms: u64,
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Default output format for reports
    pub format: OutputFormat,
}

/// Report output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            init_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The parsed configuration or an error if loading/parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/modforge/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "modforge")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Create a default configuration file with documented comments
    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    pub fn default_config_content() -> &'static str {
        r#"# modforge configuration

[general]
# Log level: trace, debug, info, warn, error
# RUST_LOG takes precedence when set.
# Default: "warn"
log_level = "warn"

[mods]
# Directory holding one sub-directory per mod, each with a mod.toml
# If not specified, defaults to $XDG_DATA_HOME/modforge/mods
# directory = "/path/to/mods"

# Mods to ignore as if they were not installed
disabled = []

[lifecycle]
# Longest a mod's initialize hook may run, in milliseconds.
# A slower mod is failed and its registrations are rolled back.
# 0 disables the limit.
# Default: 5000
init_timeout_ms = 5000

[output]
# Report format: "text" or "json"
# Default: "text"
format = "text"
"#
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are valid and within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.general.log_level,
                valid_log_levels.join(", ")
            );
        }

        if let Some(id) = self.mods.disabled.iter().find(|id| id.trim().is_empty()) {
            anyhow::bail!("mods.disabled contains an empty mod id: {:?}", id);
        }

        // an hour is far beyond any sane initializer
        if self.lifecycle.init_timeout_ms > 3_600_000 {
            anyhow::bail!(
                "lifecycle.init_timeout_ms must be at most 3600000, got {}",
                self.lifecycle.init_timeout_ms
            );
        }

        Ok(())
    }

    /// Get the mod root directory
    ///
    /// Returns the configured directory or the default XDG data directory path
    pub fn mods_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.mods.directory {
            return Ok(dir.clone());
        }

        modforge_manifest::user_mods_dir().context("Failed to determine project directories")
    }

    /// Lifecycle manager settings derived from `[lifecycle]`
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            init_timeout: match self.lifecycle.init_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}
