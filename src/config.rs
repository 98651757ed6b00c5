//! Configuration management for litexplore.
//!
//! Handles loading configuration from TOML files and environment variables,
//! with support for named remote targets and engine limits.

use crate::error::{EngineError, Result};
use crate::query::{DEFAULT_ROW_CAP, DEFAULT_TIME_BUDGET};
use crate::remote::{RemoteTarget, SshSettings, DEFAULT_BINARY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for litexplore.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Engine limits and ssh settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Named remote targets.
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,
}

/// Engine limits and ssh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum rows read per query.
    #[serde(default = "default_row_cap")]
    pub row_cap: usize,

    /// Wall-clock budget per query, in seconds.
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: f64,

    /// How long an idle master connection stays up (ssh `ControlPersist`).
    #[serde(default = "default_control_persist")]
    pub control_persist: String,

    /// ssh program and leading arguments.
    #[serde(default = "default_ssh_command")]
    pub ssh_command: Vec<String>,

    /// Extra `-o` options for every ssh invocation, e.g. `BatchMode=yes`.
    #[serde(default)]
    pub ssh_options: Vec<String>,
}

fn default_row_cap() -> usize {
    DEFAULT_ROW_CAP
}

fn default_time_budget_secs() -> f64 {
    DEFAULT_TIME_BUDGET.as_secs_f64()
}

fn default_control_persist() -> String {
    "5m".to_string()
}

fn default_ssh_command() -> Vec<String> {
    vec!["ssh".to_string()]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            row_cap: default_row_cap(),
            time_budget_secs: default_time_budget_secs(),
            control_persist: default_control_persist(),
            ssh_command: default_ssh_command(),
            ssh_options: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Returns the row cap, falling back to the default when it is zero.
    pub fn row_cap(&self) -> usize {
        if self.row_cap == 0 {
            DEFAULT_ROW_CAP
        } else {
            self.row_cap
        }
    }

    /// Returns the time budget, falling back to the default for unusable values.
    pub fn time_budget(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_budget_secs)
            .ok()
            .filter(|budget| !budget.is_zero())
            .unwrap_or(DEFAULT_TIME_BUDGET)
    }

    /// Returns the ssh invocation settings.
    pub fn ssh_settings(&self) -> SshSettings {
        SshSettings {
            command: self.ssh_command.clone(),
            control_persist: self.control_persist.clone(),
            options: self.ssh_options.clone(),
        }
    }
}

/// A remote database as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TargetConfig {
    /// ssh host or alias.
    pub host: Option<String>,

    /// Database path on the remote host.
    pub database: Option<String>,

    /// sqlite3 binary on the remote host.
    pub binary: Option<String>,
}

impl TargetConfig {
    /// Merges another config into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &TargetConfig) {
        if other.host.is_some() {
            self.host = other.host.clone();
        }
        if other.database.is_some() {
            self.database = other.database.clone();
        }
        if other.binary.is_some() {
            self.binary = other.binary.clone();
        }
    }

    /// Applies environment variables (LTX_HOST, LTX_DATABASE, LTX_BINARY) as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.host.is_none() {
            self.host = std::env::var("LTX_HOST").ok();
        }
        if self.database.is_none() {
            self.database = std::env::var("LTX_DATABASE").ok();
        }
        if self.binary.is_none() {
            self.binary = std::env::var("LTX_BINARY").ok();
        }
    }

    /// Returns true if neither host nor database is set.
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.database.is_none()
    }

    /// Validates the config into a target.
    pub fn to_target(&self) -> Result<RemoteTarget> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| EngineError::configuration("Remote host is required"))?;
        let database = self
            .database
            .as_deref()
            .ok_or_else(|| EngineError::configuration("Remote database path is required"))?;
        let binary = self.binary.as_deref().unwrap_or(DEFAULT_BINARY);

        RemoteTarget::new(host, database, binary)
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("litexplore")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::configuration(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            EngineError::configuration(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named target, or the default target if name is None.
    pub fn get_target(&self, name: Option<&str>) -> Option<&TargetConfig> {
        let key = name.unwrap_or("default");
        self.targets.get(key)
    }
}
