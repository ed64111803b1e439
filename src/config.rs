//! Configuration management for logsift
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. `logsift.yml`, `logsift.json` or `logsift.toml` in the config directory
//! 2. the `LOG_DIR` environment variable
//! 3. command-line flags (applied by the binary)

use crate::logs::DEFAULT_DEDUP_CAPACITY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the watched directory
pub const LOG_DIR_ENV: &str = "LOG_DIR";

/// Settings for the watcher, the sink and the stats endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory to scan and watch
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Extension (without dot) of files to process
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    /// Number of remembered line hashes before the dedup set is reset
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    /// Port of the stats HTTP server
    #[serde(default = "default_stats_port")]
    pub stats_port: u16,
    /// Whether to start the stats HTTP server
    #[serde(default = "default_true")]
    pub server_enabled: bool,
    /// JSON-lines file for parsed records; records are kept in memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_file_extension() -> String {
    "log".to_string()
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

fn default_stats_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            file_extension: default_file_extension(),
            dedup_capacity: default_dedup_capacity(),
            stats_port: default_stats_port(),
            server_enabled: true,
            output: None,
        }
    }
}

impl WatchConfig {
    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(LOG_DIR_ENV).filter(|dir| !dir.trim().is_empty()) {
            self.log_dir = PathBuf::from(dir);
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.file_extension.is_empty() || self.file_extension.starts_with('.') {
            return Err(anyhow::anyhow!(
                "file_extension must be non-empty and given without a leading dot, got '{}'",
                self.file_extension
            ));
        }
        if self.dedup_capacity == 0 {
            return Err(anyhow::anyhow!("dedup_capacity must be greater than zero"));
        }
        Ok(())
    }
}

/// Load the watch configuration from `config_dir`, defaulting when no file exists
pub fn load_watch_config(config_dir: &Path) -> Result<WatchConfig> {
    let yaml_path = config_dir.join("logsift.yml");
    let json_path = config_dir.join("logsift.json");
    let toml_path = config_dir.join("logsift.toml");

    let config = if yaml_path.exists() {
        let contents = read_config(&yaml_path)?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid YAML in {}", yaml_path.display()))?
    } else if json_path.exists() {
        let contents = read_config(&json_path)?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid JSON in {}", json_path.display()))?
    } else if toml_path.exists() {
        let contents = read_config(&toml_path)?;
        toml::from_str(&contents)
            .with_context(|| format!("Invalid TOML in {}", toml_path.display()))?
    } else {
        WatchConfig::default()
    };

    Ok(config)
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))
}

/// Default config directory: `/etc/logsift` if it exists, otherwise the user config dir
pub fn default_config_dir() -> PathBuf {
    let system_config = PathBuf::from("/etc/logsift");
    if system_config.exists() {
        system_config
    } else {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("logsift")
    }
}
