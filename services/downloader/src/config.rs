//! Run configuration loaded from `config.yaml`.
//!
//! Every key is optional; command-line arguments override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::scheduler::{RetryPolicy, SchedulerConfig};

/// Root of `config.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Station codes to backfill
    #[serde(default)]
    pub station_list: Vec<String>,
    #[serde(default)]
    pub api_key: String,
    /// Root for the response cache and the default database file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Off unless the config file turns it on
    #[serde(default = "default_cache_enabled")]
    pub is_cache_enabled: bool,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_cache_enabled() -> bool {
    false
}

fn default_max_workers() -> usize {
    5
}

/// Backoff settings, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            station_list: Vec::new(),
            api_key: String::new(),
            data_dir: default_data_dir(),
            is_cache_enabled: default_cache_enabled(),
            max_workers: default_max_workers(),
            base_url: None,
            retry: RetryConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty file deserializes to unit, not a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }

    /// Load the file at `path`, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        info!(
            path = %path.display(),
            stations = config.station_list.len(),
            "Loaded config"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            bail!("max_workers must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            bail!("retry.base_delay_ms exceeds retry.max_delay_ms");
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_workers: self.max_workers,
            retry: RetryPolicy::from(&self.retry),
        }
    }

    /// Default database file under the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("observations.db")
    }
}
