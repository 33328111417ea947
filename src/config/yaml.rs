//! YAML configuration parsing.
//!
//! Parses job definitions and the coordinator's global configuration from
//! YAML files.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::coordinator::TimerMode;
use crate::core::schedule::{Schedule, ScheduleError};
use crate::store::LockOptions;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to read a specific file with context.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Failed to parse YAML from a specific file.
    #[error("YAML parse error in '{path}': {source}")]
    YamlFileError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A schedule expression or timezone was rejected.
    #[error("invalid schedule for job '{job}': {source}")]
    InvalidSchedule {
        job: String,
        #[source]
        source: ScheduleError,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Global configuration (fleetcron.yaml).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default timezone for schedules that do not name one.
    pub default_timezone: Option<String>,
    /// Coordination store shared by the fleet.
    pub store: StoreConfig,
    /// Lock acquisition tuning.
    pub lock: LockConfig,
}

/// Coordination store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// In-memory store (default, single process, non-persistent).
    #[serde(rename = "memory")]
    #[default]
    Memory,
    /// SQLite store; every process opening the same file is one fleet.
    #[serde(rename = "sqlite")]
    Sqlite {
        /// Path to the database file.
        path: String,
    },
}

/// Lock timing in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub acquire_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub ttl_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        let defaults = LockOptions::default();
        Self {
            acquire_timeout_ms: millis(defaults.acquire_timeout),
            retry_delay_ms: millis(defaults.retry_delay),
            ttl_ms: millis(defaults.ttl),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl LockConfig {
    /// Convert to the coordinator's lock options.
    pub fn to_options(&self) -> LockOptions {
        LockOptions {
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ttl: Duration::from_millis(self.ttl_ms),
        }
    }
}

/// Job configuration from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name; unique across the fleet.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Schedule expression (cron, shortcut or `@every`).
    pub schedule: ScheduleConfig,
    /// Repeating (default) or one-shot.
    #[serde(default)]
    pub mode: TimerMode,
    /// Whether the job is registered at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Program to run.
    pub command: String,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Timeout in seconds.
    pub timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleConfig {
    /// Simple expression string.
    Simple(String),
    /// Detailed schedule with timezone.
    Detailed {
        /// Cron expression or shortcut.
        cron: String,
        /// Timezone for the schedule.
        timezone: Option<String>,
    },
}

impl ScheduleConfig {
    /// Get the expression.
    pub fn cron(&self) -> &str {
        match self {
            ScheduleConfig::Simple(s) => s,
            ScheduleConfig::Detailed { cron, .. } => cron,
        }
    }

    /// Get the timezone, if specified.
    pub fn timezone(&self) -> Option<&str> {
        match self {
            ScheduleConfig::Simple(_) => None,
            ScheduleConfig::Detailed { timezone, .. } => timezone.as_deref(),
        }
    }

    /// Parse into a [`Schedule`], falling back to `default_timezone` and then UTC.
    pub fn to_schedule(&self, default_timezone: Option<&str>) -> Result<Schedule, ScheduleError> {
        let tz = self.timezone().or(default_timezone).unwrap_or("UTC");
        Schedule::with_timezone(self.cron(), tz)
    }
}

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load global configuration from a file.
    pub fn load_global_config(path: impl AsRef<Path>) -> Result<GlobalConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config: GlobalConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_global_config(&config)?;
        Ok(config)
    }

    /// Parse global configuration from a YAML string.
    pub fn parse_global_config(yaml: &str) -> Result<GlobalConfig, ConfigError> {
        let config: GlobalConfig = serde_yaml::from_str(yaml)?;
        Self::validate_global_config(&config)?;
        Ok(config)
    }

    /// Load a job configuration from a file.
    pub fn load_job_config(path: impl AsRef<Path>) -> Result<JobConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config: JobConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_job_config(&config)?;
        Ok(config)
    }

    /// Parse a job configuration from a YAML string.
    pub fn parse_job_config(yaml: &str) -> Result<JobConfig, ConfigError> {
        let config: JobConfig = serde_yaml::from_str(yaml)?;
        Self::validate_job_config(&config)?;
        Ok(config)
    }

    fn validate_global_config(config: &GlobalConfig) -> Result<(), ConfigError> {
        if config.lock.retry_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "lock.retry_delay_ms cannot be zero".into(),
            ));
        }
        if config.lock.ttl_ms == 0 {
            return Err(ConfigError::InvalidConfig("lock.ttl_ms cannot be zero".into()));
        }
        if let StoreConfig::Sqlite { path } = &config.store
            && path.trim().is_empty()
        {
            return Err(ConfigError::MissingField("store.path".into()));
        }
        Ok(())
    }

    /// Validate a job configuration.
    fn validate_job_config(config: &JobConfig) -> Result<(), ConfigError> {
        if config.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name".into()));
        }

        if config.command.trim().is_empty() {
            return Err(ConfigError::MissingField("command".into()));
        }

        if config.schedule.cron().trim().is_empty() {
            return Err(ConfigError::MissingField("schedule".into()));
        }

        if config.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "timeout_secs cannot be zero".into(),
            ));
        }

        Ok(())
    }

    /// Check that every job name is used once.
    pub fn validate_unique_names(configs: &[JobConfig]) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for config in configs {
            if !names.insert(config.name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate job name: {}",
                    config.name
                )));
            }
        }
        Ok(())
    }
}
