//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for jobs and for the
//! coordinator's global settings (store backend, lock timing, timezone).

mod builder;
mod yaml;

pub use builder::{
    GLOBAL_CONFIG_FILES, JobConfigBuilder, JobDefinition, LoadedConfig, load_jobs_from_directory,
};
pub use yaml::{
    ConfigError, GlobalConfig, JobConfig, LockConfig, ScheduleConfig, StoreConfig, YamlLoader,
};
