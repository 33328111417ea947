//! Job definitions from YAML configuration.
//!
//! This module turns [`JobConfig`] values into schedules and command actions
//! and registers them with a [`Coordinator`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::{Coordinator, TimerHandle, TimerMode};
use crate::core::action::{Action, ActionError};
use crate::core::schedule::Schedule;
use crate::core::types::JobName;
use crate::execution::CommandAction;
use crate::store::CoordinationStore;

use super::yaml::{ConfigError, GlobalConfig, JobConfig, YamlLoader};

/// File names in a jobs directory that hold the global configuration.
pub const GLOBAL_CONFIG_FILES: [&str; 2] = ["fleetcron.yaml", "fleetcron.yml"];

/// A job ready to register: parsed schedule plus its command action.
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub name: JobName,
    pub description: Option<String>,
    pub schedule: Schedule,
    pub action: CommandAction,
    pub mode: TimerMode,
    pub enabled: bool,
}

impl JobDefinition {
    /// Run this job's command once on the local node, outside the guard.
    ///
    /// The job is not registered, so no timer can fire while the command runs.
    pub async fn trigger<S>(&self, coordinator: &Coordinator<S>) -> Result<(), ActionError>
    where
        S: CoordinationStore + 'static,
    {
        coordinator
            .run_action(self.name.clone(), Arc::new(self.action.clone()))
            .await
    }

    /// Register this job with `coordinator` according to its mode.
    pub async fn register<S>(&self, coordinator: &Coordinator<S>) -> TimerHandle
    where
        S: CoordinationStore + 'static,
    {
        let action: Arc<dyn Action> = Arc::new(self.action.clone());
        match self.mode {
            TimerMode::Repeating => {
                coordinator
                    .add_job(self.name.clone(), self.schedule.clone(), action)
                    .await
            }
            TimerMode::OneShot => {
                coordinator
                    .add_single_execution_job(self.name.clone(), self.schedule.clone(), action)
                    .await
            }
        }
    }
}

/// Builder for creating job definitions from YAML configuration.
pub struct JobConfigBuilder;

impl JobConfigBuilder {
    /// Build a definition, resolving the schedule's timezone against
    /// `default_timezone` when the job does not name one.
    pub fn build(
        config: JobConfig,
        default_timezone: Option<&str>,
    ) -> Result<JobDefinition, ConfigError> {
        let schedule = config
            .schedule
            .to_schedule(default_timezone)
            .map_err(|source| ConfigError::InvalidSchedule {
                job: config.name.clone(),
                source,
            })?;

        let mut builder = CommandAction::builder(&config.command)
            .name(&config.name)
            .args(config.args)
            .envs(config.env);
        if let Some(dir) = config.working_dir {
            builder = builder.working_dir(dir);
        }
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(JobDefinition {
            name: JobName::new(config.name),
            description: config.description,
            schedule,
            action: builder.build(),
            mode: config.mode,
            enabled: config.enabled,
        })
    }
}

/// Everything loaded from a jobs directory.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub global: GlobalConfig,
    pub jobs: Vec<JobDefinition>,
}

impl LoadedConfig {
    /// Look up a job by name.
    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.name.as_str() == name)
    }
}

/// Load the global configuration and all job definitions from a directory.
///
/// `fleetcron.yaml` (or `.yml`) is read as the global configuration; every
/// other `.yaml`/`.yml` file is a job. Jobs are returned sorted by name.
pub fn load_jobs_from_directory(dir: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let dir = dir.as_ref();

    if !dir.is_dir() {
        return Err(ConfigError::InvalidConfig(format!(
            "'{}' is not a directory",
            dir.display()
        )));
    }

    let mut global = GlobalConfig::default();
    let mut configs = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }

        let is_global = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| GLOBAL_CONFIG_FILES.contains(&name));
        if is_global {
            global = YamlLoader::load_global_config(&path)?;
        } else {
            configs.push(YamlLoader::load_job_config(&path)?);
        }
    }

    YamlLoader::validate_unique_names(&configs)?;

    let default_timezone = global.default_timezone.clone();
    let mut jobs = configs
        .into_iter()
        .map(|config| JobConfigBuilder::build(config, default_timezone.as_deref()))
        .collect::<Result<Vec<_>, _>>()?;
    jobs.sort_by(|a, b| a.name.cmp(&b.name));

    tracing::debug!(dir = %dir.display(), jobs = jobs.len(), "Loaded job configuration");
    Ok(LoadedConfig { global, jobs })
}
