//! Process-local job registry.
//!
//! Maps job names to their armed timer and action. The map lives behind the
//! coordinator's async `RwLock`; nothing here is visible to other processes.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Coordinator, CoordinatorError, TimerHandle, TimerMode, containment};
use crate::core::action::{Action, ActionError};
use crate::core::schedule::Recurrence;
use crate::core::types::JobName;
use crate::events::Event;
use crate::store::CoordinationStore;

struct RegisteredJob {
    action: Arc<dyn Action>,
    schedule: Arc<dyn Recurrence>,
    timer: TimerHandle,
}

#[derive(Default)]
pub(super) struct JobRegistry {
    jobs: HashMap<JobName, RegisteredJob>,
}

impl<S: CoordinationStore + 'static> Coordinator<S> {
    /// Register `action` to run on every instant of `schedule`, at most once
    /// fleet-wide per instant.
    ///
    /// Registering a name that is already present replaces the registry entry
    /// but leaves the previous timer running.
    pub async fn add_job<R>(
        &self,
        name: impl Into<JobName>,
        schedule: R,
        action: Arc<dyn Action>,
    ) -> TimerHandle
    where
        R: Recurrence + 'static,
    {
        self.register(name.into(), Arc::new(schedule), action, TimerMode::Repeating)
            .await
    }

    /// Register `action` to run once, at the next instant of `schedule`.
    ///
    /// The entry stays in the registry after the timer fires, until
    /// [`cancel_job`](Self::cancel_job) removes it.
    pub async fn add_single_execution_job<R>(
        &self,
        name: impl Into<JobName>,
        schedule: R,
        action: Arc<dyn Action>,
    ) -> TimerHandle
    where
        R: Recurrence + 'static,
    {
        self.register(name.into(), Arc::new(schedule), action, TimerMode::OneShot)
            .await
    }

    async fn register(
        &self,
        job: JobName,
        schedule: Arc<dyn Recurrence>,
        action: Arc<dyn Action>,
        mode: TimerMode,
    ) -> TimerHandle {
        let timer = self.arm_timer(job.clone(), Arc::clone(&action), Arc::clone(&schedule), mode);

        let replaced = {
            let mut registry = self.inner.registry.write().await;
            registry.jobs.insert(
                job.clone(),
                RegisteredJob {
                    action,
                    schedule,
                    timer: timer.clone(),
                },
            )
        };

        if replaced.is_some() {
            // The previous timer keeps firing with its own action.
            tracing::warn!(job = %job, "Job re-registered; previous timer was not cancelled");
        }
        tracing::info!(job = %job, %mode, "Registered job");
        self.inner
            .event_bus
            .emit(Event::job_registered(job, mode))
            .await;

        timer
    }

    /// Cancel a job's timer, drop it from the registry and delete its
    /// watermark under the job's lock.
    ///
    /// Returns `Ok(false)` without touching the store when `name` is not
    /// registered.
    pub async fn cancel_job(&self, name: &str) -> Result<bool, CoordinatorError> {
        let job = JobName::new(name);
        let removed = self.inner.registry.write().await.jobs.remove(&job);
        let Some(entry) = removed else {
            tracing::debug!(job = %job, "Cancel requested for unknown job");
            return Ok(false);
        };

        entry.timer.cancel();

        let store = &self.inner.store;
        self.with_lock(&job.lock_name(), || store.delete(job.as_str()))
            .await??;

        tracing::info!(job = %job, "Cancelled job");
        self.inner
            .event_bus
            .emit(Event::job_cancelled(job))
            .await;
        Ok(true)
    }

    /// Invoke a registered job's action now, bypassing the execution guard.
    ///
    /// Returns `Ok(false)` when `name` is not registered. The action's own
    /// failure is returned rather than swallowed.
    pub async fn run_job(&self, name: &str) -> Result<bool, ActionError> {
        let job = JobName::new(name);
        let action = {
            let registry = self.inner.registry.read().await;
            registry.jobs.get(&job).map(|entry| Arc::clone(&entry.action))
        };
        let Some(action) = action else {
            tracing::debug!(job = %job, "Run requested for unknown job");
            return Ok(false);
        };

        self.run_action(job, action).await.map(|()| true)
    }

    /// Invoke `action` once on this node under `name`, without registering it.
    ///
    /// No timer is armed and the store is never touched, so a long run cannot
    /// claim a fleet slot on the job's behalf.
    pub async fn run_action(
        &self,
        name: impl Into<JobName>,
        action: Arc<dyn Action>,
    ) -> Result<(), ActionError> {
        let job = name.into();
        tracing::info!(job = %job, "Running job manually");
        let result = containment::contain(action).await;
        if let Err(e) = &result {
            containment::report_failure(&self.inner.event_bus, &job, e).await;
        }
        self.inner
            .event_bus
            .emit(Event::manual_run(job, result.is_ok()))
            .await;
        result
    }

    /// Names of all registered jobs, sorted.
    pub async fn jobs(&self) -> Vec<JobName> {
        let registry = self.inner.registry.read().await;
        let mut names: Vec<JobName> = registry.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` is registered.
    pub async fn is_registered(&self, name: &str) -> bool {
        self.inner
            .registry
            .read()
            .await
            .jobs
            .contains_key(&JobName::new(name))
    }

    /// The timer handle registered under `name`.
    pub async fn timer(&self, name: &str) -> Option<TimerHandle> {
        self.inner
            .registry
            .read()
            .await
            .jobs
            .get(&JobName::new(name))
            .map(|entry| entry.timer.clone())
    }

    /// The schedule registered under `name`.
    pub async fn schedule_of(&self, name: &str) -> Option<Arc<dyn Recurrence>> {
        self.inner
            .registry
            .read()
            .await
            .jobs
            .get(&JobName::new(name))
            .map(|entry| Arc::clone(&entry.schedule))
    }

    /// Stop every registered timer. Watermarks stay in the store so the
    /// rest of the fleet keeps its place in each schedule.
    pub async fn shutdown(&self) {
        let mut registry = self.inner.registry.write().await;
        for (job, entry) in registry.jobs.drain() {
            entry.timer.cancel();
            tracing::debug!(job = %job, "Stopped timer");
        }
        tracing::info!("Coordinator shut down");
    }
}
