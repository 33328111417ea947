//! Process-local timers.
//!
//! Every registered job owns one timer task. The task sleeps until the job's
//! next scheduled instant, then hands the attempt to its own task so a slow
//! lock or a slow action never delays the following wake-up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Coordinator;
use crate::core::action::Action;
use crate::core::schedule::Recurrence;
use crate::core::types::JobName;
use crate::store::CoordinationStore;

/// Extra sleep past each scheduled instant.
///
/// The guard executes only when the stored watermark is strictly below now,
/// and the watermark a previous fire committed is exactly this instant.
pub(crate) const TIMER_SLACK: Duration = Duration::from_millis(1);

/// How often a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    /// Fire on every scheduled instant until cancelled.
    #[default]
    Repeating,
    /// Fire once at the next scheduled instant.
    #[serde(alias = "once")]
    OneShot,
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerMode::Repeating => write!(f, "repeating"),
            TimerMode::OneShot => write!(f, "one_shot"),
        }
    }
}

/// Handle to a job's local timer.
///
/// Cancelling stops future wake-ups; an attempt already handed off keeps
/// running to completion.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
    fires: Arc<AtomicU64>,
    mode: TimerMode,
}

impl TimerHandle {
    fn new(mode: TimerMode) -> Self {
        Self {
            token: CancellationToken::new(),
            fires: Arc::new(AtomicU64::new(0)),
            mode,
        }
    }

    /// Stop the timer. Safe to call more than once.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the timer was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of times the timer woke up and started an attempt.
    pub fn fire_count(&self) -> u64 {
        self.fires.load(Ordering::SeqCst)
    }

    /// Repeating or one-shot.
    pub fn mode(&self) -> TimerMode {
        self.mode
    }
}

impl<S: CoordinationStore + 'static> Coordinator<S> {
    /// Spawn the timer task for `job` and return its handle.
    pub(crate) fn arm_timer(
        &self,
        job: JobName,
        action: Arc<dyn Action>,
        schedule: Arc<dyn Recurrence>,
        mode: TimerMode,
    ) -> TimerHandle {
        let handle = TimerHandle::new(mode);
        let timer = handle.clone();
        let coordinator = self.clone();

        tokio::spawn(async move {
            coordinator.run_timer(job, action, schedule, timer).await;
        });

        handle
    }

    async fn run_timer(
        self,
        job: JobName,
        action: Arc<dyn Action>,
        schedule: Arc<dyn Recurrence>,
        timer: TimerHandle,
    ) {
        loop {
            let now = self.inner.clock.now();
            let next = match schedule.next_after(now) {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(job = %job, error = %e, "Stopping timer: no next occurrence");
                    break;
                }
            };
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO) + TIMER_SLACK;
            tracing::trace!(job = %job, %next, ?delay, "Timer armed");

            tokio::select! {
                biased;
                _ = timer.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            timer.fires.fetch_add(1, Ordering::SeqCst);

            let coordinator = self.clone();
            let job = job.clone();
            let action = Arc::clone(&action);
            let schedule = Arc::clone(&schedule);
            tokio::spawn(async move {
                coordinator.attempt(&action, schedule.as_ref(), &job).await;
            });

            if timer.mode == TimerMode::OneShot {
                break;
            }
        }

        tracing::debug!(job = %job, fires = timer.fire_count(), "Timer stopped");
    }
}
