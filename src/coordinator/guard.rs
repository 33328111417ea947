//! Execution guard: at-most-once execution of a scheduled slot fleet-wide.
//!
//! Each attempt walks the phases
//! `AcquiringLock → ReadingWatermark → DecidingAndWriting → Releasing → Invoking`.
//! The watermark is written before the lock is released, and the action runs
//! only after the release, so lock hold time is bounded by the store round
//! trips and never by the action.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use super::{Coordinator, CoordinatorError, containment};
use crate::core::action::{Action, ActionError};
use crate::core::schedule::{Recurrence, ScheduleError};
use crate::core::types::{JobName, Watermark};
use crate::events::Event;
use crate::store::CoordinationStore;

/// Number of upcoming instants consulted when picking the slot to claim.
///
/// Two candidates correct drift of up to one schedule period; a wake-up
/// delayed by more than that still claims the second candidate.
pub const LOOKAHEAD: usize = 2;

/// Phase of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptPhase {
    /// Waiting for the job's fleet-wide lock.
    AcquiringLock,
    /// Reading the job's watermark inside the lock.
    ReadingWatermark,
    /// Comparing against now and committing the next slot.
    DecidingAndWriting,
    /// Handing the lock back.
    Releasing,
    /// Running the user action outside the lock.
    Invoking,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptPhase::AcquiringLock => "acquiring_lock",
            AttemptPhase::ReadingWatermark => "reading_watermark",
            AttemptPhase::DecidingAndWriting => "deciding_and_writing",
            AttemptPhase::Releasing => "releasing",
            AttemptPhase::Invoking => "invoking",
        };
        f.write_str(name)
    }
}

/// Result of one execution attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// This process claimed the slot and ran the action.
    Executed {
        /// Watermark committed for the claimed slot.
        watermark: Watermark,
        /// What the action returned; failures are contained, never propagated.
        action: Result<(), ActionError>,
    },
    /// The slot was already claimed; the store was not written.
    Skipped {
        /// Watermark found in the store.
        watermark: Watermark,
    },
    /// The attempt stopped before deciding; the job stays scheduled.
    Aborted {
        phase: AttemptPhase,
        error: CoordinatorError,
    },
}

impl AttemptOutcome {
    /// Whether the action was invoked.
    pub fn executed(&self) -> bool {
        matches!(self, AttemptOutcome::Executed { .. })
    }

    /// Whether the attempt found the slot already claimed.
    pub fn skipped(&self) -> bool {
        matches!(self, AttemptOutcome::Skipped { .. })
    }
}

/// What the critical section decided.
enum Decision {
    Execute(Watermark),
    Skip(Watermark),
}

/// Pick the first candidate not earlier than `now`, falling back to the last one.
pub(crate) fn select_candidate(
    candidates: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    candidates
        .iter()
        .find(|candidate| **candidate >= now)
        .or_else(|| candidates.last())
        .copied()
}

impl<S: CoordinationStore + 'static> Coordinator<S> {
    /// Attempt to claim the current slot of `job` and run `action` if this
    /// process wins it.
    ///
    /// Never fails: lock, store and action errors are logged, emitted as
    /// events and reported in the returned outcome.
    pub async fn attempt(
        &self,
        action: &Arc<dyn Action>,
        schedule: &dyn Recurrence,
        job: &JobName,
    ) -> AttemptOutcome {
        trace_phase(job, AttemptPhase::AcquiringLock);
        let critical = self
            .with_lock(&job.lock_name(), || self.decide_and_write(schedule, job))
            .await;
        trace_phase(job, AttemptPhase::Releasing);

        let decision = match critical {
            Err(e) => return self.abort(job, AttemptPhase::AcquiringLock, e.into()).await,
            Ok(Err((phase, e))) => return self.abort(job, phase, e).await,
            Ok(Ok(decision)) => decision,
        };

        match decision {
            Decision::Skip(watermark) => {
                tracing::debug!(job = %job, %watermark, "Slot already claimed, skipping");
                self.inner
                    .event_bus
                    .emit(Event::attempt_skipped(job.clone(), watermark))
                    .await;
                AttemptOutcome::Skipped { watermark }
            }
            Decision::Execute(watermark) => {
                tracing::info!(job = %job, next = %watermark, "Claimed slot, running action");
                self.inner
                    .event_bus
                    .emit(Event::attempt_executed(job.clone(), watermark))
                    .await;

                trace_phase(job, AttemptPhase::Invoking);
                let result = containment::contain(Arc::clone(action)).await;
                if let Err(e) = &result {
                    containment::report_failure(&self.inner.event_bus, job, e).await;
                }

                AttemptOutcome::Executed {
                    watermark,
                    action: result,
                }
            }
        }
    }

    /// Critical section: read, compare against now, and commit the next slot.
    async fn decide_and_write(
        &self,
        schedule: &dyn Recurrence,
        job: &JobName,
    ) -> Result<Decision, (AttemptPhase, CoordinatorError)> {
        trace_phase(job, AttemptPhase::ReadingWatermark);
        let current = self
            .inner
            .store
            .get(job.as_str())
            .await
            .map_err(|e| (AttemptPhase::ReadingWatermark, CoordinatorError::Store(e)))?;

        trace_phase(job, AttemptPhase::DecidingAndWriting);
        let now = self.inner.clock.now();
        let candidates = schedule
            .next_n_after(now, LOOKAHEAD)
            .map_err(|e| (AttemptPhase::DecidingAndWriting, CoordinatorError::Schedule(e)))?;
        let next = select_candidate(&candidates, now).ok_or((
            AttemptPhase::DecidingAndWriting,
            CoordinatorError::Schedule(ScheduleError::NoMoreOccurrences),
        ))?;

        // Compared against now, not the candidate: a sibling that already
        // advanced the watermark past now wins even if we woke up late.
        if let Some(watermark) = current
            && watermark >= Watermark::from_datetime(now)
        {
            return Ok(Decision::Skip(watermark));
        }

        let next = Watermark::from_datetime(next);
        self.inner
            .store
            .set(job.as_str(), next)
            .await
            .map_err(|e| (AttemptPhase::DecidingAndWriting, CoordinatorError::Store(e)))?;

        Ok(Decision::Execute(next))
    }

    async fn abort(
        &self,
        job: &JobName,
        phase: AttemptPhase,
        error: CoordinatorError,
    ) -> AttemptOutcome {
        tracing::warn!(job = %job, %phase, error = %error, "Execution attempt aborted");
        self.inner
            .event_bus
            .emit(Event::attempt_aborted(job.clone(), phase, error.to_string()))
            .await;
        AttemptOutcome::Aborted { phase, error }
    }
}

fn trace_phase(job: &JobName, phase: AttemptPhase) {
    tracing::trace!(job = %job, %phase, "Attempt phase");
}
