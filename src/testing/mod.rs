//! Testing utilities for users of the fleetcron library.
//!
//! This module provides helpers for testing coordination without real time
//! or a real fleet:
//!
//! - [`ManualClock`]: a clock that only moves when told to
//! - [`TokioClock`]: wall-clock instants driven by tokio's (pausable) timer
//! - [`RecordingStore`]: wraps a store, counts calls and injects failures
//! - [`CountingAction`]: an action that counts its invocations
//! - [`FailingAction`]: an action that always errors or panics

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::core::action::{Action, ActionError};
use crate::core::clock::Clock;
use crate::core::types::Watermark;
use crate::store::{CoordinationStore, LockLease, StoreError};

/// A clock whose current instant is set explicitly.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use fleetcron::Clock;
/// use fleetcron::testing::ManualClock;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let clock = ManualClock::new(start);
/// clock.advance(chrono::Duration::seconds(5));
/// assert_eq!(clock.now(), start + chrono::Duration::seconds(5));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock stopped at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A clock reporting `origin` plus the tokio time elapsed since creation.
///
/// Under `#[tokio::test(start_paused = true)]` timers and this clock advance
/// together, so driver tests run instantly and deterministically.
#[derive(Debug)]
pub struct TokioClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    /// Create a clock that reads `origin` right now.
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or(chrono::Duration::zero());
        self.origin + elapsed
    }
}

/// Number of calls a [`RecordingStore`] has seen, by operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCallCounts {
    pub gets: usize,
    pub sets: usize,
    pub deletes: usize,
    pub acquires: usize,
    pub releases: usize,
}

impl StoreCallCounts {
    /// Calls of any kind.
    pub fn total(&self) -> usize {
        self.gets + self.sets + self.deletes + self.acquires + self.releases
    }
}

/// A store wrapper that counts every call and can fail reads or writes.
#[derive(Debug, Default)]
pub struct RecordingStore<S> {
    inner: S,
    counts: Mutex<StoreCallCounts>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl<S> RecordingStore<S> {
    /// Wrap `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            counts: Mutex::new(StoreCallCounts::default()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// The wrapped store; calls made through it are not counted.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Snapshot of the call counts so far.
    pub fn counts(&self) -> StoreCallCounts {
        *self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `get` fail until turned off.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `set` and `delete` fail until turned off.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn record(&self, bump: impl FnOnce(&mut StoreCallCounts)) {
        bump(&mut self.counts.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Backend(format!("injected {} failure", operation)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: CoordinationStore> CoordinationStore for RecordingStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Watermark>, StoreError> {
        self.record(|c| c.gets += 1);
        Self::injected(&self.fail_reads, "read")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Watermark) -> Result<(), StoreError> {
        self.record(|c| c.sets += 1);
        Self::injected(&self.fail_writes, "write")?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.record(|c| c.deletes += 1);
        Self::injected(&self.fail_writes, "delete")?;
        self.inner.delete(key).await
    }

    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockLease>, StoreError> {
        self.record(|c| c.acquires += 1);
        self.inner.try_acquire(name, ttl).await
    }

    async fn release(&self, lease: LockLease) -> Result<(), StoreError> {
        self.record(|c| c.releases += 1);
        self.inner.release(lease).await
    }
}

/// An action that counts how many times it ran.
///
/// Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct CountingAction {
    count: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingAction {
    /// Create an action with a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` on every run before counting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of completed runs.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// A shareable handle to this action.
    pub fn as_action(&self) -> Arc<dyn Action> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Action for CountingAction {
    async fn run(&self) -> Result<(), ActionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn description(&self) -> Option<&str> {
        Some("counting action")
    }
}

/// An action that fails on every run, either by returning an error or by
/// panicking.
///
/// Clones share the call counter.
#[derive(Debug, Clone)]
pub struct FailingAction {
    message: String,
    panics: bool,
    calls: Arc<AtomicUsize>,
}

impl FailingAction {
    /// Fail with [`ActionError::Failed`] carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            panics: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Panic with `message` instead of returning an error.
    pub fn panicking(message: impl Into<String>) -> Self {
        Self {
            panics: true,
            ..Self::new(message)
        }
    }

    /// Number of times the action was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A shareable handle to this action.
    pub fn as_action(&self) -> Arc<dyn Action> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Action for FailingAction {
    async fn run(&self) -> Result<(), ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("{}", self.message);
        }
        Err(ActionError::Failed(self.message.clone()))
    }
}
