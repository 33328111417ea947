//! Fleet-wide job coordinator.
//!
//! A [`Coordinator`] is built once per process around a handle to the shared
//! coordination store. Every job registered through it runs its own local
//! timer; when a timer fires, the execution guard decides inside a fleet-wide
//! lock whether this process claims the slot.
//!
//! - `guard`: the lock / read / compare / write / release / invoke sequence
//! - `driver`: process-local wake-ups aligned to the job's schedule
//! - `registry`: name → timer and action, with cancellation and manual runs
//! - `containment`: keeps failing actions from reaching the driver

mod containment;
mod driver;
mod guard;
mod registry;

pub use containment::contain;
pub use driver::{TimerHandle, TimerMode};
pub use guard::{AttemptOutcome, AttemptPhase, LOOKAHEAD};

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::clock::{Clock, SystemClock};
use crate::core::schedule::ScheduleError;
use crate::events::EventBus;
use crate::store::{CoordinationStore, LockError, LockLease, LockOptions, StoreError};

use registry::JobRegistry;

/// Errors surfaced by coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The fleet-wide lock could not be taken.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The schedule produced no usable instant.
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),
}

struct Inner<S> {
    store: S,
    lock_options: LockOptions,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
    registry: RwLock<JobRegistry>,
}

/// Process-wide coordinator state.
///
/// Cloning is cheap and every clone refers to the same registry and store.
pub struct Coordinator<S: CoordinationStore> {
    inner: Arc<Inner<S>>,
}

impl<S: CoordinationStore> Clone for Coordinator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: CoordinationStore + 'static> Coordinator<S> {
    /// Create a coordinator over `store` with default lock options.
    pub fn new(store: S) -> Self {
        CoordinatorBuilder::new(store).build()
    }

    /// Start building a coordinator with custom settings.
    pub fn builder(store: S) -> CoordinatorBuilder<S> {
        CoordinatorBuilder::new(store)
    }

    /// The underlying coordination store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Lock tuning in effect.
    pub fn lock_options(&self) -> LockOptions {
        self.inner.lock_options
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Run `critical` while holding the fleet-wide lock `name`.
    ///
    /// Acquisition polls the store every `retry_delay` until `acquire_timeout`
    /// elapses. The lease is released exactly once after `critical` finishes,
    /// whatever it returns.
    pub async fn with_lock<T, F, Fut>(&self, name: &str, critical: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lease = self.acquire_lock(name).await?;
        let output = critical().await;
        self.release_lock(lease).await;
        Ok(output)
    }

    async fn acquire_lock(&self, name: &str) -> Result<LockLease, LockError> {
        let options = self.inner.lock_options;
        let start = tokio::time::Instant::now();

        loop {
            if let Some(lease) = self.inner.store.try_acquire(name, options.ttl).await? {
                return Ok(lease);
            }

            let waited = start.elapsed();
            if waited >= options.acquire_timeout {
                return Err(LockError::Timeout {
                    name: name.to_string(),
                    waited,
                });
            }

            tokio::time::sleep(options.retry_delay).await;
        }
    }

    async fn release_lock(&self, lease: LockLease) {
        let name = lease.name().to_string();
        if let Err(e) = self.inner.store.release(lease).await {
            // The lease still expires after its ttl.
            tracing::warn!(lock = %name, error = %e, "Failed to release lock");
        }
    }
}

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder<S> {
    store: S,
    lock_options: LockOptions,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
}

impl<S: CoordinationStore + 'static> CoordinatorBuilder<S> {
    /// Create a builder over `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            lock_options: LockOptions::default(),
            clock: Arc::new(SystemClock),
            event_bus: Arc::new(EventBus::new()),
        }
    }

    /// Set the lock acquisition options.
    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    /// Set the clock used for "now" inside the critical section and by timers.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Finish building.
    pub fn build(self) -> Coordinator<S> {
        Coordinator {
            inner: Arc::new(Inner {
                store: self.store,
                lock_options: self.lock_options,
                clock: self.clock,
                event_bus: self.event_bus,
                registry: RwLock::new(JobRegistry::default()),
            }),
        }
    }
}
