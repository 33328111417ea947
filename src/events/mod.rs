//! Lifecycle events and event handling.
//!
//! This module provides event emission for job registration and for every
//! execution attempt, enabling observability into how the fleet divides
//! scheduled slots. Action failures are routed here as their error sink.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::coordinator::{AttemptPhase, TimerMode};
use crate::core::types::{JobName, Watermark};

/// Lifecycle events emitted by a coordinator.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job was added to the registry and its timer armed.
    JobRegistered {
        job: JobName,
        mode: TimerMode,
        timestamp: Instant,
    },

    /// A job was cancelled and removed from the registry.
    JobCancelled { job: JobName, timestamp: Instant },

    /// This process won the slot: the watermark advanced and the action ran.
    AttemptExecuted {
        job: JobName,
        watermark: Watermark,
        timestamp: Instant,
    },

    /// The slot was already claimed; nothing was written or run.
    AttemptSkipped {
        job: JobName,
        /// The watermark that blocked this attempt.
        watermark: Watermark,
        timestamp: Instant,
    },

    /// The attempt gave up before deciding (lock or store failure).
    AttemptAborted {
        job: JobName,
        phase: AttemptPhase,
        error: String,
        timestamp: Instant,
    },

    /// The user action returned an error or panicked.
    ActionFailed {
        job: JobName,
        error: String,
        timestamp: Instant,
    },

    /// An action was invoked directly, bypassing the execution guard.
    ManualRun {
        job: JobName,
        success: bool,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::JobRegistered { timestamp, .. } => *timestamp,
            Event::JobCancelled { timestamp, .. } => *timestamp,
            Event::AttemptExecuted { timestamp, .. } => *timestamp,
            Event::AttemptSkipped { timestamp, .. } => *timestamp,
            Event::AttemptAborted { timestamp, .. } => *timestamp,
            Event::ActionFailed { timestamp, .. } => *timestamp,
            Event::ManualRun { timestamp, .. } => *timestamp,
        }
    }

    /// Name of the job the event concerns.
    pub fn job(&self) -> &JobName {
        match self {
            Event::JobRegistered { job, .. }
            | Event::JobCancelled { job, .. }
            | Event::AttemptExecuted { job, .. }
            | Event::AttemptSkipped { job, .. }
            | Event::AttemptAborted { job, .. }
            | Event::ActionFailed { job, .. }
            | Event::ManualRun { job, .. } => job,
        }
    }

    /// Create a JobRegistered event.
    pub fn job_registered(job: JobName, mode: TimerMode) -> Self {
        Event::JobRegistered {
            job,
            mode,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobCancelled event.
    pub fn job_cancelled(job: JobName) -> Self {
        Event::JobCancelled {
            job,
            timestamp: Instant::now(),
        }
    }

    /// Create an AttemptExecuted event.
    pub fn attempt_executed(job: JobName, watermark: Watermark) -> Self {
        Event::AttemptExecuted {
            job,
            watermark,
            timestamp: Instant::now(),
        }
    }

    /// Create an AttemptSkipped event.
    pub fn attempt_skipped(job: JobName, watermark: Watermark) -> Self {
        Event::AttemptSkipped {
            job,
            watermark,
            timestamp: Instant::now(),
        }
    }

    /// Create an AttemptAborted event.
    pub fn attempt_aborted(job: JobName, phase: AttemptPhase, error: String) -> Self {
        Event::AttemptAborted {
            job,
            phase,
            error,
            timestamp: Instant::now(),
        }
    }

    /// Create an ActionFailed event.
    pub fn action_failed(job: JobName, error: String) -> Self {
        Event::ActionFailed {
            job,
            error,
            timestamp: Instant::now(),
        }
    }

    /// Create a ManualRun event.
    pub fn manual_run(job: JobName, success: bool) -> Self {
        Event::ManualRun {
            job,
            success,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
