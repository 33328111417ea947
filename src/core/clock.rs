//! Source of the current instant.
//!
//! The execution guard compares watermarks against "now" as observed inside
//! the critical section, so the clock is injectable for deterministic tests.

use chrono::{DateTime, Utc};
use std::fmt;

/// Provides the current wall-clock instant.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
