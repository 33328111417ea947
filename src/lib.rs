//! fleetcron - fleet-wide at-most-once job scheduling.
//!
//! Every process in a fleet registers the same jobs and runs its own local
//! timers. When a timer fires, the process takes the job's lock in the shared
//! coordination store, compares the stored watermark against now, and only
//! the first process to see a stale watermark advances it and runs the job.

pub mod config;
pub mod coordinator;
pub mod core;
pub mod events;
pub mod execution;
pub mod store;
pub mod testing;

pub use config::{ConfigError, GlobalConfig, JobConfig, JobDefinition, load_jobs_from_directory};
pub use coordinator::{
    AttemptOutcome, AttemptPhase, Coordinator, CoordinatorBuilder, CoordinatorError, LOOKAHEAD,
    TimerHandle, TimerMode, contain,
};
pub use crate::core::action::{Action, ActionError, FnAction, action_fn};
pub use crate::core::clock::{Clock, SystemClock};
pub use crate::core::schedule::{Recurrence, Schedule, ScheduleError};
pub use crate::core::types::{JobName, Watermark};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{CommandAction, CommandActionBuilder};
pub use store::{CoordinationStore, InMemoryStore, LockError, LockLease, LockOptions, StoreError};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
