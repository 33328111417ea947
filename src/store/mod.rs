//! Coordination store abstraction shared by every process in the fleet.
//!
//! A store holds one integer watermark per job name and grants named,
//! expiring mutual-exclusion leases. Backends are pluggable (in-memory,
//! SQLite, etc.).

mod memory;
#[cfg(any(feature = "sqlite", test))]
mod sqlite;

pub use memory::InMemoryStore;
#[cfg(any(feature = "sqlite", test))]
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::core::types::Watermark;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// The backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("corrupt value for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Errors that can occur while acquiring a fleet-wide lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock stayed held by someone else for the whole acquisition window.
    #[error("timed out after {waited:?} waiting for lock '{name}'")]
    Timeout { name: String, waited: Duration },

    /// The store failed while trying to take the lock.
    #[error("store error while acquiring lock: {0}")]
    Store(#[from] StoreError),
}

/// Proof of holding a named lock.
///
/// Handing the lease back to [`CoordinationStore::release`] consumes it, so a
/// lease can be released at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct LockLease {
    name: String,
    token: Uuid,
}

impl LockLease {
    /// Create a lease for `name` with a fresh random token.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: Uuid::new_v4(),
        }
    }

    /// Rebuild a lease from its parts (used by backends).
    pub fn from_parts(name: impl Into<String>, token: Uuid) -> Self {
        Self {
            name: name.into(),
            token,
        }
    }

    /// Name of the lock this lease holds.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token distinguishing this holder from any later holder of the same lock.
    pub fn token(&self) -> Uuid {
        self.token
    }
}

/// Tuning for the acquire/retry protocol layered over [`CoordinationStore::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// How long to keep retrying before giving up on this attempt.
    pub acquire_timeout: Duration,
    /// Pause between acquisition attempts.
    pub retry_delay: Duration,
    /// Lease lifetime; an unreleased lease is reclaimable after this long.
    ///
    /// The critical section is two store round trips. Keep this comfortably
    /// above the backend's worst-case call latency (1s for the SQLite busy
    /// timeout), or a sibling can reclaim the lock mid-section.
    pub ttl: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(50),
            ttl: Duration::from_secs(5),
        }
    }
}

/// Key-value and lock primitives shared fleet-wide.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    // Watermark operations

    /// Read the watermark stored under `key`; `None` means never executed.
    async fn get(&self, key: &str) -> Result<Option<Watermark>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Watermark) -> Result<(), StoreError>;

    /// Remove the value under `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    // Lock operations

    /// Take the named lock if it is free or its previous lease expired.
    ///
    /// Returns `None` without waiting when someone else holds it.
    async fn try_acquire(&self, name: &str, ttl: Duration)
    -> Result<Option<LockLease>, StoreError>;

    /// Give the lock back. A lease that already expired and was taken over
    /// by another holder is ignored.
    async fn release(&self, lease: LockLease) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: CoordinationStore + ?Sized> CoordinationStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Watermark>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Watermark) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockLease>, StoreError> {
        (**self).try_acquire(name, ttl).await
    }

    async fn release(&self, lease: LockLease) -> Result<(), StoreError> {
        (**self).release(lease).await
    }
}
