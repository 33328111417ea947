//! In-memory coordination store.
//!
//! Provides a thread-safe backend for testing and single-host fleets: every
//! coordinator sharing one `Arc<InMemoryStore>` behaves like a separate
//! process pointed at the same central store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::{CoordinationStore, LockLease, StoreError};
use crate::core::types::Watermark;

#[derive(Debug, Clone, Copy)]
struct HeldLock {
    token: Uuid,
    expires_at: Instant,
}

/// In-memory store backend.
///
/// Thread-safe storage using RwLock for concurrent access.
/// Data is not persisted across restarts.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, Watermark>>,
    locks: RwLock<HashMap<String, HeldLock>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently held by an unexpired lease.
    pub fn is_locked(&self, name: &str) -> bool {
        self.locks
            .read()
            .map(|locks| {
                locks
                    .get(name)
                    .is_some_and(|held| held.expires_at > Instant::now())
            })
            .unwrap_or(false)
    }

    /// Number of stored watermarks.
    pub fn len(&self) -> usize {
        self.values.read().map(|values| values.len()).unwrap_or(0)
    }

    /// Whether no watermark is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Watermark>, StoreError> {
        let values = self.values.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(values.get(key).copied())
    }

    async fn set(&self, key: &str, value: Watermark) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|_| StoreError::LockPoisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|_| StoreError::LockPoisoned)?;
        values.remove(key);
        Ok(())
    }

    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockLease>, StoreError> {
        let mut locks = self.locks.write().map_err(|_| StoreError::LockPoisoned)?;
        let now = Instant::now();

        if let Some(held) = locks.get(name) {
            if held.expires_at > now {
                return Ok(None);
            }
            tracing::debug!(lock = name, "Reclaiming expired lock");
        }

        let lease = LockLease::new(name);
        locks.insert(
            name.to_string(),
            HeldLock {
                token: lease.token(),
                expires_at: now + ttl,
            },
        );
        Ok(Some(lease))
    }

    async fn release(&self, lease: LockLease) -> Result<(), StoreError> {
        let mut locks = self.locks.write().map_err(|_| StoreError::LockPoisoned)?;
        if locks
            .get(lease.name())
            .is_some_and(|held| held.token == lease.token())
        {
            locks.remove(lease.name());
        }
        Ok(())
    }
}
