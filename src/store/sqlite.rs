//! SQLite coordination store.
//!
//! Every process that opens the same database file joins the same fleet:
//! watermarks and lock leases live in ordinary tables and lease expiry is
//! measured in wall-clock milliseconds so it means the same thing to all of
//! them.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::{CoordinationStore, LockLease, StoreError};
use crate::core::types::Watermark;

/// How long a connection waits on a database locked by another process.
///
/// Must stay well below [`LockOptions::ttl`](super::LockOptions): a store call
/// made while holding a lease cannot be allowed to outlive it.
const BUSY_TIMEOUT: Duration = Duration::from_secs(1);

/// SQLite store backend.
///
/// Provides persistent, multi-process coordination with automatic schema migration.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the store at the given database path.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(backend)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(backend)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let schema = include_str!("../../migrations/001_coordination_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl CoordinationStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Watermark>, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM watermarks WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        Ok(row.map(|(value,)| Watermark::from_millis(value)))
    }

    async fn set(&self, key: &str, value: Watermark) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO watermarks (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value.as_millis())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM watermarks WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockLease>, StoreError> {
        let lease = LockLease::new(name);
        let now = now_millis();
        let expires_at = now.saturating_add(duration_millis(ttl));

        // Inserts a free lock or takes over an expired one in a single statement.
        let result = sqlx::query(
            r#"
            INSERT INTO locks (name, token, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE
                SET token = excluded.token, expires_at = excluded.expires_at
                WHERE locks.expires_at <= ?
            "#,
        )
        .bind(name)
        .bind(lease.token().to_string())
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            Ok(Some(lease))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, lease: LockLease) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM locks WHERE name = ? AND token = ?")
            .bind(lease.name())
            .bind(lease.token().to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

impl SqliteStore {
    /// Token of the current holder of `name`, if any row exists for it.
    pub async fn lock_holder(&self, name: &str) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT token FROM locks WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(|(token,)| {
            Uuid::parse_str(&token).map_err(|e| StoreError::Corrupt {
                key: name.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }
}
