//! Cross-process coordination through a shared SQLite file.
//!
//! Each `SqliteStore` opened on the same path has its own connection pool,
//! the same as separate processes would.

#![cfg(feature = "sqlite")]

use crate::common::origin;
use chrono::Duration as ChronoDuration;
use fleetcron::testing::{CountingAction, ManualClock};
use fleetcron::{CoordinationStore, Coordinator, JobName, Schedule, SqliteStore, Watermark};
use std::path::Path;
use std::sync::Arc;

async fn node(path: &Path, clock: Arc<ManualClock>) -> Coordinator<SqliteStore> {
    let store = SqliteStore::new(path).await.unwrap();
    Coordinator::builder(store).with_clock(clock).build()
}

fn every_5s() -> Schedule {
    Schedule::new("@every 5s").unwrap()
}

#[tokio::test]
async fn test_two_processes_share_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");
    let clock = Arc::new(ManualClock::new(origin() + ChronoDuration::milliseconds(3)));
    let a = node(&path, clock.clone()).await;
    let b = node(&path, clock.clone()).await;
    let action = CountingAction::new();
    let job = JobName::new("backup");

    let first = a.attempt(&action.as_action(), &every_5s(), &job).await;
    let second = b.attempt(&action.as_action(), &every_5s(), &job).await;

    assert!(first.executed());
    assert!(second.skipped());
    assert_eq!(action.count(), 1);

    clock.advance(ChronoDuration::seconds(5));
    let third = b.attempt(&action.as_action(), &every_5s(), &job).await;
    assert!(third.executed());
    assert_eq!(
        a.store().get("backup").await.unwrap(),
        Some(Watermark::from_millis(origin().timestamp_millis() + 10_000))
    );
}

#[tokio::test]
async fn test_concurrent_attempts_execute_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");
    let clock = Arc::new(ManualClock::new(origin() + ChronoDuration::milliseconds(3)));
    let nodes = vec![
        node(&path, clock.clone()).await,
        node(&path, clock.clone()).await,
        node(&path, clock.clone()).await,
    ];
    let action = CountingAction::new();
    let job = JobName::new("backup");
    let schedule = every_5s();

    let (a0, a1, a2) = (action.as_action(), action.as_action(), action.as_action());
    let (x, y, z) = tokio::join!(
        nodes[0].attempt(&a0, &schedule, &job),
        nodes[1].attempt(&a1, &schedule, &job),
        nodes[2].attempt(&a2, &schedule, &job),
    );

    let executed = [x, y, z].iter().filter(|o| o.executed()).count();
    assert_eq!(executed, 1);
    assert_eq!(action.count(), 1);
}

#[tokio::test]
async fn test_cancel_deletes_shared_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");
    let clock = Arc::new(ManualClock::new(origin()));
    let a = node(&path, clock.clone()).await;
    let b = node(&path, clock).await;

    b.store()
        .set("backup", Watermark::from_millis(1))
        .await
        .unwrap();
    a.add_job("backup", every_5s(), CountingAction::new().as_action())
        .await;

    assert!(a.cancel_job("backup").await.unwrap());
    assert_eq!(b.store().get("backup").await.unwrap(), None);
    assert_eq!(b.store().lock_holder("backupLock").await.unwrap(), None);
}
