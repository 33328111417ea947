//! Job registry tests through the public coordinator API.

use crate::common::{RecordingHandler, fleet};
use fleetcron::testing::{CountingAction, RecordingStore};
use fleetcron::{CoordinationStore, Coordinator, Event, InMemoryStore, Schedule, TimerMode};
use std::sync::Arc;
use std::time::Duration;

fn every_5s() -> Schedule {
    Schedule::new("@every 5s").unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_local_to_the_cancelling_node() {
    let store = Arc::new(InMemoryStore::new());
    let nodes = fleet(Arc::clone(&store), 2);
    let action = CountingAction::new();
    for node in &nodes {
        node.add_job("x", every_5s(), action.as_action()).await;
    }

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert_eq!(action.count(), 1);
    assert!(store.get("x").await.unwrap().is_some());

    assert!(nodes[0].cancel_job("x").await.unwrap());
    assert!(store.get("x").await.unwrap().is_none());
    assert!(!nodes[0].is_registered("x").await);
    assert!(nodes[1].is_registered("x").await);

    // The other node keeps its timer and claims the next slot alone.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(action.count(), 2);

    assert!(nodes[1].cancel_job("x").await.unwrap());
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(action.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_single_execution_job_fires_once_and_stays_registered() {
    let store = Arc::new(InMemoryStore::new());
    let nodes = fleet(Arc::clone(&store), 2);
    let action = CountingAction::new();
    for node in &nodes {
        let timer = node
            .add_single_execution_job("once", every_5s(), action.as_action())
            .await;
        assert_eq!(timer.mode(), TimerMode::OneShot);
    }

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(action.count(), 1);
    for node in &nodes {
        assert!(node.is_registered("once").await);
        assert_eq!(node.timer("once").await.unwrap().fire_count(), 1);
    }
}

#[tokio::test]
async fn test_run_job_bypasses_dedup_on_every_node() {
    let store = Arc::new(RecordingStore::new(InMemoryStore::new()));
    let nodes = fleet(Arc::clone(&store), 2);
    let action = CountingAction::new();
    for node in &nodes {
        node.add_job("x", every_5s(), action.as_action()).await;
    }

    for node in &nodes {
        assert!(node.run_job("x").await.unwrap());
    }

    assert_eq!(action.count(), 2);
    assert_eq!(store.counts().total(), 0);

    for node in &nodes {
        node.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_manual_run_outlasting_a_period_claims_no_slot() {
    let store = Arc::new(RecordingStore::new(InMemoryStore::new()));
    let node = fleet(Arc::clone(&store), 1).remove(0);
    let action = CountingAction::new().with_delay(Duration::from_secs(6));

    node.run_action("report", action.as_action()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    node.shutdown().await;

    assert_eq!(action.count(), 1);
    assert!(!node.is_registered("report").await);
    assert_eq!(store.counts().total(), 0);
    assert!(store.inner().get("report").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_names_are_noops() {
    let store = Arc::new(RecordingStore::new(InMemoryStore::new()));
    let coordinator = Coordinator::new(Arc::clone(&store));

    assert!(!coordinator.cancel_job("never-added").await.unwrap());
    assert!(!coordinator.run_job("never-added").await.unwrap());
    assert!(coordinator.timer("never-added").await.is_none());

    assert_eq!(store.counts().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_re_added_job_leaves_previous_timer_contending() {
    let store = Arc::new(InMemoryStore::new());
    let node = fleet(Arc::clone(&store), 1).remove(0);
    let original = CountingAction::new();
    let replacement = CountingAction::new();

    let first = node.add_job("x", every_5s(), original.as_action()).await;
    let second = node.add_job("x", every_5s(), replacement.as_action()).await;

    tokio::time::sleep(Duration::from_millis(10_500)).await;

    // Both timers wake per slot; the shared lock still lets only one run.
    assert_eq!(first.fire_count(), 2);
    assert_eq!(second.fire_count(), 2);
    assert_eq!(original.count() + replacement.count(), 2);

    node.cancel_job("x").await.unwrap();
    assert!(second.is_cancelled());
    assert!(!first.is_cancelled());
    first.cancel();
}

#[tokio::test]
async fn test_lifecycle_events_are_emitted() {
    let coordinator = Coordinator::new(InMemoryStore::new());
    let handler = RecordingHandler::new();
    coordinator.event_bus().register(handler.clone()).await;

    coordinator
        .add_job("x", every_5s(), CountingAction::new().as_action())
        .await;
    coordinator.run_job("x").await.unwrap();
    coordinator.cancel_job("x").await.unwrap();

    let events = handler.events().await;
    assert_eq!(events.len(), 3);
    assert!(matches!(
        &events[0],
        Event::JobRegistered { job, mode: TimerMode::Repeating, .. } if job.as_str() == "x"
    ));
    assert!(matches!(&events[1], Event::ManualRun { success: true, .. }));
    assert!(matches!(&events[2], Event::JobCancelled { .. }));
}

#[tokio::test]
async fn test_shutdown_clears_registry() {
    let coordinator = Coordinator::new(InMemoryStore::new());
    let a = coordinator
        .add_job("a", every_5s(), CountingAction::new().as_action())
        .await;
    let b = coordinator
        .add_single_execution_job("b", every_5s(), CountingAction::new().as_action())
        .await;

    let names: Vec<String> = coordinator
        .jobs()
        .await
        .iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(names, vec!["a", "b"]);

    coordinator.shutdown().await;

    assert!(a.is_cancelled());
    assert!(b.is_cancelled());
    assert!(coordinator.jobs().await.is_empty());
}
