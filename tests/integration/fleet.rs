//! Fleet-wide deduplication tests.
//!
//! Several coordinators share one in-memory store, standing in for several
//! processes pointed at the same central store. Time is paused so every
//! node's timer wakes at exactly the same instants.

use crate::common::{RecordingHandler, fleet, origin};
use chrono::Duration as ChronoDuration;
use fleetcron::testing::{CountingAction, FailingAction, ManualClock};
use fleetcron::{
    AttemptOutcome, Coordinator, CoordinationStore, Event, InMemoryStore, JobName, Schedule,
    Watermark,
};
use std::sync::Arc;
use std::time::Duration;

fn every_5s() -> Schedule {
    Schedule::new("@every 5s").unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_three_nodes_execute_each_slot_once() {
    let store = Arc::new(InMemoryStore::new());
    let nodes = fleet(Arc::clone(&store), 3);
    let action = CountingAction::new();

    let mut timers = Vec::new();
    for node in &nodes {
        timers.push(node.add_job("report", every_5s(), action.as_action()).await);
    }

    tokio::time::sleep(Duration::from_millis(20_500)).await;

    // Slots at +5s, +10s, +15s and +20s.
    assert_eq!(action.count(), 4);
    for timer in &timers {
        assert_eq!(timer.fire_count(), 4);
    }

    let expected = origin().timestamp_millis() + 25_000;
    assert_eq!(
        store.get("report").await.unwrap(),
        Some(Watermark::from_millis(expected))
    );

    for node in &nodes {
        node.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_every_node_observes_executions_and_skips() {
    let store = Arc::new(InMemoryStore::new());
    let nodes = fleet(Arc::clone(&store), 2);
    let handler = RecordingHandler::new();
    for node in &nodes {
        node.event_bus().register(handler.clone()).await;
    }

    let action = CountingAction::new();
    for node in &nodes {
        node.add_job("report", every_5s(), action.as_action()).await;
    }

    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let executed = handler
        .count(|e| matches!(e, Event::AttemptExecuted { .. }))
        .await;
    let skipped = handler
        .count(|e| matches!(e, Event::AttemptSkipped { .. }))
        .await;
    let aborted = handler
        .count(|e| matches!(e, Event::AttemptAborted { .. }))
        .await;
    assert_eq!(executed, 2);
    assert_eq!(skipped, 2);
    assert_eq!(aborted, 0);
    assert_eq!(action.count(), 2);

    for node in &nodes {
        node.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_distinct_jobs_do_not_contend() {
    let store = Arc::new(InMemoryStore::new());
    let nodes = fleet(Arc::clone(&store), 2);
    let a = CountingAction::new();
    let b = CountingAction::new();

    for node in &nodes {
        node.add_job("a", every_5s(), a.as_action()).await;
        node.add_job("b", every_5s(), b.as_action()).await;
    }

    tokio::time::sleep(Duration::from_millis(15_500)).await;

    assert_eq!(a.count(), 3);
    assert_eq!(b.count(), 3);
    assert_eq!(store.len(), 2);

    for node in &nodes {
        node.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_action_runs_outside_the_lock() {
    let store = Arc::new(InMemoryStore::new());
    let nodes = fleet(Arc::clone(&store), 3);
    let handler = RecordingHandler::new();
    for node in &nodes {
        node.event_bus().register(handler.clone()).await;
    }

    // Each run takes most of a period; siblings must not wait on it.
    let action = CountingAction::new().with_delay(Duration::from_secs(3));
    for node in &nodes {
        node.add_job("slow", every_5s(), action.as_action()).await;
    }

    tokio::time::sleep(Duration::from_secs(24)).await;

    assert_eq!(action.count(), 4);
    assert_eq!(
        handler
            .count(|e| matches!(e, Event::AttemptAborted { .. }))
            .await,
        0
    );
    assert!(!store.is_locked("slowLock"));

    for node in &nodes {
        node.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_action_does_not_stop_the_schedule() {
    let store = Arc::new(InMemoryStore::new());
    let nodes = fleet(Arc::clone(&store), 2);
    let handler = RecordingHandler::new();
    nodes[0].event_bus().register(handler.clone()).await;
    nodes[1].event_bus().register(handler.clone()).await;

    let action = FailingAction::panicking("disk on fire");
    for node in &nodes {
        node.add_job("flaky", every_5s(), action.as_action()).await;
    }

    tokio::time::sleep(Duration::from_millis(15_500)).await;

    assert_eq!(action.calls(), 3);
    assert_eq!(
        handler
            .count(|e| matches!(e, Event::ActionFailed { .. }))
            .await,
        3
    );
    let expected = origin().timestamp_millis() + 20_000;
    assert_eq!(
        store.get("flaky").await.unwrap(),
        Some(Watermark::from_millis(expected))
    );

    for node in &nodes {
        node.shutdown().await;
    }
}

#[tokio::test]
async fn test_late_lock_holder_does_not_refire_claimed_slot() {
    let store = Arc::new(InMemoryStore::new());
    let prompt_clock = Arc::new(ManualClock::new(origin() + ChronoDuration::milliseconds(2)));
    let late_clock = Arc::new(ManualClock::new(origin() + ChronoDuration::milliseconds(900)));
    let prompt = Coordinator::builder(Arc::clone(&store))
        .with_clock(prompt_clock)
        .build();
    let late = Coordinator::builder(Arc::clone(&store))
        .with_clock(late_clock)
        .build();
    let action = CountingAction::new();
    let job = JobName::new("report");

    let first = prompt.attempt(&action.as_action(), &every_5s(), &job).await;
    let second = late.attempt(&action.as_action(), &every_5s(), &job).await;

    assert!(first.executed());
    assert!(second.skipped());
    assert_eq!(action.count(), 1);
}

#[tokio::test]
async fn test_wakeup_delayed_past_a_period_claims_next_future_slot() {
    let store = Arc::new(InMemoryStore::new());
    store
        .set(
            "report",
            Watermark::from_millis(origin().timestamp_millis() + 5_000),
        )
        .await
        .unwrap();
    let clock = Arc::new(ManualClock::new(origin() + ChronoDuration::milliseconds(12_300)));
    let node = Coordinator::builder(Arc::clone(&store))
        .with_clock(clock)
        .build();
    let action = CountingAction::new();

    let outcome = node
        .attempt(&action.as_action(), &every_5s(), &JobName::new("report"))
        .await;

    let expected = origin().timestamp_millis() + 15_000;
    assert!(matches!(
        outcome,
        AttemptOutcome::Executed { watermark, .. } if watermark.as_millis() == expected
    ));
    assert_eq!(action.count(), 1);
}
