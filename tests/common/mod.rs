//! Common test utilities shared across integration tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fleetcron::testing::TokioClock;
use fleetcron::{Coordinator, CoordinationStore, Event, EventHandler};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A wall-clock origin aligned to every period the tests use.
pub fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

/// Build `size` coordinators over clones of `store`, all driven by tokio's
/// (pausable) clock.
pub fn fleet<S>(store: S, size: usize) -> Vec<Coordinator<S>>
where
    S: CoordinationStore + Clone + 'static,
{
    (0..size)
        .map(|_| {
            Coordinator::builder(store.clone())
                .with_clock(Arc::new(TokioClock::new(origin())))
                .build()
        })
        .collect()
}

/// Records every event it receives.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().await.iter().filter(|e| matches(e)).count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
