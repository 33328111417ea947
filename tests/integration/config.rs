//! Loading jobs from a YAML directory and registering them.

use crate::common::RecordingHandler;
use fleetcron::config::{GlobalConfig, StoreConfig};
use fleetcron::testing::RecordingStore;
use fleetcron::{Coordinator, Event, InMemoryStore, TimerMode, load_jobs_from_directory};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn write(dir: &Path, file: &str, content: &str) {
    std::fs::write(dir.join(file), content).unwrap();
}

fn jobs_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "fleetcron.yaml",
        r#"
default_timezone: America/New_York
store:
  type: memory
lock:
  acquire_timeout_ms: 1000
  retry_delay_ms: 20
  ttl_ms: 3000
"#,
    );
    write(
        dir.path(),
        "heartbeat.yaml",
        r#"
name: heartbeat
schedule: "@every 5s"
command: "true"
"#,
    );
    write(
        dir.path(),
        "report.yaml",
        r#"
name: report
description: Morning report
schedule: "0 9 * * 1-5"
mode: once
command: sh
args: ["-c", "exit 0"]
timeout_secs: 5
"#,
    );
    write(
        dir.path(),
        "retired.yml",
        r#"
name: retired
schedule: "@daily"
enabled: false
command: "false"
"#,
    );
    dir
}

#[test]
fn test_load_directory_with_global_config() {
    let dir = jobs_dir();
    let loaded = load_jobs_from_directory(dir.path()).unwrap();

    let GlobalConfig { store, lock, .. } = &loaded.global;
    assert_eq!(store, &StoreConfig::Memory);
    assert_eq!(lock.to_options().retry_delay, Duration::from_millis(20));

    assert_eq!(loaded.jobs.len(), 3);
    let report = loaded.job("report").unwrap();
    assert_eq!(report.mode, TimerMode::OneShot);
    assert_eq!(report.schedule.timezone(), "America/New_York");
    assert_eq!(report.action.timeout(), Some(Duration::from_secs(5)));
    assert!(!loaded.job("retired").unwrap().enabled);
}

#[tokio::test]
async fn test_register_loaded_jobs_and_trigger_command() {
    let dir = jobs_dir();
    let loaded = load_jobs_from_directory(dir.path()).unwrap();
    let coordinator = Coordinator::builder(InMemoryStore::new())
        .with_lock_options(loaded.global.lock.to_options())
        .build();

    for job in loaded.jobs.iter().filter(|job| job.enabled) {
        job.register(&coordinator).await;
    }

    assert!(coordinator.is_registered("heartbeat").await);
    assert!(coordinator.is_registered("report").await);
    assert!(!coordinator.is_registered("retired").await);
    assert_eq!(
        coordinator.timer("report").await.unwrap().mode(),
        TimerMode::OneShot
    );

    assert!(coordinator.run_job("report").await.unwrap());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_trigger_runs_command_without_arming_timer_or_touching_store() {
    let dir = jobs_dir();
    let loaded = load_jobs_from_directory(dir.path()).unwrap();
    let store = Arc::new(RecordingStore::new(InMemoryStore::new()));
    let coordinator = Coordinator::new(Arc::clone(&store));
    let handler = RecordingHandler::new();
    coordinator.event_bus().register(handler.clone()).await;

    loaded
        .job("heartbeat")
        .unwrap()
        .trigger(&coordinator)
        .await
        .unwrap();
    coordinator.shutdown().await;

    assert!(!coordinator.is_registered("heartbeat").await);
    assert_eq!(store.counts().total(), 0);
    let events = handler.events().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        Event::ManualRun { job, success: true, .. } if job.as_str() == "heartbeat"
    ));
}

#[test]
fn test_invalid_job_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "bad.yaml",
        r#"
name: bad
schedule:
  cron: "0 9 * * *"
  timezone: Mars/Olympus_Mons
command: echo
"#,
    );

    let err = load_jobs_from_directory(dir.path()).unwrap_err();
    assert!(err.to_string().contains("bad"));
}
