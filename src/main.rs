//! fleetcron - fleet-wide at-most-once job scheduling.
//!
//! Usage:
//!   fleetcron run <jobs-dir>            Register every job and run until Ctrl+C
//!   fleetcron validate <jobs-dir>       Validate job configurations without running
//!   fleetcron list <jobs-dir>           List jobs and their next instants
//!   fleetcron trigger <jobs-dir> <job>  Run one job's action now, bypassing dedup

use chrono::Utc;
use clap::{Parser, Subcommand};
use fleetcron::config::{LoadedConfig, StoreConfig};
use fleetcron::{
    CoordinationStore, Coordinator, Event, EventHandler, InMemoryStore, LOOKAHEAD, Recurrence,
    load_jobs_from_directory,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// fleetcron - run the same jobs on every node, execute each slot once
#[derive(Parser)]
#[command(name = "fleetcron")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register jobs from a directory and run until interrupted
    Run {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,
    },

    /// Validate job configurations without running
    Validate {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,
    },

    /// List all jobs in the directory
    List {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,
    },

    /// Run a job's action once, right now, on this node only
    Trigger {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,

        /// Name of the job to run
        #[arg(value_name = "JOB")]
        job: String,
    },
}

/// Logs lifecycle events the coordinator does not already log itself.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::AttemptSkipped { job, watermark, .. } => {
                info!("Job '{}' skipped: slot already claimed until {}", job, watermark);
            }
            Event::ManualRun { job, success, .. } => {
                if *success {
                    info!("Job '{}' finished (manual run)", job);
                } else {
                    warn!("Job '{}' failed (manual run)", job);
                }
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { jobs_dir } => {
            run_jobs(jobs_dir).await?;
        }
        Commands::Validate { jobs_dir } => {
            validate_jobs(jobs_dir)?;
        }
        Commands::List { jobs_dir } => {
            list_jobs(jobs_dir)?;
        }
        Commands::Trigger { jobs_dir, job } => {
            trigger_job(jobs_dir, job).await?;
        }
    }

    Ok(())
}

/// Open the coordination store named in the global configuration.
async fn open_store(
    config: &StoreConfig,
) -> Result<Arc<dyn CoordinationStore>, Box<dyn std::error::Error>> {
    match config {
        StoreConfig::Memory => {
            warn!("Using the in-memory store: jobs are only deduplicated within this process");
            Ok(Arc::new(InMemoryStore::new()))
        }
        #[cfg(feature = "sqlite")]
        StoreConfig::Sqlite { path } => {
            info!("Using SQLite store at {}", path);
            Ok(Arc::new(fleetcron::SqliteStore::new(path).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreConfig::Sqlite { .. } => {
            Err("this build of fleetcron was compiled without the `sqlite` feature".into())
        }
    }
}

async fn build_coordinator(
    loaded: &LoadedConfig,
) -> Result<Coordinator<Arc<dyn CoordinationStore>>, Box<dyn std::error::Error>> {
    let store = open_store(&loaded.global.store).await?;
    let coordinator = Coordinator::builder(store)
        .with_lock_options(loaded.global.lock.to_options())
        .build();
    coordinator
        .event_bus()
        .register(Arc::new(LoggingHandler))
        .await;
    Ok(coordinator)
}

/// Register every enabled job and wait for Ctrl+C.
async fn run_jobs(jobs_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading jobs from: {}", jobs_dir.display());

    let loaded = load_jobs_from_directory(&jobs_dir)?;

    if loaded.jobs.is_empty() {
        warn!("No job files found in {}", jobs_dir.display());
        return Ok(());
    }

    let coordinator = build_coordinator(&loaded).await?;

    for job in &loaded.jobs {
        if !job.enabled {
            info!("  - {} (disabled, not registered)", job.name);
            continue;
        }
        job.register(&coordinator).await;
        info!("  - {} [{}] {}", job.name, job.schedule, job.mode);
    }

    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    coordinator.shutdown().await;
    info!("Goodbye!");
    Ok(())
}

/// Validate job configurations without running.
fn validate_jobs(jobs_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating jobs in: {}", jobs_dir.display());

    match load_jobs_from_directory(&jobs_dir) {
        Ok(loaded) => {
            info!("All {} job(s) are valid:", loaded.jobs.len());
            for job in &loaded.jobs {
                info!("  - {} ({}): OK", job.name, job.schedule);
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// List all jobs in the directory with their upcoming instants.
fn list_jobs(jobs_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_jobs_from_directory(&jobs_dir)?;

    if loaded.jobs.is_empty() {
        println!("No jobs found in {}", jobs_dir.display());
        return Ok(());
    }

    println!("Jobs in {}:", jobs_dir.display());
    println!();

    let now = Utc::now();
    for job in &loaded.jobs {
        println!("Name: {}", job.name);
        if let Some(description) = &job.description {
            println!("  Description: {}", description);
        }
        println!("  Enabled: {}", job.enabled);
        println!("  Mode: {}", job.mode);
        println!("  Schedule: {}", job.schedule);
        println!(
            "  Command: {} {}",
            job.action.program(),
            job.action.args().join(" ")
        );

        match job.schedule.next_n_after(now, LOOKAHEAD) {
            Ok(instants) => {
                for instant in instants {
                    println!("    next: {}", instant.to_rfc3339());
                }
            }
            Err(e) => println!("    next: none ({})", e),
        }

        println!();
    }

    Ok(())
}

/// Run one job's action immediately on this node, without arming its timer.
async fn trigger_job(jobs_dir: PathBuf, name: String) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading jobs from: {}", jobs_dir.display());

    let loaded = load_jobs_from_directory(&jobs_dir)?;

    let Some(job) = loaded.job(&name) else {
        error!("Job '{}' not found", name);
        error!(
            "Available jobs: {}",
            loaded
                .jobs
                .iter()
                .map(|j| j.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return Err(format!("Job '{}' not found", name).into());
    };

    let coordinator = build_coordinator(&loaded).await?;

    info!("Triggering job '{}'...", name);
    job.trigger(&coordinator).await?;
    info!("Done!");
    Ok(())
}
