//! External command actions.
//!
//! [`CommandAction`] runs a program as a job's action, so jobs declared in
//! YAML can be scheduled without writing Rust.
//!
//! ```rust
//! use fleetcron::CommandAction;
//! use std::time::Duration;
//!
//! let action = CommandAction::builder("pg_dump")
//!     .args(["--format", "custom", "warehouse"])
//!     .env("PGHOST", "db.internal")
//!     .working_dir("/var/backups")
//!     .timeout(Duration::from_secs(600))
//!     .build();
//! assert_eq!(action.program(), "pg_dump");
//! ```
//!
//! # Error Handling
//!
//! - **Non-zero exit code**: [`ActionError::CommandFailed`] with the exit
//!   code and captured stderr
//! - **Timeout**: [`ActionError::Timeout`]; the child is killed when its
//!   future is dropped
//! - **Spawn failure** (program not found, bad working directory):
//!   [`ActionError::Failed`]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::action::{Action, ActionError};

/// An action that executes an external command.
#[derive(Debug, Clone)]
pub struct CommandAction {
    /// Display name, defaults to the program
    name: String,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandAction {
    /// Create a new builder for a command action.
    pub fn builder(program: impl Into<String>) -> CommandActionBuilder {
        CommandActionBuilder::new(program)
    }

    /// Get the program being executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Get the extra environment variables.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Get the timeout duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl Action for CommandAction {
    async fn run(&self) -> Result<(), ActionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = match self.timeout {
            Some(duration) => timeout(duration, cmd.output())
                .await
                .map_err(|_| ActionError::Timeout(duration))?,
            None => cmd.output().await,
        }
        .map_err(|e| ActionError::Failed(format!("failed to start '{}': {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!(command = %self.name, stdout = %stdout.trim(), "Command output");
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(ActionError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn description(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// Builder for creating `CommandAction` instances.
#[derive(Debug, Clone)]
pub struct CommandActionBuilder {
    name: Option<String>,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandActionBuilder {
    /// Create a new builder with the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            name: None,
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a single environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Build the `CommandAction`.
    pub fn build(self) -> CommandAction {
        let name = self.name.unwrap_or_else(|| self.program.clone());
        CommandAction {
            name,
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            timeout: self.timeout,
        }
    }
}
