//! Action trait and error types.
//!
//! An `Action` is the user-supplied unit of work a job runs when its
//! schedule fires and the execution guard grants the slot.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a job action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Action failed with a message.
    #[error("action failed: {0}")]
    Failed(String),

    /// Action panicked while running.
    #[error("action panicked: {0}")]
    Panicked(String),

    /// Action was cancelled before it finished.
    #[error("action cancelled")]
    Cancelled,

    /// Action did not finish in time.
    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    /// External command exited with a non-zero code.
    #[error("command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ActionError {
    /// Shorthand for [`ActionError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed(message.into())
    }
}

/// Work executed when a job fires.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use fleetcron::{Action, ActionError};
///
/// struct Rotate;
///
/// #[async_trait]
/// impl Action for Rotate {
///     async fn run(&self) -> Result<(), ActionError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the action once.
    async fn run(&self) -> Result<(), ActionError>;

    /// Optional description for display/logging purposes.
    fn description(&self) -> Option<&str> {
        None
    }
}

/// Adapter turning an async closure into an [`Action`].
pub struct FnAction<F> {
    f: F,
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ActionError>> + Send,
{
    async fn run(&self) -> Result<(), ActionError> {
        (self.f)().await
    }
}

/// Wrap an async closure as a shareable action.
///
/// ```
/// let action = fleetcron::action_fn(|| async { Ok(()) });
/// # let _ = action;
/// ```
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn Action>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    Arc::new(FnAction { f })
}
