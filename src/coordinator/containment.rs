//! Failure containment for user actions.
//!
//! An action that returns an error or panics must never take down the timer
//! that invoked it. Each invocation runs on its own task so a panic surfaces
//! as a [`tokio::task::JoinError`] instead of unwinding through the driver.

use std::any::Any;
use std::sync::Arc;

use crate::core::action::{Action, ActionError};
use crate::core::types::JobName;
use crate::events::{Event, EventBus};

/// Run `action` to completion, converting a panic into [`ActionError::Panicked`].
pub async fn contain(action: Arc<dyn Action>) -> Result<(), ActionError> {
    let handle = tokio::spawn(async move { action.run().await });

    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(ActionError::Panicked(panic_message(e.into_panic()))),
        Err(_) => Err(ActionError::Cancelled),
    }
}

/// Route a contained failure to the log and the event bus.
pub(crate) async fn report_failure(event_bus: &EventBus, job: &JobName, error: &ActionError) {
    tracing::error!(job = %job, error = %error, "Job action failed");
    event_bus
        .emit(Event::action_failed(job.clone(), error.to_string()))
        .await;
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
