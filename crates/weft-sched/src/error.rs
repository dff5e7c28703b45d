//! Error types for scheduling and task execution.
//!
//! Two layers of failure exist:
//!
//! - **`ScheduleError`**: the scheduler refused an operation (unknown queue,
//!   already shut down). Returned synchronously to the caller.
//! - **`TaskError`**: a single task did not produce a result. Delivered through
//!   the task's completion signal and the task-failed event; never aborts the
//!   dispatcher or sibling tasks.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

use crate::task::QueueId;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Errors returned by scheduler operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The scheduler must be created from within a tokio runtime
    #[error("no tokio runtime is available to run the dispatcher")]
    NoRuntime,

    /// The queue id was not produced by this scheduler
    #[error("unknown queue: {0}")]
    UnknownQueue(QueueId),

    /// Shutdown has been requested; no new work is accepted
    #[error("scheduler has been shut down")]
    ShutDown,
}

/// Outcome of a task that did not complete successfully.
///
/// Cloneable so the same failure can be handed to the completion signal and to
/// every observer.
#[derive(Debug, Error, Clone)]
pub enum TaskError {
    /// The shutdown signal was observed before the task finished
    #[error("task cancelled by shutdown")]
    Cancelled,

    /// The processing function panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The processing function returned an error
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),

    /// The completion signal was already taken by another caller
    #[error("task completion has already been observed")]
    AlreadyObserved,
}

impl TaskError {
    /// Wrap an arbitrary error as a task failure.
    #[must_use]
    pub fn failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(Arc::new(error))
    }

    /// Build a task failure from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }

    /// Returns `true` if the task ended because of shutdown.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
