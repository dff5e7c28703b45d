//! The pluggable processing function.

use async_trait::async_trait;

use crate::error::TaskError;
use crate::shutdown::ShutdownSignal;
use crate::task::Task;

/// Turns a task's input into an output.
///
/// Implementations should call [`ShutdownSignal::check`] between stages and
/// return [`TaskError::Cancelled`] once shutdown is observed. Any other error,
/// or a panic, fails only this task.
#[async_trait]
pub trait TaskProcessor: Send + Sync + 'static {
    /// Input carried by each task.
    type Input: Send + Sync + 'static;
    /// Result appended to the task's queue on success.
    type Output: Send + Sync + 'static;

    /// Process one task.
    async fn process(
        &self,
        task: &Task<Self::Input>,
        shutdown: &ShutdownSignal,
    ) -> Result<Self::Output, TaskError>;
}
