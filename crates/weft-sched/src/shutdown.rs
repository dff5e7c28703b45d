//! One-shot cooperative shutdown signal.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::TaskError;

/// Cooperative shutdown signal shared by the dispatcher and every task.
///
/// Raising is idempotent and cannot be undone. Work observes the signal at
/// its next suspension point; nothing is interrupted mid-computation.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create a signal that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal.
    pub fn raise(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the signal has been raised.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the signal is raised.
    pub fn raised(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Check point for processing functions.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Cancelled`] once the signal has been raised.
    pub fn check(&self) -> Result<(), TaskError> {
        if self.is_raised() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}
