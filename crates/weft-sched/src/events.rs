//! Lifecycle notifications.
//!
//! Observers are invoked on worker tasks, in the order the transitions
//! happen. They must return quickly; anything slow belongs on the other end
//! of a [`ChannelObserver`].

use tokio::sync::mpsc;

use crate::error::TaskError;
use crate::task::{QueueId, Task};

/// A scheduler lifecycle event.
#[derive(Debug)]
pub enum SchedulerEvent<I> {
    /// A task finished and its result was appended
    TaskCompleted(Task<I>),
    /// A task failed for a reason other than shutdown
    TaskFailed(Task<I>, TaskError),
    /// The queue's outstanding counter went from 1 to 0
    QueueCompleted(QueueId),
    /// The global outstanding counter went from 1 to 0
    GlobalIdle,
    /// Diagnostic message
    Log(String),
}

/// Receives scheduler lifecycle notifications.
///
/// Every method defaults to doing nothing.
pub trait SchedulerObserver<I>: Send + Sync {
    /// A task completed successfully.
    fn task_completed(&self, _task: &Task<I>) {}

    /// A task failed. Not called for cancellation.
    fn task_failed(&self, _task: &Task<I>, _error: &TaskError) {}

    /// Every task submitted to `queue` so far has finished.
    fn queue_completed(&self, _queue: QueueId) {}

    /// No submitted task is outstanding.
    fn global_idle(&self) {}

    /// Diagnostic message from the dispatcher or a worker.
    fn log(&self, _message: &str) {}
}

/// Observer that forwards every notification into an unbounded channel.
#[derive(Debug)]
pub struct ChannelObserver<I> {
    tx: mpsc::UnboundedSender<SchedulerEvent<I>>,
}

impl<I> ChannelObserver<I> {
    /// Create an observer and the receiving half of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SchedulerEvent<I>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `true` once the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: SchedulerEvent<I>) {
        // A dropped receiver only means nobody listens anymore.
        let _ = self.tx.send(event);
    }
}

impl<I: Send + Sync> SchedulerObserver<I> for ChannelObserver<I> {
    fn task_completed(&self, task: &Task<I>) {
        self.send(SchedulerEvent::TaskCompleted(task.clone()));
    }

    fn task_failed(&self, task: &Task<I>, error: &TaskError) {
        self.send(SchedulerEvent::TaskFailed(task.clone(), error.clone()));
    }

    fn queue_completed(&self, queue: QueueId) {
        self.send(SchedulerEvent::QueueCompleted(queue));
    }

    fn global_idle(&self) {
        self.send(SchedulerEvent::GlobalIdle);
    }

    fn log(&self, message: &str) {
        self.send(SchedulerEvent::Log(message.to_string()));
    }
}
