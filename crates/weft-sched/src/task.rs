//! Task handles, identifiers, and priorities.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::TaskError;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a logical queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(Uuid);

impl QueueId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Priority and status
// ============================================================================

/// Dispatch priority. Lower values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum TaskPriority {
    /// Served before everything else
    Urgent = 0,
    /// Served before normal work
    High = 1,
    /// The default priority
    #[default]
    Normal = 2,
    /// Served last
    Low = 3,
}

impl TaskPriority {
    /// Stable lowercase name, used in log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

/// Lifecycle state of a task.
///
/// `Completed` and `Failed` are terminal. `Paused` marks a task that was still
/// pending when the scheduler shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskStatus {
    /// Waiting in the priority queue
    Pending = 0,
    /// Being processed by a worker
    Running = 1,
    /// Processed successfully; a result was appended
    Completed = 2,
    /// Processing failed or was cancelled
    Failed = 3,
    /// Never dispatched because shutdown was requested
    Paused = 4,
}

impl TaskStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Paused,
        }
    }

    /// Returns `true` for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ============================================================================
// Task handle
// ============================================================================

type Outcome = Result<(), TaskError>;

struct TaskInner<I> {
    id: TaskId,
    queue_id: QueueId,
    input: I,
    priority: TaskPriority,
    status: AtomicU8,
    resolver: Mutex<Option<oneshot::Sender<Outcome>>>,
    completion: Mutex<Option<oneshot::Receiver<Outcome>>>,
}

/// Shared handle to a submitted unit of work.
///
/// Cloning is cheap; every clone refers to the same task. The input is
/// immutable for the task's lifetime and only the executing worker (or
/// shutdown) changes the status.
pub struct Task<I> {
    inner: Arc<TaskInner<I>>,
}

impl<I> Clone for Task<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: fmt::Debug> fmt::Debug for Task<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("queue_id", &self.inner.queue_id)
            .field("priority", &self.inner.priority)
            .field("status", &self.status())
            .field("input", &self.inner.input)
            .finish()
    }
}

impl<I> Task<I> {
    pub(crate) fn new(queue_id: QueueId, input: I, priority: TaskPriority) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            inner: Arc::new(TaskInner {
                id: TaskId::new(),
                queue_id,
                input,
                priority,
                status: AtomicU8::new(TaskStatus::Pending as u8),
                resolver: Mutex::new(Some(tx)),
                completion: Mutex::new(Some(rx)),
            }),
        }
    }

    /// This task's identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// The queue the task was submitted to.
    #[must_use]
    pub fn queue_id(&self) -> QueueId {
        self.inner.queue_id
    }

    /// The immutable input.
    #[must_use]
    pub fn input(&self) -> &I {
        &self.inner.input
    }

    /// The priority the task was submitted with.
    #[must_use]
    pub fn priority(&self) -> TaskPriority {
        self.inner.priority
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.inner.status.store(status as u8, Ordering::Release);
    }

    /// Resolve the completion signal. Later calls are ignored.
    pub(crate) fn resolve(&self, outcome: Outcome) {
        if let Some(tx) = self.inner.resolver.lock().take() {
            // The receiver may already be gone; nobody is waiting then.
            let _ = tx.send(outcome);
        }
    }

    /// Take the single-resolution completion signal.
    ///
    /// Returns `None` if it was already taken through this or another clone.
    #[must_use]
    pub fn completion(&self) -> Option<Completion> {
        self.inner
            .completion
            .lock()
            .take()
            .map(|rx| Completion { rx })
    }

    /// Wait until the task reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the task's failure, or [`TaskError::AlreadyObserved`] if the
    /// completion signal was taken earlier.
    pub async fn wait(&self) -> Outcome {
        match self.completion() {
            Some(completion) => completion.await,
            None => Err(TaskError::AlreadyObserved),
        }
    }

    /// Returns `true` if both handles refer to the same task.
    #[must_use]
    pub fn same_task(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Future resolving once the task completes, fails, or is parked by shutdown.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Outcome>,
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Cancelled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_order_urgent_first() {
        let mut priorities = vec![
            TaskPriority::Low,
            TaskPriority::Urgent,
            TaskPriority::Normal,
            TaskPriority::High,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                TaskPriority::Urgent,
                TaskPriority::High,
                TaskPriority::Normal,
                TaskPriority::Low,
            ]
        );
    }

    #[test]
    fn new_task_is_pending() {
        let task = Task::new(QueueId::new(), "input", TaskPriority::Normal);
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(*task.input(), "input");
        assert!(!task.status().is_terminal());
    }

    #[test]
    fn status_round_trips_through_atomic() {
        let task = Task::new(QueueId::new(), (), TaskPriority::Low);
        for status in [
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Paused,
        ] {
            task.set_status(status);
            assert_eq!(task.status(), status);
        }
    }

    #[tokio::test]
    async fn completion_can_be_taken_once() {
        let task = Task::new(QueueId::new(), (), TaskPriority::Normal);
        let clone = task.clone();
        let completion = task.completion().expect("first take should succeed");
        assert!(clone.completion().is_none());

        task.resolve(Ok(()));
        task.resolve(Err(TaskError::Cancelled));
        assert!(completion.await.is_ok());
        assert!(matches!(clone.wait().await, Err(TaskError::AlreadyObserved)));
    }

    #[tokio::test]
    async fn dropped_resolver_reads_as_cancelled() {
        let task = Task::new(QueueId::new(), (), TaskPriority::Normal);
        let completion = task.completion().expect("first take should succeed");
        task.inner.resolver.lock().take();
        assert!(matches!(completion.await, Err(TaskError::Cancelled)));
    }
}
