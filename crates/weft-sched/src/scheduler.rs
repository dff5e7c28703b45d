//! Dispatcher, worker pool, and completion accounting.
//!
//! A single dispatch loop drains a global priority heap. Each dispatched task
//! holds one permit of a fixed-size semaphore for its whole execution, so at
//! most `max_concurrency` processing functions run at once. Outstanding
//! counters are atomics; the worker that moves a counter from 1 to 0 fires the
//! matching completion event, which makes each transition fire exactly once.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Result, ScheduleError, TaskError};
use crate::events::{ChannelObserver, SchedulerEvent, SchedulerObserver};
use crate::processor::TaskProcessor;
use crate::shutdown::ShutdownSignal;
use crate::task::{QueueId, Task, TaskId, TaskPriority, TaskStatus};

/// Default number of tasks processed concurrently.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default bound on how long [`Scheduler::shutdown`] waits for the dispatcher.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently running tasks. Zero is treated as one.
    pub max_concurrency: usize,
    /// How long shutdown waits for the dispatch loop to exit.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SchedulerConfig {
    /// Set the concurrency bound.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the shutdown wait bound.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ============================================================================
// Internal state
// ============================================================================

/// Heap entry. `BinaryHeap` is a max-heap, so the ordering is reversed:
/// lower priority value first, then earlier arrival.
struct Pending<I> {
    priority: TaskPriority,
    sequence: u64,
    task: Task<I>,
}

impl<I> PartialEq for Pending<I> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<I> Eq for Pending<I> {}

impl<I> PartialOrd for Pending<I> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<I> Ord for Pending<I> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct QueueState<O> {
    outstanding: AtomicUsize,
    results: RwLock<Vec<(TaskId, Arc<O>)>>,
}

impl<O> QueueState<O> {
    fn new() -> Self {
        Self {
            outstanding: AtomicUsize::new(0),
            results: RwLock::new(Vec::new()),
        }
    }
}

type Observers<I> = RwLock<Vec<Arc<dyn SchedulerObserver<I>>>>;

struct Shared<P: TaskProcessor> {
    processor: P,
    pending: Mutex<BinaryHeap<Pending<P::Input>>>,
    /// One permit per task sitting in `pending`.
    available: Semaphore,
    /// One permit per worker slot.
    slots: Arc<Semaphore>,
    queues: DashMap<QueueId, Arc<QueueState<P::Output>>>,
    outstanding: AtomicUsize,
    running: AtomicUsize,
    sequence: AtomicU64,
    shutdown: ShutdownSignal,
    observers: Observers<P::Input>,
}

impl<P: TaskProcessor> Shared<P> {
    fn observers(&self) -> Vec<Arc<dyn SchedulerObserver<P::Input>>> {
        self.observers.read().clone()
    }

    fn log(&self, message: &str) {
        debug!("{message}");
        for observer in self.observers() {
            observer.log(message);
        }
    }

    async fn dispatch_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.raised() => break,
                permit = self.available.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => break,
                },
            }

            let slot = tokio::select! {
                biased;
                () = self.shutdown.raised() => {
                    // The task stays in the heap; give its availability back.
                    self.available.add_permits(1);
                    break;
                }
                slot = Arc::clone(&self.slots).acquire_owned() => match slot {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };

            let next = self.pending.lock().pop();
            let Some(entry) = next else {
                trace!("woke with an empty pending heap, retrying");
                drop(slot);
                continue;
            };

            debug!(
                task_id = %entry.task.id(),
                queue_id = %entry.task.queue_id(),
                priority = entry.priority.as_str(),
                "dispatching task"
            );
            tokio::spawn(Arc::clone(&self).execute(entry.task, slot));
        }

        self.log("dispatch loop stopped");
        self.park_pending();
    }

    async fn execute(self: Arc<Self>, task: Task<P::Input>, slot: OwnedSemaphorePermit) {
        task.set_status(TaskStatus::Running);
        self.running.fetch_add(1, Ordering::AcqRel);
        self.log(&format!("task {} started", task.id()));

        let outcome = AssertUnwindSafe(self.processor.process(&task, &self.shutdown))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TaskError::from_panic(&*panic)));

        let queue = self
            .queues
            .get(&task.queue_id())
            .map(|state| Arc::clone(state.value()));

        match outcome {
            Ok(output) => {
                if let Some(queue) = &queue {
                    queue.results.write().push((task.id(), Arc::new(output)));
                }
                task.set_status(TaskStatus::Completed);
                task.resolve(Ok(()));
                debug!(task_id = %task.id(), "task completed");
                for observer in self.observers() {
                    observer.task_completed(&task);
                }
            }
            Err(TaskError::Cancelled) => {
                task.set_status(TaskStatus::Failed);
                task.resolve(Err(TaskError::Cancelled));
                self.log(&format!("task {} cancelled by shutdown", task.id()));
            }
            Err(error) => {
                task.set_status(TaskStatus::Failed);
                task.resolve(Err(error.clone()));
                warn!(task_id = %task.id(), error = %error, "task failed");
                for observer in self.observers() {
                    observer.task_failed(&task, &error);
                }
            }
        }

        drop(slot);
        self.running.fetch_sub(1, Ordering::AcqRel);
        self.settle(task.queue_id(), queue.as_deref());
    }

    /// Count one task as finished, firing queue-completed and global-idle on
    /// their 1 to 0 transitions.
    fn settle(&self, queue_id: QueueId, queue: Option<&QueueState<P::Output>>) {
        if let Some(queue) = queue
            && queue.outstanding.fetch_sub(1, Ordering::AcqRel) == 1
        {
            debug!(queue_id = %queue_id, "queue completed");
            for observer in self.observers() {
                observer.queue_completed(queue_id);
            }
        }

        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!("scheduler idle");
            for observer in self.observers() {
                observer.global_idle();
            }
        }
    }

    /// Park every never-dispatched task and resolve it as cancelled. Parked
    /// tasks no longer count as outstanding.
    fn park_pending(&self) {
        let parked: Vec<_> = self.pending.lock().drain().collect();
        if parked.is_empty() {
            return;
        }
        debug!(count = parked.len(), "parking pending tasks");
        for entry in parked {
            let task = entry.task;
            task.set_status(TaskStatus::Paused);
            task.resolve(Err(TaskError::Cancelled));
            let queue = self
                .queues
                .get(&task.queue_id())
                .map(|state| Arc::clone(state.value()));
            self.settle(task.queue_id(), queue.as_deref());
        }
    }
}

// ============================================================================
// Public handle
// ============================================================================

/// Concurrent priority scheduler.
///
/// Tasks are submitted to logical queues created with
/// [`create_queue`](Self::create_queue). Results accumulate per queue in
/// completion order.
pub struct Scheduler<P: TaskProcessor> {
    shared: Arc<Shared<P>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    config: SchedulerConfig,
}

impl<P: TaskProcessor> fmt::Debug for Scheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("outstanding", &self.outstanding())
            .field("running", &self.running())
            .finish_non_exhaustive()
    }
}

impl<P: TaskProcessor> Scheduler<P> {
    /// Create a scheduler and start its dispatch loop on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::NoRuntime`] when called outside a tokio runtime.
    pub fn new(config: SchedulerConfig, processor: P) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| ScheduleError::NoRuntime)?;
        let config = SchedulerConfig {
            max_concurrency: config.max_concurrency.max(1),
            ..config
        };

        let shared = Arc::new(Shared {
            processor,
            pending: Mutex::new(BinaryHeap::new()),
            available: Semaphore::new(0),
            slots: Arc::new(Semaphore::new(config.max_concurrency)),
            queues: DashMap::new(),
            outstanding: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
            shutdown: ShutdownSignal::new(),
            observers: RwLock::new(Vec::new()),
        });

        let dispatcher = handle.spawn(Arc::clone(&shared).dispatch_loop());
        debug!(
            max_concurrency = config.max_concurrency,
            "scheduler started"
        );

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
            config,
        })
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// The processing function.
    #[must_use]
    pub fn processor(&self) -> &P {
        &self.shared.processor
    }

    /// The shutdown signal handed to every task.
    #[must_use]
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shared.shutdown
    }

    /// Create an empty logical queue.
    pub fn create_queue(&self) -> QueueId {
        let id = QueueId::new();
        self.shared.queues.insert(id, Arc::new(QueueState::new()));
        trace!(queue_id = %id, "queue created");
        id
    }

    /// Submit `input` to `queue` with the given priority.
    ///
    /// Never blocks on processing. The returned handle exposes the task's
    /// status and completion signal.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::ShutDown`] once shutdown was requested
    /// - [`ScheduleError::UnknownQueue`] if `queue` was not created here
    pub fn add_task(
        &self,
        queue: QueueId,
        input: P::Input,
        priority: TaskPriority,
    ) -> Result<Task<P::Input>> {
        if self.shared.shutdown.is_raised() {
            return Err(ScheduleError::ShutDown);
        }

        let state = self
            .shared
            .queues
            .get(&queue)
            .map(|state| Arc::clone(state.value()))
            .ok_or(ScheduleError::UnknownQueue(queue))?;

        let task = Task::new(queue, input, priority);
        {
            // Shutdown drains `pending` under this lock, so the signal is
            // re-checked while holding it.
            let mut pending = self.shared.pending.lock();
            if self.shared.shutdown.is_raised() {
                return Err(ScheduleError::ShutDown);
            }
            state.outstanding.fetch_add(1, Ordering::AcqRel);
            self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
            let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
            pending.push(Pending {
                priority,
                sequence,
                task: task.clone(),
            });
        }
        self.shared.available.add_permits(1);

        trace!(
            task_id = %task.id(),
            queue_id = %queue,
            priority = priority.as_str(),
            "task submitted"
        );
        Ok(task)
    }

    /// Snapshot of the results appended to `queue`, in completion order.
    ///
    /// Unknown queues yield an empty vector.
    #[must_use]
    pub fn results(&self, queue: QueueId) -> Vec<Arc<P::Output>> {
        self.shared
            .queues
            .get(&queue)
            .map(|state| {
                state
                    .results
                    .read()
                    .iter()
                    .map(|(_, output)| Arc::clone(output))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The result produced by `task`, if it completed successfully.
    #[must_use]
    pub fn result_for(&self, task: &Task<P::Input>) -> Option<Arc<P::Output>> {
        let state = self.shared.queues.get(&task.queue_id())?;
        let results = state.results.read();
        results
            .iter()
            .find(|(id, _)| *id == task.id())
            .map(|(_, output)| Arc::clone(output))
    }

    /// Number of submitted tasks that have not finished.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Number of tasks currently being processed.
    #[must_use]
    pub fn running(&self) -> usize {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of unfinished tasks in `queue`.
    #[must_use]
    pub fn queue_outstanding(&self, queue: QueueId) -> usize {
        self.shared
            .queues
            .get(&queue)
            .map_or(0, |state| state.outstanding.load(Ordering::Acquire))
    }

    /// Register an observer for lifecycle notifications.
    pub fn add_observer(&self, observer: Arc<dyn SchedulerObserver<P::Input>>) {
        self.shared.observers.write().push(observer);
    }

    /// Receive lifecycle notifications through a channel.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SchedulerEvent<P::Input>> {
        let (observer, rx) = ChannelObserver::new();
        self.add_observer(Arc::new(observer));
        rx
    }

    /// Request shutdown and wait for the dispatch loop to exit.
    ///
    /// In-flight tasks keep running until their next shutdown check. Tasks
    /// that were never dispatched are marked [`TaskStatus::Paused`] and their
    /// completion resolves with [`TaskError::Cancelled`]; they stop counting
    /// toward [`outstanding`](Self::outstanding). Calling this more
    /// than once is harmless.
    pub async fn shutdown(&self) {
        self.shared.shutdown.raise();
        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            match tokio::time::timeout(self.config.shutdown_timeout, dispatcher).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(error = %error, "dispatch loop ended abnormally"),
                Err(_) => warn!(
                    timeout_ms = u64::try_from(self.config.shutdown_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                    "dispatch loop did not stop in time"
                ),
            }
        }
        self.shared.park_pending();
    }
}

impl<P: TaskProcessor> Drop for Scheduler<P> {
    fn drop(&mut self) {
        self.shared.shutdown.raise();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_pops_by_priority_then_arrival() {
        let queue = QueueId::new();
        let mut heap = BinaryHeap::new();
        let entries = [
            (TaskPriority::Low, 0),
            (TaskPriority::Normal, 1),
            (TaskPriority::Urgent, 2),
            (TaskPriority::Normal, 3),
            (TaskPriority::High, 4),
        ];
        for (priority, sequence) in entries {
            heap.push(Pending {
                priority,
                sequence,
                task: Task::new(queue, sequence, priority),
            });
        }

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|p| p.sequence)).collect();
        assert_eq!(order, vec![2, 4, 1, 3, 0]);
    }

    #[test]
    fn default_config_matches_constants() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);

        let tuned = config
            .with_max_concurrency(1)
            .with_shutdown_timeout(Duration::from_millis(10));
        assert_eq!(tuned.max_concurrency, 1);
        assert_eq!(tuned.shutdown_timeout, Duration::from_millis(10));
    }
}
