//! Concurrent priority task scheduler.
//!
//! `weft-sched` runs a pluggable [`TaskProcessor`] over submitted inputs with
//! a bounded worker pool. Tasks carry a [`TaskPriority`]; the dispatcher always
//! serves the most urgent pending task first, breaking ties by submission
//! order. Work is grouped into logical queues whose results accumulate in
//! completion order.
//!
//! ## Completion tracking
//!
//! Each queue and the scheduler as a whole keep an outstanding-task counter.
//! A queue-completed notification fires exactly once whenever a queue's
//! counter drops from 1 to 0, and a global-idle notification fires exactly
//! once whenever the global counter does. Both re-arm when new work arrives.
//!
//! ## Shutdown
//!
//! [`Scheduler::shutdown`] raises a one-shot [`ShutdownSignal`]. The dispatcher
//! stops handing out work, running tasks observe the signal at their next
//! check, and never-dispatched tasks are parked as [`TaskStatus::Paused`].
//!
//! # Quick Start
//!
//! ```no_run
//! use weft_sched::async_trait;
//! use weft_sched::{Scheduler, SchedulerConfig, ShutdownSignal, Task, TaskError,
//!     TaskPriority, TaskProcessor};
//!
//! struct Upper;
//!
//! #[async_trait]
//! impl TaskProcessor for Upper {
//!     type Input = String;
//!     type Output = String;
//!
//!     async fn process(&self, task: &Task<String>, shutdown: &ShutdownSignal)
//!         -> Result<String, TaskError>
//!     {
//!         shutdown.check()?;
//!         Ok(task.input().to_uppercase())
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new(SchedulerConfig::default(), Upper)?;
//! let queue = scheduler.create_queue();
//! let task = scheduler.add_task(queue, "hello".to_string(), TaskPriority::High)?;
//! task.wait().await?;
//! assert_eq!(scheduler.results(queue)[0].as_str(), "HELLO");
//! scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod events;
mod processor;
mod scheduler;
mod shutdown;
mod task;

pub use error::{Result, ScheduleError, TaskError};
pub use events::{ChannelObserver, SchedulerEvent, SchedulerObserver};
pub use processor::TaskProcessor;
pub use scheduler::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_SHUTDOWN_TIMEOUT, Scheduler, SchedulerConfig,
};
pub use shutdown::ShutdownSignal;
pub use task::{Completion, QueueId, Task, TaskId, TaskPriority, TaskStatus};

// Re-exported so processors can be written without a direct dependency.
pub use async_trait::async_trait;
