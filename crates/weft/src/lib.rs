//! # Weft: Concurrent Tokenization over Tree-sitter
//!
//! Weft parses source files with tree-sitter and turns query matches into
//! classified tokens for highlighters and code readers. Requests are queued
//! with a priority and processed by a bounded worker pool; parse trees,
//! compiled queries, and highlight data are kept in bounded LRU caches so
//! repeated and incremental requests stay cheap.
//!
//! ## Pieces
//!
//! - **Scheduling** comes from [`weft_sched`]: queues, priorities, completion
//!   events, cooperative shutdown.
//! - **Caches** ([`cache`]) keep trees per file identity (re-parsing
//!   incrementally when the text changes) and compiled queries per script.
//! - **Resolution** ([`resolver`]) merges matches that share a start offset
//!   by label rank and emits one sorted token stream.
//! - **Highlighting** ([`highlight`]) styles the tokens of `highlights.scm`
//!   through a [`ThemeProvider`].
//!
//! Query scripts live at `<query_root>/<language>/codeinfo.scm` for
//! classification and `<query_root>/<language>/highlights.scm` for
//! highlighting.
//!
//! ## Quick Start
//!
//! ```no_run
//! use weft::{ParsingInput, TaskPriority, Weft, WeftConfig, WeftContext};
//!
//! # async fn run() -> weft::Result<()> {
//! let config = WeftConfig::default()
//!     .with_query_root("/opt/weft/queries")
//!     .with_project_root("/path/to/project");
//! let weft = Weft::new(WeftContext::new(config)?)?;
//!
//! let queue = weft.create_queue();
//! let task = weft.add_task(
//!     queue,
//!     ParsingInput::file("/path/to/project/src/main.rs"),
//!     TaskPriority::High,
//! )?;
//! task.wait().await.ok();
//!
//! for result in weft.results(queue) {
//!     println!("{} tokens", result.tokens.len());
//! }
//! weft.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
mod context;
pub mod decode;
pub mod engine;
mod error;
pub mod highlight;
pub mod languages;
pub mod paths;
mod processor;
pub mod resolver;
mod types;

pub use config::WeftConfig;
pub use context::WeftContext;
pub use error::{Error, ErrorKind, Result};
pub use highlight::{
    HighlightProvider, Highlighter, StaticTheme, Style, StyleToken, ThemeProvider, TokenProvider,
};
pub use processor::{ParseHook, TokenizeProcessor};
pub use types::{
    KindLabel, Origin, ParsingInput, TEXT_ORIGIN_NAME, TaskResult, Token, TreeId,
};
pub use weft_sched::{
    QueueId, SchedulerEvent, SchedulerObserver, Task, TaskError, TaskId, TaskPriority, TaskStatus,
};

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use weft_sched::{Scheduler, SchedulerConfig};

/// Tokenization service: a scheduler running [`TokenizeProcessor`] over a
/// shared [`WeftContext`].
#[derive(Debug)]
pub struct Weft {
    scheduler: Scheduler<TokenizeProcessor>,
}

impl Weft {
    /// Start a service over `ctx` with `max_concurrent_tasks` workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schedule`] when called outside a tokio runtime.
    pub fn new(ctx: Arc<WeftContext>) -> Result<Self> {
        let config =
            SchedulerConfig::default().with_max_concurrency(ctx.config().max_concurrent_tasks);
        debug!(workers = config.max_concurrency, "starting weft");
        let scheduler = Scheduler::new(config, TokenizeProcessor::new(ctx))?;
        Ok(Self { scheduler })
    }

    /// The shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<WeftContext> {
        self.scheduler.processor().context()
    }

    /// The underlying scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<TokenizeProcessor> {
        &self.scheduler
    }

    /// Create a new logical queue.
    #[must_use]
    pub fn create_queue(&self) -> QueueId {
        self.scheduler.create_queue()
    }

    /// Submit an input. Returns immediately with the pending task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schedule`] for an unknown queue or after shutdown.
    pub fn add_task(
        &self,
        queue: QueueId,
        input: ParsingInput,
        priority: TaskPriority,
    ) -> Result<Task<ParsingInput>> {
        Ok(self.scheduler.add_task(queue, input, priority)?)
    }

    /// Results appended to `queue` so far, in completion order.
    #[must_use]
    pub fn results(&self, queue: QueueId) -> Vec<Arc<TaskResult>> {
        self.scheduler.results(queue)
    }

    /// The result of `task`, once it has completed.
    #[must_use]
    pub fn result_for(&self, task: &Task<ParsingInput>) -> Option<Arc<TaskResult>> {
        self.scheduler.result_for(task)
    }

    /// Receive every lifecycle event from now on.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SchedulerEvent<ParsingInput>> {
        self.scheduler.subscribe()
    }

    /// Register an observer for lifecycle events.
    pub fn add_observer(&self, observer: Arc<dyn SchedulerObserver<ParsingInput>>) {
        self.scheduler.add_observer(observer);
    }

    /// Register a hook called around every tokenization task.
    pub fn register_hook(&self, hook: Arc<dyn ParseHook>) {
        self.scheduler.processor().register_hook(hook);
    }

    /// A highlighter sharing this service's caches.
    #[must_use]
    pub fn highlighter(&self, theme: Arc<dyn ThemeProvider>) -> Highlighter {
        Highlighter::new(Arc::clone(self.context()), theme)
    }

    /// Stop dispatching, cancel running tasks, and park pending ones.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
