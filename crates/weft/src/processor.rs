//! The tokenizing task processor.
//!
//! Each task resolves its language, obtains a tree and the classification
//! query through the caches, and resolves the query's matches into tokens.
//! Parsing and resolution run on the blocking pool.
//!
//! Registered [`ParseHook`]s are told when a task begins, when its parse
//! starts, and when its result is ready.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinError;
use tracing::{debug, trace};
use weft_sched::{ShutdownSignal, Task, TaskError, TaskProcessor, async_trait};

use crate::config::CLASSIFY_SCRIPT;
use crate::context::WeftContext;
use crate::types::{ParsingInput, TaskResult};

/// Callbacks around each tokenization task.
///
/// Hooks run on worker tasks and must return quickly. Every method defaults
/// to doing nothing.
pub trait ParseHook: Send + Sync {
    /// A task passed its first shutdown check.
    fn before_parse(&self, _input: &ParsingInput) {}

    /// The input was loaded and parsing in `language` is about to start.
    fn start_parse(&self, _input: &ParsingInput, _language: &str) {}

    /// The task produced `result`. Not called for failed tasks.
    fn end_parse(&self, _result: &TaskResult) {}
}

/// Turns [`ParsingInput`]s into [`TaskResult`]s.
#[derive(Clone)]
pub struct TokenizeProcessor {
    ctx: Arc<WeftContext>,
    hooks: Arc<RwLock<Vec<Arc<dyn ParseHook>>>>,
}

impl fmt::Debug for TokenizeProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenizeProcessor")
            .field("ctx", &self.ctx)
            .field("hooks", &self.hooks.read().len())
            .finish()
    }
}

impl TokenizeProcessor {
    /// Create a processor over `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<WeftContext>) -> Self {
        Self {
            ctx,
            hooks: Arc::default(),
        }
    }

    /// The shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<WeftContext> {
        &self.ctx
    }

    /// Register a hook. It applies to tasks that start after this call.
    pub fn register_hook(&self, hook: Arc<dyn ParseHook>) {
        self.hooks.write().push(hook);
    }

    fn hooks(&self) -> Vec<Arc<dyn ParseHook>> {
        self.hooks.read().clone()
    }
}

#[async_trait]
impl TaskProcessor for TokenizeProcessor {
    type Input = ParsingInput;
    type Output = TaskResult;

    async fn process(
        &self,
        task: &Task<ParsingInput>,
        shutdown: &ShutdownSignal,
    ) -> std::result::Result<TaskResult, TaskError> {
        shutdown.check()?;
        let hooks = self.hooks();
        for hook in &hooks {
            hook.before_parse(task.input());
        }
        let source = self.ctx.load_source(task.input()).await?;

        shutdown.check()?;
        let script = self
            .ctx
            .query_script(&source.grammar, CLASSIFY_SCRIPT)
            .await?;

        shutdown.check()?;
        for hook in &hooks {
            hook.start_parse(task.input(), source.grammar.name());
        }
        let ctx = Arc::clone(&self.ctx);
        let grammar = source.grammar.clone();
        let key = source.key;
        let text = source.text;
        let tokens = tokio::task::spawn_blocking(move || {
            let tree = ctx.trees().get_or_parse(ctx.engine(), key, &grammar, text)?;
            let query = ctx.queries().get_or_compile(&grammar, &script)?;
            query.tokens(&tree, ctx.config().classify_profile)
        })
        .await
        .map_err(join_error)??;

        trace!(task = %task.id(), tokens = tokens.len(), "classified");
        let result = TaskResult {
            origin: source.origin,
            language: source.grammar.shared_name(),
            tokens,
            task_id: task.id(),
        };
        for hook in &hooks {
            hook.end_parse(&result);
        }
        Ok(result)
    }
}

fn join_error(error: JoinError) -> TaskError {
    if error.is_panic() {
        TaskError::from_panic(&*error.into_panic())
    } else {
        debug!("blocking tokenization was cancelled");
        TaskError::Cancelled
    }
}
