//! End-to-end tokenization through the scheduler, caches, and resolver using
//! the shipped query scripts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;
use weft::cache::TreeKey;
use weft::{
    Error, Origin, ParseHook, ParsingInput, SchedulerEvent, TEXT_ORIGIN_NAME, TaskError,
    TaskPriority, TaskResult, TaskStatus, Token, Weft, WeftConfig, WeftContext,
};

// ========== Test Fixtures ==========

const MAIN_RS: &str = "fn main() {\n    let answer = 42;\n}\n";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn query_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("queries")
}

struct Project {
    dir: TempDir,
    weft: Weft,
}

impl Project {
    fn new() -> Self {
        Self::with_config(|config| config)
    }

    fn with_config(adjust: impl FnOnce(WeftConfig) -> WeftConfig) -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let mut config = WeftConfig::default()
            .with_query_root(query_root())
            .with_project_root(dir.path());
        config.classify_profile = true;
        let ctx = WeftContext::new(adjust(config)).unwrap();
        let weft = Weft::new(ctx).unwrap();
        Self { dir, weft }
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    async fn run(&self, input: ParsingInput) -> Result<Arc<TaskResult>, TaskError> {
        let queue = self.weft.create_queue();
        let task = self.weft.add_task(queue, input, TaskPriority::Normal).unwrap();
        task.wait().await?;
        Ok(self.weft.result_for(&task).expect("completed task has a result"))
    }
}

fn kind_at<'a>(tokens: &'a [Token], text: &str, needle: &str) -> Option<&'a str> {
    let start = u32::try_from(text.find(needle)?).ok()?;
    tokens
        .iter()
        .find(|t| t.start == start)
        .map(|t| t.kind.as_str())
}

fn downcast(err: &TaskError) -> &Error {
    match err {
        TaskError::Failed(inner) => inner
            .downcast_ref::<Error>()
            .expect("task failures carry a weft error"),
        other => panic!("expected a failure, got {other}"),
    }
}

async fn next_event(
    events: &mut UnboundedReceiver<SchedulerEvent<ParsingInput>>,
) -> SchedulerEvent<ParsingInput> {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("event should arrive")
        .expect("channel should stay open")
}

// ========== Tokenization ==========

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_input_is_classified() {
    let project = Project::new();
    let path = project.write("src/main.rs", MAIN_RS);

    let result = project.run(ParsingInput::file(&path)).await.unwrap();

    assert_eq!(&*result.language, "rust");
    assert_eq!(kind_at(&result.tokens, MAIN_RS, "fn"), Some("keyword"));
    assert_eq!(kind_at(&result.tokens, MAIN_RS, "main"), Some("function"));
    assert_eq!(kind_at(&result.tokens, MAIN_RS, "let"), Some("keyword"));
    assert_eq!(kind_at(&result.tokens, MAIN_RS, "answer"), Some("variable"));
    assert_eq!(
        kind_at(&result.tokens, MAIN_RS, "42"),
        Some("constant.numeric")
    );

    let main = result
        .tokens
        .iter()
        .find(|t| t.kind.as_str() == "function")
        .unwrap();
    assert_eq!(main.shadowed.as_ref().map(|k| k.as_str()), Some("variable"));

    let display = result
        .origin
        .display_path(project.weft.context().interner())
        .unwrap();
    assert_eq!(display, path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokens_are_sorted_with_unique_starts() {
    let project = Project::new();
    let text = "// header\nfn add(a: i32, b: i32) -> i32 {\n    let s = \"sum\";\n    a + b\n}\n";

    let result = project.run(ParsingInput::text(text, "rs")).await.unwrap();

    assert!(!result.tokens.is_empty());
    assert!(result.tokens.windows(2).all(|w| w[0].start < w[1].start));
    assert!(result.tokens.iter().all(|t| t.end >= t.start));
    assert_eq!(kind_at(&result.tokens, text, "// header"), Some("comment"));
    assert_eq!(kind_at(&result.tokens, text, "\"sum\""), Some("string"));
    assert_eq!(kind_at(&result.tokens, text, "i32"), Some("type.builtin"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn text_input_reports_placeholder_origin() {
    let project = Project::new();

    let result = project
        .run(ParsingInput::text("fn f() {}", "rust"))
        .await
        .unwrap();

    assert!(matches!(&result.origin, Origin::Text(text) if &**text == "fn f() {}"));
    assert_eq!(
        result
            .origin
            .display_path(project.weft.context().interner())
            .unwrap(),
        PathBuf::from(TEXT_ORIGIN_NAME)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn csharp_is_classified() {
    let project = Project::new();
    let text = "namespace App {\n  public class Greeter {\n    public static int Count() { return 1; }\n  }\n}\n";

    let result = project
        .run(ParsingInput::text(text, "cs"))
        .await
        .unwrap();

    assert_eq!(&*result.language, "c-sharp");
    assert_eq!(kind_at(&result.tokens, text, "class"), Some("keyword"));
    assert_eq!(kind_at(&result.tokens, text, "Greeter"), Some("type"));
    assert_eq!(kind_at(&result.tokens, text, "Count"), Some("function"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_inputs_give_identical_output() {
    let project = Project::with_config(|config| config.with_max_concurrent_tasks(4));
    let path = project.write("src/lib.rs", MAIN_RS);
    let text = "// lead\nfn add(a: i32) -> i32 { let b = \"x\"; a }\n";

    let queue = project.weft.create_queue();
    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let input = if i % 2 == 0 {
                ParsingInput::file(&path)
            } else {
                ParsingInput::text(text, "rust")
            };
            project
                .weft
                .add_task(queue, input, TaskPriority::Normal)
                .unwrap()
        })
        .collect();
    for task in &tasks {
        task.wait().await.unwrap();
    }

    let serialized: Vec<String> = tasks
        .iter()
        .map(|task| {
            let result = project.weft.result_for(task).unwrap();
            serde_json::to_string(&result.tokens).unwrap()
        })
        .collect();
    assert!(serialized.iter().step_by(2).all(|s| s == &serialized[0]));
    assert!(serialized.iter().skip(1).step_by(2).all(|s| s == &serialized[1]));
    assert_ne!(serialized[0], serialized[1]);
}

#[derive(Default)]
struct RecordingHook {
    calls: parking_lot::Mutex<Vec<String>>,
}

impl ParseHook for RecordingHook {
    fn before_parse(&self, _input: &ParsingInput) {
        self.calls.lock().push("before".to_string());
    }

    fn start_parse(&self, _input: &ParsingInput, language: &str) {
        self.calls.lock().push(format!("start {language}"));
    }

    fn end_parse(&self, result: &TaskResult) {
        self.calls
            .lock()
            .push(format!("end {}", result.tokens.len()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hooks_run_around_each_task_in_order() {
    let project = Project::new();
    let hook = Arc::new(RecordingHook::default());
    project.weft.register_hook(Arc::clone(&hook) as Arc<dyn ParseHook>);

    let result = project
        .run(ParsingInput::text("fn f() {}", "rust"))
        .await
        .unwrap();
    assert_eq!(
        *hook.calls.lock(),
        vec![
            "before".to_string(),
            "start rust".to_string(),
            format!("end {}", result.tokens.len()),
        ]
    );

    hook.calls.lock().clear();
    let unknown = project.write("notes.xyz", "hello");
    project.run(ParsingInput::file(&unknown)).await.unwrap_err();
    assert_eq!(*hook.calls.lock(), vec!["before".to_string()]);
}

// ========== Caches ==========

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn edited_file_is_reparsed() {
    let project = Project::new();
    let path = project.write("src/main.rs", MAIN_RS);
    let ctx = Arc::clone(project.weft.context());
    let key = TreeKey::File(ctx.interner().intern(&path).unwrap());

    project.run(ParsingInput::file(&path)).await.unwrap();
    let before = ctx.trees().get(&key).unwrap().id();

    project.run(ParsingInput::file(&path)).await.unwrap();
    assert_eq!(ctx.trees().get(&key).unwrap().id(), before);

    let edited = "fn main() {\n    let answer = 42;\n    let more = 7;\n}\n";
    std::fs::write(&path, edited).unwrap();
    let result = project.run(ParsingInput::file(&path)).await.unwrap();

    let after = ctx.trees().get(&key).unwrap();
    assert_ne!(after.id(), before);
    assert_eq!(&**after.source(), edited);
    assert_eq!(kind_at(&result.tokens, edited, "more"), Some("variable"));
    assert_eq!(ctx.queries().entries().len(), 1);
}

// ========== Failures ==========

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failures_stay_local_to_their_task() {
    let project = Project::new();
    let good = project.write("src/main.rs", MAIN_RS);
    let unknown = project.write("notes.xyz", "hello");

    let queue = project.weft.create_queue();
    let ok = project
        .weft
        .add_task(queue, ParsingInput::file(&good), TaskPriority::Normal)
        .unwrap();
    let bad = project
        .weft
        .add_task(queue, ParsingInput::file(&unknown), TaskPriority::Urgent)
        .unwrap();

    let err = bad.wait().await.unwrap_err();
    assert!(matches!(downcast(&err), Error::NoLanguage { suffix } if suffix == "xyz"));
    assert_eq!(bad.status(), TaskStatus::Failed);

    ok.wait().await.unwrap();
    assert_eq!(project.weft.results(queue).len(), 1);
    assert!(project.weft.result_for(&bad).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_outside_project_root_is_rejected() {
    let project = Project::new();
    let elsewhere = TempDir::new().unwrap();
    let path = elsewhere.path().join("main.rs");
    std::fs::write(&path, MAIN_RS).unwrap();

    let err = project.run(ParsingInput::file(&path)).await.unwrap_err();
    assert!(matches!(downcast(&err), Error::PathOutsideRoot { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_query_script_is_reported() {
    let scripts = TempDir::new().unwrap();
    let project = Project::with_config(|config| config.with_query_root(scripts.path()));

    let err = project
        .run(ParsingInput::text("fn f() {}", "rust"))
        .await
        .unwrap_err();
    match downcast(&err) {
        Error::MissingQueryScript { path } => {
            assert_eq!(path, &scripts.path().join("rust").join("codeinfo.scm"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unregistered_grammar_is_reported() {
    let project = Project::new();

    let err = project
        .run(ParsingInput::text("print('hi')", "py"))
        .await
        .unwrap_err();
    assert!(matches!(downcast(&err), Error::GrammarNotFound { name } if name == "python"));
}

// ========== Events and shutdown ==========

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queue_completion_follows_the_last_task() {
    let project = Project::new();
    let mut events = project.weft.subscribe();
    let queue = project.weft.create_queue();

    for i in 0..3 {
        project
            .weft
            .add_task(
                queue,
                ParsingInput::text(format!("fn f{i}() {{}}"), "rust"),
                TaskPriority::Normal,
            )
            .unwrap();
    }

    let mut completed = 0;
    loop {
        match next_event(&mut events).await {
            SchedulerEvent::TaskCompleted(task) => {
                assert_eq!(task.queue_id(), queue);
                completed += 1;
            }
            SchedulerEvent::QueueCompleted(id) if id == queue && completed == 3 => break,
            SchedulerEvent::TaskFailed(_, err) => panic!("unexpected failure: {err}"),
            _ => {}
        }
    }
    assert_eq!(project.weft.results(queue).len(), 3);
    assert_eq!(project.weft.scheduler().queue_outstanding(queue), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submissions_after_shutdown_are_refused() {
    let project = Project::new();
    let queue = project.weft.create_queue();
    project.weft.shutdown().await;

    let err = project
        .weft
        .add_task(queue, ParsingInput::text("fn f() {}", "rust"), TaskPriority::High)
        .unwrap_err();
    assert!(matches!(err, Error::Schedule(_)));
}
