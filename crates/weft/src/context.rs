//! Shared state for one Weft instance.
//!
//! A [`WeftContext`] owns everything tasks share: the path interner, the
//! grammar registry and suffix table, the parser pool, and the tree and query
//! caches. It is built once from a [`WeftConfig`] and passed explicitly to
//! the pieces that need it.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tracing::debug;

use crate::cache::{CompiledQuery, QueryCache, TreeCache, TreeKey};
use crate::config::WeftConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::languages::{Grammar, GrammarRegistry, SuffixTable, builtin_sources};
use crate::paths::PathInterner;
use crate::types::{Origin, ParsingInput};

/// A loaded input: its grammar, cache key, origin, and text.
#[derive(Debug)]
pub(crate) struct Source {
    pub grammar: Grammar,
    pub key: TreeKey,
    pub origin: Origin,
    pub text: Arc<str>,
}

/// Shared state for tasks and highlighters.
#[derive(Debug)]
pub struct WeftContext {
    config: WeftConfig,
    interner: PathInterner,
    grammars: GrammarRegistry,
    suffixes: SuffixTable,
    engine: Engine,
    trees: TreeCache,
    queries: QueryCache,
}

impl WeftContext {
    /// Build a context with the built-in grammars.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration fails validation.
    pub fn new(config: WeftConfig) -> Result<Arc<Self>> {
        let mut suffixes = SuffixTable::default();
        for source in builtin_sources() {
            suffixes.insert(source.name(), source.suffixes());
        }
        Self::with_grammars(config, GrammarRegistry::with_builtins(), suffixes)
    }

    /// Build a context with an explicit grammar set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration fails validation.
    pub fn with_grammars(
        config: WeftConfig,
        grammars: GrammarRegistry,
        suffixes: SuffixTable,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let interner = match &config.project_root {
            Some(root) => PathInterner::with_root(root),
            None => PathInterner::new(),
        };
        debug!(
            grammars = ?grammars.names(),
            query_root = %config.query_root.display(),
            "context created"
        );

        Ok(Arc::new(Self {
            trees: TreeCache::new(config.tree_cache()),
            queries: QueryCache::new(config.query_cache()),
            engine: Engine::default(),
            interner,
            grammars,
            suffixes,
            config,
        }))
    }

    /// The configuration this context was built from.
    #[must_use]
    pub fn config(&self) -> &WeftConfig {
        &self.config
    }

    /// The path interner.
    #[must_use]
    pub fn interner(&self) -> &PathInterner {
        &self.interner
    }

    /// The registered grammars.
    #[must_use]
    pub fn grammars(&self) -> &GrammarRegistry {
        &self.grammars
    }

    /// The suffix table.
    #[must_use]
    pub fn suffixes(&self) -> &SuffixTable {
        &self.suffixes
    }

    /// The parser pool.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The parse-tree cache.
    #[must_use]
    pub fn trees(&self) -> &TreeCache {
        &self.trees
    }

    /// The compiled query cache.
    #[must_use]
    pub fn queries(&self) -> &QueryCache {
        &self.queries
    }

    /// Grammar for a language tag: a registered name (`rust`) or a suffix
    /// alias (`rs`, `.RS`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoLanguage`] for an unknown tag and
    /// [`Error::GrammarNotFound`] if the tag maps to a language without a
    /// registered grammar.
    pub fn resolve_language(&self, tag: &str) -> Result<Grammar> {
        if self.grammars.contains(tag) {
            return self.grammars.load(tag);
        }
        let language = self.suffixes.language_for(tag)?;
        self.grammars.load(language)
    }

    /// Grammar for a file, chosen by its suffix.
    ///
    /// # Errors
    ///
    /// As [`resolve_language`](Self::resolve_language).
    pub fn language_for_path(&self, path: &Path) -> Result<Grammar> {
        let language = self.suffixes.language_for_path(path)?;
        self.grammars.load(language)
    }

    /// Resolve an input's language and read its text.
    pub(crate) async fn load_source(&self, input: &ParsingInput) -> Result<Source> {
        match input {
            ParsingInput::File { path } => {
                let grammar = self.language_for_path(path)?;
                let interned = self.interner.intern(path)?;
                let text: Arc<str> = fs::read_to_string(path).await?.into();
                Ok(Source {
                    grammar,
                    key: TreeKey::File(interned.clone()),
                    origin: Origin::File(interned),
                    text,
                })
            }
            ParsingInput::Text { text, language } => {
                let grammar = self.resolve_language(language)?;
                Ok(Source {
                    key: TreeKey::for_text(grammar.name(), text),
                    origin: Origin::Text(Arc::clone(text)),
                    text: Arc::clone(text),
                    grammar,
                })
            }
        }
    }

    /// Read the query script `script` for `grammar`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingQueryScript`] if the file does not exist and
    /// [`Error::Io`] for any other read failure.
    pub async fn query_script(&self, grammar: &Grammar, script: &str) -> Result<String> {
        let path = self.config.query_script_path(grammar.name(), script);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::MissingQueryScript { path })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read and compile `script` for `grammar` through the query cache.
    ///
    /// # Errors
    ///
    /// As [`query_script`](Self::query_script), plus
    /// [`Error::QueryCompile`] for an invalid script.
    pub async fn compiled_query(
        &self,
        grammar: &Grammar,
        script: &str,
    ) -> Result<Arc<CompiledQuery>> {
        let text = self.query_script(grammar, script).await?;
        self.queries.get_or_compile(grammar, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLASSIFY_SCRIPT;
    use rstest::rstest;
    use tempfile::TempDir;

    fn context(query_root: &Path) -> Arc<WeftContext> {
        WeftContext::new(WeftConfig::default().with_query_root(query_root))
            .expect("default config is valid")
    }

    #[rstest]
    #[case::name("rust", "rust")]
    #[case::suffix("rs", "rust")]
    #[case::dotted_suffix(".CS", "c-sharp")]
    #[case::csharp_name("c-sharp", "c-sharp")]
    fn language_tags_resolve(#[case] tag: &str, #[case] expected: &str) {
        let ctx = context(Path::new("/unused"));
        assert_eq!(ctx.resolve_language(tag).unwrap().name(), expected);
    }

    #[test]
    fn unknown_and_unregistered_languages() {
        let ctx = context(Path::new("/unused"));
        assert!(matches!(
            ctx.resolve_language("xyz"),
            Err(Error::NoLanguage { .. })
        ));
        assert!(matches!(
            ctx.resolve_language("py"),
            Err(Error::GrammarNotFound { name }) if name == "python"
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = WeftConfig {
            query_cache_capacity: 0,
            ..WeftConfig::default()
        };
        assert!(matches!(WeftContext::new(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn missing_script_names_the_expected_path() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let rust = ctx.resolve_language("rust").unwrap();

        let err = ctx.query_script(&rust, CLASSIFY_SCRIPT).await.unwrap_err();
        match err {
            Error::MissingQueryScript { path } => {
                assert_eq!(path, temp.path().join("rust").join(CLASSIFY_SCRIPT));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn compiled_queries_are_cached() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("rust")).unwrap();
        std::fs::write(
            temp.path().join("rust").join(CLASSIFY_SCRIPT),
            "(line_comment) @comment\n",
        )
        .unwrap();
        let ctx = context(temp.path());
        let rust = ctx.resolve_language("rust").unwrap();

        let first = ctx.compiled_query(&rust, CLASSIFY_SCRIPT).await.unwrap();
        let second = ctx.compiled_query(&rust, CLASSIFY_SCRIPT).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(ctx.queries().entries().len(), 1);
    }
}
