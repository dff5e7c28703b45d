//! Grammar registry and language detection.
//!
//! Grammars are registered explicitly. Each built-in grammar implements
//! [`GrammarSource`]; anything else can be added at runtime with
//! [`GrammarRegistry::register_language`].
//!
//! ## Adding a New Grammar
//!
//! 1. Add the grammar crate to `Cargo.toml`
//! 2. Create a module (e.g., `python.rs`) implementing `GrammarSource`
//! 3. Register it in `GrammarRegistry::with_builtins()`
//! 4. Ship `codeinfo.scm` and `highlights.scm` under `queries/<name>/`

pub mod csharp;
pub mod rust;
mod suffix;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};

pub use suffix::SuffixTable;

/// A built-in grammar.
pub trait GrammarSource: Send + Sync {
    /// Canonical language name, also the query directory name.
    fn name(&self) -> &'static str;

    /// File suffixes handled by this grammar, without the leading dot.
    fn suffixes(&self) -> &[&'static str];

    /// The tree-sitter language.
    fn tree_sitter_language(&self) -> tree_sitter::Language;
}

/// A loaded grammar handle. Cheap to clone.
#[derive(Clone)]
pub struct Grammar {
    name: Arc<str>,
    language: tree_sitter::Language,
}

impl Grammar {
    /// Canonical language name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the name.
    #[must_use]
    pub fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// The tree-sitter language.
    #[must_use]
    pub fn language(&self) -> &tree_sitter::Language {
        &self.language
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar").field("name", &self.name).finish()
    }
}

impl PartialEq for Grammar {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Grammar {}

/// Registered grammars by canonical name.
#[derive(Debug, Default)]
pub struct GrammarRegistry {
    grammars: HashMap<String, Grammar>,
}

impl GrammarRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in grammar.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for source in builtin_sources() {
            registry.register(*source);
        }
        registry
    }

    /// Register a built-in style grammar source.
    pub fn register(&mut self, source: &dyn GrammarSource) {
        self.register_language(source.name(), source.tree_sitter_language());
    }

    /// Register a tree-sitter language under `name`, replacing any previous one.
    pub fn register_language(&mut self, name: &str, language: tree_sitter::Language) {
        trace!(grammar = name, "grammar registered");
        self.grammars.insert(
            name.to_string(),
            Grammar {
                name: Arc::from(name),
                language,
            },
        );
    }

    /// Load a grammar by canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GrammarNotFound`] for unregistered names.
    pub fn load(&self, name: &str) -> Result<Grammar> {
        self.grammars
            .get(name)
            .cloned()
            .ok_or_else(|| Error::GrammarNotFound {
                name: name.to_string(),
            })
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.grammars.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.grammars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

static BUILTINS: &[&dyn GrammarSource] = &[&rust::RustGrammar, &csharp::CSharpGrammar];

/// The grammars compiled into this crate.
#[must_use]
pub fn builtin_sources() -> &'static [&'static dyn GrammarSource] {
    BUILTINS
}
