//! Parse-tree cache with incremental re-parse.

use std::fmt;
use std::sync::Arc;

use tracing::trace;
use tree_sitter::Tree;
use xxhash_rust::xxh3::Xxh3;

use super::{BoundedCache, CacheSettings};
use crate::engine::{Engine, edit};
use crate::error::Result;
use crate::languages::Grammar;
use crate::paths::InternedPath;
use crate::types::TreeId;

/// Identity of a cached tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TreeKey {
    /// A file under the project root
    File(InternedPath),
    /// Inline text, identified by a hash of its language and content
    Text(u64),
}

impl TreeKey {
    /// Key for an inline text input.
    #[must_use]
    pub fn for_text(language: &str, text: &str) -> Self {
        let mut hasher = Xxh3::new();
        hasher.update(language.as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        Self::Text(hasher.digest())
    }
}

/// A parsed tree together with the exact source it was parsed from.
pub struct ParsedTree {
    id: TreeId,
    grammar: Grammar,
    tree: Tree,
    source: Arc<str>,
}

impl ParsedTree {
    fn new(grammar: &Grammar, tree: Tree, source: Arc<str>) -> Self {
        Self {
            id: TreeId::next(),
            grammar: grammar.clone(),
            tree,
            source,
        }
    }

    /// Identity of this parse.
    #[must_use]
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// The grammar used.
    #[must_use]
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// The syntax tree.
    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// The parsed source text.
    #[must_use]
    pub fn source(&self) -> &Arc<str> {
        &self.source
    }
}

impl fmt::Debug for ParsedTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedTree")
            .field("id", &self.id)
            .field("grammar", &self.grammar.name())
            .field("source_len", &self.source.len())
            .finish_non_exhaustive()
    }
}

/// Parsed trees keyed by file identity.
#[derive(Debug)]
pub struct TreeCache {
    cache: BoundedCache<TreeKey, ParsedTree>,
}

impl TreeCache {
    /// Create a tree cache.
    #[must_use]
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            cache: BoundedCache::new("trees", settings),
        }
    }

    /// Return a tree for `source`.
    ///
    /// - Miss: full parse.
    /// - Hit with identical grammar and source: the cached tree.
    /// - Hit with the same grammar but different source: the cached tree is
    ///   edited and re-parsed incrementally.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::Parse`](crate::Error::Parse) from the engine.
    pub fn get_or_parse(
        &self,
        engine: &Engine,
        key: TreeKey,
        grammar: &Grammar,
        source: Arc<str>,
    ) -> Result<Arc<ParsedTree>> {
        if let Some(previous) = self.cache.get(&key)
            && previous.grammar == *grammar
        {
            let Some(change) = edit::diff(&previous.source, &source) else {
                trace!(tree = previous.id.as_u64(), "tree cache hit");
                return Ok(previous);
            };
            let mut old = previous.tree.clone();
            old.edit(&change);
            let tree = engine.parse(grammar, &source, Some(&old))?;
            trace!(
                grammar = grammar.name(),
                start = change.start_byte,
                "incremental re-parse"
            );
            return Ok(self.cache.insert(key, ParsedTree::new(grammar, tree, source)));
        }

        let tree = engine.parse(grammar, &source, None)?;
        trace!(grammar = grammar.name(), "full parse");
        Ok(self.cache.insert(key, ParsedTree::new(grammar, tree, source)))
    }

    /// Cached tree for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &TreeKey) -> Option<Arc<ParsedTree>> {
        self.cache.get(key)
    }

    /// Drop the tree for `key`.
    pub fn invalidate(&self, key: &TreeKey) -> Option<Arc<ParsedTree>> {
        self.cache.remove(key)
    }

    /// The underlying cache.
    #[must_use]
    pub fn entries(&self) -> &BoundedCache<TreeKey, ParsedTree> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::GrammarRegistry;
    use crate::paths::PathInterner;
    use std::path::Path;

    fn setup() -> (Engine, Grammar, TreeCache, TreeKey) {
        let grammar = GrammarRegistry::with_builtins()
            .load("rust")
            .expect("rust is built in");
        let interner = PathInterner::with_root("/project");
        let key = TreeKey::File(
            interner
                .intern(Path::new("/project/src/main.rs"))
                .expect("should intern"),
        );
        (
            Engine::default(),
            grammar,
            TreeCache::new(CacheSettings::with_capacity(8)),
            key,
        )
    }

    #[test]
    fn identical_source_reuses_the_tree() {
        let (engine, grammar, cache, key) = setup();
        let first = cache
            .get_or_parse(&engine, key.clone(), &grammar, Arc::from("fn main() {}"))
            .expect("should parse");
        let second = cache
            .get_or_parse(&engine, key, &grammar, Arc::from("fn main() {}"))
            .expect("should hit");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn changed_source_reparses_incrementally() {
        let (engine, grammar, cache, key) = setup();
        let first = cache
            .get_or_parse(&engine, key.clone(), &grammar, Arc::from("fn main() {}"))
            .expect("should parse");
        let second = cache
            .get_or_parse(
                &engine,
                key.clone(),
                &grammar,
                Arc::from("fn main() { let x = 1; }"),
            )
            .expect("should reparse");

        assert_ne!(first.id(), second.id());
        assert_eq!(&**second.source(), "fn main() { let x = 1; }");
        let fresh = engine
            .parse(&grammar, "fn main() { let x = 1; }", None)
            .expect("should parse");
        assert_eq!(
            second.tree().root_node().to_sexp(),
            fresh.root_node().to_sexp()
        );
        assert_eq!(cache.get(&key).map(|t| t.id()), Some(second.id()));
    }

    #[test]
    fn text_keys_depend_on_language_and_content() {
        assert_eq!(
            TreeKey::for_text("rust", "fn a() {}"),
            TreeKey::for_text("rust", "fn a() {}")
        );
        assert_ne!(
            TreeKey::for_text("rust", "fn a() {}"),
            TreeKey::for_text("c-sharp", "fn a() {}")
        );
    }
}
