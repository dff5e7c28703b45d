//! Compiled query cache keyed by grammar and script content.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use tree_sitter::Query;
use xxhash_rust::xxh3::xxh3_64;

use super::{BoundedCache, CacheSettings, ParsedTree};
use crate::decode::DecodeTable;
use crate::engine::Engine;
use crate::error::Result;
use crate::languages::Grammar;
use crate::resolver::TokenResolver;
use crate::types::Token;

/// Identity of a compiled query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Canonical grammar name
    pub language: Arc<str>,
    /// xxh3 hash of the script text
    pub script_hash: u64,
}

impl QueryKey {
    /// Key for `script` compiled against `grammar`.
    #[must_use]
    pub fn new(grammar: &Grammar, script: &str) -> Self {
        Self {
            language: grammar.shared_name(),
            script_hash: xxh3_64(script.as_bytes()),
        }
    }
}

/// A compiled query with its decode table.
pub struct CompiledQuery {
    query: Query,
    table: DecodeTable,
}

impl CompiledQuery {
    /// Compile `script` and derive its decode table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryCompile`](crate::Error::QueryCompile) if either the
    /// engine or the decode-table scanner rejects the script.
    pub fn compile(grammar: &Grammar, script: &str) -> Result<Self> {
        let query = Engine::compile_query(grammar, script)?;
        let table = DecodeTable::from_script(grammar.name(), script)?;
        table.check_against(grammar.name(), query.pattern_count());
        debug!(
            grammar = grammar.name(),
            patterns = query.pattern_count(),
            labelled = table.len(),
            "query compiled"
        );
        Ok(Self { query, table })
    }

    /// The engine query.
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Pattern index to kind label mapping.
    #[must_use]
    pub fn table(&self) -> &DecodeTable {
        &self.table
    }

    /// Run this query over `tree` and resolve the matches into tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPattern`](crate::Error::UnknownPattern) if a
    /// match comes from a pattern without a label.
    pub fn tokens(&self, tree: &ParsedTree, profile: bool) -> Result<Vec<Token>> {
        let matches = Engine::run_query(&self.query, tree.tree(), tree.source());
        TokenResolver::new(&self.table, profile).resolve(matches)
    }
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("patterns", &self.query.pattern_count())
            .field("table", &self.table)
            .finish()
    }
}

/// Compiled queries keyed by grammar and script hash.
#[derive(Debug)]
pub struct QueryCache {
    cache: BoundedCache<QueryKey, CompiledQuery>,
}

impl QueryCache {
    /// Create a query cache.
    #[must_use]
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            cache: BoundedCache::new("queries", settings),
        }
    }

    /// The compiled query for `script`, compiling it on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryCompile`](crate::Error::QueryCompile) on a miss
    /// with an invalid script.
    pub fn get_or_compile(&self, grammar: &Grammar, script: &str) -> Result<Arc<CompiledQuery>> {
        self.cache
            .get_or_try_insert_with(QueryKey::new(grammar, script), || {
                CompiledQuery::compile(grammar, script)
            })
    }

    /// The underlying cache.
    #[must_use]
    pub fn entries(&self) -> &BoundedCache<QueryKey, CompiledQuery> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{TreeCache, TreeKey};
    use crate::error::Error;
    use crate::languages::GrammarRegistry;

    const SCRIPT: &str = "(line_comment) @comment\n\"fn\" @keyword\n";

    fn rust() -> Grammar {
        GrammarRegistry::with_builtins()
            .load("rust")
            .expect("rust is built in")
    }

    #[test]
    fn same_script_hits() {
        let cache = QueryCache::new(CacheSettings::with_capacity(4));
        let grammar = rust();
        let first = cache.get_or_compile(&grammar, SCRIPT).expect("should compile");
        let second = cache.get_or_compile(&grammar, SCRIPT).expect("should hit");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.table().pattern_count(), first.query().pattern_count());
        assert_eq!(first.table().get(1).map(|l| l.as_str()), Some("keyword"));
    }

    #[test]
    fn edited_script_compiles_again() {
        let cache = QueryCache::new(CacheSettings::with_capacity(4));
        let grammar = rust();
        let first = cache.get_or_compile(&grammar, SCRIPT).expect("should compile");
        let edited = format!("{SCRIPT}(string_literal) @string\n");
        let second = cache
            .get_or_compile(&grammar, &edited)
            .expect("should compile");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.entries().len(), 2);
    }

    #[test]
    fn tokens_resolve_against_a_tree() {
        let grammar = rust();
        let query = CompiledQuery::compile(&grammar, SCRIPT).expect("should compile");
        let trees = TreeCache::new(CacheSettings::with_capacity(4));
        let tree = trees
            .get_or_parse(
                &Engine::default(),
                TreeKey::for_text("rust", "// hi\nfn main() {}"),
                &grammar,
                Arc::from("// hi\nfn main() {}"),
            )
            .expect("should parse");

        let tokens = query.tokens(&tree, true).expect("should resolve");
        let kinds: Vec<(u32, &str)> = tokens.iter().map(|t| (t.start, t.kind.as_str())).collect();
        assert_eq!(kinds, vec![(0, "comment"), (6, "keyword")]);
    }

    #[test]
    fn invalid_script_is_not_cached() {
        let cache = QueryCache::new(CacheSettings::with_capacity(4));
        let err = cache
            .get_or_compile(&rust(), "(not_a_real_node) @x\n")
            .expect_err("should fail");
        assert!(matches!(err, Error::QueryCompile { .. }));
        assert!(cache.entries().is_empty());
    }
}
