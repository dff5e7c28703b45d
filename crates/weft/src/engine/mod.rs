//! Tree-sitter adapter: parsing, query compilation, and match extraction.
//!
//! Parsers are expensive to create and cannot be shared between threads, so
//! [`Engine`] keeps a small pool of idle parsers per grammar and hands one
//! out for the duration of a single parse.

pub mod edit;

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use parking_lot::Mutex;
use tracing::trace;
use tree_sitter::{Parser, Query, QueryCursor, StreamingIterator, Tree};

use crate::error::{Error, Result};
use crate::languages::Grammar;

/// Default number of idle parsers kept per grammar.
pub const DEFAULT_IDLE_PARSERS: usize = 8;

/// One query match: its pattern index and the byte range of each capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    /// Index of the pattern in the query script
    pub pattern_index: usize,
    /// Capture ranges in capture order
    pub captures: Vec<Range<u32>>,
}

impl RawMatch {
    /// Range of the first capture, if any.
    #[must_use]
    pub fn primary(&self) -> Option<&Range<u32>> {
        self.captures.first()
    }
}

/// Parses text and runs queries with registered grammars.
pub struct Engine {
    idle: Mutex<HashMap<String, Vec<Parser>>>,
    max_idle: usize,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("max_idle", &self.max_idle)
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_PARSERS)
    }
}

impl Engine {
    /// Create an engine keeping up to `max_idle` parsers per grammar.
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            max_idle,
        }
    }

    /// Number of idle parsers pooled for `grammar`.
    #[must_use]
    pub fn idle_parsers(&self, grammar: &Grammar) -> usize {
        self.idle.lock().get(grammar.name()).map_or(0, Vec::len)
    }

    fn checkout(&self, grammar: &Grammar) -> Result<Parser> {
        if let Some(parser) = self
            .idle
            .lock()
            .get_mut(grammar.name())
            .and_then(Vec::pop)
        {
            return Ok(parser);
        }

        trace!(grammar = grammar.name(), "creating parser");
        let mut parser = Parser::new();
        parser
            .set_language(grammar.language())
            .map_err(|e| Error::Parse(format!("{}: {e}", grammar.name())))?;
        Ok(parser)
    }

    fn checkin(&self, grammar: &Grammar, parser: Parser) {
        let mut idle = self.idle.lock();
        let parsers = idle.entry(grammar.name().to_string()).or_default();
        if parsers.len() < self.max_idle {
            parsers.push(parser);
        }
    }

    /// Parse `text`. With `previous`, the parse is incremental; the previous
    /// tree must already have been [`edit`](Tree::edit)ed to match `text`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the grammar cannot be loaded into a parser
    /// or the engine gives up on the input.
    pub fn parse(&self, grammar: &Grammar, text: &str, previous: Option<&Tree>) -> Result<Tree> {
        let mut parser = self.checkout(grammar)?;
        let tree = parser.parse(text, previous);
        self.checkin(grammar, parser);
        tree.ok_or_else(|| Error::Parse(format!("{} parser produced no tree", grammar.name())))
    }

    /// Compile a query script against `grammar`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryCompile`] with the engine's offset and category.
    pub fn compile_query(grammar: &Grammar, script: &str) -> Result<Query> {
        Query::new(grammar.language(), script).map_err(|e| Error::QueryCompile {
            language: grammar.name().to_string(),
            offset: e.offset,
            kind: format!("{:?}", e.kind),
            message: e.message,
        })
    }

    /// Run `query` over `tree` and return every match in ascending document
    /// order of its first capture. Matches sharing a start keep engine order.
    #[must_use]
    pub fn run_query(query: &Query, tree: &Tree, text: &str) -> Vec<RawMatch> {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, tree.root_node(), text.as_bytes());

        let mut collected = Vec::new();
        while let Some(m) = matches.next() {
            collected.push(RawMatch {
                pattern_index: m.pattern_index,
                captures: m
                    .captures
                    .iter()
                    .map(|c| offset(c.node.start_byte())..offset(c.node.end_byte()))
                    .collect(),
            });
        }

        collected.sort_by_key(|m| m.primary().map_or(u32::MAX, |r| r.start));
        collected
    }
}

/// Byte offset as `u32`, saturating for inputs beyond 4 GiB.
fn offset(byte: usize) -> u32 {
    u32::try_from(byte).unwrap_or(u32::MAX)
}
