//! Token resolution: turns raw query matches into one token stream.
//!
//! Queries routinely produce several matches for the same text, e.g. an
//! identifier matched both as `variable` and as `function`. Matches that
//! share a start offset are merged: with profiling enabled the label with
//! the higher rank wins, otherwise the first one seen is kept. Matches with
//! different starts are never merged, even if their ranges overlap.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::decode::DecodeTable;
use crate::engine::RawMatch;
use crate::error::Result;
use crate::types::{KindLabel, Token};

/// Rank of a label's leading segment. Unknown segments rank lowest.
#[must_use]
pub fn rank(label: &KindLabel) -> u8 {
    match label.leading() {
        "comment" => 50,
        "operator" => 55,
        "string" => 60,
        "variable" => 65,
        "parameter" => 70,
        "constant" => 75,
        "function" => 80,
        "namespace" => 85,
        "punctuation" => 90,
        "type" => 95,
        "keyword" => 100,
        _ => 0,
    }
}

/// The span currently being accumulated.
struct Span {
    start: u32,
    end: u32,
    kind: KindLabel,
    shadowed: Option<KindLabel>,
}

impl Span {
    fn seed(start: u32, end: u32, kind: &KindLabel) -> Self {
        Self {
            start,
            end: end.max(start),
            kind: kind.clone(),
            shadowed: None,
        }
    }

    /// Merge a label covering `[self.start, end)`.
    fn absorb(&mut self, end: u32, kind: &KindLabel) {
        if rank(kind) > rank(&self.kind) {
            self.shadowed = Some(std::mem::replace(&mut self.kind, kind.clone()));
        } else {
            self.shadowed = Some(kind.clone());
        }
        self.end = self.end.max(end);
    }

    fn into_token(self) -> Token {
        Token {
            start: self.start,
            end: self.end,
            kind: self.kind,
            shadowed: self.shadowed,
        }
    }
}

/// Resolves the matches of one (tree, query) pair.
#[derive(Debug, Clone, Copy)]
pub struct TokenResolver<'a> {
    table: &'a DecodeTable,
    profile: bool,
}

impl<'a> TokenResolver<'a> {
    /// Create a resolver. `profile` enables rank-based merging.
    #[must_use]
    pub fn new(table: &'a DecodeTable, profile: bool) -> Self {
        Self { table, profile }
    }

    /// Resolve matches given in ascending document order.
    ///
    /// Matches without captures are skipped. The first capture's range is the
    /// match's range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPattern`](crate::Error::UnknownPattern) if a
    /// match's pattern has no label; nothing is returned for the pass then.
    pub fn resolve<I>(&self, matches: I) -> Result<Vec<Token>>
    where
        I: IntoIterator<Item = RawMatch>,
    {
        let mut tokens: BTreeMap<u32, Span> = BTreeMap::new();
        let mut current: Option<Span> = None;

        for m in matches {
            let Some(range) = m.primary() else {
                continue;
            };
            let kind = self.table.label(m.pattern_index)?;

            match current.as_mut() {
                Some(span) if self.profile && span.start == range.start => {
                    span.absorb(range.end, kind);
                }
                _ => {
                    let next = Span::seed(range.start, range.end, kind);
                    if let Some(done) = current.replace(next) {
                        self.finalize(&mut tokens, done);
                    }
                }
            }
        }

        if let Some(done) = current {
            self.finalize(&mut tokens, done);
        }

        Ok(tokens.into_values().map(Span::into_token).collect())
    }

    fn finalize(&self, tokens: &mut BTreeMap<u32, Span>, span: Span) {
        match tokens.entry(span.start) {
            Entry::Vacant(slot) => {
                slot.insert(span);
            }
            Entry::Occupied(mut slot) if self.profile => {
                slot.get_mut().absorb(span.end, &span.kind);
            }
            Entry::Occupied(_) => {}
        }
    }
}
