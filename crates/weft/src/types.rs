//! Core data types: inputs, tokens, kind labels, and task results.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, Serializer};
use weft_sched::TaskId;

use crate::error::Result;
use crate::paths::{InternedPath, PathInterner};

// ============================================================================
// Inputs
// ============================================================================

/// What a tokenization task works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsingInput {
    /// A file under the project root
    File {
        /// Absolute path of the file
        path: PathBuf,
    },
    /// Source text with an explicit language tag
    Text {
        /// The source text
        text: Arc<str>,
        /// Canonical language name (`rust`) or a suffix alias (`rs`)
        language: String,
    },
}

impl ParsingInput {
    /// Convenience constructor for file inputs.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    /// Convenience constructor for text inputs.
    pub fn text(text: impl Into<Arc<str>>, language: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            language: language.into(),
        }
    }
}

// ============================================================================
// Kind labels
// ============================================================================

/// Dot-segmented classification label such as `function.builtin`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindLabel(Arc<str>);

impl KindLabel {
    /// Create a label.
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self(label.into())
    }

    /// The full label text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first dot-separated segment (`function` for `function.builtin`).
    #[must_use]
    pub fn leading(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    /// The label with its last segment removed, or `None` for a single segment.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(parent, _)| parent)
    }
}

impl fmt::Debug for KindLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for KindLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KindLabel {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl Serialize for KindLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// A classified half-open byte range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// First byte
    pub start: u32,
    /// One past the last byte
    pub end: u32,
    /// Winning classification
    pub kind: KindLabel,
    /// Classification that lost the rank comparison at the same start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadowed: Option<KindLabel>,
}

impl Token {
    /// Number of bytes covered.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Returns `true` for a zero-length token.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// The covered byte range as `usize` offsets.
    #[must_use]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Identity of one parsed tree. A re-parse produces a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl TreeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// Results
// ============================================================================

/// Display name used for text inputs, which have no file.
pub const TEXT_ORIGIN_NAME: &str = "SingleFile";

/// Where the tokenized source came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// An interned file path
    File(InternedPath),
    /// The raw text of a text input
    Text(Arc<str>),
}

impl Origin {
    /// Rebuild a displayable path.
    ///
    /// # Errors
    ///
    /// Fails if the interner no longer knows the path's segments.
    pub fn display_path(&self, interner: &PathInterner) -> Result<PathBuf> {
        match self {
            Self::File(path) => interner.resolve(path),
            Self::Text(_) => Ok(PathBuf::from(TEXT_ORIGIN_NAME)),
        }
    }
}

/// Output of one tokenization task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Where the source came from
    pub origin: Origin,
    /// Canonical language name
    pub language: Arc<str>,
    /// Tokens sorted by start offset
    pub tokens: Vec<Token>,
    /// The task that produced this result
    pub task_id: TaskId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::nested("function.builtin", "function", Some("function"))]
    #[case::deep("keyword.control.flow", "keyword", Some("keyword.control"))]
    #[case::flat("comment", "comment", None)]
    fn kind_label_segments(
        #[case] label: &str,
        #[case] leading: &str,
        #[case] parent: Option<&str>,
    ) {
        let label = KindLabel::from(label);
        assert_eq!(label.leading(), leading);
        assert_eq!(label.parent(), parent);
    }

    #[test]
    fn token_length_and_range() {
        let token = Token {
            start: 4,
            end: 10,
            kind: "string".into(),
            shadowed: None,
        };
        assert_eq!(token.len(), 6);
        assert!(!token.is_empty());
        assert_eq!(token.range(), 4..10);
    }

    #[test]
    fn token_serializes_labels_as_strings() {
        let token = Token {
            start: 0,
            end: 4,
            kind: "keyword".into(),
            shadowed: Some("variable".into()),
        };
        let json = serde_json::to_string(&token).expect("should serialize");
        assert_eq!(
            json,
            r#"{"start":0,"end":4,"kind":"keyword","shadowed":"variable"}"#
        );
    }

    #[test]
    fn tree_ids_are_unique() {
        assert_ne!(TreeId::next(), TreeId::next());
    }

    #[test]
    fn text_origin_displays_placeholder() {
        let interner = PathInterner::new();
        let origin = Origin::Text(Arc::from("fn main() {}"));
        assert_eq!(
            origin.display_path(&interner).expect("text origin never fails"),
            PathBuf::from(TEXT_ORIGIN_NAME)
        );
    }
}
