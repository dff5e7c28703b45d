//! Rust grammar, backed by tree-sitter-rust.

use super::GrammarSource;

/// The Rust grammar.
pub struct RustGrammar;

impl GrammarSource for RustGrammar {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn suffixes(&self) -> &[&'static str] {
        &["rs"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }
}
