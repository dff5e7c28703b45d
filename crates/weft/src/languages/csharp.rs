//! C# grammar, backed by tree-sitter-c-sharp.

use super::GrammarSource;

/// The C# grammar.
pub struct CSharpGrammar;

impl GrammarSource for CSharpGrammar {
    fn name(&self) -> &'static str {
        "c-sharp"
    }

    fn suffixes(&self) -> &[&'static str] {
        &["cs", "csx"]
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_c_sharp::LANGUAGE.into()
    }
}
