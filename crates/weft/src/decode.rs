//! Pattern index to kind label tables derived from query scripts.
//!
//! The engine reports which pattern produced a match but not which name the
//! script author gave it. The table is rebuilt from the script text: patterns
//! are counted in source order, and each pattern's last `@capture` becomes its
//! kind label.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::KindLabel;

static CAPTURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([\w.]*\w)").expect("capture pattern is valid"));

/// Kind labels by pattern index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeTable {
    labels: HashMap<usize, KindLabel>,
    pattern_count: usize,
}

impl DecodeTable {
    /// Derive a table from a query script.
    ///
    /// Blank lines and `;` comments are skipped, string literals are opaque,
    /// and brackets are balanced across lines. Once every bracket is closed a
    /// pattern stays open until a later line starts a new top-level form, so
    /// captures, quantifiers, and predicates on their own lines still belong
    /// to it. Patterns without any capture still consume an index but get no
    /// label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryCompile`] for unbalanced brackets or an
    /// unterminated string.
    pub fn from_script(language: &str, script: &str) -> Result<Self> {
        let syntax_error = |offset: usize, message: &str| Error::QueryCompile {
            language: language.to_string(),
            offset,
            kind: "Syntax".to_string(),
            message: message.to_string(),
        };

        let mut table = Self::default();
        let mut brackets: Vec<(char, usize)> = Vec::new();
        let mut in_string = false;
        let mut escaped = false;
        let mut pattern_open = false;
        let mut label: Option<String> = None;
        let mut line_offset = 0;

        for line in script.split_inclusive('\n') {
            let start = line_offset;
            line_offset += line.len();

            if pattern_open && brackets.is_empty() && !in_string && starts_pattern(line) {
                table.close_pattern(label.take());
                pattern_open = false;
            }

            let mut code = String::with_capacity(line.len());
            for (i, c) in line.char_indices() {
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        in_string = false;
                    }
                    code.push(' ');
                    continue;
                }
                match c {
                    ';' => break,
                    '"' => {
                        in_string = true;
                        pattern_open = true;
                        code.push(' ');
                        continue;
                    }
                    '(' | '[' => brackets.push((c, start + i)),
                    ')' | ']' => {
                        let expected = if c == ')' { '(' } else { '[' };
                        match brackets.pop() {
                            Some((open, _)) if open == expected => {}
                            _ => return Err(syntax_error(start + i, "unbalanced bracket")),
                        }
                    }
                    _ => {}
                }
                if !c.is_whitespace() {
                    pattern_open = true;
                }
                code.push(c);
            }

            if let Some(capture) = CAPTURE.captures_iter(&code).last() {
                label = Some(capture[1].to_string());
            }
        }

        if in_string {
            return Err(syntax_error(script.len(), "unterminated string"));
        }
        if let Some((_, offset)) = brackets.first() {
            return Err(syntax_error(*offset, "unclosed bracket"));
        }
        if pattern_open {
            table.close_pattern(label);
        }
        Ok(table)
    }

    fn close_pattern(&mut self, label: Option<String>) {
        if let Some(label) = label {
            self.labels.insert(self.pattern_count, KindLabel::new(label));
        }
        self.pattern_count += 1;
    }

    /// Compare the derived pattern count with the compiled query's count.
    ///
    /// A mismatch means labels may be attached to the wrong patterns; it is
    /// logged rather than rejected because the script still compiled.
    pub fn check_against(&self, language: &str, compiled_patterns: usize) -> bool {
        let consistent = self.pattern_count == compiled_patterns;
        if !consistent {
            warn!(
                language,
                derived = self.pattern_count,
                compiled = compiled_patterns,
                "decode table pattern count differs from compiled query"
            );
        }
        consistent
    }

    /// Label for `pattern_index`, if it has one.
    #[must_use]
    pub fn get(&self, pattern_index: usize) -> Option<&KindLabel> {
        self.labels.get(&pattern_index)
    }

    /// Label for `pattern_index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPattern`] if the index has no label.
    pub fn label(&self, pattern_index: usize) -> Result<&KindLabel> {
        self.get(pattern_index).ok_or(Error::UnknownPattern {
            index: pattern_index,
        })
    }

    /// Number of patterns counted in the script.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    /// Number of labelled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if no pattern carries a label.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Whether `line`, read outside any pattern, begins a new top-level form.
/// Captures, quantifiers, and predicates continue the previous pattern.
fn starts_pattern(line: &str) -> bool {
    let code = line.trim_start();
    match code.chars().next() {
        None | Some(';' | '@' | '?' | '*' | '+') => false,
        Some('(') => !code[1..].trim_start().starts_with('#'),
        Some(_) => true,
    }
}

impl FromIterator<(usize, KindLabel)> for DecodeTable {
    fn from_iter<T: IntoIterator<Item = (usize, KindLabel)>>(iter: T) -> Self {
        let labels: HashMap<usize, KindLabel> = iter.into_iter().collect();
        let pattern_count = labels.keys().max().map_or(0, |max| max + 1);
        Self {
            labels,
            pattern_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(table: &DecodeTable) -> Vec<Option<&str>> {
        (0..table.pattern_count())
            .map(|i| table.get(i).map(KindLabel::as_str))
            .collect()
    }

    #[test]
    fn one_pattern_per_line() {
        let script = "(line_comment) @comment\n(string_literal) @string\n\"fn\" @keyword\n";
        let table = DecodeTable::from_script("rust", script).expect("should derive");
        assert_eq!(
            labels(&table),
            vec![Some("comment"), Some("string"), Some("keyword")]
        );
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let script = "; Comments\n\n(line_comment) @comment ; trailing @ignored\n\n;(identifier) @nope\n(identifier) @variable\n";
        let table = DecodeTable::from_script("rust", script).expect("should derive");
        assert_eq!(labels(&table), vec![Some("comment"), Some("variable")]);
    }

    #[test]
    fn multi_line_patterns_take_the_last_capture() {
        let script = "(function_item\n  name: (identifier) @function)\n\n(call_expression\n  function: (identifier) @function.call\n  (#eq? @function.call \"main\")) @call\n";
        let table = DecodeTable::from_script("rust", script).expect("should derive");
        assert_eq!(labels(&table), vec![Some("function"), Some("call")]);
    }

    #[test]
    fn brackets_inside_strings_do_not_count() {
        let script = "[\n  \"(\"\n  \"[\"\n  \")\"\n] @punctuation.bracket\n\"\\\"\" @string.escape\n";
        let table = DecodeTable::from_script("rust", script).expect("should derive");
        assert_eq!(
            labels(&table),
            vec![Some("punctuation.bracket"), Some("string.escape")]
        );
    }

    #[test]
    fn capture_on_its_own_line_belongs_to_the_pattern_above() {
        let script = "[\n  \"fn\"\n  \"let\"\n]\n@keyword\n(identifier) @variable\n";
        let table = DecodeTable::from_script("rust", script).expect("should derive");
        assert_eq!(labels(&table), vec![Some("keyword"), Some("variable")]);
    }

    #[test]
    fn trailing_quantifiers_and_predicates_continue_the_pattern() {
        let script = "(line_comment)+\n; doc comments\n@comment.doc\n\n(identifier) @constant\n  (#match? @constant \"^[A-Z]\")\n\"fn\" @keyword\n";
        let table = DecodeTable::from_script("rust", script).expect("should derive");
        assert_eq!(
            labels(&table),
            vec![Some("comment.doc"), Some("constant"), Some("keyword")]
        );
    }

    #[test]
    fn patterns_without_captures_keep_their_index() {
        let script = "(line_comment)\n(identifier) @variable\n";
        let table = DecodeTable::from_script("rust", script).expect("should derive");
        assert_eq!(table.pattern_count(), 2);
        assert_eq!(labels(&table), vec![None, Some("variable")]);
        assert!(matches!(table.label(0), Err(Error::UnknownPattern { index: 0 })));
    }

    #[test]
    fn unbalanced_brackets_are_rejected() {
        assert!(matches!(
            DecodeTable::from_script("rust", "(identifier)) @x\n"),
            Err(Error::QueryCompile { offset: 12, .. })
        ));
        assert!(matches!(
            DecodeTable::from_script("rust", "(identifier @x\n"),
            Err(Error::QueryCompile { offset: 0, .. })
        ));
    }

    #[test]
    fn count_check_reports_mismatch() {
        let table: DecodeTable = [(0, KindLabel::from("comment"))].into_iter().collect();
        assert!(table.check_against("rust", 1));
        assert!(!table.check_against("rust", 2));
    }
}
