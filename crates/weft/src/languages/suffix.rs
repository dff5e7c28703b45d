//! File suffix to language name mapping.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Languages known by suffix, whether or not a grammar is registered for them.
const DEFAULT_SUFFIXES: &[(&str, &[&str])] = &[
    ("c", &["c", "h"]),
    ("cpp", &["cpp", "hpp", "cxx", "cc"]),
    ("c-sharp", &["cs", "csx"]),
    ("go", &["go"]),
    ("java", &["java"]),
    ("javascript", &["js", "mjs", "cjs"]),
    ("yaml", &["yaml", "yml"]),
    ("python", &["py", "pyw"]),
    ("typescript", &["ts", "tsx"]),
    ("sql", &["sql"]),
    ("json", &["json"]),
    ("markdown", &["md", "markdown"]),
    ("rust", &["rs"]),
];

/// Case-insensitive suffix lookup.
#[derive(Debug, Clone)]
pub struct SuffixTable {
    by_suffix: HashMap<String, String>,
}

impl Default for SuffixTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (language, suffixes) in DEFAULT_SUFFIXES {
            table.insert(language, suffixes);
        }
        table
    }
}

impl SuffixTable {
    /// A table with no mappings.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_suffix: HashMap::new(),
        }
    }

    /// Map each suffix to `language`, replacing earlier mappings.
    pub fn insert(&mut self, language: &str, suffixes: &[&str]) {
        for suffix in suffixes {
            self.by_suffix
                .insert(normalize(suffix), language.to_string());
        }
    }

    /// Look up a suffix; a leading dot and letter case are ignored.
    #[must_use]
    pub fn get(&self, suffix: &str) -> Option<&str> {
        self.by_suffix.get(&normalize(suffix)).map(String::as_str)
    }

    /// Language for `suffix`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoLanguage`] if the suffix is not mapped.
    pub fn language_for(&self, suffix: &str) -> Result<&str> {
        self.get(suffix).ok_or_else(|| Error::NoLanguage {
            suffix: suffix.to_string(),
        })
    }

    /// Language for the extension of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoLanguage`] if the path has no extension or the
    /// extension is not mapped.
    pub fn language_for_path(&self, path: &Path) -> Result<&str> {
        let suffix = path
            .extension()
            .map(|ext| ext.to_string_lossy())
            .unwrap_or_default();
        self.language_for(&suffix)
    }
}

fn normalize(suffix: &str) -> String {
    suffix.trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("rs", "rust")]
    #[case::dotted(".cs", "c-sharp")]
    #[case::upper("PY", "python")]
    #[case::mixed(".Md", "markdown")]
    #[case::header("h", "c")]
    fn known_suffixes(#[case] suffix: &str, #[case] language: &str) {
        let table = SuffixTable::default();
        assert_eq!(table.language_for(suffix).expect("suffix is mapped"), language);
    }

    #[test]
    fn unknown_suffix_is_an_error() {
        let table = SuffixTable::default();
        let err = table.language_for("xyz").expect_err("xyz is not mapped");
        assert!(matches!(err, Error::NoLanguage { suffix } if suffix == "xyz"));
    }

    #[test]
    fn paths_without_extension_have_no_language() {
        let table = SuffixTable::default();
        assert!(table.language_for_path(Path::new("/src/Makefile")).is_err());
        assert_eq!(
            table
                .language_for_path(Path::new("/src/Program.CS"))
                .expect("extension is mapped"),
            "c-sharp"
        );
    }

    #[test]
    fn insert_overrides_existing_mapping() {
        let mut table = SuffixTable::default();
        table.insert("cpp", &["h"]);
        assert_eq!(table.get("h"), Some("cpp"));
    }
}
