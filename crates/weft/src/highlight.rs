//! Syntax highlighting: styled tokens from the highlight query and a theme.
//!
//! A [`Highlighter`] resolves `highlights.scm` over a file's tree and caches
//! the resulting [`HighlightProvider`] per tree. Styles are looked up through
//! a [`ThemeProvider`] each time tokens are requested, so a provider stays
//! valid across theme changes.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cache::BoundedCache;
use crate::config::HIGHLIGHT_SCRIPT;
use crate::context::WeftContext;
use crate::error::{Error, Result};
use crate::types::{KindLabel, ParsingInput, Token, TreeId};

// ============================================================================
// Styles and themes
// ============================================================================

/// Colors and font modifiers for one kind label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    /// Foreground color, e.g. `#c678dd`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fg: Option<String>,
    /// Background color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg: Option<String>,
    /// Font modifiers such as `bold` or `italic`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

impl Style {
    /// A style with only a foreground color.
    pub fn fg(color: impl Into<String>) -> Self {
        Self {
            fg: Some(color.into()),
            ..Self::default()
        }
    }

    /// Add a modifier.
    #[must_use]
    pub fn with_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.push(modifier.into());
        self
    }
}

/// Maps kind labels to styles.
pub trait ThemeProvider: Send + Sync {
    /// Style registered for exactly this label.
    fn lookup(&self, label: &str) -> Option<&Style>;

    /// Style for `label`, falling back from `a.b.c` to `a.b` to `a`.
    fn style(&self, label: &KindLabel) -> Option<Style> {
        let mut current = label.as_str();
        loop {
            if let Some(style) = self.lookup(current) {
                return Some(style.clone());
            }
            current = current.rsplit_once('.')?.0;
        }
    }
}

/// A theme backed by an in-memory map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticTheme {
    styles: HashMap<String, Style>,
}

impl StaticTheme {
    /// An empty theme.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a style for `label`.
    #[must_use]
    pub fn with(mut self, label: impl Into<String>, style: Style) -> Self {
        self.insert(label, style);
        self
    }

    /// Register a style for `label`, replacing any previous one.
    pub fn insert(&mut self, label: impl Into<String>, style: Style) {
        self.styles.insert(label.into(), style);
    }

    /// Number of styled labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Returns `true` if no label is styled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

impl ThemeProvider for StaticTheme {
    fn lookup(&self, label: &str) -> Option<&Style> {
        self.styles.get(label)
    }
}

// ============================================================================
// Styled tokens
// ============================================================================

/// A token with its resolved style. `style` is `None` when the theme has no
/// entry for the label or any of its parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleToken {
    /// The classified range
    #[serde(flatten)]
    pub token: Token,
    /// Resolved style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
}

/// Produces styled tokens.
pub trait TokenProvider: Send + Sync {
    /// Styled tokens sorted by start offset.
    fn style_tokens(&self) -> Vec<StyleToken>;
}

/// Resolved highlight tokens of one tree, styled on demand.
#[derive(Clone)]
pub struct HighlightProvider {
    tree: TreeId,
    tokens: Arc<[Token]>,
    theme: Arc<dyn ThemeProvider>,
}

impl HighlightProvider {
    /// Wrap resolved tokens.
    #[must_use]
    pub fn new(tree: TreeId, tokens: Vec<Token>, theme: Arc<dyn ThemeProvider>) -> Self {
        Self {
            tree,
            tokens: tokens.into(),
            theme,
        }
    }

    /// The tree the tokens were resolved from.
    #[must_use]
    pub fn tree(&self) -> TreeId {
        self.tree
    }

    /// The unstyled tokens.
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The same tokens styled by another theme.
    #[must_use]
    pub fn with_theme(&self, theme: Arc<dyn ThemeProvider>) -> Self {
        Self {
            tree: self.tree,
            tokens: Arc::clone(&self.tokens),
            theme,
        }
    }
}

impl fmt::Debug for HighlightProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HighlightProvider")
            .field("tree", &self.tree)
            .field("tokens", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

impl TokenProvider for HighlightProvider {
    fn style_tokens(&self) -> Vec<StyleToken> {
        self.tokens
            .iter()
            .map(|token| StyleToken {
                style: self.theme.style(&token.kind),
                token: token.clone(),
            })
            .collect()
    }
}

// ============================================================================
// Highlighter
// ============================================================================

/// Highlights files and text through the shared caches.
#[derive(Clone)]
pub struct Highlighter {
    ctx: Arc<WeftContext>,
    theme: Arc<dyn ThemeProvider>,
    providers: Arc<BoundedCache<TreeId, HighlightProvider>>,
}

impl fmt::Debug for Highlighter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Highlighter")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

impl Highlighter {
    /// Create a highlighter styling with `theme`.
    #[must_use]
    pub fn new(ctx: Arc<WeftContext>, theme: Arc<dyn ThemeProvider>) -> Self {
        let providers = BoundedCache::new("highlights", ctx.config().highlight_cache());
        Self {
            ctx,
            theme,
            providers: Arc::new(providers),
        }
    }

    /// The provider cache.
    #[must_use]
    pub fn providers(&self) -> &BoundedCache<TreeId, HighlightProvider> {
        &self.providers
    }

    /// Styled tokens for a file under the project root.
    ///
    /// # Errors
    ///
    /// Fails like a tokenization task would, with
    /// [`Error::MissingQueryScript`] if the language ships no
    /// `highlights.scm`.
    pub async fn highlight_file(&self, path: impl Into<PathBuf>) -> Result<Vec<StyleToken>> {
        let provider = self.provider(&ParsingInput::file(path)).await?;
        Ok(provider.style_tokens())
    }

    /// Styled tokens for source text in `language`.
    ///
    /// # Errors
    ///
    /// As [`highlight_file`](Self::highlight_file).
    pub async fn highlight_text(
        &self,
        text: impl Into<Arc<str>>,
        language: &str,
    ) -> Result<Vec<StyleToken>> {
        let provider = self.provider(&ParsingInput::text(text, language)).await?;
        Ok(provider.style_tokens())
    }

    /// The cached provider for an input, building it on a miss.
    ///
    /// # Errors
    ///
    /// As [`highlight_file`](Self::highlight_file).
    pub async fn provider(&self, input: &ParsingInput) -> Result<Arc<HighlightProvider>> {
        let source = self.ctx.load_source(input).await?;
        let script = self
            .ctx
            .query_script(&source.grammar, HIGHLIGHT_SCRIPT)
            .await?;

        let ctx = Arc::clone(&self.ctx);
        let theme = Arc::clone(&self.theme);
        let providers = Arc::clone(&self.providers);
        tokio::task::spawn_blocking(move || {
            let grammar = source.grammar;
            let tree = ctx
                .trees()
                .get_or_parse(ctx.engine(), source.key, &grammar, source.text)?;
            providers.get_or_try_insert_with(tree.id(), || {
                let query = ctx.queries().get_or_compile(&grammar, &script)?;
                let tokens = query.tokens(&tree, ctx.config().highlight_profile)?;
                trace!(tree = tree.id().as_u64(), tokens = tokens.len(), "highlighted");
                Ok::<_, Error>(HighlightProvider::new(tree.id(), tokens, theme))
            })
        })
        .await
        .map_err(|e| Error::Parse(format!("highlight worker failed: {e}")))?
    }
}
