//! Weft configuration.
//!
//! Stored as YAML. Every field is optional in the file; missing fields take
//! their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::cache::CacheSettings;
use crate::error::{Error, Result};

/// Default number of tasks processed at once
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 4;

/// Default directory holding `<language>/<script>.scm` files
pub const DEFAULT_QUERY_ROOT: &str = "./queries";

/// Default capacity of the tree and query caches
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default capacity of the highlight cache
pub const DEFAULT_HIGHLIGHT_CACHE_CAPACITY: usize = 500;

/// Default idle time after which a cache entry is swept
pub const DEFAULT_STALE_AFTER_SECS: u64 = 3600;

/// Default period of the stale-entry sweeper
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Name of the classification query script
pub const CLASSIFY_SCRIPT: &str = "codeinfo.scm";

/// Name of the highlighting query script
pub const HIGHLIGHT_SCRIPT: &str = "highlights.scm";

/// Configuration for a [`WeftContext`](crate::WeftContext).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WeftConfig {
    /// Upper bound on concurrently running tasks
    pub max_concurrent_tasks: usize,

    /// Root directory of the query scripts
    pub query_root: PathBuf,

    /// Root under which file inputs must live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,

    /// Parse-tree cache capacity
    pub tree_cache_capacity: usize,

    /// Compiled query cache capacity
    pub query_cache_capacity: usize,

    /// Highlight cache capacity
    pub highlight_cache_capacity: usize,

    /// Seconds of idleness after which an entry is swept
    pub stale_after_secs: u64,

    /// Seconds between sweeps; zero disables the sweeper
    pub sweep_interval_secs: u64,

    /// Rank-based merging for classification
    pub classify_profile: bool,

    /// Rank-based merging for highlighting
    pub highlight_profile: bool,
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            query_root: PathBuf::from(DEFAULT_QUERY_ROOT),
            project_root: None,
            tree_cache_capacity: DEFAULT_CACHE_CAPACITY,
            query_cache_capacity: DEFAULT_CACHE_CAPACITY,
            highlight_cache_capacity: DEFAULT_HIGHLIGHT_CACHE_CAPACITY,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            classify_profile: false,
            highlight_profile: true,
        }
    }
}

impl WeftConfig {
    /// Set the query root.
    #[must_use]
    pub fn with_query_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.query_root = root.into();
        self
    }

    /// Set the project root.
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Set the concurrency bound.
    #[must_use]
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is not valid YAML or fails [`validate`](Self::validate).
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on serialization failure and [`Error::Io`] if
    /// the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Reject values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_concurrent_tasks", self.max_concurrent_tasks),
            ("tree_cache_capacity", self.tree_cache_capacity),
            ("query_cache_capacity", self.query_cache_capacity),
            ("highlight_cache_capacity", self.highlight_cache_capacity),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{field} must be greater than zero")));
        }
        if self.query_root.as_os_str().is_empty() {
            return Err(Error::Config("query_root must not be empty".to_string()));
        }
        if let Some(root) = &self.project_root
            && !root.is_absolute()
        {
            return Err(Error::Config(format!(
                "project_root must be absolute: {}",
                root.display()
            )));
        }
        Ok(())
    }

    /// Location of `script` for `language`.
    #[must_use]
    pub fn query_script_path(&self, language: &str, script: &str) -> PathBuf {
        self.query_root.join(language).join(script)
    }

    fn cache_settings(&self, capacity: usize) -> CacheSettings {
        CacheSettings {
            capacity,
            stale_after: Duration::from_secs(self.stale_after_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }

    /// Settings for the parse-tree cache.
    #[must_use]
    pub fn tree_cache(&self) -> CacheSettings {
        self.cache_settings(self.tree_cache_capacity)
    }

    /// Settings for the query cache.
    #[must_use]
    pub fn query_cache(&self) -> CacheSettings {
        self.cache_settings(self.query_cache_capacity)
    }

    /// Settings for the highlight cache.
    #[must_use]
    pub fn highlight_cache(&self) -> CacheSettings {
        self.cache_settings(self.highlight_cache_capacity)
    }
}
