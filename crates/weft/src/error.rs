//! Error types for Weft operations.
//!
//! Every fallible operation returns [`Error`]. [`Error::kind`] sorts failures
//! into three buckets:
//!
//! - **Configuration**: the environment is wrong (no grammar, no query
//!   script, bad config file, no project root). Retrying the same request
//!   will fail the same way until the setup changes.
//! - **Input**: the request itself is unusable (unmapped suffix, file outside
//!   the project root, malformed query script).
//! - **Runtime**: something failed while doing the work (I/O, the engine gave
//!   up, shutdown, a decode table that does not cover the query).
//!
//! Inside the scheduler a failure stays local to its task; see
//! [`weft_sched::TaskError`].

use std::path::PathBuf;

use thiserror::Error;
use weft_sched::TaskError;

/// Result type for Weft operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Weft operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No grammar is registered under this name
    #[error("grammar not found: {name}")]
    GrammarNotFound {
        /// Requested grammar name
        name: String,
    },

    /// The suffix or language tag does not map to a language
    #[error("no language registered for '{suffix}'")]
    NoLanguage {
        /// Offending suffix or tag
        suffix: String,
    },

    /// The engine rejected a query script
    #[error("query compile error in {language} at byte {offset} ({kind}): {message}")]
    QueryCompile {
        /// Grammar the script was compiled against
        language: String,
        /// Byte offset into the script
        offset: usize,
        /// Engine error category
        kind: String,
        /// Engine message
        message: String,
    },

    /// The well-known query script for a language is absent
    #[error("query script not found: {}", path.display())]
    MissingQueryScript {
        /// Expected location
        path: PathBuf,
    },

    /// A match referenced a pattern index the decode table does not cover
    #[error("pattern index {index} has no kind label")]
    UnknownPattern {
        /// Offending pattern index
        index: usize,
    },

    /// A file path was interned before the project root was set
    #[error("project root is not configured")]
    ProjectRootUnset,

    /// A file path does not live under the project root
    #[error("{} is outside the project root {}", path.display(), root.display())]
    PathOutsideRoot {
        /// The rejected path
        path: PathBuf,
        /// The configured root
        root: PathBuf,
    },

    /// An interned path refers to segment ids this interner never issued
    #[error("interned path references unknown segment {id}")]
    UnknownSegment {
        /// Offending segment id
        id: u32,
    },

    /// The engine could not produce a tree
    #[error("parser error: {0}")]
    Parse(String),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Work stopped because shutdown was requested
    #[error("cancelled by shutdown")]
    Cancelled,

    /// The scheduler refused an operation
    #[error("scheduler error: {0}")]
    Schedule(#[from] weft_sched::ScheduleError),
}

/// Failure category, see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Setup problem
    Configuration,
    /// Unusable request
    Input,
    /// Failure while doing the work
    Runtime,
}

impl Error {
    /// Categorize this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GrammarNotFound { .. }
            | Self::MissingQueryScript { .. }
            | Self::ProjectRootUnset
            | Self::Config(_) => ErrorKind::Configuration,
            Self::NoLanguage { .. }
            | Self::PathOutsideRoot { .. }
            | Self::UnknownSegment { .. }
            | Self::QueryCompile { .. } => ErrorKind::Input,
            Self::UnknownPattern { .. }
            | Self::Parse(_)
            | Self::Io(_)
            | Self::Cancelled
            | Self::Schedule(_) => ErrorKind::Runtime,
        }
    }

    /// Returns `true` if retrying cannot help until the setup changes.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

impl From<Error> for TaskError {
    fn from(error: Error) -> Self {
        match error {
            Error::Cancelled => TaskError::Cancelled,
            other => TaskError::failed(other),
        }
    }
}
