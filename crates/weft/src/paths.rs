//! Compact file identities relative to the project root.
//!
//! Directory names repeat across thousands of files, so each distinct name is
//! stored once and referred to by a `u32` id. An [`InternedPath`] is the list
//! of directory ids from the root down plus the file name, which makes it a
//! cheap, hashable cache key.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Segment id reserved for the project root itself.
pub const ROOT_SEGMENT: u32 = 0;

/// A file path relative to the project root, with interned directory names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternedPath {
    segments: Box<[u32]>,
    file_name: Arc<str>,
}

impl InternedPath {
    /// Directory segment ids from the root down.
    #[must_use]
    pub fn segments(&self) -> &[u32] {
        &self.segments
    }

    /// The final path component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

#[derive(Debug, Default)]
struct Table {
    root: Option<PathBuf>,
    ids: HashMap<Arc<str>, u32>,
    names: Vec<Arc<str>>,
}

impl Table {
    fn reset(&mut self, root: PathBuf) {
        self.ids.clear();
        self.names.clear();
        // Slot 0 belongs to the root.
        self.names.push(Arc::from(""));
        self.root = Some(root);
    }

    fn id_for(&mut self, name: &str) -> u32 {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        let name: Arc<str> = Arc::from(name);
        self.names.push(Arc::clone(&name));
        self.ids.insert(name, id);
        id
    }
}

/// Thread-safe interner for paths under one project root.
///
/// The root must be set with [`set_root`](Self::set_root) before any file path
/// is interned. Names are stored lossily as UTF-8.
#[derive(Debug, Default)]
pub struct PathInterner {
    table: RwLock<Table>,
}

impl PathInterner {
    /// Create an interner without a root.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an interner rooted at `root`.
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let interner = Self::new();
        interner.set_root(root);
        interner
    }

    /// Set the project root. Any previously issued ids become invalid.
    pub fn set_root(&self, root: impl AsRef<Path>) {
        let root = normalize(root.as_ref());
        debug!(root = %root.display(), "project root set");
        self.table.write().reset(root);
    }

    /// The configured root, if any.
    #[must_use]
    pub fn root(&self) -> Option<PathBuf> {
        self.table.read().root.clone()
    }

    /// Number of distinct directory names seen so far.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.table.read().names.len().saturating_sub(1)
    }

    /// Intern `path`, which must live under the project root.
    ///
    /// `.` components are dropped and `..` components folded before the root
    /// check, so `root/src/../lib.rs` interns as `root/lib.rs`.
    ///
    /// # Errors
    ///
    /// - [`Error::ProjectRootUnset`] if no root was set
    /// - [`Error::PathOutsideRoot`] if `path` is not below the root
    pub fn intern(&self, path: &Path) -> Result<InternedPath> {
        let normalized = normalize(path);
        let mut table = self.table.write();
        let root = table.root.clone().ok_or(Error::ProjectRootUnset)?;

        let outside = || Error::PathOutsideRoot {
            path: path.to_path_buf(),
            root: root.clone(),
        };
        let relative = normalized.strip_prefix(&root).map_err(|_| outside())?;

        let mut names: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let file_name = names.pop().ok_or_else(outside)?;

        let segments = names.iter().map(|name| table.id_for(name)).collect();
        Ok(InternedPath {
            segments,
            file_name: Arc::from(file_name),
        })
    }

    /// Rebuild the absolute path for an interned path.
    ///
    /// # Errors
    ///
    /// - [`Error::ProjectRootUnset`] if no root was set
    /// - [`Error::UnknownSegment`] if the path was issued under a different root
    pub fn resolve(&self, path: &InternedPath) -> Result<PathBuf> {
        let table = self.table.read();
        let mut resolved = table.root.clone().ok_or(Error::ProjectRootUnset)?;
        for &id in path.segments() {
            let name = table
                .names
                .get(id as usize)
                .filter(|_| id != ROOT_SEGMENT)
                .ok_or(Error::UnknownSegment { id })?;
            resolved.push(&**name);
        }
        resolved.push(path.file_name());
        Ok(resolved)
    }
}

/// Lexically normalize a path without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
