//! Registry of directories subscribed to OS notifications.
//!
//! Directories are only ever added. A deleted directory keeps its entry; the
//! OS drops the underlying watch on its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use walkdir::WalkDir;

/// Set of registered absolute directory paths.
///
/// Cloning shares the same set. The watcher thread is the only writer; clones
/// held elsewhere may read while it inserts.
#[derive(Debug, Clone, Default)]
pub struct WatchRegistry {
    dirs: Arc<DashSet<PathBuf>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `dir` as registered. Returns `false` if it already was.
    pub fn insert(&self, dir: PathBuf) -> bool {
        self.dirs.insert(dir)
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.contains(dir)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Snapshot of registered directories.
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.dirs.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Walk `root` and return directories not registered yet.
    ///
    /// Unreadable entries are logged and skipped; the next scan retries them.
    /// Nothing is inserted here: callers insert once the OS subscription
    /// succeeds.
    pub fn unregistered_dirs(&self, root: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    crate::debug_event!("watcher", "scan skipped", "{e}");
                    continue;
                }
            };

            if entry.file_type().is_dir() && !self.contains(entry.path()) {
                found.push(entry.into_path());
            }
        }

        found
    }
}
