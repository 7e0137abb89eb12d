//! Error types for the class folder watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Watch root {path} is not a directory")]
    RootMissing { path: PathBuf },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Sink '{sink}' failed for {path}: {reason}")]
    SinkFailed {
        sink: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to spawn watcher thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Watcher thread panicked")]
    WorkerPanicked,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
