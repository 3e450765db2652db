//! Error types for watch-core operations.
//!
//! These never reach the hook's exit status. The supervisor converts them
//! into log records and warning strings (see [`crate::supervisor`]).

use std::path::PathBuf;

/// All errors that can occur while supervising a watch process.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    // ─────────────────────────────────────────────────────────────────────
    // Handle Store Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid PID in handle {path}: {content:?}")]
    InvalidHandle { path: PathBuf, content: String },

    #[error("Handle already exists: {0}")]
    HandleExists(PathBuf),

    // ─────────────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Working directory does not exist: {0}")]
    InvalidCwd(PathBuf),

    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

impl WatchError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WatchError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for watch-core operations.
pub type Result<T> = std::result::Result<T, WatchError>;
