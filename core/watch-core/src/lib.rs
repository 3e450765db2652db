//! # watch-core
//!
//! Session-scoped supervision of the `wb-grep watch` background process.
//!
//! A SessionStart hook starts one watcher per session and records it in the
//! Handle Store; a SessionEnd hook (usually a different process) finds the
//! record, signals the watcher's process group, and deletes the record and the
//! watcher's log. The files in the store are the only state shared between
//! the two.
//!
//! ## Design Principles
//!
//! - **Never block the host**: handlers return outcomes, not errors.
//! - **Synchronous**: no async runtime; each hook is a short run-to-completion process.
//! - **Filesystem is the registry**: deterministic per-session paths, atomic create.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use watch_core::Supervisor;
//!
//! let supervisor = Supervisor::from_env();
//! let outcome = supervisor.start("session-123", std::path::Path::new("/repo"));
//! // ... later, possibly from another process
//! let report = supervisor.stop("session-123");
//! ```

pub mod config;
pub mod error;
pub mod process;
pub mod store;
pub mod supervisor;
pub mod types;

pub use config::WatchConfig;
pub use error::{Result, WatchError};
pub use store::{session_key, HandleStore, StoredHandle};
pub use supervisor::{StartOutcome, StopReport, Supervisor, Termination, WatchStatus};
pub use types::{HookInput, HookOutput, ProcessHandle, UNKNOWN_SESSION};
