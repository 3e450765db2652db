//! Session-start and session-end handlers.
//!
//! ## Lifecycle (per session)
//!
//! ```text
//! NONE ──start──▶ RUNNING ──stop──▶ NONE
//!                 RUNNING ──start──▶ RUNNING   (no second watcher)
//! ```
//!
//! Neither handler returns an error. Every failure is logged through
//! `tracing` and, where the host should hear about it, carried as a warning
//! string in the returned outcome. The hook binary always exits 0.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::process::{self, Delivery, PidIdentity, PidState, Signal};
use crate::store::HandleStore;
use crate::types::{HookOutput, ProcessHandle};

const WATCH_LABEL: &str = "wb-grep watch";

/// What the start handler did.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started {
        pid: u32,
        handle_path: PathBuf,
    },
    /// Spawned, but the handle could not be written. Stop cannot reach this watcher.
    StartedUntracked {
        pid: u32,
        warning: String,
    },
    AlreadyRunning {
        handle_path: PathBuf,
        /// None when the handle exists but could not be read.
        pid: Option<u32>,
    },
    /// `WB_GREP_WATCH_ENABLED=0`.
    Disabled,
    Failed {
        warning: String,
    },
}

impl StartOutcome {
    /// The structured message for the host, if the start produced one.
    pub fn acknowledgment(&self) -> Option<HookOutput> {
        let context = match self {
            StartOutcome::Started { pid, .. } => format!(
                "{WATCH_LABEL} started (PID: {pid}). Index updates will happen automatically."
            ),
            StartOutcome::StartedUntracked { pid, .. } => format!(
                "{WATCH_LABEL} started (PID: {pid}) but is not tracked; it will keep running after this session ends."
            ),
            StartOutcome::AlreadyRunning { handle_path, .. } => format!(
                "{WATCH_LABEL} already running for this session (PID file: {})",
                handle_path.display()
            ),
            StartOutcome::Disabled | StartOutcome::Failed { .. } => return None,
        };
        Some(HookOutput::session_start(context))
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            StartOutcome::StartedUntracked { warning, .. } | StartOutcome::Failed { warning } => {
                Some(warning)
            }
            _ => None,
        }
    }
}

/// How the stop handler dealt with the recorded process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Signalled { group: bool },
    /// SIGTERM was ignored for the whole grace period; SIGKILL followed.
    Escalated,
    AlreadyGone,
    /// The PID now belongs to a different process; nothing was signalled.
    PidRecycled,
    Failed,
}

/// What the stop handler did. Purely informational.
#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    pub session_id: String,
    pub handle_found: bool,
    pub pid: Option<u32>,
    /// None when there was nothing valid to signal.
    pub termination: Option<Termination>,
    pub handle_removed: bool,
    pub log_removed: bool,
    pub warnings: Vec<String>,
}

/// One handle in the store, as reported by `watch-hook status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchStatus {
    pub key: String,
    pub handle_path: PathBuf,
    pub session_id: Option<String>,
    pub pid: Option<u32>,
    pub cwd: Option<String>,
    pub alive: bool,
}

pub struct Supervisor {
    config: WatchConfig,
    store: HandleStore,
}

impl Supervisor {
    pub fn new(config: WatchConfig) -> Self {
        let store = HandleStore::new(config.store_dir());
        Self { config, store }
    }

    pub fn from_env() -> Self {
        Self::new(WatchConfig::from_env())
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn store(&self) -> &HandleStore {
        &self.store
    }

    /// Ensures exactly one watcher runs for `session_id`, started in `cwd`.
    pub fn start(&self, session_id: &str, cwd: &Path) -> StartOutcome {
        if !self.config.enabled() {
            tracing::info!(session = %session_id, "watch supervision disabled; not starting");
            return StartOutcome::Disabled;
        }

        if let Some(outcome) = self.check_existing(session_id) {
            return outcome;
        }

        if let Err(err) = self.store.ensure_dir() {
            tracing::error!(session = %session_id, error = %err, "failed to prepare store dir");
            return StartOutcome::Failed {
                warning: format!("Failed to start {WATCH_LABEL}: {err}"),
            };
        }

        let log_path = self.store.log_path(session_id);
        let child = match process::spawn_detached(
            self.config.program(),
            self.config.args(),
            cwd,
            &log_path,
        ) {
            Ok(child) => child,
            Err(err) => {
                let warning = format!("Failed to start {WATCH_LABEL}: {err}");
                tracing::error!(session = %session_id, cwd = %cwd.display(), error = %err, "failed to start watch process");
                return StartOutcome::Failed { warning };
            }
        };

        let pid = child.id();
        tracing::info!(
            session = %session_id,
            pid,
            cwd = %cwd.display(),
            log = %log_path.display(),
            "started watch process"
        );

        self.record(session_id, pid, cwd, log_path)
    }

    /// Persists the handle for a freshly spawned watcher.
    ///
    /// If another start created the handle first, the watcher is terminated
    /// and the existing handle is left untouched.
    pub(crate) fn record(
        &self,
        session_id: &str,
        pid: u32,
        cwd: &Path,
        log_path: PathBuf,
    ) -> StartOutcome {
        let handle = ProcessHandle {
            pid,
            session_id: Some(session_id.to_string()),
            cwd: Some(cwd.display().to_string()),
            log_path: Some(log_path),
            created: Some(Utc::now().timestamp()),
            proc_started: process::process_start_time(pid),
        };

        match self.store.create(session_id, &handle) {
            Ok(handle_path) => {
                tracing::debug!(session = %session_id, path = %handle_path.display(), "handle written");
                StartOutcome::Started { pid, handle_path }
            }
            Err(WatchError::HandleExists(handle_path)) => {
                // A concurrent start for the same session won; retire ours.
                tracing::warn!(session = %session_id, pid, "lost start race; stopping duplicate watcher");
                if let Err(err) = process::terminate_tree(pid, Signal::Terminate) {
                    tracing::warn!(pid, error = %err, "failed to stop duplicate watcher");
                }
                let pid = self.store.read(session_id).ok().flatten().map(|h| h.pid);
                StartOutcome::AlreadyRunning { handle_path, pid }
            }
            Err(err) => {
                tracing::error!(session = %session_id, pid, error = %err, "failed to record watch process");
                StartOutcome::StartedUntracked {
                    pid,
                    warning: format!("Started {WATCH_LABEL} (PID: {pid}) but could not record it: {err}"),
                }
            }
        }
    }

    /// Returns an outcome when an existing handle means start must not spawn.
    /// Stale handles are removed and `None` is returned so the start proceeds.
    fn check_existing(&self, session_id: &str) -> Option<StartOutcome> {
        let handle_path = self.store.handle_path(session_id);
        let stale_reason = match self.store.read(session_id) {
            Ok(None) => return None,
            Ok(Some(handle)) => match self.stale_reason(&handle) {
                Some(reason) => reason,
                None => {
                    tracing::info!(session = %session_id, pid = handle.pid, "watch process already running");
                    return Some(StartOutcome::AlreadyRunning {
                        handle_path,
                        pid: Some(handle.pid),
                    });
                }
            },
            Err(err @ WatchError::InvalidHandle { .. }) if self.config.reclaim_stale() => {
                err.to_string()
            }
            Err(err) => {
                tracing::warn!(session = %session_id, error = %err, "unreadable handle; assuming watcher is running");
                return Some(StartOutcome::AlreadyRunning {
                    handle_path,
                    pid: None,
                });
            }
        };

        tracing::info!(session = %session_id, reason = %stale_reason, "reclaiming stale handle");
        match self.store.remove(session_id) {
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(session = %session_id, error = %err, "failed to remove stale handle");
                Some(StartOutcome::AlreadyRunning {
                    handle_path,
                    pid: None,
                })
            }
        }
    }

    /// Why a parsed handle no longer describes a running watcher, if it doesn't.
    fn stale_reason(&self, handle: &ProcessHandle) -> Option<String> {
        if !self.config.reclaim_stale() {
            return None;
        }
        if process::pid_state(handle.pid) == PidState::Gone {
            return Some(format!("PID {} is no longer running", handle.pid));
        }
        match process::verify_identity(handle.pid, handle.proc_started) {
            PidIdentity::Recycled { actual_start } => Some(format!(
                "PID {} now belongs to a process started at {actual_start}",
                handle.pid
            )),
            PidIdentity::Matches | PidIdentity::Unverified => None,
        }
    }

    /// Stops the session's watcher (process group) and removes its handle and log.
    pub fn stop(&self, session_id: &str) -> StopReport {
        let mut report = StopReport {
            session_id: session_id.to_string(),
            handle_found: false,
            pid: None,
            termination: None,
            handle_removed: false,
            log_removed: false,
            warnings: Vec::new(),
        };

        match self.store.read(session_id) {
            Ok(None) => {
                tracing::info!(session = %session_id, "no PID file found for session");
            }
            Ok(Some(handle)) => {
                report.handle_found = true;
                report.pid = Some(handle.pid);
                tracing::info!(session = %session_id, pid = handle.pid, "stopping watch process");
                report.termination = Some(self.terminate(&handle, &mut report.warnings));
            }
            Err(err) => {
                report.handle_found = true;
                tracing::warn!(session = %session_id, error = %err, "cannot read handle; skipping termination");
            }
        }

        match self.store.remove(session_id) {
            Ok(removed) => {
                report.handle_removed = removed;
                if removed {
                    tracing::info!(
                        path = %self.store.handle_path(session_id).display(),
                        "removed PID file"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(session = %session_id, error = %err, "could not remove PID file");
                report.warnings.push(format!("Could not remove PID file: {err}"));
            }
        }

        match self.store.remove_log(session_id) {
            Ok(removed) => {
                report.log_removed = removed;
                if removed {
                    tracing::info!(
                        path = %self.store.log_path(session_id).display(),
                        "cleaned up log file"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(session = %session_id, error = %err, "could not remove log file");
                report.warnings.push(format!("Could not remove log file: {err}"));
            }
        }

        report
    }

    fn terminate(&self, handle: &ProcessHandle, warnings: &mut Vec<String>) -> Termination {
        let pid = handle.pid;

        if let PidIdentity::Recycled { actual_start } =
            process::verify_identity(pid, handle.proc_started)
        {
            tracing::warn!(
                pid,
                recorded_start = ?handle.proc_started,
                actual_start,
                "PID belongs to a different process; not signalling"
            );
            return Termination::PidRecycled;
        }

        match process::terminate_tree(pid, Signal::Terminate) {
            Ok(Delivery::AlreadyGone) => {
                tracing::info!(pid, "process not found (already terminated)");
                Termination::AlreadyGone
            }
            Ok(Delivery::Sent { group }) => {
                tracing::info!(pid, group, signal = Signal::Terminate.name(), "sent termination signal");
                self.escalate_if_needed(pid, group)
            }
            Err(err) => {
                tracing::warn!(pid, error = %err, "error killing process");
                warnings.push(format!("Error stopping {WATCH_LABEL} (PID: {pid}): {err}"));
                Termination::Failed
            }
        }
    }

    fn escalate_if_needed(&self, pid: u32, group: bool) -> Termination {
        let grace = self.config.grace();
        if grace.is_zero() || process::wait_for_exit(pid, grace) {
            return Termination::Signalled { group };
        }

        tracing::warn!(pid, grace_ms = grace.as_millis() as u64, "watch process ignored SIGTERM; escalating");
        match process::terminate_tree(pid, Signal::Kill) {
            Ok(Delivery::AlreadyGone) => Termination::Signalled { group },
            Ok(Delivery::Sent { .. }) => Termination::Escalated,
            Err(err) => {
                tracing::warn!(pid, error = %err, "forced kill failed");
                Termination::Signalled { group }
            }
        }
    }

    /// Every handle in the store with a liveness check. Read-only.
    pub fn status(&self) -> crate::Result<Vec<WatchStatus>> {
        let handles = self.store.list()?;
        Ok(handles
            .into_iter()
            .map(|stored| {
                let pid = stored.handle.as_ref().map(|h| h.pid);
                let alive = stored.handle.as_ref().is_some_and(|h| {
                    process::pid_state(h.pid) == PidState::Running
                        && !matches!(
                            process::verify_identity(h.pid, h.proc_started),
                            PidIdentity::Recycled { .. }
                        )
                });
                WatchStatus {
                    key: stored.key,
                    handle_path: stored.path,
                    session_id: stored.handle.as_ref().and_then(|h| h.session_id.clone()),
                    pid,
                    cwd: stored.handle.and_then(|h| h.cwd),
                    alive,
                }
            })
            .collect())
    }
}
