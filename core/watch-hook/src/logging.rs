//! Diagnostic log for the hook.
//!
//! All `tracing` output (including watch-core's) is appended to one file,
//! `$WB_GREP_WATCH_LOG` or `<temp>/wb-grep-watch.log`, one line per event:
//!
//! ```text
//! [2026-01-31 09:12:44]  INFO watch_core::supervisor: started watch process session=abc pid=4242 ...
//! ```
//!
//! The log is never rotated or truncated here. If it cannot be opened, events
//! go to a sink; logging must never be the reason a hook fails.

use chrono::Local;
use fs_err as fs;
use std::env;
use std::fmt;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "WB_GREP_WATCH_DEBUG";

struct LocalTimestamp;

impl FormatTime for LocalTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "[{}]", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(log_path: &Path) -> WorkerGuard {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (writer, guard) = match open_append(log_path) {
        Some(file) => tracing_appender::non_blocking(file),
        None => tracing_appender::non_blocking(io::sink()),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_timer(LocalTimestamp)
        .try_init();

    guard
}

fn open_append(path: &Path) -> Option<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = fs::create_dir_all(parent);
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .ok()
        .map(|file| file.into_parts().0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_append_creates_parents_and_appends() {
        use std::io::Write;

        let temp = tempdir().unwrap();
        let path = temp.path().join("nested/logs/diag.log");

        let mut first = open_append(&path).unwrap();
        writeln!(first, "one").unwrap();
        drop(first);
        let mut second = open_append(&path).unwrap();
        writeln!(second, "two").unwrap();
        drop(second);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn open_append_fails_quietly() {
        let temp = tempdir().unwrap();
        // A directory cannot be opened for appending.
        assert!(open_append(temp.path()).is_none());
    }
}
