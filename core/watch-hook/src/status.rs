//! `watch-hook status`: one JSON line per recorded watcher.

use std::io::{self, Write};
use watch_core::Supervisor;

pub fn run(supervisor: &Supervisor) {
    let statuses = match supervisor.status() {
        Ok(statuses) => statuses,
        Err(err) => {
            tracing::warn!(error = %err, "failed to list handles");
            eprintln!("Warning: failed to list watchers: {err}");
            return;
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for status in statuses {
        if let Ok(line) = serde_json::to_string(&status) {
            let _ = writeln!(out, "{line}");
        }
    }
}
