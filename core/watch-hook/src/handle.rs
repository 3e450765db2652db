//! Hook entry points: decode stdin, run the handler, report to the host.
//!
//! stdout carries only the SessionStart acknowledgment JSON. Non-fatal
//! problems go to stderr as `Warning: ...` lines. Nothing here can change
//! the exit status.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;

use watch_core::types::{SESSION_END_EVENT, SESSION_START_EVENT};
use watch_core::{HookInput, Supervisor};

use crate::input::{self, Payload};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Pick the handler from `hook_event_name`.
    Dispatch,
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Start,
    Stop,
}

pub fn run(supervisor: &Supervisor, mode: Mode) {
    let payload = input::read_stdin();
    let stdout = io::stdout();
    let stderr = io::stderr();
    handle_payload(supervisor, mode, payload, &mut stdout.lock(), &mut stderr.lock());
}

fn handle_payload(
    supervisor: &Supervisor,
    mode: Mode,
    payload: Payload,
    out: &mut impl Write,
    err: &mut impl Write,
) {
    let input = match payload {
        Payload::Input(input) => input,
        Payload::Empty => {
            tracing::info!("no hook input received");
            return;
        }
        Payload::Malformed(reason) => {
            tracing::warn!(reason = %reason, "ignoring malformed hook input");
            return;
        }
    };

    let Some(action) = action_for(mode, &input) else {
        tracing::debug!(event = ?input.hook_event_name, "ignoring event");
        return;
    };

    match action {
        Action::Start => handle_start(supervisor, &input, out, err),
        Action::Stop => handle_stop(supervisor, &input, err),
    }
}

fn action_for(mode: Mode, input: &HookInput) -> Option<Action> {
    match mode {
        Mode::Start => Some(Action::Start),
        Mode::Stop => Some(Action::Stop),
        Mode::Dispatch => match input.hook_event_name.as_deref() {
            Some(SESSION_START_EVENT) => Some(Action::Start),
            Some(SESSION_END_EVENT) => Some(Action::Stop),
            _ => None,
        },
    }
}

fn handle_start(
    supervisor: &Supervisor,
    input: &HookInput,
    out: &mut impl Write,
    err: &mut impl Write,
) {
    let session_id = input.session_id_or_unknown();
    let fallback = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let cwd = input.resolve_cwd(&fallback);

    let outcome = supervisor.start(session_id, &cwd);

    if let Some(ack) = outcome.acknowledgment() {
        match serde_json::to_string(&ack) {
            Ok(json) => {
                let _ = writeln!(out, "{json}");
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize acknowledgment"),
        }
    }
    if let Some(warning) = outcome.warning() {
        let _ = writeln!(err, "Warning: {warning}");
    }
}

fn handle_stop(supervisor: &Supervisor, input: &HookInput, err: &mut impl Write) {
    let report = supervisor.stop(input.session_id_or_unknown());
    tracing::debug!(
        session = %report.session_id,
        pid = ?report.pid,
        termination = ?report.termination,
        handle_removed = report.handle_removed,
        log_removed = report.log_removed,
        "stop finished"
    );
    for warning in &report.warnings {
        let _ = writeln!(err, "Warning: {warning}");
    }
}
