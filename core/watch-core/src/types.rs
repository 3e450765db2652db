//! Serialized types shared by the hook binary and the supervisor.
//!
//! Handle format is JSON. Handles written by the historical shell/python hooks
//! contain only the PID as plain text; those are still accepted on read.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Session id used when the host omits one.
pub const UNKNOWN_SESSION: &str = "unknown";

pub const SESSION_START_EVENT: &str = "SessionStart";
pub const SESSION_END_EVENT: &str = "SessionEnd";

/// Payload the host writes to the hook's stdin.
///
/// Unknown fields (`transcript_path`, `source`, `reason`, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
}

impl HookInput {
    pub fn session_id_or_unknown(&self) -> &str {
        self.session_id.as_deref().unwrap_or(UNKNOWN_SESSION)
    }

    /// Working directory for the watcher: the payload's `cwd`, else `fallback`.
    pub fn resolve_cwd(&self, fallback: &Path) -> PathBuf {
        match self.cwd.as_deref() {
            Some(cwd) if !cwd.is_empty() => PathBuf::from(cwd),
            _ => fallback.to_path_buf(),
        }
    }
}

/// Persisted record linking a session to its watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: u32,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Handle creation time (Unix seconds).
    #[serde(default)]
    pub created: Option<i64>,
    /// Watcher start time (Unix seconds) for PID-reuse detection.
    /// None for legacy handles.
    #[serde(default)]
    pub proc_started: Option<u64>,
}

impl ProcessHandle {
    /// A handle carrying nothing but a PID (the legacy plain-text format).
    pub fn bare(pid: u32) -> Self {
        Self {
            pid,
            session_id: None,
            cwd: None,
            log_path: None,
            created: None,
            proc_started: None,
        }
    }

    /// Parses handle file contents. Accepts JSON or a bare decimal PID.
    ///
    /// PID 0 and values outside the positive `pid_t` range are rejected:
    /// signalling them would hit the caller's own process group or every process.
    pub fn parse(content: &str) -> Option<Self> {
        let trimmed = content.trim();
        let handle = match trimmed.parse::<u32>() {
            Ok(pid) => Self::bare(pid),
            Err(_) => serde_json::from_str::<Self>(trimmed).ok()?,
        };
        if handle.pid == 0 || handle.pid > i32::MAX as u32 {
            return None;
        }
        Some(handle)
    }
}

/// Structured acknowledgment printed on stdout by the start handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub additional_context: String,
}

impl HookOutput {
    pub fn session_start(context: impl Into<String>) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                hook_event_name: SESSION_START_EVENT.to_string(),
                additional_context: context.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_plain_pid() {
        let handle = ProcessHandle::parse("4242\n").unwrap();
        assert_eq!(handle, ProcessHandle::bare(4242));
    }

    #[test]
    fn parses_json_handle() {
        let handle = ProcessHandle::parse(
            r#"{"pid":77,"session_id":"abc","cwd":"/tmp/proj","log_path":"/tmp/x.log","created":1,"proc_started":2}"#,
        )
        .unwrap();
        assert_eq!(handle.pid, 77);
        assert_eq!(handle.session_id.as_deref(), Some("abc"));
        assert_eq!(handle.log_path.as_deref(), Some(Path::new("/tmp/x.log")));
        assert_eq!(handle.proc_started, Some(2));
    }

    #[test]
    fn rejects_garbage_and_dangerous_pids() {
        assert_eq!(ProcessHandle::parse(""), None);
        assert_eq!(ProcessHandle::parse("not-a-pid"), None);
        assert_eq!(ProcessHandle::parse("-1"), None);
        assert_eq!(ProcessHandle::parse("0"), None);
        assert_eq!(ProcessHandle::parse("4294967295"), None);
        assert_eq!(ProcessHandle::parse(r#"{"pid":0}"#), None);
    }

    #[test]
    fn hook_input_defaults() {
        let input: HookInput = serde_json::from_str(r#"{"transcript_path":"/x"}"#).unwrap();
        assert_eq!(input.session_id_or_unknown(), "unknown");
        assert_eq!(input.resolve_cwd(Path::new("/fallback")), Path::new("/fallback"));

        let input: HookInput =
            serde_json::from_str(r#"{"session_id":"abc","cwd":"/tmp/proj"}"#).unwrap();
        assert_eq!(input.session_id_or_unknown(), "abc");
        assert_eq!(input.resolve_cwd(Path::new("/fallback")), Path::new("/tmp/proj"));
    }

    #[test]
    fn hook_output_uses_camel_case_wire_names() {
        let output = HookOutput::session_start("wb-grep watch started");
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "hookSpecificOutput": {
                    "hookEventName": "SessionStart",
                    "additionalContext": "wb-grep watch started"
                }
            })
        );
    }
}
