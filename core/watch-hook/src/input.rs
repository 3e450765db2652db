//! Hook payload decoding.
//!
//! Anything other than a non-empty JSON object means "nothing to do".

use std::io::{self, Read};
use watch_core::HookInput;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Input(HookInput),
    /// No bytes, whitespace, or `{}`.
    Empty,
    Malformed(String),
}

pub fn read_stdin() -> Payload {
    let mut raw = String::new();
    if let Err(err) = io::stdin().read_to_string(&mut raw) {
        return Payload::Malformed(format!("failed to read stdin: {err}"));
    }
    parse(&raw)
}

pub fn parse(raw: &str) -> Payload {
    if raw.trim().is_empty() {
        return Payload::Empty;
    }

    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => return Payload::Malformed(format!("failed to decode JSON: {err}")),
    };

    match value.as_object() {
        None => return Payload::Malformed(format!("expected a JSON object, got {value}")),
        Some(map) if map.is_empty() => return Payload::Empty,
        Some(_) => {}
    }

    match serde_json::from_value(value) {
        Ok(input) => Payload::Input(input),
        Err(err) => Payload::Malformed(format!("unexpected hook input shape: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs() {
        assert_eq!(parse(""), Payload::Empty);
        assert_eq!(parse(" \n\t"), Payload::Empty);
        assert_eq!(parse("{}"), Payload::Empty);
    }

    #[test]
    fn malformed_inputs() {
        for raw in ["not json", "[1,2]", "\"abc\"", "42", r#"{"session_id": 5}"#, "{"] {
            assert!(
                matches!(parse(raw), Payload::Malformed(_)),
                "expected malformed for {raw:?}"
            );
        }
    }

    #[test]
    fn valid_input_ignores_extra_fields() {
        let payload = parse(
            r#"{"session_id":"abc","cwd":"/tmp/proj","hook_event_name":"SessionStart","source":"startup"}"#,
        );
        let Payload::Input(input) = payload else {
            panic!("expected input, got {payload:?}");
        };
        assert_eq!(input.session_id.as_deref(), Some("abc"));
        assert_eq!(input.cwd.as_deref(), Some("/tmp/proj"));
        assert_eq!(input.hook_event_name.as_deref(), Some("SessionStart"));
    }

    #[test]
    fn object_without_session_id_is_still_input() {
        let Payload::Input(input) = parse(r#"{"cwd":"/x"}"#) else {
            panic!("expected input");
        };
        assert_eq!(input.session_id_or_unknown(), "unknown");
    }
}
