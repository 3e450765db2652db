//! Configuration and path management for the watch supervisor.
//!
//! All path decisions live in [`WatchConfig`]. Production code resolves it
//! from the environment with [`WatchConfig::from_env`]; tests inject a temp
//! directory with [`WatchConfig::with_store_dir`].
//!
//! ## Environment
//!
//! | Variable                 | Default                        |
//! |--------------------------|--------------------------------|
//! | `WB_GREP_WATCH_DIR`      | system temp dir                |
//! | `WB_GREP_WATCH_LOG`      | `<temp>/wb-grep-watch.log`     |
//! | `WB_GREP_WATCH_BIN`      | `wb-grep`                      |
//! | `WB_GREP_WATCH_ENABLED`  | `1`                            |
//! | `WB_GREP_WATCH_RECLAIM`  | `1`                            |
//! | `WB_GREP_WATCH_GRACE_MS` | `0` (no forced-kill escalation) |

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DIR_ENV: &str = "WB_GREP_WATCH_DIR";
pub const LOG_ENV: &str = "WB_GREP_WATCH_LOG";
pub const BIN_ENV: &str = "WB_GREP_WATCH_BIN";
pub const ENABLE_ENV: &str = "WB_GREP_WATCH_ENABLED";
pub const RECLAIM_ENV: &str = "WB_GREP_WATCH_RECLAIM";
pub const GRACE_ENV: &str = "WB_GREP_WATCH_GRACE_MS";

pub const DEFAULT_PROGRAM: &str = "wb-grep";
pub const WATCH_SUBCOMMAND: &str = "watch";
const DIAGNOSTIC_LOG_NAME: &str = "wb-grep-watch.log";

/// Everything a handler invocation needs to know about its environment.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directory holding handles and log artifacts (the Handle Store).
    store_dir: PathBuf,
    /// Process-wide diagnostic log.
    diagnostic_log: PathBuf,
    /// Watched program; launched as `<program> <args...>`.
    program: String,
    args: Vec<String>,
    /// When false, start is a no-op. Stop always runs.
    enabled: bool,
    /// Remove handles whose PID is provably dead instead of reporting "already running".
    reclaim_stale: bool,
    /// How long stop waits after SIGTERM before escalating to SIGKILL. Zero disables.
    grace: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::with_store_dir(env::temp_dir())
    }
}

impl WatchConfig {
    /// Resolves the configuration from `WB_GREP_WATCH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Resolves the configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let store_dir = non_empty(DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        let diagnostic_log = non_empty(LOG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_diagnostic_log);

        let mut config = Self::with_store_dir(store_dir);
        config.diagnostic_log = diagnostic_log;
        if let Some(program) = non_empty(BIN_ENV) {
            config.program = program;
        }
        config.enabled = non_empty(ENABLE_ENV).map_or(true, |v| flag_enabled(&v));
        config.reclaim_stale = non_empty(RECLAIM_ENV).map_or(true, |v| flag_enabled(&v));
        config.grace = non_empty(GRACE_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);
        config
    }

    /// Creates a config rooted at `store_dir` with every other setting at its default.
    /// Used for testing with temp directories.
    pub fn with_store_dir(store_dir: PathBuf) -> Self {
        Self {
            store_dir,
            diagnostic_log: default_diagnostic_log(),
            program: DEFAULT_PROGRAM.to_string(),
            args: vec![WATCH_SUBCOMMAND.to_string()],
            enabled: true,
            reclaim_stale: true,
            grace: Duration::ZERO,
        }
    }

    /// Replaces the watched command line (program and arguments).
    pub fn with_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_reclaim_stale(mut self, reclaim: bool) -> Self {
        self.reclaim_stale = reclaim;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_diagnostic_log(mut self, path: PathBuf) -> Self {
        self.diagnostic_log = path;
        self
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn diagnostic_log(&self) -> &Path {
        &self.diagnostic_log
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn reclaim_stale(&self) -> bool {
        self.reclaim_stale
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }
}

/// Default diagnostic log location: `<temp>/wb-grep-watch.log`.
pub fn default_diagnostic_log() -> PathBuf {
    env::temp_dir().join(DIAGNOSTIC_LOG_NAME)
}

/// Only an explicit "off" value disables a flag; anything else keeps it on.
fn flag_enabled(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> WatchConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WatchConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]);
        assert_eq!(config.store_dir(), env::temp_dir());
        assert_eq!(config.diagnostic_log(), default_diagnostic_log());
        assert_eq!(config.program(), "wb-grep");
        assert_eq!(config.args(), ["watch".to_string()]);
        assert!(config.enabled());
        assert!(config.reclaim_stale());
        assert_eq!(config.grace(), Duration::ZERO);
    }

    #[test]
    fn env_overrides_paths_and_program() {
        let config = config_from(&[
            (DIR_ENV, "/var/tmp/watch"),
            (LOG_ENV, "/var/log/wb.log"),
            (BIN_ENV, "/opt/bin/wb-grep"),
        ]);
        assert_eq!(config.store_dir(), Path::new("/var/tmp/watch"));
        assert_eq!(config.diagnostic_log(), Path::new("/var/log/wb.log"));
        assert_eq!(config.program(), "/opt/bin/wb-grep");
        assert_eq!(config.args(), ["watch".to_string()]);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[(DIR_ENV, "  "), (BIN_ENV, "")]);
        assert_eq!(config.store_dir(), env::temp_dir());
        assert_eq!(config.program(), DEFAULT_PROGRAM);
    }

    #[test]
    fn flags_only_disable_on_explicit_off() {
        assert!(!config_from(&[(ENABLE_ENV, "0")]).enabled());
        assert!(!config_from(&[(ENABLE_ENV, "false")]).enabled());
        assert!(!config_from(&[(RECLAIM_ENV, "OFF")]).reclaim_stale());
        assert!(config_from(&[(ENABLE_ENV, "1")]).enabled());
        assert!(config_from(&[(ENABLE_ENV, "maybe")]).enabled());
    }

    #[test]
    fn grace_parses_milliseconds_and_ignores_garbage() {
        assert_eq!(
            config_from(&[(GRACE_ENV, "1500")]).grace(),
            Duration::from_millis(1500)
        );
        assert_eq!(config_from(&[(GRACE_ENV, "soon")]).grace(), Duration::ZERO);
    }
}
