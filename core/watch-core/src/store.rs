//! Handle Store: one file per session in a shared directory.
//!
//! There is no index. The path of a session's handle is a pure function of
//! the store directory and the session id, so the start and end hooks (separate
//! processes with no shared memory) agree on it without coordination.
//!
//! ```text
//! <store_dir>/
//! ├── wb-grep-watch-pid-<key>.txt   # handle (JSON, or a bare PID from older hooks)
//! └── wb-grep-watch-<key>.log       # watcher stdout+stderr
//! ```
//!
//! `<key>` is the session id itself when it is a short `[A-Za-z0-9_-]` token,
//! otherwise `h` + the MD5 hex of the id. Session ids come from the host and
//! are never interpolated into a path unchecked.
//!
//! Handles are created with temp file + no-clobber link, so a racing second
//! start sees `HandleExists` instead of overwriting, and a reader never
//! observes a half-written file. Removal is idempotent.

use fs_err as fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Result, WatchError};
use crate::types::ProcessHandle;

const HANDLE_PREFIX: &str = "wb-grep-watch-pid-";
const HANDLE_SUFFIX: &str = ".txt";
const LOG_PREFIX: &str = "wb-grep-watch-";
const LOG_SUFFIX: &str = ".log";
const MAX_VERBATIM_KEY_LEN: usize = 64;

/// Maps an untrusted session id to a filename-safe key.
pub fn session_key(session_id: &str) -> String {
    let verbatim = !session_id.is_empty()
        && session_id.len() <= MAX_VERBATIM_KEY_LEN
        && session_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if verbatim {
        session_id.to_string()
    } else {
        format!("h{:x}", md5::compute(session_id))
    }
}

/// A handle file found by [`HandleStore::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHandle {
    pub key: String,
    pub path: PathBuf,
    /// None when the file could not be read or parsed.
    pub handle: Option<ProcessHandle>,
}

#[derive(Debug, Clone)]
pub struct HandleStore {
    dir: PathBuf,
}

impl HandleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn handle_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!(
            "{HANDLE_PREFIX}{}{HANDLE_SUFFIX}",
            session_key(session_id)
        ))
    }

    /// Path of the log artifact capturing the watcher's combined output.
    pub fn log_path(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{LOG_PREFIX}{}{LOG_SUFFIX}", session_key(session_id)))
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.handle_path(session_id).exists()
    }

    /// Reads the session's handle.
    ///
    /// `Ok(None)` when no handle exists; `Err(InvalidHandle)` when one exists
    /// but does not hold a usable PID.
    pub fn read(&self, session_id: &str) -> Result<Option<ProcessHandle>> {
        let path = self.handle_path(session_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(WatchError::io("reading handle", err)),
        };

        match ProcessHandle::parse(&content) {
            Some(handle) => Ok(Some(handle)),
            None => Err(WatchError::InvalidHandle {
                path,
                content: content.trim().to_string(),
            }),
        }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| WatchError::io("creating store dir", e))
    }

    /// Creates the session's handle if, and only if, none exists yet.
    pub fn create(&self, session_id: &str, handle: &ProcessHandle) -> Result<PathBuf> {
        self.ensure_dir()?;

        let path = self.handle_path(session_id);
        let content = serde_json::to_string(handle).map_err(|e| {
            WatchError::io("serializing handle", io::Error::other(e))
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| {
            WatchError::io(format!("creating temp file in {}", self.dir.display()), e)
        })?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| WatchError::io(format!("writing temp file for {}", path.display()), e))?;
        tmp.flush()
            .map_err(|e| WatchError::io(format!("flushing temp file for {}", path.display()), e))?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(path),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                Err(WatchError::HandleExists(path))
            }
            Err(err) => Err(WatchError::io(
                format!("persisting handle to {}", path.display()),
                err.error,
            )),
        }
    }

    /// Removes the session's handle. Returns whether a file was removed.
    pub fn remove(&self, session_id: &str) -> Result<bool> {
        remove_if_present(&self.handle_path(session_id), "removing handle")
    }

    /// Removes the session's log artifact. Returns whether a file was removed.
    pub fn remove_log(&self, session_id: &str) -> Result<bool> {
        remove_if_present(&self.log_path(session_id), "removing log artifact")
    }

    /// Every handle file in the store, sorted by key.
    pub fn list(&self) -> Result<Vec<StoredHandle>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(WatchError::io("listing store dir", err)),
        };

        let mut handles = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(key) = name
                .to_str()
                .and_then(|n| n.strip_prefix(HANDLE_PREFIX))
                .and_then(|n| n.strip_suffix(HANDLE_SUFFIX))
            else {
                continue;
            };
            let path = entry.path();
            let handle = fs::read_to_string(&path)
                .ok()
                .and_then(|content| ProcessHandle::parse(&content));
            handles.push(StoredHandle {
                key: key.to_string(),
                path,
                handle,
            });
        }
        handles.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(handles)
    }
}

fn remove_if_present(path: &Path, context: &str) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(WatchError::io(context, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn handle(pid: u32) -> ProcessHandle {
        ProcessHandle {
            session_id: Some("abc".to_string()),
            ..ProcessHandle::bare(pid)
        }
    }

    #[test]
    fn simple_ids_are_used_verbatim() {
        let store = HandleStore::new("/tmp");
        assert_eq!(
            store.handle_path("abc"),
            PathBuf::from("/tmp/wb-grep-watch-pid-abc.txt")
        );
        assert_eq!(
            store.log_path("abc"),
            PathBuf::from("/tmp/wb-grep-watch-abc.log")
        );
        assert_eq!(
            session_key("0f8c2a6e-1b7d-4c39-9e2f-5a4b3c2d1e0f"),
            "0f8c2a6e-1b7d-4c39-9e2f-5a4b3c2d1e0f"
        );
    }

    #[test]
    fn unsafe_ids_are_hashed_inside_store_dir() {
        let store = HandleStore::new("/tmp/store");
        let long = "x".repeat(65);
        for id in ["../../etc/passwd", "a/b", "", "with space", long.as_str()] {
            let path = store.handle_path(id);
            assert_eq!(path.parent(), Some(Path::new("/tmp/store")), "id {id:?}");
            let key = session_key(id);
            assert!(key.starts_with('h') && key.len() == 33, "key {key}");
        }
        assert_ne!(session_key("a/b"), session_key("a\\b"));
    }

    #[test]
    fn read_missing_handle_is_none() {
        let temp = tempdir().unwrap();
        let store = HandleStore::new(temp.path());
        assert_eq!(store.read("nope").unwrap(), None);
        assert!(!store.exists("nope"));
    }

    #[test]
    fn create_then_read_round_trips() {
        let temp = tempdir().unwrap();
        let store = HandleStore::new(temp.path());

        let path = store.create("abc", &handle(1234)).unwrap();
        assert_eq!(path, store.handle_path("abc"));
        assert!(store.exists("abc"));
        assert_eq!(store.read("abc").unwrap(), Some(handle(1234)));
    }

    #[test]
    fn create_refuses_to_clobber() {
        let temp = tempdir().unwrap();
        let store = HandleStore::new(temp.path());

        store.create("abc", &handle(1)).unwrap();
        let err = store.create("abc", &handle(2)).unwrap_err();
        assert!(matches!(err, WatchError::HandleExists(_)));
        assert_eq!(store.read("abc").unwrap().map(|h| h.pid), Some(1));
        // No temp files left behind.
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn create_makes_missing_store_dir() {
        let temp = tempdir().unwrap();
        let store = HandleStore::new(temp.path().join("nested/dir"));
        store.create("abc", &handle(9)).unwrap();
        assert!(store.exists("abc"));
    }

    #[test]
    fn read_legacy_and_invalid_handles() {
        let temp = tempdir().unwrap();
        let store = HandleStore::new(temp.path());

        std::fs::write(store.handle_path("legacy"), "31337").unwrap();
        assert_eq!(
            store.read("legacy").unwrap(),
            Some(ProcessHandle::bare(31337))
        );

        std::fs::write(store.handle_path("broken"), "pid?").unwrap();
        assert!(matches!(
            store.read("broken"),
            Err(WatchError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = HandleStore::new(temp.path());

        store.create("abc", &handle(5)).unwrap();
        std::fs::write(store.log_path("abc"), "output").unwrap();

        assert!(store.remove("abc").unwrap());
        assert!(!store.remove("abc").unwrap());
        assert!(store.remove_log("abc").unwrap());
        assert!(!store.remove_log("abc").unwrap());
        assert!(!store.exists("abc"));
    }

    #[test]
    fn list_returns_only_handles() {
        let temp = tempdir().unwrap();
        let store = HandleStore::new(temp.path());

        store.create("b", &handle(2)).unwrap();
        store.create("a", &handle(1)).unwrap();
        std::fs::write(store.log_path("a"), "").unwrap();
        std::fs::write(store.handle_path("c"), "garbage").unwrap();
        std::fs::write(temp.path().join("unrelated.txt"), "").unwrap();

        let listed = store.list().unwrap();
        let keys: Vec<_> = listed.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(listed[0].handle.as_ref().map(|h| h.pid), Some(1));
        assert_eq!(listed[2].handle, None);
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let temp = tempdir().unwrap();
        let store = HandleStore::new(temp.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }
}
