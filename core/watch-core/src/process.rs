//! Process primitives: detached spawn, process-group termination, liveness.
//!
//! The watcher is launched as the leader of a new session (`setsid`), so its
//! process group id equals its PID. It survives the hook process exiting, and
//! [`terminate_tree`] can signal the watcher and every child it forked at once.
//! Platforms without process groups fall back to signalling the PID alone.

use fs_err as fs;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, WatchError};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Allowed drift between a recorded and an observed process start time.
const START_TIME_TOLERANCE_SECS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Graceful shutdown request (SIGTERM).
    Terminate,
    /// Forced kill (SIGKILL).
    Kill,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Signal::Terminate => "SIGTERM",
            Signal::Kill => "SIGKILL",
        }
    }

    #[cfg(unix)]
    fn raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

/// Result of a successful signal delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Signal sent. `group` is false when only the single PID was signalled.
    Sent { group: bool },
    /// The target no longer exists.
    AlreadyGone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidState {
    Running,
    Gone,
    /// Could not tell (no permission, unsupported platform).
    Unknown,
}

/// Whether a live PID still belongs to the process recorded at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidIdentity {
    Matches,
    Recycled { actual_start: u64 },
    /// No recorded start time, or the process could not be inspected.
    Unverified,
}

/// Launches `program args...` in `cwd` as a detached process-group leader,
/// sending stdout and stderr to a freshly truncated `log_path`.
///
/// The returned [`Child`] is never waited on by the hook; dropping it leaves
/// the watcher running.
pub fn spawn_detached(program: &str, args: &[String], cwd: &Path, log_path: &Path) -> Result<Child> {
    if !cwd.is_dir() {
        return Err(WatchError::InvalidCwd(cwd.to_path_buf()));
    }

    let (stdout, _) = fs::File::create(log_path)
        .map_err(|e| WatchError::io("creating log artifact", e))?
        .into_parts();
    let stderr = stdout
        .try_clone()
        .map_err(|e| WatchError::io("duplicating log artifact handle", e))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    detach(&mut command);

    command.spawn().map_err(|source| {
        let _ = fs::remove_file(log_path);
        WatchError::Spawn {
            program: program.to_string(),
            source,
        }
    })
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid() is async-signal-safe and touches no state of the parent;
    // it runs in the forked child before exec.
    #[allow(unsafe_code)]
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn detach(_command: &mut Command) {}

/// Sends `signal` to the process group of `pid`, or to `pid` alone when the
/// group cannot be resolved or is the caller's own group.
///
/// "No such process" is reported as [`Delivery::AlreadyGone`], not an error.
#[cfg(unix)]
pub fn terminate_tree(pid: u32, signal: Signal) -> Result<Delivery> {
    let target = pid as libc::pid_t;

    // SAFETY: getpgid/getpgrp only query kernel state for the given PID.
    #[allow(unsafe_code)]
    let (pgid, own_pgid) = unsafe { (libc::getpgid(target), libc::getpgrp()) };

    if pgid == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(Delivery::AlreadyGone);
        }
        tracing::debug!(pid, error = %err, "getpgid failed; signalling PID alone");
    }

    let group = pgid > 0 && pgid != own_pgid;

    // SAFETY: kill/killpg with a positive id and a valid signal number.
    #[allow(unsafe_code)]
    let rc = unsafe {
        if group {
            libc::killpg(pgid, signal.raw())
        } else {
            libc::kill(target, signal.raw())
        }
    };

    if rc == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(Delivery::AlreadyGone);
        }
        return Err(WatchError::Signal { pid, source: err });
    }
    Ok(Delivery::Sent { group })
}

#[cfg(not(unix))]
pub fn terminate_tree(pid: u32, signal: Signal) -> Result<Delivery> {
    let mut command = Command::new("taskkill");
    command.args(["/PID", &pid.to_string(), "/T"]);
    if signal == Signal::Kill {
        command.arg("/F");
    }
    let output = command
        .output()
        .map_err(|source| WatchError::Signal { pid, source })?;
    if output.status.success() {
        Ok(Delivery::Sent { group: true })
    } else if pid_state(pid) == PidState::Gone {
        Ok(Delivery::AlreadyGone)
    } else {
        Err(WatchError::Signal {
            pid,
            source: io::Error::other(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        })
    }
}

pub fn pid_state(pid: u32) -> PidState {
    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs the permission and existence checks only.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
        if rc == 0 {
            return if is_zombie(pid) {
                PidState::Gone
            } else {
                PidState::Running
            };
        }
        match io::Error::last_os_error().raw_os_error() {
            Some(libc::ESRCH) => PidState::Gone,
            Some(libc::EPERM) => PidState::Running,
            _ => PidState::Unknown,
        }
    }
    #[cfg(not(unix))]
    {
        match process_start_time(pid) {
            Some(_) => PidState::Running,
            None => PidState::Unknown,
        }
    }
}

/// An exited-but-unreaped process still answers signal 0.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let (_, rest) = stat.rsplit_once(')')?;
            rest.trim_start().chars().next()
        })
        .is_some_and(|state| state == 'Z')
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

/// Polls until `pid` disappears or `timeout` elapses. Returns true if it exited.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pid_state(pid) == PidState::Gone {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

/// Start time of a process (Unix seconds), if it exists and can be queried.
pub fn process_start_time(pid: u32) -> Option<u64> {
    use sysinfo::{Pid, ProcessRefreshKind, System};

    let mut sys = System::new();
    let sys_pid = Pid::from(pid as usize);
    sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new());
    sys.process(sys_pid).map(|process| process.start_time())
}

/// Compares the live process behind `pid` with the start time recorded at spawn.
pub fn verify_identity(pid: u32, recorded_start: Option<u64>) -> PidIdentity {
    let Some(expected) = recorded_start else {
        return PidIdentity::Unverified;
    };
    match process_start_time(pid) {
        Some(actual) if actual.abs_diff(expected) <= START_TIME_TOLERANCE_SECS => {
            PidIdentity::Matches
        }
        Some(actual) => PidIdentity::Recycled {
            actual_start: actual,
        },
        None => PidIdentity::Unverified,
    }
}

/// Reaps `pid` (a child of the test process) and waits for it to vanish.
#[cfg(all(test, unix))]
pub(crate) fn reap_and_wait(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let mut status = 0;
        // SAFETY: non-blocking wait on our own child.
        let _ = unsafe { libc::waitpid(pid as libc::pid_t, &mut status, libc::WNOHANG) };
        if pid_state(pid) == PidState::Gone {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}
