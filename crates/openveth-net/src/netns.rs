//! Scoped entry into container network namespaces.
//!
//! Namespace membership belongs to an OS thread, not to a logical
//! task. [`with_namespace`] therefore confines the whole
//! switch/action/restore sequence to a dedicated scoped thread: the
//! action can never migrate off it, and a thread whose restore failed
//! is quarantined instead of being returned to a pool.

use std::fs::File;
use std::os::fd::AsFd;

use nix::sched::{setns, CloneFlags};

use crate::error::{NetError, Result};

/// Namespace of the current thread. `/proc/thread-self` resolves
/// per-thread, which matters here since membership is thread-local.
const THREAD_NS_PATH: &str = "/proc/thread-self/ns/net";

/// Opens a handle to the network namespace of `pid`.
///
/// The handle keeps the namespace alive and is usable both for
/// `setns(2)` and for moving interfaces by file descriptor.
///
/// # Errors
///
/// Returns an error if `/proc/<pid>/ns/net` cannot be opened (process
/// gone, or insufficient privileges).
pub fn netns_file(pid: u32) -> Result<File> {
    let path = format!("/proc/{pid}/ns/net");
    File::open(&path)
        .map_err(|e| NetError::Namespace(format!("failed to open {path}: {e}")))
}

/// Runs `action` inside the network namespace of `pid`.
///
/// On every exit path the executing thread is back in its original
/// namespace before this function returns, or the error is
/// [`NetError::Critical`] and the caller should treat the process as
/// compromised. If acquiring either namespace handle or switching in
/// fails, `action` is never run.
///
/// # Errors
///
/// Propagates handle/switch failures, the action's own error, or
/// `Critical` when the restore step fails (wrapping the action error
/// if both failed).
pub fn with_namespace<T, F>(pid: u32, action: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send,
    T: Send,
{
    std::thread::scope(|scope| {
        scope
            .spawn(|| enter_run_restore(pid, action))
            .join()
            .map_err(|_| NetError::Namespace("namespace worker thread panicked".to_string()))?
    })
}

fn enter_run_restore<T, F>(pid: u32, action: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    // Original first: without a way back there is no point switching.
    let original = File::open(THREAD_NS_PATH)
        .map_err(|e| NetError::Namespace(format!("failed to open {THREAD_NS_PATH}: {e}")))?;
    let target = netns_file(pid)?;

    setns(target.as_fd(), CloneFlags::CLONE_NEWNET).map_err(|e| {
        NetError::Namespace(format!("failed to enter namespace of pid {pid}: {e}"))
    })?;

    let outcome = action();

    if let Err(restore) = setns(original.as_fd(), CloneFlags::CLONE_NEWNET) {
        return Err(NetError::Critical {
            restore: restore.to_string(),
            action: outcome.err().map(|e| e.to_string()),
        });
    }

    outcome
}
