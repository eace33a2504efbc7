//! # RAII Stop Guard
//!
//! Halts a process with `SIGSTOP` and resumes it with `SIGCONT` when dropped,
//! so a capture reads a frame region nothing is mutating.
//!
//! ```rust,no_run
//! use rbscope_core::platform::linux::guard::StopGuard;
//! use rbscope_core::types::ProcessId;
//!
//! let _guard = StopGuard::stop(ProcessId::from(12345))?;
//! // target stays stopped until `_guard` goes out of scope
//! # Ok::<(), rbscope_core::error::RbscopeError>(())
//! ```

use std::fs;
use std::io;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{RbscopeError, Result};
use crate::types::ProcessId;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const POLL_ATTEMPTS: u32 = 1000;

/// Keeps the target stopped while alive.
#[derive(Debug)]
pub struct StopGuard
{
    pid: ProcessId,
    active: bool,
}

impl StopGuard
{
    /// Send `SIGSTOP` and wait until the kernel reports the process stopped.
    ///
    /// ## Errors
    ///
    /// - `ProcessNotFound`: no such process
    /// - `PermissionDenied`: not allowed to signal it
    pub fn stop(pid: ProcessId) -> Result<Self>
    {
        send_signal(pid, libc::SIGSTOP)?;
        let guard = Self { pid, active: true };

        for _ in 0..POLL_ATTEMPTS {
            if process_state(pid)? == Some('T') {
                debug!(%pid, "target stopped");
                return Ok(guard);
            }
            thread::sleep(POLL_INTERVAL);
        }
        warn!(%pid, "target did not report stopped state; continuing anyway");
        Ok(guard)
    }

    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    /// Resume now instead of on drop.
    pub fn resume(mut self) -> Result<()>
    {
        self.active = false;
        send_signal(self.pid, libc::SIGCONT)
    }
}

impl Drop for StopGuard
{
    fn drop(&mut self)
    {
        if self.active {
            if let Err(err) = send_signal(self.pid, libc::SIGCONT) {
                warn!(pid = %self.pid, %err, "failed to resume target");
            }
        }
    }
}

fn send_signal(pid: ProcessId, signal: libc::c_int) -> Result<()>
{
    let raw = libc::pid_t::try_from(pid.0)
        .map_err(|_| RbscopeError::InvalidArgument(format!("pid {pid} out of range")))?;
    // SAFETY: kill has no memory-safety preconditions.
    let rc = unsafe { libc::kill(raw, signal) };
    if rc == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    Err(match err.raw_os_error() {
        Some(libc::ESRCH) => RbscopeError::ProcessNotFound(pid.0),
        Some(libc::EPERM) => RbscopeError::PermissionDenied(format!("cannot signal process {pid}")),
        _ => RbscopeError::Io(err),
    })
}

/// State letter from `/proc/<pid>/stat` (`R`, `S`, `T`, ...).
fn process_state(pid: ProcessId) -> Result<Option<char>>
{
    let stat = match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(RbscopeError::ProcessNotFound(pid.0)),
        Err(err) => return Err(err.into()),
    };
    Ok(parse_state(&stat))
}

/// The command name may contain spaces and parentheses, so the state is
/// taken after the last `)`.
fn parse_state(stat: &str) -> Option<char>
{
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}
