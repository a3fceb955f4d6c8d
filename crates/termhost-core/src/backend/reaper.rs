//! Best-effort cleanup of processes left behind by a dead backend

use tracing::{debug, warn};

/// Terminates a single OS process
#[cfg_attr(test, mockall::automock)]
pub trait ProcessReaper: Send + Sync {
    /// Returns true if a signal was delivered
    fn reap(&self, pid: u32) -> bool;
}

/// Sends SIGKILL through the OS
#[derive(Debug, Default, Clone, Copy)]
pub struct OsReaper;

impl ProcessReaper for OsReaper {
    #[cfg(unix)]
    fn reap(&self, pid: u32) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => true,
            // Already gone
            Err(nix::errno::Errno::ESRCH) => false,
            Err(e) => {
                warn!(pid, error = %e, "failed to kill orphaned process");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn reap(&self, _pid: u32) -> bool {
        false
    }
}

/// Kill every pid in `pids`, skipping our own process and pids that cannot
/// name a real child. Returns how many were signalled.
pub fn reap_orphans(reaper: &dyn ProcessReaper, pids: &[u32]) -> usize {
    let own = std::process::id();
    let mut reaped = 0;
    for &pid in pids {
        if pid <= 1 || pid == own {
            debug!(pid, "skipping unresolvable pid");
            continue;
        }
        if reaper.reap(pid) {
            reaped += 1;
        }
    }
    if reaped > 0 {
        debug!(reaped, "reaped orphaned terminal processes");
    }
    reaped
}
