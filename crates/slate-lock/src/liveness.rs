//! Process liveness: is the recorded owner of a lock marker still running?
//!
//! Liveness is an injected trait because the check is inherently
//! platform-specific. The default implementation reads `/proc`; platforms
//! without it get a conservative predicate that never declares a lock
//! orphaned (manual `cleanup --force` remains available).

use crate::marker::LockMarker;

/// Predicate deciding whether a lock marker's owner is still alive.
///
/// Implementations must tolerate PID reuse: a PID that exists but belongs to
/// a process started at a different time is *not* the recorded owner.
pub trait Liveness: Send + Sync {
    /// Returns `true` if the process recorded in `marker` is still running.
    fn is_alive(&self, marker: &LockMarker) -> bool;
}

/// `/proc`-based liveness for Linux hosts.
///
/// A marker's owner is alive when `/proc/<pid>` exists and, if the marker
/// recorded a start-time nonce, the current start time of that PID matches.
/// A mismatching start time means the PID was recycled by an unrelated
/// process, so the original owner is dead.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcLiveness;

impl Liveness for ProcLiveness {
    #[cfg(target_os = "linux")]
    fn is_alive(&self, marker: &LockMarker) -> bool {
        match process_start_time(marker.pid) {
            Some(start) => marker.pid_start == 0 || start == marker.pid_start,
            None => false,
        }
    }

    // Without /proc there is no reliable same-host check; err on the side
    // of never reclaiming a potentially live lock.
    #[cfg(not(target_os = "linux"))]
    fn is_alive(&self, _marker: &LockMarker) -> bool {
        true
    }
}

/// Start time of the given PID in kernel clock ticks since boot.
///
/// Field 22 of `/proc/<pid>/stat`, counting from 1. The process name (field
/// 2) may contain spaces and parentheses, so parsing starts after the last
/// `)`. Returns `None` if the process does not exist or the field cannot be
/// read.
#[cfg(target_os = "linux")]
pub fn process_start_time(pid: u32) -> Option<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let after_comm = &stat[stat.rfind(')')? + 1..];
    // after_comm starts at field 3 (state); starttime is field 22.
    after_comm.split_whitespace().nth(19)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
pub fn process_start_time(_pid: u32) -> Option<u64> {
    None
}
