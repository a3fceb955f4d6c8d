//! Point-in-time view of the supervisor

use crate::crash::CrashRecord;
use crate::watchdog::WatchdogState;
use serde::Serialize;

/// Coarse lifecycle state, observable through a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    NotStarted,
    Starting,
    Ready,
    Restarting,
    Failed,
    Disposed,
}

impl Readiness {
    /// No further transition without an explicit `start` or a new instance
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Disposed)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorHealth {
    pub readiness: Readiness,
    pub generation: u64,
    pub pid: Option<u32>,
    pub restart_attempts: u32,
    pub max_restart_attempts: u32,
    pub watchdog_state: WatchdogState,
    pub missed_heartbeats: u32,
    pub health_check_paused: bool,
    pub sessions: usize,
    pub pending_requests: usize,
    pub shared_buffers: bool,
    /// Why output falls back to message passing, when it does
    pub shared_buffers_reason: Option<String>,
    /// Domain notifications forwarded to the application bus
    pub domain_events: u64,
    pub last_crash: Option<CrashRecord>,
    pub disposed: bool,
}

impl SupervisorHealth {
    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    /// One-line summary for consoles and logs
    pub fn summary(&self) -> String {
        let pid = self
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{:?} gen={} pid={} restarts={}/{} watchdog={:?} missed={} sessions={} pending={} shm={}",
            self.readiness,
            self.generation,
            pid,
            self.restart_attempts,
            self.max_restart_attempts,
            self.watchdog_state,
            self.missed_heartbeats,
            self.sessions,
            self.pending_requests,
            if self.shared_buffers { "on" } else { "off" },
        )
    }
}
