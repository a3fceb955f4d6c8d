//! Centralized timing defaults
//!
//! Every value here can be overridden through [`SupervisorConfig`](super::SupervisorConfig).

use std::time::Duration;

/// Restart back-off defaults
pub mod restart {
    use super::*;

    /// Maximum consecutive restart attempts before giving up
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay (1 second)
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Delay cap (10 seconds)
    pub const MAX_DELAY_MS: u64 = 10_000;

    /// Exponential multiplier
    pub const MULTIPLIER: f64 = 2.0;

    pub fn base_delay() -> Duration {
        Duration::from_millis(BASE_DELAY_MS)
    }

    pub fn max_delay() -> Duration {
        Duration::from_millis(MAX_DELAY_MS)
    }
}

/// Heartbeat watchdog defaults
pub mod watchdog {
    use super::*;

    /// Heartbeat interval (30 seconds)
    pub const INTERVAL_SECS: u64 = 30;

    /// Consecutive unanswered heartbeats tolerated before a forced kill
    pub const MAX_MISSED: u32 = 3;

    /// How long a resume handshake waits for a pong (5 seconds)
    pub const HANDSHAKE_TIMEOUT_SECS: u64 = 5;

    pub fn interval() -> Duration {
        Duration::from_secs(INTERVAL_SECS)
    }

    pub fn handshake_timeout() -> Duration {
        Duration::from_secs(HANDSHAKE_TIMEOUT_SECS)
    }
}

/// Broker-backed query defaults
pub mod requests {
    use super::*;

    pub const LIST_MS: u64 = 5_000;
    pub const INFO_MS: u64 = 2_000;
    pub const SERIALIZED_STATE_MS: u64 = 5_000;
    pub const REPLAY_MS: u64 = 5_000;
    pub const BULK_MS: u64 = 10_000;
    pub const STATS_MS: u64 = 5_000;

    pub fn list() -> Duration {
        Duration::from_millis(LIST_MS)
    }

    pub fn info() -> Duration {
        Duration::from_millis(INFO_MS)
    }

    pub fn serialized_state() -> Duration {
        Duration::from_millis(SERIALIZED_STATE_MS)
    }

    pub fn replay() -> Duration {
        Duration::from_millis(REPLAY_MS)
    }

    pub fn bulk() -> Duration {
        Duration::from_millis(BULK_MS)
    }

    pub fn stats() -> Duration {
        Duration::from_millis(STATS_MS)
    }
}

/// Shutdown defaults
pub mod shutdown {
    use super::*;

    /// Time the backend gets to exit after `dispose` before it is force-killed
    pub const GRACE_PERIOD_MS: u64 = 2_000;

    pub fn grace_period() -> Duration {
        Duration::from_millis(GRACE_PERIOD_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_defaults() {
        assert_eq!(restart::base_delay(), Duration::from_secs(1));
        assert_eq!(restart::max_delay(), Duration::from_secs(10));
        assert_eq!(restart::MAX_ATTEMPTS, 3);
    }

    #[test]
    fn test_watchdog_defaults() {
        assert_eq!(watchdog::MAX_MISSED, 3);
        assert_eq!(watchdog::handshake_timeout(), Duration::from_secs(5));
    }
}
