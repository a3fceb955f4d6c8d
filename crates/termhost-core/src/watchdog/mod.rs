//! Heartbeat watchdog for a live backend
//!
//! The watchdog does not own a timer task. The supervisor polls
//! [`HealthWatchdog::tick`] from its event loop and acts on the returned
//! [`WatchdogAction`], so every timer is torn down with the watchdog itself.
//!
//! States:
//! - `Idle`: no interval; `tick` never completes
//! - `Active`: one heartbeat per interval, `missed` counts unanswered beats
//! - `AwaitingHandshake`: entered on resume; the first pong or the handshake
//!   timeout moves to `Active`

use crate::config::WatchdogConfig;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Observable watchdog state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogState {
    Idle,
    Active,
    AwaitingHandshake,
}

/// What the supervisor should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Send a `health-check` to the backend
    SendHeartbeat,
    /// Too many heartbeats went unanswered; force-kill the backend
    Unresponsive { missed: u32 },
    /// Resume handshake timed out; monitoring continues regardless
    HandshakeExpired,
}

enum Phase {
    Idle,
    Active(Interval),
    AwaitingHandshake(Instant),
}

pub struct HealthWatchdog {
    enabled: bool,
    interval: Duration,
    max_missed: u32,
    handshake_timeout: Duration,
    phase: Phase,
    missed: u32,
    /// A backend is live and should be monitored
    armed: bool,
    /// Monitoring is paused for system sleep
    suspended: bool,
}

impl HealthWatchdog {
    /// A zero interval cannot drive a timer and leaves monitoring off
    pub fn new(config: &WatchdogConfig) -> Self {
        Self {
            enabled: config.enabled && !config.interval.is_zero(),
            interval: config.interval,
            max_missed: config.max_missed.max(1),
            handshake_timeout: config.handshake_timeout,
            phase: Phase::Idle,
            missed: 0,
            armed: false,
            suspended: false,
        }
    }

    /// Begin monitoring a freshly spawned backend
    pub fn start(&mut self) {
        if !self.enabled {
            return;
        }
        self.armed = true;
        self.missed = 0;
        if !self.suspended {
            self.phase = Phase::Active(self.new_interval());
        }
    }

    /// Stop monitoring; the backend is gone
    pub fn stop(&mut self) {
        self.armed = false;
        self.missed = 0;
        self.phase = Phase::Idle;
    }

    /// Suspend monitoring (system sleep)
    pub fn pause(&mut self) {
        self.suspended = true;
        self.missed = 0;
        self.phase = Phase::Idle;
    }

    /// Leave suspension
    ///
    /// Returns true when a handshake heartbeat must be sent right away.
    pub fn resume(&mut self) -> bool {
        let was_suspended = std::mem::replace(&mut self.suspended, false);
        if !was_suspended || !self.armed {
            return false;
        }
        self.missed = 0;
        self.phase = Phase::AwaitingHandshake(Instant::now() + self.handshake_timeout);
        true
    }

    /// A pong proves liveness
    pub fn record_pong(&mut self) {
        self.missed = 0;
        if matches!(self.phase, Phase::AwaitingHandshake(_)) {
            self.phase = Phase::Active(self.new_interval());
        }
    }

    /// Wait for the next timer event
    ///
    /// Cancel-safe: dropping the future loses no state, so it can sit in a
    /// `select!` loop.
    pub async fn tick(&mut self) -> WatchdogAction {
        match &mut self.phase {
            Phase::Idle => std::future::pending().await,
            Phase::Active(interval) => {
                interval.tick().await;
                if self.missed >= self.max_missed {
                    let missed = self.missed;
                    self.missed = 0;
                    self.phase = Phase::Idle;
                    WatchdogAction::Unresponsive { missed }
                } else {
                    self.missed += 1;
                    WatchdogAction::SendHeartbeat
                }
            }
            Phase::AwaitingHandshake(deadline) => {
                tokio::time::sleep_until(*deadline).await;
                self.missed = 0;
                self.phase = Phase::Active(self.new_interval());
                WatchdogAction::HandshakeExpired
            }
        }
    }

    pub fn state(&self) -> WatchdogState {
        match self.phase {
            Phase::Idle => WatchdogState::Idle,
            Phase::Active(_) => WatchdogState::Active,
            Phase::AwaitingHandshake(_) => WatchdogState::AwaitingHandshake,
        }
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn new_interval(&self) -> Interval {
        // First beat lands one full period after arming
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}
