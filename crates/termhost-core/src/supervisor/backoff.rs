//! Bounded exponential restart back-off

use crate::config::RestartConfig;
use std::time::Duration;

/// Restart attempt counter with capped exponential delays
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_attempts: u32,
    attempts: u32,
}

impl RestartBackoff {
    pub fn new(config: &RestartConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
            max_attempts: config.max_attempts,
            attempts: 0,
        }
    }

    /// Delay for attempt `n`: `min(base * multiplier^n, max)`, never negative
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Claim the next attempt, or `None` once the ceiling is reached
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.delay_for_attempt(self.attempts)))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
