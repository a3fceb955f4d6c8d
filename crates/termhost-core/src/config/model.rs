//! Configuration model for the supervisor

use super::logging_config::LoggingConfig;
use super::timeouts;
use crate::error::{HostError, HostResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level supervisor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How to launch the backend host
    pub backend: BackendCommandConfig,
    /// Crash restart policy
    pub restart: RestartConfig,
    /// Heartbeat watchdog
    pub watchdog: WatchdogConfig,
    /// Timeouts for broker-backed queries
    pub requests: RequestTimeouts,
    /// Zero-copy output segments
    pub shared_buffers: SharedBufferConfig,
    /// Disposal behaviour
    pub shutdown: ShutdownConfig,
    /// Orphaned process cleanup
    pub orphans: OrphanConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl SupervisorConfig {
    /// Validate cross-field invariants
    pub fn validate(&self) -> HostResult<()> {
        if self.backend.program.trim().is_empty() {
            return Err(HostError::config_with_context(
                "backend.program must not be empty",
                "validating [backend]",
            ));
        }

        if self.watchdog.max_missed == 0 {
            return Err(HostError::config_with_context(
                "watchdog.max_missed must be at least 1",
                "validating [watchdog]",
            ));
        }

        if self.watchdog.enabled && self.watchdog.interval.is_zero() {
            return Err(HostError::config_with_context(
                "watchdog.interval must be greater than zero",
                "validating [watchdog]",
            ));
        }

        if self.restart.max_delay < self.restart.base_delay {
            return Err(HostError::config_with_context(
                "restart.max_delay must not be smaller than restart.base_delay",
                "validating [restart]",
            ));
        }

        if self.restart.multiplier.is_nan() || self.restart.multiplier < 1.0 {
            return Err(HostError::config_with_context(
                "restart.multiplier must be at least 1.0",
                "validating [restart]",
            ));
        }

        if self.shared_buffers.enabled
            && (self.shared_buffers.segment_size == 0 || self.shared_buffers.signal_size == 0)
        {
            return Err(HostError::config_with_context(
                "shared buffer sizes must be greater than zero when enabled",
                "validating [shared_buffers]",
            ));
        }

        Ok(())
    }
}

/// Backend host command line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendCommandConfig {
    /// Program to execute
    pub program: String,
    /// Program arguments
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Working directory (tilde-expanded)
    pub cwd: Option<String>,
}

impl Default for BackendCommandConfig {
    fn default() -> Self {
        Self {
            program: "termhost-host".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }
}

impl BackendCommandConfig {
    /// Program path with `~` and environment variables expanded
    pub fn resolved_program(&self) -> String {
        expand(&self.program)
    }

    /// Working directory with `~` and environment variables expanded
    pub fn resolved_cwd(&self) -> Option<PathBuf> {
        self.cwd.as_deref().map(|cwd| PathBuf::from(expand(cwd)))
    }
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|expanded| expanded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Restart back-off policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Maximum consecutive restarts before a fatal notification
    pub max_attempts: u32,
    /// Delay unit for attempt zero
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound on any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_attempts: timeouts::restart::MAX_ATTEMPTS,
            base_delay: timeouts::restart::base_delay(),
            max_delay: timeouts::restart::max_delay(),
            multiplier: timeouts::restart::MULTIPLIER,
        }
    }
}

/// Heartbeat watchdog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub max_missed: u32,
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: timeouts::watchdog::interval(),
            max_missed: timeouts::watchdog::MAX_MISSED,
            handshake_timeout: timeouts::watchdog::handshake_timeout(),
        }
    }
}

/// Per-query reply timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestTimeouts {
    #[serde(with = "humantime_serde")]
    pub list: Duration,
    #[serde(with = "humantime_serde")]
    pub info: Duration,
    #[serde(with = "humantime_serde")]
    pub serialized_state: Duration,
    #[serde(with = "humantime_serde")]
    pub replay: Duration,
    #[serde(with = "humantime_serde")]
    pub bulk: Duration,
    #[serde(with = "humantime_serde")]
    pub stats: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            list: timeouts::requests::list(),
            info: timeouts::requests::info(),
            serialized_state: timeouts::requests::serialized_state(),
            replay: timeouts::requests::replay(),
            bulk: timeouts::requests::bulk(),
            stats: timeouts::requests::stats(),
        }
    }
}

/// Shared output segment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedBufferConfig {
    pub enabled: bool,
    /// Number of fixed-size data segments
    pub segment_count: usize,
    /// Size of each data segment in bytes
    pub segment_size: usize,
    /// Size of the signal segment in bytes
    pub signal_size: usize,
    /// Directory for the backing files; a private temp dir when unset
    pub directory: Option<PathBuf>,
}

impl Default for SharedBufferConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            segment_count: 1,
            segment_size: 10 * 1024 * 1024,
            signal_size: 64,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: timeouts::shutdown::grace_period(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrphanConfig {
    /// Also reap tracked terminal processes when the backend exits cleanly
    pub cleanup_on_clean_exit: bool,
}
