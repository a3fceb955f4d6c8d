//! Crash classification for backend exits
//!
//! [`CrashType::classify`] is a pure, total function over the `(exit code,
//! signal)` pair reported by the OS. The order of the checks matters: the
//! out-of-memory and assertion rules must run before the generic `> 128`
//! rule because 137 and 134 both exceed 128.

mod notice;

pub use notice::FatalNotice;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code produced when a process is killed with SIGKILL (128 + 9)
pub const EXIT_CODE_SIGKILL: i32 = 137;
/// Exit code produced when a process aborts with SIGABRT (128 + 6)
pub const EXIT_CODE_SIGABRT: i32 = 134;
/// Exit codes above this value encode a terminating signal
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Category of a backend exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrashType {
    CleanExit,
    OutOfMemory,
    AssertionFailure,
    SignalTerminated,
    UnknownCrash,
}

impl CrashType {
    /// Classify an exit
    pub fn classify(exit_code: Option<i32>, signal: Option<&str>) -> Self {
        let Some(code) = exit_code else {
            if signal == Some("SIGKILL") {
                return Self::OutOfMemory;
            }
            if signal == Some("SIGABRT") {
                return Self::AssertionFailure;
            }
            return Self::SignalTerminated;
        };

        if code == 0 {
            Self::CleanExit
        } else if code == EXIT_CODE_SIGKILL || signal == Some("SIGKILL") {
            Self::OutOfMemory
        } else if code == EXIT_CODE_SIGABRT || signal == Some("SIGABRT") {
            Self::AssertionFailure
        } else if code > SIGNAL_EXIT_BASE {
            Self::SignalTerminated
        } else {
            Self::UnknownCrash
        }
    }

    pub fn is_clean(self) -> bool {
        self == Self::CleanExit
    }

    /// Stable identifier used in logs and events
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CleanExit => "CLEAN_EXIT",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::AssertionFailure => "ASSERTION_FAILURE",
            Self::SignalTerminated => "SIGNAL_TERMINATED",
            Self::UnknownCrash => "UNKNOWN_CRASH",
        }
    }

    /// Human-readable explanation of what happened
    pub fn user_message(self) -> &'static str {
        match self {
            Self::CleanExit => "The terminal backend exited normally.",
            Self::OutOfMemory => {
                "The terminal backend ran out of memory and was killed by the operating system."
            }
            Self::AssertionFailure => "The terminal backend hit an internal assertion and aborted.",
            Self::SignalTerminated => "The terminal backend was terminated by a signal.",
            Self::UnknownCrash => "The terminal backend exited unexpectedly.",
        }
    }

    /// Suggested remediation for the user
    pub fn remediation(self) -> &'static str {
        match self {
            Self::CleanExit => "No action is needed.",
            Self::OutOfMemory => {
                "Close terminals with very large scrollback or heavy output, then restart the application."
            }
            Self::AssertionFailure => {
                "Restart the application. If this keeps happening, report the issue with your logs attached."
            }
            Self::SignalTerminated => {
                "Check whether another process or the system killed the backend, then restart the application."
            }
            Self::UnknownCrash => {
                "Restart the application. If the problem persists, run with RUST_LOG=debug and report the logs."
            }
        }
    }
}

impl fmt::Display for CrashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified, timestamped description of a non-clean backend exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashRecord {
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub crash_type: CrashType,
    pub timestamp: DateTime<Utc>,
}

impl CrashRecord {
    /// Build a record by classifying an exit
    pub fn from_exit(exit_code: Option<i32>, signal: Option<String>) -> Self {
        let crash_type = CrashType::classify(exit_code, signal.as_deref());
        Self {
            exit_code,
            signal,
            crash_type,
            timestamp: Utc::now(),
        }
    }

    /// Record for a backend the supervisor force-killed itself, after missed
    /// heartbeats or a broken channel; never classified as out-of-memory
    pub fn forced_kill() -> Self {
        Self {
            exit_code: None,
            signal: Some("SIGKILL".to_string()),
            crash_type: CrashType::SignalTerminated,
            timestamp: Utc::now(),
        }
    }
}

/// Map a raw signal number to its conventional `SIG*` name
#[cfg(unix)]
pub fn signal_name(signo: i32) -> Option<String> {
    nix::sys::signal::Signal::try_from(signo)
        .ok()
        .map(|signal| signal.as_str().to_string())
}

#[cfg(not(unix))]
pub fn signal_name(_signo: i32) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_documented_cases() {
        assert_eq!(CrashType::classify(Some(137), None), CrashType::OutOfMemory);
        assert_eq!(
            CrashType::classify(None, Some("SIGKILL")),
            CrashType::OutOfMemory
        );
        assert_eq!(CrashType::classify(Some(0), None), CrashType::CleanExit);
        assert_eq!(CrashType::classify(None, None), CrashType::SignalTerminated);
        assert_eq!(
            CrashType::classify(Some(134), None),
            CrashType::AssertionFailure
        );
        assert_eq!(CrashType::classify(Some(1), None), CrashType::UnknownCrash);
    }

    #[test]
    fn test_classify_signal_precedence() {
        assert_eq!(
            CrashType::classify(None, Some("SIGABRT")),
            CrashType::AssertionFailure
        );
        assert_eq!(
            CrashType::classify(None, Some("SIGTERM")),
            CrashType::SignalTerminated
        );
        // A SIGKILL signal wins over a generic non-zero code
        assert_eq!(
            CrashType::classify(Some(1), Some("SIGKILL")),
            CrashType::OutOfMemory
        );
    }

    #[test]
    fn test_classify_high_codes() {
        assert_eq!(
            CrashType::classify(Some(143), None),
            CrashType::SignalTerminated
        );
        assert_eq!(CrashType::classify(Some(128), None), CrashType::UnknownCrash);
        assert_eq!(CrashType::classify(Some(-1), None), CrashType::UnknownCrash);
    }

    #[test]
    fn test_classify_is_deterministic() {
        for code in [None, Some(0), Some(1), Some(134), Some(137), Some(255)] {
            for signal in [None, Some("SIGKILL"), Some("SIGABRT"), Some("SIGHUP")] {
                assert_eq!(
                    CrashType::classify(code, signal),
                    CrashType::classify(code, signal)
                );
            }
        }
    }

    #[test]
    fn test_forced_kill_is_not_out_of_memory() {
        let record = CrashRecord::forced_kill();
        assert_eq!(record.crash_type, CrashType::SignalTerminated);
        assert_eq!(record.signal.as_deref(), Some("SIGKILL"));
        assert!(record.exit_code.is_none());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = CrashRecord::from_exit(Some(137), None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["crashType"], "OUT_OF_MEMORY");
        assert_eq!(json["exitCode"], 137);
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_name() {
        assert_eq!(signal_name(9).as_deref(), Some("SIGKILL"));
        assert_eq!(signal_name(6).as_deref(), Some("SIGABRT"));
        assert_eq!(signal_name(4096), None);
    }
}
