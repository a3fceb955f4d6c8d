//! User-facing notification raised when the restart budget is exhausted

use super::{CrashRecord, CrashType};
use serde::Serialize;

/// Blocking notification describing why the backend will not be restarted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FatalNotice {
    pub title: String,
    pub message: String,
    pub remediation: String,
    pub attempts: u32,
    pub last_crash: Option<CrashRecord>,
}

impl FatalNotice {
    /// Summarize the last crash after `attempts` failed restarts
    pub fn restart_budget_exhausted(attempts: u32, last_crash: Option<CrashRecord>) -> Self {
        let crash_type = last_crash
            .as_ref()
            .map(|record| record.crash_type)
            .unwrap_or(CrashType::UnknownCrash);

        let mut message = format!(
            "{} Restarting failed {} time{}.",
            crash_type.user_message(),
            attempts,
            if attempts == 1 { "" } else { "s" }
        );
        if let Some(record) = &last_crash {
            match (record.exit_code, record.signal.as_deref()) {
                (Some(code), _) => message.push_str(&format!(" Last exit code: {}.", code)),
                (None, Some(signal)) => message.push_str(&format!(" Last signal: {}.", signal)),
                (None, None) => {}
            }
        }

        Self {
            title: "Terminal backend stopped".to_string(),
            message,
            remediation: crash_type.remediation().to_string(),
            attempts,
            last_crash,
        }
    }

    /// Format the notice for a console
    pub fn format_display(&self) -> String {
        format!("{}\n\n{}\n\n{}", self.title, self.message, self.remediation)
    }
}
