//! Fatal notification sink

use crate::crash::FatalNotice;

/// Receives the one user-interrupting condition: an exhausted restart budget
#[cfg_attr(test, mockall::automock)]
pub trait FatalNotifier: Send + Sync {
    fn notify(&self, notice: &FatalNotice);
}

/// Writes the notice to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl FatalNotifier for LoggingNotifier {
    fn notify(&self, notice: &FatalNotice) {
        tracing::error!(
            attempts = notice.attempts,
            crash_type = ?notice.last_crash.as_ref().map(|c| c.crash_type),
            remediation = %notice.remediation,
            "{}: {}",
            notice.title,
            notice.message
        );
    }
}
