//! Fatal notice rendering for terminal users

use colored::*;
use termhost_core::crash::FatalNotice;
use termhost_core::supervisor::FatalNotifier;

/// Prints the fatal notice to stderr, and logs it
#[derive(Default)]
pub struct ConsoleNotifier;

impl FatalNotifier for ConsoleNotifier {
    fn notify(&self, notice: &FatalNotice) {
        tracing::error!(attempts = notice.attempts, title = %notice.title, "backend gave up");
        eprintln!();
        eprintln!("{} {}", "✗".red().bold(), notice.title.red().bold());
        for line in notice.format_display().lines().skip(1) {
            eprintln!("  {}", line);
        }
    }
}
