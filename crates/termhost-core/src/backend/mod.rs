//! Backend process seam
//!
//! A [`BackendLauncher`] produces one [`BackendConnection`] per backend
//! instance. The supervisor owns the connection exclusively and drops it the
//! moment the instance exits, so a stale handle can never be written to.

mod process;
mod reaper;

pub use process::ProcessLauncher;
pub use reaper::{OsReaper, ProcessReaper, reap_orphans};

#[cfg(test)]
pub use reaper::MockProcessReaper;

use crate::error::{HostError, HostResult};
use crate::protocol::{ControlMessage, InboundMessage};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// How a backend instance ended
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<String>,
}

impl ExitInfo {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(signal: impl Into<String>) -> Self {
        Self {
            code: None,
            signal: Some(signal.into()),
        }
    }
}

/// Live channel to one backend instance
#[derive(Debug)]
pub struct BackendConnection {
    pub pid: Option<u32>,
    /// Control messages to the backend, in order
    pub outbound: mpsc::UnboundedSender<ControlMessage>,
    /// Messages from the backend, in arrival order
    pub inbound: mpsc::UnboundedReceiver<InboundMessage>,
    /// Completes once with the exit status
    pub exited: oneshot::Receiver<ExitInfo>,
    /// Cancelling force-kills the instance
    pub kill: CancellationToken,
}

impl BackendConnection {
    /// Queue a message; on failure the instance is force-killed so the exit
    /// path runs
    pub fn send(&self, message: ControlMessage) -> HostResult<()> {
        let kind = message.kind();
        self.outbound.send(message).map_err(|_| {
            tracing::warn!(
                message_type = kind,
                pid = ?self.pid,
                "backend channel closed, forcing kill"
            );
            self.kill.cancel();
            HostError::transport(format!("backend channel closed while sending '{kind}'"))
        })
    }
}

/// Spawns backend instances
#[async_trait]
pub trait BackendLauncher: Send + Sync {
    /// Launch instance number `generation` (starting at 1)
    async fn launch(&self, generation: u64) -> HostResult<BackendConnection>;

    /// Short description for logs
    fn describe(&self) -> String {
        "backend".to_string()
    }
}
