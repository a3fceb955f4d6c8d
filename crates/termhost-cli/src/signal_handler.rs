//! Ctrl+C / SIGTERM handling
//!
//! The first signal asks the caller to shut down gracefully; the supervisor's
//! `dispose()` then stops the backend.

use futures::stream::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct ShutdownSignal {
    handle: Handle,
    task: JoinHandle<()>,
    received: Option<oneshot::Receiver<i32>>,
}

impl ShutdownSignal {
    /// Start listening for SIGINT and SIGTERM
    pub fn install() -> anyhow::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            if let Some(signal) = signals.next().await {
                let _ = tx.send(signal);
            }
        });

        Ok(Self {
            handle,
            task,
            received: Some(rx),
        })
    }

    /// Resolves with the signal number once one arrives; never resolves twice
    pub async fn received(&mut self) -> i32 {
        let Some(rx) = self.received.as_mut() else {
            return std::future::pending().await;
        };
        match rx.await {
            Ok(signal) => {
                self.received = None;
                signal
            }
            Err(_) => {
                self.received = None;
                std::future::pending().await
            }
        }
    }
}

pub fn signal_label(signal: i32) -> &'static str {
    match signal {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        _ => "signal",
    }
}

impl Drop for ShutdownSignal {
    fn drop(&mut self) {
        self.handle.close();
        self.task.abort();
    }
}
