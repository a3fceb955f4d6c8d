//! In-memory backend used to drive the supervisor end-to-end

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use termhost_core::backend::{BackendConnection, BackendLauncher, ExitInfo, ProcessReaper};
use termhost_core::config::SupervisorConfig;
use termhost_core::crash::FatalNotice;
use termhost_core::error::{HostError, HostResult};
use termhost_core::events::SupervisorEvent;
use termhost_core::protocol::{ControlMessage, DomainEvent, InboundMessage, TransportMessage};
use termhost_core::supervisor::{FatalNotifier, HostSupervisor};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Test side of one launched backend instance
pub struct FakeBackend {
    pub generation: u64,
    pub kill: CancellationToken,
    outbound: mpsc::UnboundedReceiver<ControlMessage>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    exit: Arc<Mutex<Option<oneshot::Sender<ExitInfo>>>>,
}

impl FakeBackend {
    pub fn ready(&self) {
        self.transport(TransportMessage::Ready);
    }

    pub fn transport(&self, message: TransportMessage) {
        let _ = self.inbound.send(InboundMessage::Transport(message));
    }

    pub fn domain(&self, event: DomainEvent) {
        let _ = self.inbound.send(InboundMessage::Domain(event));
    }

    /// Report the process as exited; false if it already exited
    pub fn exit(&self, info: ExitInfo) -> bool {
        match self.exit.lock().take() {
            Some(tx) => tx.send(info).is_ok(),
            None => false,
        }
    }

    pub fn crash(&self, code: i32) -> bool {
        self.exit(ExitInfo::code(code))
    }

    /// Next control message, waiting (in virtual time) up to a minute
    pub async fn next_message(&mut self) -> Option<ControlMessage> {
        tokio::time::timeout(Duration::from_secs(60), self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Messages already queued, without waiting
    pub fn drain(&mut self) -> Vec<ControlMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Skip ahead to the first message matching `pred`
    pub async fn expect<F>(&mut self, mut pred: F) -> ControlMessage
    where
        F: FnMut(&ControlMessage) -> bool,
    {
        loop {
            match self.next_message().await {
                Some(message) if pred(&message) => return message,
                Some(_) => continue,
                None => panic!("backend {} got no matching message", self.generation),
            }
        }
    }
}

/// Launcher handing every new instance to the test
pub struct FakeLauncher {
    instances: mpsc::UnboundedSender<FakeBackend>,
    failures: AtomicU32,
    launches: AtomicU32,
}

impl FakeLauncher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeBackend>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let launcher = Arc::new(Self {
            instances: tx,
            failures: AtomicU32::new(0),
            launches: AtomicU32::new(0),
        });
        (launcher, rx)
    }

    /// Make the next `count` launches fail
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendLauncher for FakeLauncher {
    async fn launch(&self, generation: u64) -> HostResult<BackendConnection> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HostError::spawn("fake-host", "simulated launch failure"));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let exit = Arc::new(Mutex::new(Some(exit_tx)));
        let kill = CancellationToken::new();

        // A force-kill ends the instance like SIGKILL would
        let exit_on_kill = Arc::clone(&exit);
        let kill_watch = kill.clone();
        tokio::spawn(async move {
            kill_watch.cancelled().await;
            if let Some(tx) = exit_on_kill.lock().take() {
                let _ = tx.send(ExitInfo::signal("SIGKILL"));
            }
        });

        let _ = self.instances.send(FakeBackend {
            generation,
            kill: kill.clone(),
            outbound: outbound_rx,
            inbound: inbound_tx,
            exit,
        });

        Ok(BackendConnection {
            pid: Some(10_000 + generation as u32),
            outbound: outbound_tx,
            inbound: inbound_rx,
            exited: exit_rx,
            kill,
        })
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

/// Reaper that records instead of killing
#[derive(Default)]
pub struct RecordingReaper {
    pub reaped: Mutex<Vec<u32>>,
}

impl ProcessReaper for RecordingReaper {
    fn reap(&self, pid: u32) -> bool {
        self.reaped.lock().push(pid);
        true
    }
}

/// Notifier that records every notice
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<FatalNotice>>,
}

impl FatalNotifier for RecordingNotifier {
    fn notify(&self, notice: &FatalNotice) {
        self.notices.lock().push(notice.clone());
    }
}

/// Config without shared buffers so message streams stay minimal
pub fn test_config() -> SupervisorConfig {
    let mut config = SupervisorConfig::default();
    config.shared_buffers.enabled = false;
    config
}

pub struct Harness {
    pub supervisor: HostSupervisor,
    pub launcher: Arc<FakeLauncher>,
    pub instances: mpsc::UnboundedReceiver<FakeBackend>,
    pub reaper: Arc<RecordingReaper>,
    pub notifier: Arc<RecordingNotifier>,
    pub events: broadcast::Receiver<SupervisorEvent>,
}

impl Harness {
    pub fn new(config: SupervisorConfig) -> Self {
        let (launcher, instances) = FakeLauncher::new();
        let reaper = Arc::new(RecordingReaper::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let supervisor = HostSupervisor::builder(config, launcher.clone())
            .reaper(reaper.clone())
            .notifier(notifier.clone())
            .build()
            .expect("test config is valid");
        let events = supervisor.subscribe_events();
        Self {
            supervisor,
            launcher,
            instances,
            reaper,
            notifier,
            events,
        }
    }

    /// Start the supervisor and return the first instance, already ready
    pub async fn start_ready(&mut self) -> FakeBackend {
        self.supervisor.start().await.unwrap();
        let backend = self.next_backend().await;
        backend.ready();
        assert!(self.supervisor.wait_for_ready(Duration::from_secs(1)).await);
        backend
    }

    pub async fn next_backend(&mut self) -> FakeBackend {
        tokio::time::timeout(Duration::from_secs(600), self.instances.recv())
            .await
            .ok()
            .flatten()
            .expect("no backend launched")
    }

    /// Next supervisor event, skipping terminal I/O noise
    pub async fn next_event(&mut self) -> SupervisorEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(600), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event bus closed");
            match event {
                SupervisorEvent::TerminalData { .. } => continue,
                other => return other,
            }
        }
    }
}

/// Let the supervisor task process everything queued so far
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn spawn_ids(messages: &[ControlMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|message| match message {
            ControlMessage::Spawn { id, .. } => Some(id.clone()),
            _ => None,
        })
        .collect()
}
