//! Process supervisor for the terminal backend
//!
//! [`HostSupervisor`] is a cheap, cloneable handle. Construction spawns the
//! actor task that owns the backend process; every handle method either
//! enqueues a command for that task or reads state that is safe to share
//! (readiness, the request broker, event buses, shared buffers).
//!
//! Request-backed queries never fail: on timeout, restart, disposal or a
//! missing backend they return a neutral default.

mod actor;
mod backoff;
mod health;
mod notifier;


pub use backoff::RestartBackoff;
pub use health::{Readiness, SupervisorHealth};
pub use notifier::{FatalNotifier, LoggingNotifier};

#[cfg(test)]
pub use notifier::MockFatalNotifier;

use crate::backend::{BackendLauncher, OsReaper, ProcessLauncher, ProcessReaper};
use crate::broker::{RequestBroker, generate_id};
use crate::config::{RequestTimeouts, SupervisorConfig};
use crate::crash::CrashRecord;
use crate::error::{HostError, HostResult};
use crate::events::{DomainEventBus, EventBus, SupervisorEvent, SupervisorEventBus};
use crate::protocol::{
    ControlMessage, DomainEvent, HostReply, PortHandle, ProjectContext, ProjectStats,
    SpawnOptions, TerminalInfo,
};
use crate::router::DomainEventRouter;
use crate::shared::{SharedChannel, SharedSegment};
use actor::{ActorParts, Command, SupervisorActor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Builder for [`HostSupervisor`]
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    launcher: Arc<dyn BackendLauncher>,
    reaper: Arc<dyn ProcessReaper>,
    notifier: Arc<dyn FatalNotifier>,
    domain_bus: Option<DomainEventBus>,
}

impl SupervisorBuilder {
    /// Replace the orphan reaper
    pub fn reaper(mut self, reaper: Arc<dyn ProcessReaper>) -> Self {
        self.reaper = reaper;
        self
    }

    /// Replace the fatal notification sink
    pub fn notifier(mut self, notifier: Arc<dyn FatalNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Forward domain events to an existing application bus
    pub fn domain_bus(mut self, bus: DomainEventBus) -> Self {
        self.domain_bus = Some(bus);
        self
    }

    /// Validate the configuration and spawn the actor task; must be called
    /// inside a Tokio runtime
    pub fn build(self) -> HostResult<HostSupervisor> {
        self.config.validate()?;

        let shared = Arc::new(SharedChannel::initialize(&self.config.shared_buffers));
        let broker = RequestBroker::new();
        let events: SupervisorEventBus = EventBus::default();
        let domain = self.domain_bus.unwrap_or_default();
        let (readiness_tx, readiness_rx) = watch::channel(Readiness::NotStarted);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let requests = self.config.requests.clone();

        let actor = SupervisorActor::new(ActorParts {
            config: self.config,
            launcher: self.launcher,
            reaper: self.reaper,
            notifier: self.notifier,
            broker: broker.clone(),
            events: events.clone(),
            router: DomainEventRouter::new(domain.clone()),
            shared: Arc::clone(&shared),
            readiness: readiness_tx,
            commands: command_rx,
        });
        tokio::spawn(actor.run());

        Ok(HostSupervisor {
            commands: command_tx,
            broker,
            events,
            domain,
            shared,
            readiness: readiness_rx,
            requests,
        })
    }
}

/// Handle to a supervised backend
#[derive(Clone)]
pub struct HostSupervisor {
    commands: mpsc::UnboundedSender<Command>,
    broker: RequestBroker<HostReply>,
    events: SupervisorEventBus,
    domain: DomainEventBus,
    shared: Arc<SharedChannel>,
    readiness: watch::Receiver<Readiness>,
    requests: RequestTimeouts,
}

impl HostSupervisor {
    /// Supervisor for the configured backend program
    pub fn new(config: SupervisorConfig) -> HostResult<Self> {
        let launcher = Arc::new(ProcessLauncher::new(config.backend.clone()));
        Self::builder(config, launcher).build()
    }

    pub fn builder(config: SupervisorConfig, launcher: Arc<dyn BackendLauncher>) -> SupervisorBuilder {
        SupervisorBuilder {
            config,
            launcher,
            reaper: Arc::new(OsReaper),
            notifier: Arc::new(LoggingNotifier),
            domain_bus: None,
        }
    }

    // Lifecycle

    /// Launch the backend; idempotent until disposed
    pub async fn start(&self) -> HostResult<()> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Start(tx));
        rx.await.unwrap_or(Err(HostError::Disposed))
    }

    /// Shut the backend down and release everything; later calls are no-ops
    pub async fn dispose(&self) {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Dispose(tx));
        let _ = rx.await;
    }

    pub fn is_ready(&self) -> bool {
        *self.readiness.borrow() == Readiness::Ready
    }

    pub fn readiness(&self) -> Readiness {
        *self.readiness.borrow()
    }

    /// Wait until a backend reports ready; false on timeout, failure or disposal
    pub async fn wait_for_ready(&self, timeout: Duration) -> bool {
        let mut readiness = self.readiness.clone();
        let reached = tokio::time::timeout(
            timeout,
            readiness.wait_for(|state| *state == Readiness::Ready || state.is_terminal()),
        )
        .await;
        matches!(reached, Ok(Ok(state)) if *state == Readiness::Ready)
    }

    // Data path

    pub fn spawn(&self, id: impl Into<String>, options: SpawnOptions) {
        self.send(ControlMessage::Spawn {
            id: id.into(),
            options,
        });
    }

    pub fn write(&self, id: impl Into<String>, data: impl Into<String>) {
        self.send(ControlMessage::Write {
            id: id.into(),
            data: data.into(),
        });
    }

    pub fn resize(&self, id: impl Into<String>, cols: u16, rows: u16) {
        self.send(ControlMessage::Resize {
            id: id.into(),
            cols,
            rows,
        });
    }

    pub fn kill(&self, id: impl Into<String>, reason: Option<String>) {
        self.send(ControlMessage::Kill {
            id: id.into(),
            reason,
        });
    }

    pub fn trash(&self, id: impl Into<String>) {
        self.send(ControlMessage::Trash { id: id.into() });
    }

    pub fn restore(&self, id: impl Into<String>) {
        self.send(ControlMessage::Restore { id: id.into() });
    }

    // Request-backed queries

    pub async fn list_terminals(&self, project_id: Option<String>) -> Vec<TerminalInfo> {
        self.request(
            "list-terminals",
            self.requests.list,
            |request_id| ControlMessage::ListTerminals {
                request_id,
                project_id,
            },
            |reply| match reply {
                HostReply::Terminals(terminals) => Some(terminals),
                _ => None,
            },
        )
        .await
        .unwrap_or_default()
    }

    pub async fn get_terminal(&self, id: impl Into<String>) -> Option<TerminalInfo> {
        let id = id.into();
        self.request(
            "get-terminal",
            self.requests.info,
            |request_id| ControlMessage::GetTerminal { request_id, id },
            |reply| match reply {
                HostReply::Terminal(terminal) => Some(terminal),
                _ => None,
            },
        )
        .await
        .flatten()
    }

    pub async fn get_serialized_state(&self, id: impl Into<String>) -> Option<String> {
        let id = id.into();
        self.request(
            "get-serialized-state",
            self.requests.serialized_state,
            |request_id| ControlMessage::GetSerializedState { request_id, id },
            |reply| match reply {
                HostReply::SerializedState(state) => Some(state),
                _ => None,
            },
        )
        .await
        .flatten()
    }

    /// Ask the backend to re-emit up to `max_lines` of history; returns the
    /// number of lines replayed
    pub async fn replay_history(&self, id: impl Into<String>, max_lines: u32) -> u64 {
        let id = id.into();
        self.request(
            "replay-history",
            self.requests.replay,
            |request_id| ControlMessage::ReplayHistory {
                request_id,
                id,
                max_lines,
            },
            |reply| match reply {
                HostReply::Replayed(count) => Some(count),
                _ => None,
            },
        )
        .await
        .unwrap_or(0)
    }

    /// Kill every terminal of a project; returns how many the backend killed
    pub async fn kill_by_project(&self, project_id: impl Into<String>) -> u32 {
        let project_id = project_id.into();
        self.request(
            "kill-by-project",
            self.requests.bulk,
            |request_id| ControlMessage::KillByProject {
                request_id,
                project_id,
            },
            |reply| match reply {
                HostReply::KilledByProject(count) => Some(count),
                _ => None,
            },
        )
        .await
        .unwrap_or(0)
    }

    pub async fn project_stats(&self, project_id: impl Into<String>) -> ProjectStats {
        let project_id = project_id.into();
        self.request(
            "get-project-stats",
            self.requests.stats,
            |request_id| ControlMessage::GetProjectStats {
                request_id,
                project_id,
            },
            |reply| match reply {
                HostReply::ProjectStats(stats) => Some(stats),
                _ => None,
            },
        )
        .await
        .unwrap_or_default()
    }

    // Power state and context

    pub fn pause_all(&self) {
        self.send(ControlMessage::PauseAll);
    }

    pub fn resume_all(&self) {
        self.send(ControlMessage::ResumeAll);
    }

    /// Stop heartbeats before the host suspends
    pub fn pause_health_check(&self) {
        self.command(Command::PauseHealthCheck);
    }

    /// Restart heartbeats after wake, with a handshake to absorb clock skew
    pub fn resume_health_check(&self) {
        self.command(Command::ResumeHealthCheck);
    }

    /// Select the active project; replayed to every new backend
    pub fn set_active_project(&self, project_id: impl Into<String>, path: Option<PathBuf>) {
        self.command(Command::SetActiveProject(ProjectContext {
            project_id: project_id.into(),
            project_path: path,
        }));
    }

    /// Hand an external channel endpoint to the backend, buffered until ready
    pub fn connect_port(&self, port: PortHandle) {
        self.command(Command::ConnectPort(port));
    }

    // Shared buffers

    pub fn shared_buffers_available(&self) -> bool {
        self.shared.is_available()
    }

    /// Visual segments; empty when the zero-copy path is unavailable
    pub fn visual_buffers(&self) -> &[SharedSegment] {
        self.shared.visual_buffers()
    }

    pub fn signal_buffer(&self) -> Option<&SharedSegment> {
        self.shared.signal_buffer()
    }

    // Observation

    pub fn subscribe_events(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_domain(&self) -> broadcast::Receiver<DomainEvent> {
        self.domain.subscribe()
    }

    pub async fn health(&self) -> Option<SupervisorHealth> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Health(tx));
        rx.await.ok()
    }

    /// Most recent crash records, oldest first
    pub async fn crash_history(&self) -> Vec<CrashRecord> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::CrashHistory(tx));
        rx.await.unwrap_or_default()
    }

    fn send(&self, message: ControlMessage) {
        self.command(Command::Send(message));
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("supervisor task has stopped");
        }
    }

    async fn request<T>(
        &self,
        prefix: &str,
        timeout: Duration,
        build: impl FnOnce(String) -> ControlMessage,
        extract: impl FnOnce(HostReply) -> Option<T>,
    ) -> Option<T> {
        let request_id = generate_id(prefix);
        let pending = match self.broker.register(&request_id, timeout) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "request not sent");
                return None;
            }
        };
        self.send(build(request_id));
        pending.wait().await.and_then(extract)
    }
}
