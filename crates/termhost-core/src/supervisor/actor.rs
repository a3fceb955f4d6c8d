//! The supervisor's single event loop
//!
//! All mutable supervisor state lives here and is touched only from
//! [`SupervisorActor::run`]. Public handles talk to the actor through
//! [`Command`]s; backend traffic, the watchdog timer and the restart timer are
//! multiplexed in one `select!`.

use super::backoff::RestartBackoff;
use super::health::{Readiness, SupervisorHealth};
use super::notifier::FatalNotifier;
use crate::backend::{BackendConnection, BackendLauncher, ExitInfo, ProcessReaper, reap_orphans};
use crate::broker::RequestBroker;
use crate::config::SupervisorConfig;
use crate::crash::{CrashRecord, CrashType, FatalNotice};
use crate::error::{HostError, HostResult};
use crate::events::{SupervisorEvent, SupervisorEventBus};
use crate::protocol::{
    ControlMessage, HostReply, InboundMessage, PortHandle, ProjectContext, TransportMessage,
};
use crate::router::DomainEventRouter;
use crate::sessions::SessionRegistry;
use crate::shared::SharedChannel;
use crate::watchdog::{HealthWatchdog, WatchdogAction};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

/// Crash records kept for inspection
const CRASH_HISTORY_LIMIT: usize = 16;

pub(super) enum Command {
    Start(oneshot::Sender<HostResult<()>>),
    Dispose(oneshot::Sender<()>),
    Send(ControlMessage),
    SetActiveProject(ProjectContext),
    ConnectPort(PortHandle),
    PauseHealthCheck,
    ResumeHealthCheck,
    Health(oneshot::Sender<SupervisorHealth>),
    CrashHistory(oneshot::Sender<Vec<CrashRecord>>),
}

/// Collaborators and shared handles the actor is built from
pub(super) struct ActorParts {
    pub config: SupervisorConfig,
    pub launcher: Arc<dyn BackendLauncher>,
    pub reaper: Arc<dyn ProcessReaper>,
    pub notifier: Arc<dyn FatalNotifier>,
    pub broker: RequestBroker<HostReply>,
    pub events: SupervisorEventBus,
    pub router: DomainEventRouter,
    pub shared: Arc<SharedChannel>,
    pub readiness: watch::Sender<Readiness>,
    pub commands: mpsc::UnboundedReceiver<Command>,
}

struct LiveBackend {
    connection: BackendConnection,
    generation: u64,
    ready: bool,
    inbound_open: bool,
}

enum BackendSignal {
    Message(InboundMessage),
    InboundClosed,
    Exited(ExitInfo),
}

pub(super) struct SupervisorActor {
    config: SupervisorConfig,
    launcher: Arc<dyn BackendLauncher>,
    reaper: Arc<dyn ProcessReaper>,
    notifier: Arc<dyn FatalNotifier>,
    broker: RequestBroker<HostReply>,
    events: SupervisorEventBus,
    router: DomainEventRouter,
    shared: Arc<SharedChannel>,
    readiness: watch::Sender<Readiness>,
    commands: mpsc::UnboundedReceiver<Command>,

    backend: Option<LiveBackend>,
    watchdog: HealthWatchdog,
    sessions: SessionRegistry,
    /// Sessions spawned while no ready backend existed
    queued_spawns: Vec<String>,
    active_project: Option<ProjectContext>,
    project_pending: bool,
    pending_port: Option<PortHandle>,
    backoff: RestartBackoff,
    restart_timer: Option<Pin<Box<Sleep>>>,
    /// The next ready follows a crash
    restarting: bool,
    /// Synthesized record for a kill we issued, consumed by the next exit
    pending_crash: Option<CrashRecord>,
    crash_history: VecDeque<CrashRecord>,
    generation: u64,
    started: bool,
    disposed: bool,
}

impl SupervisorActor {
    pub(super) fn new(parts: ActorParts) -> Self {
        let watchdog = HealthWatchdog::new(&parts.config.watchdog);
        let backoff = RestartBackoff::new(&parts.config.restart);
        Self {
            config: parts.config,
            launcher: parts.launcher,
            reaper: parts.reaper,
            notifier: parts.notifier,
            broker: parts.broker,
            events: parts.events,
            router: parts.router,
            shared: parts.shared,
            readiness: parts.readiness,
            commands: parts.commands,
            backend: None,
            watchdog,
            sessions: SessionRegistry::new(),
            queued_spawns: Vec::new(),
            active_project: None,
            project_pending: false,
            pending_port: None,
            backoff,
            restart_timer: None,
            restarting: false,
            pending_crash: None,
            crash_history: VecDeque::with_capacity(CRASH_HISTORY_LIMIT),
            generation: 0,
            started: false,
            disposed: false,
        }
    }

    pub(super) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                signal = next_backend_signal(&mut self.backend) => match signal {
                    BackendSignal::Message(message) => self.handle_inbound(message),
                    BackendSignal::InboundClosed => debug!("backend output closed"),
                    BackendSignal::Exited(info) => self.handle_exit(info),
                },
                action = self.watchdog.tick() => self.handle_watchdog(action),
                _ = restart_due(&mut self.restart_timer) => self.restart().await,
            }
        }

        // Every handle is gone; nothing can observe us any more
        if !self.disposed {
            self.dispose().await;
        }
        debug!("supervisor loop stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::Dispose(reply) => {
                self.dispose().await;
                let _ = reply.send(());
            }
            Command::Send(message) => self.dispatch(message),
            Command::SetActiveProject(context) => self.set_active_project(context),
            Command::ConnectPort(port) => self.connect_port(port),
            Command::PauseHealthCheck => {
                debug!("pausing health checks");
                self.watchdog.pause();
            }
            Command::ResumeHealthCheck => {
                if self.watchdog.resume() {
                    debug!("resuming health checks with handshake");
                    self.send(ControlMessage::HealthCheck);
                }
            }
            Command::Health(reply) => {
                let _ = reply.send(self.health());
            }
            Command::CrashHistory(reply) => {
                let _ = reply.send(self.crash_history.iter().cloned().collect());
            }
        }
    }

    async fn start(&mut self) -> HostResult<()> {
        if self.disposed {
            return Err(HostError::Disposed);
        }
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.readiness.send_replace(Readiness::Starting);

        if let Err(e) = self.launch().await {
            error!(error = %e, "failed to start backend");
            self.started = false;
            self.readiness.send_replace(Readiness::Failed);
            return Err(e);
        }
        Ok(())
    }

    async fn launch(&mut self) -> HostResult<()> {
        self.generation += 1;
        let generation = self.generation;
        let connection = self.launcher.launch(generation).await?;

        info!(
            generation,
            pid = ?connection.pid,
            launcher = %self.launcher.describe(),
            "backend launched"
        );

        self.backend = Some(LiveBackend {
            connection,
            generation,
            ready: false,
            inbound_open: true,
        });

        // Each instance is a fresh process and must be told where the segments are
        if let Some(init) = self.shared.init_message() {
            self.send(init);
        }
        self.watchdog.start();
        Ok(())
    }

    /// Write to the live backend; without one the message is dropped
    ///
    /// A broken channel force-kills the instance, and the exit that follows is
    /// recorded as our own kill rather than classified from the signal.
    fn send(&mut self, message: ControlMessage) {
        match &self.backend {
            Some(live) => {
                if let Err(e) = live.connection.send(message) {
                    error!(generation = live.generation, error = %e, "backend transport failed");
                    self.pending_crash.get_or_insert_with(CrashRecord::forced_kill);
                }
            }
            None => {
                warn!(message_type = message.kind(), "no live backend, dropping message");
                if let Some(request_id) = message.request_id() {
                    self.broker.cancel(request_id);
                }
            }
        }
    }

    fn backend_ready(&self) -> bool {
        self.backend.as_ref().is_some_and(|live| live.ready)
    }

    /// Apply registry bookkeeping for a data-path message, then send it
    fn dispatch(&mut self, message: ControlMessage) {
        if self.disposed {
            debug!(message_type = message.kind(), "supervisor disposed, ignoring message");
            if let Some(request_id) = message.request_id() {
                self.broker.cancel(request_id);
            }
            return;
        }

        match &message {
            ControlMessage::Spawn { id, options } => {
                self.sessions.insert(id.clone(), options.clone());
                if !self.backend_ready() {
                    debug!(terminal = %id, "queueing spawn until backend is ready");
                    if !self.queued_spawns.contains(id) {
                        self.queued_spawns.push(id.clone());
                    }
                    return;
                }
            }
            ControlMessage::Kill { id, .. } => {
                self.sessions.remove(id);
                self.queued_spawns.retain(|queued| queued != id);
            }
            ControlMessage::KillByProject { project_id, .. } => {
                let removed = self.sessions.remove_by_project(project_id);
                self.queued_spawns.retain(|queued| !removed.contains(queued));
            }
            _ => {}
        }
        self.send(message);
    }

    fn set_active_project(&mut self, context: ProjectContext) {
        if self.disposed {
            return;
        }
        self.active_project = Some(context.clone());
        if self.backend_ready() {
            self.project_pending = false;
            self.send(ControlMessage::SetActiveProject { context });
        } else {
            self.project_pending = true;
        }
    }

    fn connect_port(&mut self, port: PortHandle) {
        if self.disposed {
            return;
        }
        if self.backend_ready() {
            self.send(ControlMessage::ConnectPort { port });
        } else {
            debug!(port = %port.name, "buffering port until backend is ready");
            self.pending_port = Some(port);
        }
    }

    fn handle_inbound(&mut self, message: InboundMessage) {
        let Some(message) = self.router.route(message) else {
            return;
        };

        match message {
            TransportMessage::Ready => self.on_ready(),
            TransportMessage::Pong => self.watchdog.record_pong(),
            TransportMessage::Data { id, data } => {
                self.events.publish(SupervisorEvent::TerminalData { id, data });
            }
            TransportMessage::Exit { id, exit_code } => {
                debug!(terminal = %id, ?exit_code, "terminal exited");
                self.sessions.remove(&id);
                self.queued_spawns.retain(|queued| queued != &id);
                self.events
                    .publish(SupervisorEvent::TerminalExit { id, exit_code });
            }
            TransportMessage::Error { id, error } => {
                warn!(terminal = %id, error = %error, "backend reported terminal error");
                self.events
                    .publish(SupervisorEvent::TerminalError { id, error });
            }
            TransportMessage::TerminalPid { id, pid } => {
                if !self.sessions.set_pid(&id, pid) {
                    debug!(terminal = %id, pid, "pid reported for untracked terminal");
                }
            }
            result => match result.into_reply() {
                Ok((request_id, reply)) => {
                    self.broker.resolve(&request_id, reply);
                }
                Err(other) => debug!(message = ?other, "unhandled transport message"),
            },
        }
    }

    fn on_ready(&mut self) {
        let Some(live) = self.backend.as_mut() else {
            return;
        };
        if live.ready {
            debug!(generation = live.generation, "duplicate ready ignored");
            return;
        }
        live.ready = true;
        let generation = live.generation;

        let restarted = std::mem::take(&mut self.restarting);
        self.backoff.reset();
        self.readiness.send_replace(Readiness::Ready);

        if let Some(port) = self.pending_port.take() {
            self.send(ControlMessage::ConnectPort { port });
        }

        if restarted || self.project_pending {
            if let Some(context) = self.active_project.clone() {
                self.send(ControlMessage::SetActiveProject { context });
            }
        }
        self.project_pending = false;

        let queued = std::mem::take(&mut self.queued_spawns);
        let replay: Vec<ControlMessage> = self
            .sessions
            .iter()
            .filter(|session| restarted || queued.contains(&session.id))
            .map(|session| ControlMessage::Spawn {
                id: session.id.clone(),
                options: session.options.clone(),
            })
            .collect();
        let replayed = replay.len();
        for spawn in replay {
            self.send(spawn);
        }

        info!(generation, restarted, replayed, "backend ready");
        self.events
            .publish(SupervisorEvent::Ready { generation, restarted });
    }

    fn handle_exit(&mut self, info: ExitInfo) {
        let Some(live) = self.backend.take() else {
            return;
        };
        self.watchdog.stop();
        let generation = live.generation;

        // Anything the backend managed to say before dying still counts
        let mut connection = live.connection;
        while let Ok(message) = connection.inbound.try_recv() {
            self.handle_inbound(message);
        }
        // The process writer cancels the token itself when stdin breaks
        let killed_by_us = connection.kill.is_cancelled();
        drop(connection);

        let record = match self.pending_crash.take() {
            Some(record) => Some(record),
            None if killed_by_us => Some(CrashRecord::forced_kill()),
            None if CrashType::classify(info.code, info.signal.as_deref()).is_clean() => None,
            None => Some(CrashRecord::from_exit(info.code, info.signal.clone())),
        };

        match &record {
            Some(record) => {
                warn!(
                    generation,
                    crash_type = %record.crash_type,
                    exit_code = ?record.exit_code,
                    signal = ?record.signal,
                    "backend crashed"
                );
                if self.crash_history.len() == CRASH_HISTORY_LIMIT {
                    self.crash_history.pop_front();
                }
                self.crash_history.push_back(record.clone());
                self.events.publish(SupervisorEvent::Crashed {
                    generation,
                    record: record.clone(),
                });
            }
            None => info!(generation, "backend exited cleanly"),
        }

        if record.is_some() || self.config.orphans.cleanup_on_clean_exit {
            let pids = self.sessions.tracked_pids();
            reap_orphans(self.reaper.as_ref(), &pids);
        }
        self.sessions.clear_pids();

        self.broker.clear("backend restart");
        self.schedule_restart(record);
    }

    fn schedule_restart(&mut self, last_crash: Option<CrashRecord>) {
        match self.backoff.next_attempt() {
            Some((attempt, delay)) => {
                info!(
                    attempt,
                    max_attempts = self.backoff.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling backend restart"
                );
                self.restarting = true;
                self.readiness.send_replace(Readiness::Restarting);
                self.restart_timer = Some(Box::pin(tokio::time::sleep(delay)));
                self.events
                    .publish(SupervisorEvent::RestartScheduled { attempt, delay });
            }
            None => {
                let last_crash = last_crash.or_else(|| self.crash_history.back().cloned());
                let notice = FatalNotice::restart_budget_exhausted(self.backoff.attempts(), last_crash);
                error!(attempts = notice.attempts, "restart budget exhausted");
                self.restarting = false;
                self.readiness.send_replace(Readiness::Failed);
                self.notifier.notify(&notice);
                self.events.publish(SupervisorEvent::Fatal(notice));
            }
        }
    }

    async fn restart(&mut self) {
        self.restart_timer = None;
        if self.disposed {
            return;
        }
        if let Err(e) = self.launch().await {
            let attempt = self.backoff.attempts();
            error!(attempt, error = %e, "backend restart failed");
            self.events.publish(SupervisorEvent::RestartFailed {
                attempt,
                error: e.to_string(),
            });
            self.schedule_restart(None);
        }
    }

    fn handle_watchdog(&mut self, action: WatchdogAction) {
        match action {
            WatchdogAction::SendHeartbeat => {
                self.send(ControlMessage::HealthCheck);
            }
            WatchdogAction::HandshakeExpired => {
                debug!("resume handshake timed out, continuing monitoring");
            }
            WatchdogAction::Unresponsive { missed } => {
                let Some(live) = &self.backend else {
                    return;
                };
                error!(
                    generation = live.generation,
                    missed, "backend unresponsive, forcing kill"
                );
                self.pending_crash = Some(CrashRecord::forced_kill());
                live.connection.kill.cancel();
            }
        }
    }

    async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.restart_timer = None;
        self.restarting = false;
        self.watchdog.stop();
        self.broker.dispose();

        if let Some(live) = self.backend.take() {
            let grace = self.config.shutdown.grace_period;
            let mut connection = live.connection;
            let _ = connection.send(ControlMessage::Dispose);

            match tokio::time::timeout(grace, &mut connection.exited).await {
                Ok(_) => debug!(generation = live.generation, "backend exited after dispose"),
                Err(_) => {
                    warn!(
                        generation = live.generation,
                        grace_ms = grace.as_millis() as u64,
                        "backend ignored dispose, forcing kill"
                    );
                    connection.kill.cancel();
                    let _ = tokio::time::timeout(grace, connection.exited).await;
                }
            }
        }

        self.sessions.clear();
        self.queued_spawns.clear();
        self.active_project = None;
        self.project_pending = false;
        self.pending_port = None;
        self.pending_crash = None;
        self.readiness.send_replace(Readiness::Disposed);
        self.events.publish(SupervisorEvent::Disposed);
        info!("supervisor disposed");
    }

    fn health(&self) -> SupervisorHealth {
        SupervisorHealth {
            readiness: *self.readiness.borrow(),
            generation: self.generation,
            pid: self.backend.as_ref().and_then(|live| live.connection.pid),
            restart_attempts: self.backoff.attempts(),
            max_restart_attempts: self.backoff.max_attempts(),
            watchdog_state: self.watchdog.state(),
            missed_heartbeats: self.watchdog.missed(),
            health_check_paused: self.watchdog.is_suspended(),
            sessions: self.sessions.len(),
            pending_requests: self.broker.pending_count(),
            shared_buffers: self.shared.is_available(),
            shared_buffers_reason: self.shared.unavailable_reason().map(str::to_string),
            domain_events: self.router.forwarded(),
            last_crash: self.crash_history.back().cloned(),
            disposed: self.disposed,
        }
    }
}

async fn next_backend_signal(backend: &mut Option<LiveBackend>) -> BackendSignal {
    let Some(live) = backend else {
        return std::future::pending().await;
    };

    tokio::select! {
        biased;
        message = live.connection.inbound.recv(), if live.inbound_open => match message {
            Some(message) => BackendSignal::Message(message),
            None => {
                live.inbound_open = false;
                BackendSignal::InboundClosed
            }
        },
        exit = &mut live.connection.exited => BackendSignal::Exited(exit.unwrap_or_default()),
    }
}

async fn restart_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
