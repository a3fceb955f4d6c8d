//! Child-process backend speaking JSON Lines over stdio

use super::{BackendConnection, BackendLauncher, ExitInfo};
use crate::config::BackendCommandConfig;
use crate::crash::signal_name;
use crate::error::{HostError, HostResult};
use crate::protocol::{ControlMessage, DecodeError, InboundMessage, decode_line, encode_line};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Launches the configured backend program
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: BackendCommandConfig,
}

impl ProcessLauncher {
    pub fn new(command: BackendCommandConfig) -> Self {
        Self { command }
    }

    fn build_command(&self, generation: u64) -> Command {
        let mut cmd = Command::new(self.command.resolved_program());
        cmd.args(&self.command.args)
            .envs(&self.command.env)
            .env("TERMHOST_GENERATION", generation.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = self.command.resolved_cwd() {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

#[async_trait]
impl BackendLauncher for ProcessLauncher {
    async fn launch(&self, generation: u64) -> HostResult<BackendConnection> {
        let program = self.command.resolved_program();
        let mut child = self
            .build_command(generation)
            .spawn()
            .map_err(|e| HostError::spawn(&program, e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HostError::spawn(&program, "failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HostError::spawn(&program, "failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HostError::spawn(&program, "failed to get stderr handle"))?;

        let pid = child.id();
        let kill = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(write_loop(stdin, outbound_rx, kill.clone()));
        tokio::spawn(read_loop(stdout, inbound_tx));
        tokio::spawn(relay_stderr(stderr, generation));
        tokio::spawn(wait_for_exit(child, exit_tx, kill.clone()));

        info!(program = %program, ?pid, generation, "backend process started");

        Ok(BackendConnection {
            pid,
            outbound: outbound_tx,
            inbound: inbound_rx,
            exited: exit_rx,
            kill,
        })
    }

    fn describe(&self) -> String {
        self.command.resolved_program()
    }
}

async fn write_loop(
    mut stdin: ChildStdin,
    mut outbound: mpsc::UnboundedReceiver<ControlMessage>,
    kill: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = kill.cancelled() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let line = match encode_line(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!(message_type = message.kind(), error = %e, "failed to encode control message");
                continue;
            }
        };

        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            // Transport failure is handled like a crash
            warn!(message_type = message.kind(), error = %e, "write to backend failed");
            kill.cancel();
            break;
        }
        trace!(message_type = message.kind(), "sent control message");
    }
}

async fn read_loop(stdout: ChildStdout, inbound: mpsc::UnboundedSender<InboundMessage>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match decode_line(&line) {
                    Ok(message) => {
                        if inbound.send(message).is_err() {
                            break;
                        }
                    }
                    Err(DecodeError::Unrecognized { type_name }) => {
                        warn!(message_type = %type_name, "dropping unrecognized backend message");
                    }
                    Err(DecodeError::InvalidPayload { type_name, source }) => {
                        warn!(
                            message_type = %type_name,
                            error = %source,
                            "dropping malformed backend message"
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable backend line");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read from backend");
                break;
            }
        }
    }
    debug!("backend stdout closed");
}

async fn relay_stderr(stderr: ChildStderr, generation: u64) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "termhost::host", generation, "{}", line);
    }
}

async fn wait_for_exit(
    mut child: Child,
    exit_tx: oneshot::Sender<ExitInfo>,
    kill: CancellationToken,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to kill backend");
            }
            child.wait().await
        }
    };

    let info = match status {
        Ok(status) => exit_info(status),
        Err(e) => {
            warn!(error = %e, "failed to wait for backend");
            ExitInfo::default()
        }
    };
    let _ = exit_tx.send(info);
}

fn exit_info(status: ExitStatus) -> ExitInfo {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal().and_then(signal_name)
    };
    #[cfg(not(unix))]
    let signal = None;

    ExitInfo {
        code: status.code(),
        signal,
    }
}
