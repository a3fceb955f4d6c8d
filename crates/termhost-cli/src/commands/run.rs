//! Supervise the backend and drive it from stdin

use super::build_supervisor;
use super::input::{ConsoleCommand, HELP};
use crate::console::CliConsole;
use crate::signal_handler::{ShutdownSignal, signal_label};
use colored::*;
use std::time::Duration;
use termhost_core::config::SupervisorConfig;
use termhost_core::events::SupervisorEvent;
use termhost_core::protocol::{DomainEvent, SpawnOptions};
use termhost_core::supervisor::HostSupervisor;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

pub async fn run(
    config: SupervisorConfig,
    ready_timeout: Duration,
    project: Option<String>,
) -> anyhow::Result<()> {
    let console = CliConsole::new(true);
    let supervisor = build_supervisor(config)?;
    let printer = spawn_event_printer(&supervisor);
    let mut shutdown = ShutdownSignal::install()?;

    supervisor.start().await?;
    if let Some(project) = project {
        supervisor.set_active_project(project, None);
    }
    if supervisor.wait_for_ready(ready_timeout).await {
        console.success("Backend ready");
    } else {
        console.warn("Backend not ready yet; sessions are created once it is");
    }
    console.info("Type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            signal = shutdown.received() => {
                console.warn(&format!("Received {}, shutting down", signal_label(signal)));
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match ConsoleCommand::parse(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => execute(&supervisor, &console, command).await,
                    Err(e) => console.error(&e),
                }
            }
        }
    }

    supervisor.dispose().await;
    printer.abort();
    console.success("Stopped");
    Ok(())
}

async fn execute(supervisor: &HostSupervisor, console: &CliConsole, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Spawn { id, cwd } => {
            let mut options = SpawnOptions::shell(DEFAULT_COLS, DEFAULT_ROWS);
            if let Some(cwd) = cwd {
                options = options.with_cwd(cwd);
            }
            supervisor.spawn(id, options);
        }
        ConsoleCommand::Write { id, data } => supervisor.write(id, data),
        ConsoleCommand::Resize { id, cols, rows } => supervisor.resize(id, cols, rows),
        ConsoleCommand::Kill { id, reason } => supervisor.kill(id, reason),
        ConsoleCommand::Trash { id } => supervisor.trash(id),
        ConsoleCommand::Restore { id } => supervisor.restore(id),
        ConsoleCommand::List { project } => {
            let terminals = supervisor.list_terminals(project).await;
            if terminals.is_empty() {
                console.info("No terminals");
            }
            for terminal in terminals {
                println!(
                    "  {:<16} {:<10} {:>4}x{:<4} pid={} project={}{}",
                    terminal.id.bold(),
                    format!("{:?}", terminal.kind).to_lowercase(),
                    terminal.cols,
                    terminal.rows,
                    terminal
                        .pid
                        .map(|pid| pid.to_string())
                        .unwrap_or_else(|| "-".into()),
                    terminal.project_id.as_deref().unwrap_or("-"),
                    if terminal.is_trashed { " (trashed)".dimmed() } else { "".normal() },
                );
            }
        }
        ConsoleCommand::Info { id } => match supervisor.get_terminal(&id).await {
            Some(info) => print_json(console, &info),
            None => console.warn(&format!("No terminal '{id}'")),
        },
        ConsoleCommand::State { id } => match supervisor.get_serialized_state(&id).await {
            Some(state) => println!("{state}"),
            None => console.warn(&format!("No state for '{id}'")),
        },
        ConsoleCommand::Replay { id, max_lines } => {
            let replayed = supervisor.replay_history(&id, max_lines).await;
            console.info(&format!("Replayed {replayed} line(s) of '{id}'"));
        }
        ConsoleCommand::KillProject { project } => {
            let killed = supervisor.kill_by_project(&project).await;
            console.info(&format!("Killed {killed} terminal(s) of '{project}'"));
        }
        ConsoleCommand::Stats { project } => {
            let stats = supervisor.project_stats(&project).await;
            console.field("terminals", stats.terminal_count);
            console.field("agents", stats.agent_count);
            console.field("running agents", stats.running_agent_count);
            console.field("trashed", stats.trashed_count);
        }
        ConsoleCommand::Project { id, path } => supervisor.set_active_project(id, path),
        ConsoleCommand::PauseAll => supervisor.pause_all(),
        ConsoleCommand::ResumeAll => supervisor.resume_all(),
        ConsoleCommand::Sleep => supervisor.pause_health_check(),
        ConsoleCommand::Wake => supervisor.resume_health_check(),
        ConsoleCommand::Health => match supervisor.health().await {
            Some(health) => println!("{}", health.summary()),
            None => console.error("Supervisor is not running"),
        },
        ConsoleCommand::Crashes => {
            let history = supervisor.crash_history().await;
            if history.is_empty() {
                console.info("No crashes recorded");
            }
            for record in history {
                println!(
                    "  {} {:<18} code={:?} signal={}",
                    record.timestamp.format("%H:%M:%S"),
                    record.crash_type,
                    record.exit_code,
                    record.signal.as_deref().unwrap_or("-"),
                );
            }
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
}

fn print_json<T: serde::Serialize>(console: &CliConsole, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => console.error(&format!("Cannot render reply: {e}")),
    }
}

fn spawn_event_printer(supervisor: &HostSupervisor) -> JoinHandle<()> {
    let mut events = supervisor.subscribe_events();
    let mut domain = supervisor.subscribe_domain();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
                event = domain.recv() => match event {
                    Ok(event) => print_domain_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "domain event printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

fn print_event(event: &SupervisorEvent) {
    match event {
        SupervisorEvent::TerminalData { id, data } => {
            print!("{} {}", format!("[{id}]").cyan(), data);
        }
        SupervisorEvent::TerminalExit { id, exit_code } => {
            println!("{} exited ({:?})", format!("[{id}]").cyan(), exit_code);
        }
        SupervisorEvent::TerminalError { id, error } => {
            println!("{} {}", format!("[{id}]").cyan(), error.red());
        }
        SupervisorEvent::Ready {
            generation,
            restarted,
        } => {
            let note = if *restarted { ", sessions restored" } else { "" };
            println!("{} backend #{generation} ready{note}", "●".green());
        }
        SupervisorEvent::Crashed { generation, record } => {
            println!(
                "{} backend #{generation} crashed: {}",
                "●".red(),
                record.crash_type.user_message()
            );
        }
        SupervisorEvent::RestartScheduled { attempt, delay } => {
            println!("{} restart #{attempt} in {delay:?}", "●".yellow());
        }
        SupervisorEvent::RestartFailed { attempt, error } => {
            println!("{} restart #{attempt} failed: {error}", "●".red());
        }
        // Rendered by the console notifier
        SupervisorEvent::Fatal(_) => {}
        SupervisorEvent::Disposed => println!("{} supervisor disposed", "●".dimmed()),
    }
}

fn print_domain_event(event: &DomainEvent) {
    println!(
        "{} {} {}",
        "◆".magenta(),
        event.event_type().dimmed(),
        event.terminal_id()
    );
}
