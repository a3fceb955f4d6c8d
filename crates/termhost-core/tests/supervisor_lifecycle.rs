//! End-to-end supervisor lifecycle: crash, restart, replay, watchdog, dispose

mod common;

use common::{Harness, settle, spawn_ids, test_config};
use std::time::Duration;
use termhost_core::backend::ExitInfo;
use termhost_core::crash::CrashType;
use termhost_core::error::HostError;
use termhost_core::events::SupervisorEvent;
use termhost_core::protocol::{ControlMessage, PortHandle, SpawnOptions, TransportMessage};
use termhost_core::supervisor::Readiness;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let mut harness = Harness::new(test_config());
    let backend = harness.start_ready().await;

    harness.supervisor.start().await.unwrap();
    settle().await;

    assert_eq!(harness.launcher.launches(), 1);
    assert_eq!(backend.generation, 1);
    assert!(harness.supervisor.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_crash_137_restarts_after_two_seconds_and_respawns_session() {
    let mut harness = Harness::new(test_config());
    let mut backend = harness.start_ready().await;
    assert!(matches!(
        harness.next_event().await,
        SupervisorEvent::Ready { generation: 1, restarted: false }
    ));

    harness.supervisor.spawn("A", SpawnOptions::shell(80, 24));
    let spawn = backend.expect(|m| matches!(m, ControlMessage::Spawn { .. })).await;
    assert_eq!(spawn_ids(&[spawn]), vec!["A"]);

    let crashed_at = Instant::now();
    assert!(backend.crash(137));

    match harness.next_event().await {
        SupervisorEvent::Crashed { generation, record } => {
            assert_eq!(generation, 1);
            assert_eq!(record.crash_type, CrashType::OutOfMemory);
            assert_eq!(record.exit_code, Some(137));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    match harness.next_event().await {
        SupervisorEvent::RestartScheduled { attempt, delay } => {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(2000));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(harness.supervisor.readiness(), Readiness::Restarting);

    let mut replacement = harness.next_backend().await;
    let waited = crashed_at.elapsed();
    assert!(waited >= Duration::from_millis(2000), "restarted after {:?}", waited);
    assert!(waited < Duration::from_millis(2100), "restarted after {:?}", waited);

    // Nothing is replayed before the new backend is ready
    settle().await;
    assert!(spawn_ids(&replacement.drain()).is_empty());

    replacement.ready();
    let spawn = replacement
        .expect(|m| matches!(m, ControlMessage::Spawn { .. }))
        .await;
    assert_eq!(spawn_ids(&[spawn]), vec!["A"]);
    assert!(matches!(
        harness.next_event().await,
        SupervisorEvent::Ready { generation: 2, restarted: true }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_replay_follows_registry_order_and_skips_killed_sessions() {
    let mut harness = Harness::new(test_config());
    let mut backend = harness.start_ready().await;

    for id in ["A", "B", "C", "D"] {
        harness.supervisor.spawn(id, SpawnOptions::shell(80, 24));
    }
    harness.supervisor.kill("B", Some("closed".into()));
    settle().await;

    // The backend reports D exiting on its own
    backend.transport(TransportMessage::Exit {
        id: "D".into(),
        exit_code: Some(0),
    });
    settle().await;
    backend.drain();

    backend.crash(1);
    let mut replacement = harness.next_backend().await;
    replacement.ready();
    settle().await;

    assert_eq!(spawn_ids(&replacement.drain()), vec!["A", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_during_outage_is_sent_exactly_once() {
    let mut harness = Harness::new(test_config());
    let backend = harness.start_ready().await;

    harness.supervisor.spawn("A", SpawnOptions::shell(80, 24));
    settle().await;
    backend.crash(134);

    // Spawned while the replacement is still starting
    let mut replacement = harness.next_backend().await;
    harness.supervisor.spawn("B", SpawnOptions::shell(80, 24));
    settle().await;
    assert!(spawn_ids(&replacement.drain()).is_empty());

    replacement.ready();
    settle().await;
    assert_eq!(spawn_ids(&replacement.drain()), vec!["A", "B"]);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_before_first_ready_is_flushed_on_ready() {
    let mut harness = Harness::new(test_config());
    harness.supervisor.start().await.unwrap();
    let mut backend = harness.next_backend().await;

    harness.supervisor.spawn("early", SpawnOptions::shell(80, 24));
    settle().await;
    assert!(spawn_ids(&backend.drain()).is_empty());

    backend.ready();
    settle().await;
    assert_eq!(spawn_ids(&backend.drain()), vec!["early"]);
}

#[tokio::test(start_paused = true)]
async fn test_ready_resets_restart_attempts() {
    let mut harness = Harness::new(test_config());
    let backend = harness.start_ready().await;

    backend.crash(1);
    let second = harness.next_backend().await;
    second.crash(1);
    let third = harness.next_backend().await;

    let health = harness.supervisor.health().await.unwrap();
    assert_eq!(health.restart_attempts, 2);

    third.ready();
    assert!(harness.supervisor.wait_for_ready(Duration::from_secs(1)).await);
    let health = harness.supervisor.health().await.unwrap();
    assert_eq!(health.restart_attempts, 0);

    // The next crash starts again from the first delay
    let crashed_at = Instant::now();
    third.crash(1);
    let _fourth = harness.next_backend().await;
    assert!(crashed_at.elapsed() < Duration::from_millis(2100));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_after_restart_ceiling() {
    let mut harness = Harness::new(test_config());
    let backend = harness.start_ready().await;

    backend.crash(137);
    for _ in 0..3 {
        let next = harness.next_backend().await;
        next.crash(137);
    }

    loop {
        match harness.next_event().await {
            SupervisorEvent::Fatal(notice) => {
                assert_eq!(notice.attempts, 3);
                assert_eq!(
                    notice.last_crash.map(|c| c.crash_type),
                    Some(CrashType::OutOfMemory)
                );
                break;
            }
            SupervisorEvent::RestartScheduled { attempt, .. } => assert!(attempt <= 3),
            _ => {}
        }
    }

    settle().await;
    assert_eq!(harness.launcher.launches(), 4);
    assert_eq!(harness.notifier.notices.lock().len(), 1);
    assert_eq!(harness.supervisor.readiness(), Readiness::Failed);
    assert!(!harness.supervisor.wait_for_ready(Duration::from_secs(1)).await);

    // Nothing else is launched
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.launcher.launches(), 4);
    assert_eq!(harness.supervisor.crash_history().await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_counts_as_attempt() {
    let mut harness = Harness::new(test_config());
    let backend = harness.start_ready().await;

    harness.launcher.fail_next(1);
    backend.crash(1);

    loop {
        match harness.next_event().await {
            SupervisorEvent::RestartFailed { attempt, .. } => {
                assert_eq!(attempt, 1);
                break;
            }
            SupervisorEvent::Ready { .. }
            | SupervisorEvent::Crashed { .. }
            | SupervisorEvent::RestartScheduled { .. } => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }
    match harness.next_event().await {
        SupervisorEvent::RestartScheduled { attempt, delay } => {
            assert_eq!(attempt, 2);
            assert_eq!(delay, Duration::from_millis(4000));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let replacement = harness.next_backend().await;
    assert_eq!(replacement.generation, 3);
}

#[tokio::test(start_paused = true)]
async fn test_clean_exit_restarts_without_crash_record() {
    let mut harness = Harness::new(test_config());
    let backend = harness.start_ready().await;
    assert!(matches!(harness.next_event().await, SupervisorEvent::Ready { .. }));

    backend.crash(0);
    match harness.next_event().await {
        SupervisorEvent::RestartScheduled { attempt, .. } => assert_eq!(attempt, 1),
        other => panic!("expected restart without crash, got {:?}", other),
    }
    let _replacement = harness.next_backend().await;
    assert!(harness.supervisor.crash_history().await.is_empty());
    assert!(harness.reaper.reaped.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_orphaned_terminal_processes_are_reaped_on_crash() {
    let mut harness = Harness::new(test_config());
    let backend = harness.start_ready().await;

    harness.supervisor.spawn("A", SpawnOptions::shell(80, 24));
    harness.supervisor.spawn("B", SpawnOptions::shell(80, 24));
    settle().await;
    backend.transport(TransportMessage::TerminalPid {
        id: "A".into(),
        pid: 31337,
    });
    backend.transport(TransportMessage::TerminalPid {
        id: "B".into(),
        pid: std::process::id(),
    });
    settle().await;

    backend.exit(ExitInfo::signal("SIGSEGV"));
    let _replacement = harness.next_backend().await;

    assert_eq!(*harness.reaper.reaped.lock(), vec![31337]);
}

/// Pids reaped when a backend with one tracked terminal exits with code 0
async fn reaped_after_clean_exit(cleanup_on_clean_exit: bool) -> Vec<u32> {
    let mut config = test_config();
    config.orphans.cleanup_on_clean_exit = cleanup_on_clean_exit;
    let mut harness = Harness::new(config);
    let backend = harness.start_ready().await;

    harness.supervisor.spawn("A", SpawnOptions::shell(80, 24));
    settle().await;
    backend.transport(TransportMessage::TerminalPid {
        id: "A".into(),
        pid: 31337,
    });
    settle().await;

    backend.crash(0);
    let _replacement = harness.next_backend().await;
    assert!(harness.supervisor.crash_history().await.is_empty());

    harness.reaper.reaped.lock().clone()
}

#[tokio::test(start_paused = true)]
async fn test_clean_exit_leaves_terminal_processes_by_default() {
    assert!(reaped_after_clean_exit(false).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_clean_exit_reaps_terminal_processes_when_configured() {
    assert_eq!(reaped_after_clean_exit(true).await, vec![31337]);
}

#[tokio::test(start_paused = true)]
async fn test_broken_channel_is_recorded_as_forced_kill() {
    let mut harness = Harness::new(test_config());
    let backend = harness.start_ready().await;
    assert!(matches!(harness.next_event().await, SupervisorEvent::Ready { .. }));

    harness.supervisor.spawn("A", SpawnOptions::shell(80, 24));
    settle().await;

    // The instance stops reading; the next write finds the channel closed
    drop(backend);
    harness.supervisor.write("A", "ls\n");

    match harness.next_event().await {
        SupervisorEvent::Crashed { generation, record } => {
            assert_eq!(generation, 1);
            assert_eq!(record.crash_type, CrashType::SignalTerminated);
            assert_eq!(record.signal.as_deref(), Some("SIGKILL"));
            assert_eq!(record.exit_code, None);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    match harness.next_event().await {
        SupervisorEvent::RestartScheduled { attempt, delay } => {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(2000));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let mut replacement = harness.next_backend().await;
    replacement.ready();
    let spawn = replacement
        .expect(|m| matches!(m, ControlMessage::Spawn { .. }))
        .await;
    assert_eq!(spawn_ids(&[spawn]), vec!["A"]);

    let history = harness.supervisor.crash_history().await;
    assert_eq!(history.len(), 1);
    assert_ne!(history[0].crash_type, CrashType::OutOfMemory);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_kills_unresponsive_backend_once() {
    let mut harness = Harness::new(test_config());
    let mut backend = harness.start_ready().await;
    let started = Instant::now();

    for _ in 0..3 {
        backend
            .expect(|m| matches!(m, ControlMessage::HealthCheck))
            .await;
    }

    let mut crashes = Vec::new();
    loop {
        match harness.next_event().await {
            SupervisorEvent::Crashed { record, .. } => crashes.push(record),
            SupervisorEvent::RestartScheduled { .. } => break,
            _ => {}
        }
    }

    assert_eq!(crashes.len(), 1);
    assert_eq!(crashes[0].crash_type, CrashType::SignalTerminated);
    assert_eq!(crashes[0].signal.as_deref(), Some("SIGKILL"));
    assert_eq!(crashes[0].exit_code, None);
    assert!(backend.kill.is_cancelled());
    assert_eq!(started.elapsed(), Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn test_pongs_keep_backend_alive() {
    let mut harness = Harness::new(test_config());
    let mut backend = harness.start_ready().await;

    for _ in 0..6 {
        backend
            .expect(|m| matches!(m, ControlMessage::HealthCheck))
            .await;
        backend.transport(TransportMessage::Pong);
    }

    assert!(!backend.kill.is_cancelled());
    let health = harness.supervisor.health().await.unwrap();
    assert!(health.is_ready());
    assert!(harness.supervisor.crash_history().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_health_check() {
    let mut harness = Harness::new(test_config());
    let mut backend = harness.start_ready().await;

    harness.supervisor.pause_health_check();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(backend.drain().is_empty());
    assert!(!backend.kill.is_cancelled());

    harness.supervisor.resume_health_check();
    settle().await;
    assert_eq!(backend.drain(), vec![ControlMessage::HealthCheck]);

    // No pong: the handshake times out and monitoring continues
    tokio::time::sleep(Duration::from_secs(6)).await;
    let health = harness.supervisor.health().await.unwrap();
    assert_eq!(
        serde_json::to_value(health.watchdog_state).unwrap(),
        "active"
    );
    assert!(!health.health_check_paused);
}

#[tokio::test(start_paused = true)]
async fn test_context_is_replayed_after_restart() {
    let mut harness = Harness::new(test_config());
    let mut backend = harness.start_ready().await;

    harness.supervisor.set_active_project("p1", None);
    settle().await;
    assert_eq!(
        backend.drain(),
        vec![ControlMessage::set_active_project("p1", None)]
    );

    backend.crash(1);
    let mut replacement = harness.next_backend().await;

    // Port handed over while the backend is down is buffered
    harness.supervisor.connect_port(PortHandle {
        name: "renderer".into(),
        endpoint: "/tmp/renderer.sock".into(),
    });
    settle().await;
    assert!(replacement.drain().is_empty());

    replacement.ready();
    settle().await;
    let replayed = replacement.drain();
    assert!(matches!(replayed[0], ControlMessage::ConnectPort { .. }));
    assert_eq!(replayed[1], ControlMessage::set_active_project("p1", None));
    assert_eq!(replayed.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_init_buffers_sent_to_every_instance() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.shared_buffers.enabled = true;
    config.shared_buffers.segment_size = 4096;
    config.shared_buffers.directory = Some(dir.path().to_path_buf());

    let mut harness = Harness::new(config);
    assert!(harness.supervisor.shared_buffers_available());
    assert_eq!(harness.supervisor.visual_buffers().len(), 1);
    assert!(harness.supervisor.signal_buffer().is_some());

    let mut backend = harness.start_ready().await;
    assert!(matches!(
        backend.next_message().await,
        Some(ControlMessage::InitBuffers { .. })
    ));

    backend.crash(137);
    let mut replacement = harness.next_backend().await;
    assert!(matches!(
        replacement.next_message().await,
        Some(ControlMessage::InitBuffers { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dispose_stops_everything() {
    let mut harness = Harness::new(test_config());
    let mut backend = harness.start_ready().await;
    harness.supervisor.spawn("A", SpawnOptions::shell(80, 24));
    settle().await;
    backend.drain();

    let supervisor = harness.supervisor.clone();
    let pending = tokio::spawn(async move { supervisor.list_terminals(None).await });
    settle().await;

    let disposed_at = Instant::now();
    harness.supervisor.dispose().await;

    // The backend ignored the dispose request and was killed after the grace period
    assert_eq!(disposed_at.elapsed(), Duration::from_secs(2));
    let messages = backend.drain();
    assert!(messages.contains(&ControlMessage::Dispose));
    assert!(backend.kill.is_cancelled());

    assert!(pending.await.unwrap().is_empty());
    assert_eq!(harness.supervisor.readiness(), Readiness::Disposed);
    assert!(matches!(
        harness.supervisor.start().await,
        Err(HostError::Disposed)
    ));

    let health = harness.supervisor.health().await.unwrap();
    assert!(health.disposed);
    assert_eq!(health.sessions, 0);

    // No restart ever happens
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.launcher.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_waits_for_graceful_exit() {
    let mut harness = Harness::new(test_config());
    let mut backend = harness.start_ready().await;

    let supervisor = harness.supervisor.clone();
    let dispose = tokio::spawn(async move { supervisor.dispose().await });

    backend
        .expect(|m| matches!(m, ControlMessage::Dispose))
        .await;
    backend.crash(0);
    dispose.await.unwrap();

    assert!(!backend.kill.is_cancelled());
    assert!(harness.supervisor.crash_history().await.is_empty());
}
