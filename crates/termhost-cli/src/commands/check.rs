//! One-shot health check of the configured backend

use super::build_supervisor;
use crate::console::CliConsole;
use std::time::Duration;
use termhost_core::config::SupervisorConfig;

pub async fn check(config: SupervisorConfig, ready_timeout: Duration, json: bool) -> anyhow::Result<()> {
    let console = CliConsole::new(!json);
    let program = config.backend.resolved_program();
    let supervisor = build_supervisor(config)?;

    console.info(&format!("Starting {program}"));
    supervisor.start().await?;
    let ready = supervisor.wait_for_ready(ready_timeout).await;
    let health = supervisor.health().await;
    supervisor.dispose().await;

    if json {
        if let Some(health) = &health {
            println!("{}", serde_json::to_string_pretty(health)?);
        }
    } else if let Some(health) = &health {
        console.print_header("Backend Health");
        console.field("readiness", format!("{:?}", health.readiness));
        console.field("generation", health.generation);
        console.field(
            "pid",
            health
                .pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
        match &health.shared_buffers_reason {
            Some(reason) => console.field("shared buffers", format!("off ({reason})")),
            None => console.field("shared buffers", health.shared_buffers),
        }
        if let Some(crash) = &health.last_crash {
            console.field("last crash", crash.crash_type);
        }
    }

    if ready {
        console.success("Backend reported ready");
        Ok(())
    } else {
        console.error(&format!("Backend not ready within {ready_timeout:?}"));
        anyhow::bail!("backend did not become ready")
    }
}
