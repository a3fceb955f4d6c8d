//! Configuration inspection commands

use super::ConfigFile;
use crate::console::CliConsole;
use anyhow::Context;

/// Print the effective configuration as JSON
pub fn show(file: &ConfigFile) -> anyhow::Result<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration");
    console.info(&format!("Source: {}", file.describe()));

    let config = file.load()?;
    let rendered =
        serde_json::to_string_pretty(&config).context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}

/// Load, validate and summarise the configuration
pub fn validate(file: &ConfigFile) -> anyhow::Result<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration Validation");

    if file.is_explicit() && !file.exists() {
        let message = format!("Configuration file not found: {}", file.describe());
        console.error(&message);
        anyhow::bail!(message);
    }

    match file.load() {
        Ok(config) => {
            console.success("Configuration is valid");
            console.field("source", file.describe());
            console.field("backend", config.backend.resolved_program());
            console.field("max restarts", config.restart.max_attempts);
            console.field(
                "heartbeat",
                if config.watchdog.enabled {
                    format!(
                        "every {:?}, {} missed allowed",
                        config.watchdog.interval, config.watchdog.max_missed
                    )
                } else {
                    "disabled".to_string()
                },
            );
            console.field(
                "shared buffers",
                if config.shared_buffers.enabled { "enabled" } else { "disabled" },
            );
            Ok(())
        }
        Err(e) => {
            console.error(&format!("Configuration validation failed: {e}"));
            Err(e.into())
        }
    }
}

/// Print where configuration is read from
pub fn path(file: &ConfigFile) -> anyhow::Result<()> {
    match file.path() {
        Some(path) => println!("{}", path.display()),
        None => println!("(no configuration directory on this platform)"),
    }
    Ok(())
}
