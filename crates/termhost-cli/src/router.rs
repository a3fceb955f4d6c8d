//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConfigAction};
use crate::commands::{self, ConfigFile};
use crate::logging;
use std::time::Duration;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli) -> anyhow::Result<()> {
    let file = ConfigFile::resolve(cli.config.clone());

    // `config` subcommands report problems themselves and log nothing
    if let Some(Commands::Config { action }) = &cli.command {
        return match action {
            ConfigAction::Show => commands::config::show(&file),
            ConfigAction::Validate => commands::config::validate(&file),
            ConfigAction::Path => commands::config::path(&file),
        };
    }

    let mut config = file.load()?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }
    logging::init(&config.logging)?;
    tracing::debug!(config = %file.describe(), "configuration loaded");

    match cli.command {
        Some(Commands::Check {
            ready_timeout,
            json,
        }) => commands::check::check(config, Duration::from_secs(ready_timeout), json).await,
        Some(Commands::Run {
            ready_timeout,
            project,
        }) => commands::run::run(config, Duration::from_secs(ready_timeout), project).await,
        None => commands::run::run(config, Duration::from_secs(10), None).await,
        Some(Commands::Config { .. }) => Ok(()),
    }
}
