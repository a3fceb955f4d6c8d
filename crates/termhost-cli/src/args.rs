//! CLI argument definitions using clap
//!
//! - termhost                     # Supervise the backend with an interactive console
//! - termhost run                 # Same, with explicit options
//! - termhost check               # Start, wait for ready, print health, shut down
//! - termhost config show|validate|path

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use termhost_core::config::LogFormat;

#[derive(Parser)]
#[command(name = "termhost")]
#[command(about = "Supervisor for an out-of-process terminal backend host")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (TOML, YAML or JSON)
    #[arg(long, short, global = true, env = "TERMHOST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level; RUST_LOG still takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Supervise the backend and drive it from a line-oriented console
    Run {
        /// Seconds to wait for the first ready before opening the console
        #[arg(long, default_value_t = 10)]
        ready_timeout: u64,

        /// Active project selected right after start
        #[arg(long)]
        project: Option<String>,
    },

    /// Start the backend once, report its health and shut it down
    Check {
        /// Seconds to wait for the backend to report ready
        #[arg(long, default_value_t = 10)]
        ready_timeout: u64,

        /// Print the health snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Load and validate the configuration
    Validate,

    /// Print the configuration file location
    Path,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
