//! Termhost CLI
//!
//! Composition root for the supervisor: loads configuration, installs
//! logging, builds one [`HostSupervisor`](termhost_core::HostSupervisor) and
//! exposes it through a small console.

mod args;
mod commands;
mod console;
mod logging;
mod notifier;
mod router;
mod signal_handler;

use args::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    router::route(cli).await
}
