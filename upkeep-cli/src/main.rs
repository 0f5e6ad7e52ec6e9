//! Upkeep — keep a self-hosted deployment current with its upstream.
//!
//! # Usage
//!
//! ```text
//! upkeep init <tree>
//! upkeep check [--json]
//! upkeep run [--refresh-only]
//! upkeep trigger
//! upkeep status [--limit <n>] [--json]
//! upkeep services restart|list
//! upkeep daemon start|run|stop|status|install|uninstall|logs
//! upkeep logs [--lines <n>]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs, daemon::DaemonCommand, init::InitArgs, logs::LogsArgs, run::RunArgs,
    services::ServicesCommand, status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "upkeep",
    version,
    about = "Keep a self-hosted deployment current with its upstream branch",
    long_about = None,
)]
struct Cli {
    /// Config file (default: $UPKEEP_CONFIG, /etc/upkeep/config.yaml, ~/.upkeep/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Adopt a deployment tree: write a starter config for it.
    Init(InitArgs),

    /// Fetch and report whether an update is pending, changing nothing.
    Check(CheckArgs),

    /// Execute one update cycle in the foreground.
    Run(RunArgs),

    /// Leave the trigger marker for the daemon to pick up.
    Trigger,

    /// Show recent runs and daemon liveness.
    Status(StatusArgs),

    /// Operate the managed services directly.
    Services {
        #[command(subcommand)]
        command: ServicesCommand,
    },

    /// Manage the background daemon and its systemd unit.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Tail the run journal.
    Logs(LogsArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // Engine and host crates log through the `log` facade; surface those
    // lines on stderr when RUST_LOG asks for them.
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(cli.config),
        Commands::Check(args) => args.run(cli.config),
        Commands::Run(args) => args.run(cli.config),
        Commands::Trigger => commands::trigger::run(cli.config),
        Commands::Status(args) => args.run(cli.config),
        Commands::Services { command } => commands::services::run(command, cli.config),
        Commands::Daemon { command } => commands::daemon::run(command, cli.config),
        Commands::Logs(args) => args.run(cli.config),
    }
}
