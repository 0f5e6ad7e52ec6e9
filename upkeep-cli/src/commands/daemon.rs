//! `upkeep daemon` — daemon lifecycle and systemd management.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use upkeep_daemon::paths::{stderr_log_path, stdout_log_path};
use upkeep_daemon::{
    install_systemd, request_run, request_status, request_stop, start_blocking, uninstall_systemd,
    DaemonError,
};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (poller + schedule + control socket).
    Start,
    /// Ask a running daemon to execute an update run now.
    Run,
    /// Request graceful daemon shutdown over the control socket.
    Stop,
    /// Query daemon runtime status over the control socket.
    Status,
    /// Install and enable the systemd unit.
    Install,
    /// Disable and remove the systemd unit.
    Uninstall,
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: DaemonCommand, config_path: Option<PathBuf>) -> Result<()> {
    let (path, config) = super::load_config(config_path)?;
    let socket = config.socket_path();

    match command {
        DaemonCommand::Start => {
            start_blocking(config).context("daemon exited with error")?;
        }
        DaemonCommand::Run => match request_run(&socket) {
            Ok(record) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&record)
                        .context("failed to render run record JSON")?
                );
                let success = record
                    .get("success")
                    .and_then(|value| value.as_bool())
                    .unwrap_or(false);
                if !success {
                    let outcome = record
                        .get("outcome")
                        .and_then(|value| value.as_str())
                        .unwrap_or("run failed");
                    anyhow::bail!("{outcome}");
                }
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                anyhow::bail!(
                    "daemon is not running; start it, or use `upkeep run` for a foreground run"
                );
            }
            Err(err) => return Err(err).context("daemon run failed"),
        },
        DaemonCommand::Stop => match request_stop(&socket) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&socket) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket.display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Install => {
            let unit = install_systemd(&config, &path).context("failed to install systemd unit")?;
            println!("installed systemd unit: {}", unit.display());
        }
        DaemonCommand::Uninstall => {
            uninstall_systemd().context("failed to uninstall systemd unit")?;
            println!("removed systemd unit");
        }
        DaemonCommand::Logs(args) => {
            let logs_dir = config.logs_dir();
            if args.stderr_only {
                print_tail(&stderr_log_path(&logs_dir), args.lines)
                    .context("failed to read daemon stderr log")?;
            } else {
                print_tail(&stdout_log_path(&logs_dir), args.lines)
                    .context("failed to read daemon stdout log")?;
                print_tail(&stderr_log_path(&logs_dir), args.lines)
                    .context("failed to read daemon stderr log")?;
            }
        }
    }

    Ok(())
}

fn print_tail(path: &std::path::Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut tail = VecDeque::<String>::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
