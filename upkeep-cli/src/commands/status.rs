//! `upkeep status` — recent runs and daemon liveness.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};
use tabled::{settings::Style, Table, Tabled};

use upkeep_core::config::UpkeepConfig;
use upkeep_core::journal::{self, RunSummary};
use upkeep_daemon::{send_request, DaemonRequest};

/// Arguments for `upkeep status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// How many recent runs to show.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config_path: Option<PathBuf>) -> Result<()> {
        let (_, config) = super::load_config(config_path)?;
        let runs = journal::recent_runs_at(&config.journal_path, self.limit)
            .context("failed to read the run journal")?;
        let daemon = probe_daemon(&config);

        if self.json {
            print_json(&config, daemon, runs)?;
            return Ok(());
        }

        print_table(&config, daemon.as_ref(), &runs);
        Ok(())
    }
}

/// One-shot daemon probe. `status` must stay fast when the daemon is
/// down, so this skips the retry loop `daemon status` uses.
fn probe_daemon(config: &UpkeepConfig) -> Option<Value> {
    let request = DaemonRequest {
        cmd: "status".to_string(),
    };
    match send_request(&config.socket_path(), &request) {
        Ok(response) if response.ok => response.data,
        _ => None,
    }
}

#[derive(Serialize)]
struct StatusJson {
    daemon: Value,
    runs: Vec<RunSummary>,
}

fn print_json(config: &UpkeepConfig, daemon: Option<Value>, runs: Vec<RunSummary>) -> Result<()> {
    let daemon = daemon.unwrap_or_else(|| {
        json!({
            "running": false,
            "socket": config.socket_path().display().to_string(),
        })
    });
    let payload = StatusJson { daemon, runs };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "finished (utc)")]
    finished: String,
    #[tabled(rename = "reason")]
    reason: String,
    #[tabled(rename = "outcome")]
    outcome: String,
    #[tabled(rename = "change")]
    change: String,
    #[tabled(rename = "duration")]
    duration: String,
}

fn print_table(config: &UpkeepConfig, daemon: Option<&Value>, runs: &[RunSummary]) {
    let failed = runs.iter().filter(|run| !run.is_success()).count();
    println!(
        "Upkeep v{} | tree {} | daemon {} | {} run(s), {} failed",
        env!("CARGO_PKG_VERSION"),
        config.tree.display(),
        daemon_label(daemon),
        runs.len(),
        failed,
    );

    if runs.is_empty() {
        println!("No runs recorded yet.");
        println!("Run 'upkeep run' to update now, or 'upkeep daemon start' to keep the tree current.");
        return;
    }

    let separator = "■".repeat(72).bright_black().to_string();
    println!("{separator}");
    println!(
        "Outcomes: {} SUCCEEDED  {} UP-TO-DATE  {} FAILED",
        "■".green().bold(),
        "■".blue().bold(),
        "■".red().bold(),
    );
    println!("{separator}");

    let rows: Vec<RunRow> = runs.iter().map(run_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{separator}");

    if let Some(last) = runs.first() {
        if !last.is_success() {
            println!("Last run failed. Run 'upkeep run' to retry, or 'upkeep logs' for the journal.");
        }
    }
}

fn daemon_label(daemon: Option<&Value>) -> String {
    match daemon {
        Some(status) => {
            let busy = status
                .get("run_in_progress")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if busy {
                "running (update in progress)".green().bold().to_string()
            } else {
                "running".green().bold().to_string()
            }
        }
        None => "not running".red().bold().to_string(),
    }
}

fn run_row(run: &RunSummary) -> RunRow {
    RunRow {
        finished: run.finished_at.clone(),
        reason: run.reason.clone(),
        outcome: run.outcome.clone(),
        change: change_cell(run),
        duration: run
            .duration_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "-".to_string()),
    }
}

fn change_cell(run: &RunSummary) -> String {
    match (run.local.as_deref(), run.remote.as_deref()) {
        (Some(local), Some(remote)) if local != remote => format!("{local} -> {remote}"),
        (Some(local), _) => local.to_string(),
        _ => "-".to_string(),
    }
}
