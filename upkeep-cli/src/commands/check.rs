//! `upkeep check` — read-only update probe.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use upkeep_engine::checker;
use upkeep_host::GitSourceTree;

/// Arguments for `upkeep check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    /// Exit code is 0 whether or not an update is pending; only a failed
    /// check (unreachable remote, not a repo) exits non-zero.
    pub fn run(self, config_path: Option<PathBuf>) -> Result<()> {
        let (_, config) = super::load_config(config_path)?;
        let tree = GitSourceTree::from_config(&config);
        let report = checker::check(&tree).context("update check failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to serialize check JSON")?
            );
            return Ok(());
        }

        if report.up_to_date {
            println!(
                "{} up to date at {}",
                "✓".green().bold(),
                report.local.short(),
            );
        } else {
            println!(
                "{} update available: {} -> {}",
                "⇡".yellow().bold(),
                report.local.short(),
                report.remote.short(),
            );
            println!("Run 'upkeep run' to apply it now, or 'upkeep trigger' to queue it for the daemon.");
        }
        Ok(())
    }
}
