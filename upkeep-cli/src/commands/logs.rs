//! `upkeep logs` — journal tail.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use upkeep_core::journal;

/// Arguments for `upkeep logs`.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Number of trailing journal lines to show.
    #[arg(long, default_value_t = 50)]
    pub lines: usize,
}

impl LogsArgs {
    pub fn run(self, config_path: Option<PathBuf>) -> Result<()> {
        let (_, config) = super::load_config(config_path)?;
        let lines = journal::tail_at(&config.journal_path, self.lines)
            .context("failed to read the run journal")?;

        if lines.is_empty() {
            println!("journal is empty: {}", config.journal_path.display());
            return Ok(());
        }
        for line in lines {
            println!("{line}");
        }
        Ok(())
    }
}
