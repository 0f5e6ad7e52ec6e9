//! `upkeep run` — one foreground update cycle.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use upkeep_engine::RunMode;

/// Arguments for `upkeep run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip the update steps; only restart the managed services.
    #[arg(long)]
    pub refresh_only: bool,
}

impl RunArgs {
    pub fn run(self, config_path: Option<PathBuf>) -> Result<()> {
        let (_, config) = super::load_config(config_path)?;
        let mode = if self.refresh_only {
            RunMode::RefreshOnly
        } else {
            RunMode::Normal
        };
        super::execute_and_report(&config, mode)
    }
}
