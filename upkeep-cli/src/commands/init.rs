//! `upkeep init` — adopt a deployment tree.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use upkeep_core::config;

/// Arguments for `upkeep init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Deployment tree to adopt (the app's git checkout).
    pub tree: PathBuf,
}

impl InitArgs {
    pub fn run(self, config_path: Option<PathBuf>) -> Result<()> {
        let tree = self
            .tree
            .canonicalize()
            .with_context(|| format!("tree not found: {}", self.tree.display()))?;
        let path = config::resolve_path(config_path).context("could not resolve config path")?;

        if path.exists() {
            let existing = config::load(&path)?;
            println!("config already present: {}", path.display());
            println!("  tree: {}", existing.tree.display());
            return Ok(());
        }

        let config = config::init_at(&path, &tree)?;
        println!("{} Adopted {}", "✓".green().bold(), tree.display());
        println!("  Saved to: {}", path.display());
        println!(
            "  Tracking: {}/{} with {} managed service(s)",
            config.remote,
            config.branch,
            config.services.len(),
        );
        println!("Edit the config to match your app, then try 'upkeep check'.");
        Ok(())
    }
}
