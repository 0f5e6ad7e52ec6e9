//! `upkeep trigger` — ask the daemon for an update soon.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

/// Write the trigger marker the daemon polls for. Presence is the whole
/// protocol; contents are ignored on the other side.
pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    let (_, config) = super::load_config(config_path)?;

    if let Some(parent) = config.trigger_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&config.trigger_path, b"")
        .with_context(|| format!("failed to write {}", config.trigger_path.display()))?;

    println!(
        "{} trigger marker written: {}",
        "✓".green().bold(),
        config.trigger_path.display(),
    );
    println!(
        "A running daemon claims it within {}s.",
        config.timing.trigger_poll_secs,
    );
    Ok(())
}
