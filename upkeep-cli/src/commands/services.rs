//! `upkeep services` — managed service operations.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use tabled::{settings::Style, Table, Tabled};

use upkeep_core::config::UpkeepConfig;
use upkeep_engine::RunMode;

#[derive(Subcommand, Debug)]
pub enum ServicesCommand {
    /// Stop, clear caches, and start every managed service (no update).
    Restart,
    /// Show the configured services.
    List,
}

pub fn run(command: ServicesCommand, config_path: Option<PathBuf>) -> Result<()> {
    let (_, config) = super::load_config(config_path)?;
    match command {
        // A restart is a refresh-only run: same lock, same journal, same
        // flag invalidation as a full update.
        ServicesCommand::Restart => super::execute_and_report(&config, RunMode::RefreshOnly),
        ServicesCommand::List => {
            list(&config);
            Ok(())
        }
    }
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "service")]
    name: String,
    #[tabled(rename = "unit")]
    unit: String,
    #[tabled(rename = "stragglers")]
    stragglers: String,
    #[tabled(rename = "cache dir")]
    cache_dir: String,
}

fn list(config: &UpkeepConfig) {
    if config.services.is_empty() {
        println!("No services configured.");
        return;
    }

    let rows: Vec<ServiceRow> = config
        .services
        .iter()
        .map(|service| ServiceRow {
            name: service.name.to_string(),
            unit: service.unit.clone(),
            stragglers: service
                .straggler_pattern
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            cache_dir: service
                .cache_dir
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
