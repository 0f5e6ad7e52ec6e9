//! Subcommand implementations.

pub mod check;
pub mod daemon;
pub mod init;
pub mod logs;
pub mod run;
pub mod services;
pub mod status;
pub mod trigger;

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use upkeep_core::config::{self, UpkeepConfig};
use upkeep_core::types::{Revision, RunOutcome, StepStatus, TriggerReason, UpdateRun};
use upkeep_engine::{Orchestrator, RunMode};
use upkeep_host::HostCollaborators;

/// Resolve and load the config every subcommand starts from.
pub(crate) fn load_config(explicit: Option<PathBuf>) -> Result<(PathBuf, UpkeepConfig)> {
    let path = config::resolve_path(explicit).context("could not resolve config path")?;
    let config = config::load(&path)?;
    Ok((path, config))
}

/// Execute one orchestrated run in the foreground and print the result.
///
/// Returns an error when the run completed with a failure outcome, so
/// `main` exits non-zero and shell callers can alert on it.
pub(crate) fn execute_and_report(config: &UpkeepConfig, mode: RunMode) -> Result<()> {
    let host = HostCollaborators::from_config(config)?;
    let orchestrator = Orchestrator::new(config, host.ops());
    let run = orchestrator.execute(TriggerReason::Manual, mode)?;
    print_run(&run);
    if !run.outcome.is_success() {
        anyhow::bail!("run failed: {}", run.outcome);
    }
    Ok(())
}

fn print_run(run: &UpdateRun) {
    for step in &run.steps {
        let glyph = match step.status {
            StepStatus::Ok => "✓".green().to_string(),
            StepStatus::Skipped => "·".bright_black().to_string(),
            StepStatus::Failed => "✗".red().bold().to_string(),
        };
        println!(
            "  {glyph} {} ({} ms): {}",
            step.name, step.duration_ms, step.detail
        );
    }

    match &run.outcome {
        RunOutcome::UpToDate => println!(
            "{} already up to date at {}",
            "✓".green().bold(),
            short_or(&run.local, "HEAD"),
        ),
        RunOutcome::Succeeded => match (&run.local, &run.remote) {
            (Some(local), Some(remote)) => println!(
                "{} updated {} -> {} in {} ms",
                "✓".green().bold(),
                local.short(),
                remote.short(),
                run.duration_ms,
            ),
            // Refresh-only runs never look at revisions.
            _ => println!(
                "{} services restarted in {} ms",
                "✓".green().bold(),
                run.duration_ms,
            ),
        },
        outcome => println!("{} {}", "✗".red().bold(), outcome),
    }
}

fn short_or<'a>(revision: &'a Option<Revision>, fallback: &'a str) -> &'a str {
    revision.as_ref().map(Revision::short).unwrap_or(fallback)
}
