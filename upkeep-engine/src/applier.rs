//! The five-step update pipeline.
//!
//! Step order is fixed: snapshot local edits, integrate the remote,
//! refresh dependencies, apply migrations, refresh assets. Dependency and
//! asset failures degrade the run but let it continue; snapshot,
//! integration, and migration failures halt it at that step. Recorded
//! results are always a prefix of the declared sequence.

use std::time::Instant;

use upkeep_core::types::{ApplyStep, StepResult, StepStatus};

use crate::ops::{AssetPipeline, DependencyInstaller, MigrationRunner, SourceError, SourceTree};

/// Everything the pipeline attempted, plus the step that halted it, if any.
#[derive(Debug)]
pub struct ApplyReport {
    pub steps: Vec<StepResult>,
    pub halted_at: Option<ApplyStep>,
}

pub struct Applier<'a> {
    pub tree: &'a dyn SourceTree,
    pub dependencies: &'a dyn DependencyInstaller,
    pub migrations: &'a dyn MigrationRunner,
    pub assets: &'a dyn AssetPipeline,
}

impl<'a> Applier<'a> {
    /// Run the pipeline against a tree already known to be behind.
    ///
    /// `snapshot_label` names the stash entry if local edits need saving,
    /// so an operator can find and restore them later.
    pub fn apply(&self, snapshot_label: &str) -> ApplyReport {
        let mut steps: Vec<StepResult> = Vec::new();

        if record(&mut steps, self.snapshot(snapshot_label)) == StepStatus::Failed {
            return ApplyReport {
                steps,
                halted_at: Some(ApplyStep::Snapshot),
            };
        }

        if record(&mut steps, self.integrate()) == StepStatus::Failed {
            return ApplyReport {
                steps,
                halted_at: Some(ApplyStep::Integrate),
            };
        }

        // A dependency failure leaves the run degraded but moving; the new
        // code is already in place and stopping here helps nobody.
        record(
            &mut steps,
            command_step(ApplyStep::Dependencies, || self.dependencies.refresh()),
        );

        if record(
            &mut steps,
            command_step(ApplyStep::Migrations, || self.migrations.apply_pending()),
        ) == StepStatus::Failed
        {
            return ApplyReport {
                steps,
                halted_at: Some(ApplyStep::Migrations),
            };
        }

        record(
            &mut steps,
            command_step(ApplyStep::Assets, || self.assets.rebuild()),
        );

        ApplyReport {
            steps,
            halted_at: None,
        }
    }

    /// Step 1. Local edits are moved aside recoverably, never discarded.
    /// A clean tree skips; a failed save halts before integration runs.
    fn snapshot(&self, label: &str) -> StepResult {
        let step = ApplyStep::Snapshot;
        let started = Instant::now();
        match self.tree.has_local_edits() {
            Ok(false) => StepResult::skipped(step.name(), "working tree clean"),
            Ok(true) => match self.tree.snapshot_edits(label) {
                Ok(()) => StepResult::ok(
                    step.name(),
                    format!("local edits saved as {label}"),
                    ms(started),
                ),
                Err(e) => StepResult::failed(step.name(), e.to_string(), ms(started)),
            },
            Err(e) => StepResult::failed(step.name(), e.to_string(), ms(started)),
        }
    }

    /// Step 2. Fast-forward only; divergence is reported, never forced over.
    fn integrate(&self) -> StepResult {
        let step = ApplyStep::Integrate;
        let started = Instant::now();
        match self.tree.fast_forward() {
            Ok(()) => StepResult::ok(step.name(), "fast-forwarded to remote head", ms(started)),
            Err(SourceError::Diverged(detail)) => StepResult::failed(
                step.name(),
                format!("integration conflict: {detail}"),
                ms(started),
            ),
            Err(e) => StepResult::failed(step.name(), e.to_string(), ms(started)),
        }
    }
}

fn command_step<F>(step: ApplyStep, run: F) -> StepResult
where
    F: FnOnce() -> Result<String, crate::ops::OpError>,
{
    let started = Instant::now();
    match run() {
        Ok(detail) => StepResult::ok(step.name(), detail, ms(started)),
        Err(e) => StepResult::failed(step.name(), e.to_string(), ms(started)),
    }
}

/// Log and collect one result, handing back its status for halt decisions.
fn record(steps: &mut Vec<StepResult>, result: StepResult) -> StepStatus {
    match result.status {
        StepStatus::Ok => {
            tracing::info!("step {}: ok ({} ms)", result.name, result.duration_ms)
        }
        StepStatus::Skipped => tracing::debug!("step {}: skipped, {}", result.name, result.detail),
        StepStatus::Failed => tracing::warn!("step {}: failed, {}", result.name, result.detail),
    }
    let status = result.status;
    steps.push(result);
    status
}

fn ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockStep, MockTree};

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn step_names(report: &ApplyReport) -> Vec<&str> {
        report.steps.iter().map(|s| s.name.as_str()).collect()
    }

    fn assert_prefix_of_sequence(report: &ApplyReport) {
        let declared: Vec<&str> = ApplyStep::SEQUENCE.iter().map(|s| s.name()).collect();
        let got = step_names(report);
        assert_eq!(&declared[..got.len()], got.as_slice(), "not a prefix: {got:?}");
    }

    #[test]
    fn clean_tree_runs_all_five_steps() {
        init_logs();
        let tree = MockTree::behind();
        let deps = MockStep::passing("42 packages up to date");
        let migrations = MockStep::passing("no pending migrations");
        let assets = MockStep::passing("118 files copied");
        let applier = Applier {
            tree: &tree,
            dependencies: &deps,
            migrations: &migrations,
            assets: &assets,
        };

        let report = applier.apply("upkeep-20260101T000000Z");

        assert!(report.halted_at.is_none());
        assert_eq!(report.steps.len(), 5);
        assert_prefix_of_sequence(&report);
        assert_eq!(report.steps[0].status, StepStatus::Skipped);
        assert!(report.steps[1..].iter().all(|s| s.status == StepStatus::Ok));
        assert!(tree.snapshots.borrow().is_empty());
        assert_eq!(*tree.fast_forwards.borrow(), 1);
    }

    #[test]
    fn dirty_tree_snapshots_before_integrating() {
        let mut tree = MockTree::behind();
        tree.dirty = true;
        let deps = MockStep::passing("ok");
        let migrations = MockStep::passing("ok");
        let assets = MockStep::passing("ok");
        let applier = Applier {
            tree: &tree,
            dependencies: &deps,
            migrations: &migrations,
            assets: &assets,
        };

        let report = applier.apply("upkeep-20260101T000000Z");

        assert_eq!(report.steps[0].status, StepStatus::Ok);
        assert_eq!(
            tree.snapshots.borrow().as_slice(),
            ["upkeep-20260101T000000Z"]
        );
        assert!(report.steps[0].detail.contains("upkeep-20260101T000000Z"));
    }

    #[test]
    fn failed_snapshot_halts_before_any_integration() {
        let mut tree = MockTree::behind();
        tree.dirty = true;
        tree.snapshot_error = Some("stash failed: unmerged entries");
        let deps = MockStep::passing("ok");
        let migrations = MockStep::passing("ok");
        let assets = MockStep::passing("ok");
        let applier = Applier {
            tree: &tree,
            dependencies: &deps,
            migrations: &migrations,
            assets: &assets,
        };

        let report = applier.apply("label");

        assert_eq!(report.halted_at, Some(ApplyStep::Snapshot));
        assert_eq!(report.steps.len(), 1);
        assert_eq!(*tree.fast_forwards.borrow(), 0, "must not integrate over unsaved edits");
        assert_eq!(deps.call_count(), 0);
        assert_prefix_of_sequence(&report);
    }

    #[test]
    fn diverged_history_halts_at_step_two() {
        let mut tree = MockTree::behind();
        tree.diverged = Some("not possible to fast-forward");
        let deps = MockStep::passing("ok");
        let migrations = MockStep::passing("ok");
        let assets = MockStep::passing("ok");
        let applier = Applier {
            tree: &tree,
            dependencies: &deps,
            migrations: &migrations,
            assets: &assets,
        };

        let report = applier.apply("label");

        assert_eq!(report.halted_at, Some(ApplyStep::Integrate));
        assert_eq!(report.steps.len(), 2);
        assert!(report.steps[1].detail.contains("integration conflict"));
        assert_eq!(deps.call_count(), 0);
        assert_eq!(migrations.call_count(), 0);
        assert_eq!(assets.call_count(), 0);
    }

    #[test]
    fn dependency_failure_degrades_but_continues() {
        init_logs();
        let tree = MockTree::behind();
        let deps = MockStep::failing("pip exited 1: no matching distribution");
        let migrations = MockStep::passing("applied 2 migrations");
        let assets = MockStep::passing("ok");
        let applier = Applier {
            tree: &tree,
            dependencies: &deps,
            migrations: &migrations,
            assets: &assets,
        };

        let report = applier.apply("label");

        assert!(report.halted_at.is_none());
        assert_eq!(report.steps.len(), 5);
        let failed: Vec<&str> = report
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(failed, ["refresh-dependencies"]);
        assert_eq!(migrations.call_count(), 1);
        assert_eq!(assets.call_count(), 1);
    }

    #[test]
    fn migration_failure_halts_before_assets() {
        let tree = MockTree::behind();
        let deps = MockStep::passing("ok");
        let migrations = MockStep::failing("relation \"users\" already exists");
        let assets = MockStep::passing("ok");
        let applier = Applier {
            tree: &tree,
            dependencies: &deps,
            migrations: &migrations,
            assets: &assets,
        };

        let report = applier.apply("label");

        assert_eq!(report.halted_at, Some(ApplyStep::Migrations));
        assert_eq!(report.steps.len(), 4);
        assert_eq!(assets.call_count(), 0);
        assert_prefix_of_sequence(&report);
    }

    #[test]
    fn asset_failure_degrades_the_final_step() {
        let tree = MockTree::behind();
        let deps = MockStep::passing("ok");
        let migrations = MockStep::passing("ok");
        let assets = MockStep::failing("collectstatic exited 1");
        let applier = Applier {
            tree: &tree,
            dependencies: &deps,
            migrations: &migrations,
            assets: &assets,
        };

        let report = applier.apply("label");

        assert!(report.halted_at.is_none());
        assert_eq!(report.steps.len(), 5);
        assert_eq!(report.steps[4].status, StepStatus::Failed);
    }
}
