//! Whole-run driver shared by `upkeep run` and the daemon.
//!
//! A run is: journal the start, take the exclusive lock, check, and then
//! either stop (already current), apply and supervise, or supervise alone
//! for a forced refresh. Every run that gets past the check ends in
//! exactly one of `up-to-date`, `succeeded`, `failed-at-step N`, or
//! `failed-at-service-restart`; earlier aborts surface as errors.

use std::time::Instant;

use chrono::{DateTime, Utc};

use upkeep_core::config::UpkeepConfig;
use upkeep_core::journal::Journal;
use upkeep_core::lock::RunLock;
use upkeep_core::types::{RunOutcome, StepResult, TriggerReason, UpdateRun};

use crate::applier::{Applier, ApplyReport};
use crate::checker::check;
use crate::error::EngineError;
use crate::ops::{
    AssetPipeline, DependencyInstaller, MigrationRunner, ProcessManager, SourceTree,
    UpdateFlagCache,
};
use crate::supervisor::{Supervisor, SupervisorTiming};

/// Concrete collaborators for one run, borrowed from the host layer.
pub struct Collaborators<'a> {
    pub tree: &'a dyn SourceTree,
    pub dependencies: &'a dyn DependencyInstaller,
    pub migrations: &'a dyn MigrationRunner,
    pub assets: &'a dyn AssetPipeline,
    pub manager: &'a dyn ProcessManager,
    pub flag_cache: Option<&'a dyn UpdateFlagCache>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Check, apply if behind, then restart services.
    Normal,
    /// Skip check and apply; cycle the services as-is.
    RefreshOnly,
}

pub struct Orchestrator<'a> {
    config: &'a UpkeepConfig,
    ops: Collaborators<'a>,
    journal: Journal,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a UpkeepConfig, ops: Collaborators<'a>) -> Self {
        let journal = Journal::new(&config.journal_path);
        Self {
            config,
            ops,
            journal,
        }
    }

    /// Run once. The lock is held from before the first step until this
    /// returns, and released on every path out.
    pub fn execute(&self, reason: TriggerReason, mode: RunMode) -> Result<UpdateRun, EngineError> {
        let started_at = Utc::now();
        let started = Instant::now();
        self.journal.run_started(reason)?;
        tracing::info!("run started ({reason})");

        let _lock = match RunLock::acquire(&self.config.lock_path()) {
            Ok(lock) => lock,
            Err(e) => {
                let _ = self.journal.run_aborted(reason, &e.to_string());
                return Err(e.into());
            }
        };

        match mode {
            RunMode::Normal => self.update_run(reason, started_at, started),
            RunMode::RefreshOnly => Ok(self.refresh_run(reason, started_at, started)),
        }
    }

    fn update_run(
        &self,
        reason: TriggerReason,
        started_at: DateTime<Utc>,
        started: Instant,
    ) -> Result<UpdateRun, EngineError> {
        let report = match check(self.ops.tree) {
            Ok(report) => report,
            Err(e) => {
                let _ = self.journal.run_aborted(reason, &e.to_string());
                return Err(e);
            }
        };

        if report.up_to_date {
            let run = UpdateRun {
                started_at,
                reason,
                local: Some(report.local),
                remote: Some(report.remote),
                steps: vec![],
                outcome: RunOutcome::UpToDate,
                duration_ms: ms(started),
            };
            self.finish(&run);
            return Ok(run);
        }

        tracing::info!(
            "applying update {} -> {}",
            report.local.short(),
            report.remote.short()
        );
        let applier = Applier {
            tree: self.ops.tree,
            dependencies: self.ops.dependencies,
            migrations: self.ops.migrations,
            assets: self.ops.assets,
        };
        let label = format!("upkeep-{}", started_at.format("%Y%m%dT%H%M%SZ"));
        let ApplyReport {
            mut steps,
            halted_at,
        } = applier.apply(&label);
        for step in &steps {
            self.log_step(step);
        }

        let outcome = match halted_at {
            Some(halted) => RunOutcome::FailedAtStep {
                step: halted.position(),
                name: halted.name().to_string(),
            },
            None => self.supervise(&mut steps),
        };

        let run = UpdateRun {
            started_at,
            reason,
            local: Some(report.local),
            remote: Some(report.remote),
            steps,
            outcome,
            duration_ms: ms(started),
        };
        self.finish(&run);
        Ok(run)
    }

    fn refresh_run(
        &self,
        reason: TriggerReason,
        started_at: DateTime<Utc>,
        started: Instant,
    ) -> UpdateRun {
        tracing::info!("service refresh requested; skipping check and apply");
        let mut steps = Vec::new();
        let outcome = self.supervise(&mut steps);
        let run = UpdateRun {
            started_at,
            reason,
            local: None,
            remote: None,
            steps,
            outcome,
            duration_ms: ms(started),
        };
        self.finish(&run);
        run
    }

    fn supervise(&self, steps: &mut Vec<StepResult>) -> RunOutcome {
        let supervisor = Supervisor::new(
            self.ops.manager,
            self.ops.flag_cache,
            SupervisorTiming::from(&self.config.timing),
        );
        let report = supervisor.restart_all(&self.config.services);
        for step in &report.per_service {
            self.log_step(step);
        }
        steps.extend(report.per_service);
        if let Some(flag_step) = report.flag_invalidated {
            self.log_step(&flag_step);
            steps.push(flag_step);
        }
        if report.all_healthy {
            RunOutcome::Succeeded
        } else {
            RunOutcome::FailedAtServiceRestart {
                services: report.unhealthy,
            }
        }
    }

    // Journal writes after the lock is held are best-effort; a failure is
    // logged and the run carries on.
    fn log_step(&self, step: &StepResult) {
        if let Err(e) = self.journal.step(step) {
            tracing::warn!("journal write failed: {e}");
        }
    }

    fn finish(&self, run: &UpdateRun) {
        tracing::info!("run finished: {}", run.outcome);
        if let Err(e) = self.journal.run_finished(run) {
            tracing::warn!("journal write failed: {e}");
        }
    }
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
    use crate::mock::{service, MockFlagCache, MockManager, MockStep, MockTree};
    use tempfile::TempDir;
    use upkeep_core::config::{StepCommands, TimingConfig};
    use upkeep_core::journal;

    struct Fixture {
        tree: MockTree,
        deps: MockStep,
        migrations: MockStep,
        assets: MockStep,
        manager: MockManager,
        flag_cache: Option<MockFlagCache>,
    }

    impl Fixture {
        fn behind() -> Self {
            Self {
                tree: MockTree::behind(),
                deps: MockStep::passing("dependencies current"),
                migrations: MockStep::passing("no pending migrations"),
                assets: MockStep::passing("assets rebuilt"),
                manager: MockManager::healthy(),
                flag_cache: None,
            }
        }

        fn ops(&self) -> Collaborators<'_> {
            Collaborators {
                tree: &self.tree,
                dependencies: &self.deps,
                migrations: &self.migrations,
                assets: &self.assets,
                manager: &self.manager,
                flag_cache: self
                    .flag_cache
                    .as_ref()
                    .map(|c| c as &dyn UpdateFlagCache),
            }
        }
    }

    fn test_config(root: &TempDir) -> UpkeepConfig {
        UpkeepConfig {
            tree: root.path().join("tree"),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            state_dir: root.path().join("state"),
            journal_path: root.path().join("logs").join("upkeep.log"),
            trigger_path: root.path().join("tmp").join("update-trigger"),
            update_flag_path: None,
            services: vec![service("web")],
            commands: StepCommands::default(),
            timing: TimingConfig {
                stop_grace_secs: 0,
                health_timeout_secs: 1,
                health_poll_interval_ms: 1,
                trigger_poll_secs: 1,
                boot_delay_secs: 0,
                schedule_interval_secs: 3600,
            },
        }
    }

    fn journal_lines(config: &UpkeepConfig) -> Vec<String> {
        journal::tail_at(&config.journal_path, 100).expect("tail")
    }

    #[test]
    fn up_to_date_touches_nothing() {
        let root = TempDir::new().expect("tempdir");
        let config = test_config(&root);
        let mut fixture = Fixture::behind();
        fixture.tree = MockTree::at("same", "same");

        let run = Orchestrator::new(&config, fixture.ops())
            .execute(TriggerReason::Scheduled, RunMode::Normal)
            .expect("run");

        assert_eq!(run.outcome, RunOutcome::UpToDate);
        assert!(run.steps.is_empty());
        assert_eq!(fixture.deps.call_count(), 0);
        assert!(fixture.manager.stops.borrow().is_empty());
        let lines = journal_lines(&config);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("outcome=up-to-date"));
    }

    #[test]
    fn full_run_applies_then_restarts() {
        let root = TempDir::new().expect("tempdir");
        let config = test_config(&root);
        let fixture = Fixture::behind();

        let run = Orchestrator::new(&config, fixture.ops())
            .execute(TriggerReason::TriggerFile, RunMode::Normal)
            .expect("run");

        assert_eq!(run.outcome, RunOutcome::Succeeded);
        assert!(run.outcome.is_success());
        // 5 pipeline steps + 1 service restart
        assert_eq!(run.steps.len(), 6);
        assert_eq!(run.steps[5].name, "restart-web");
        assert_eq!(run.local, Some("1111111".into()));
        assert_eq!(run.remote, Some("2222222".into()));
        let lines = journal_lines(&config);
        assert!(lines[0].contains("run started reason=trigger-file"));
        assert!(lines.last().unwrap().contains("outcome=succeeded"));
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn network_failure_aborts_with_journal_note() {
        let root = TempDir::new().expect("tempdir");
        let config = test_config(&root);
        let mut fixture = Fixture::behind();
        fixture.tree.fetch_network_error = Some("could not resolve host");

        let err = Orchestrator::new(&config, fixture.ops())
            .execute(TriggerReason::Scheduled, RunMode::Normal)
            .unwrap_err();

        assert!(matches!(err, EngineError::Network(_)));
        assert_eq!(fixture.deps.call_count(), 0, "no step may run after a failed check");
        let lines = journal_lines(&config);
        assert!(lines[1].contains("run aborted"));
        assert!(lines[1].contains("could not resolve host"));
        assert!(!config.lock_path().exists(), "lock released on abort");
    }

    #[test]
    fn migration_failure_skips_service_restart() {
        let root = TempDir::new().expect("tempdir");
        let config = test_config(&root);
        let mut fixture = Fixture::behind();
        fixture.migrations = MockStep::failing("column already exists");

        let run = Orchestrator::new(&config, fixture.ops())
            .execute(TriggerReason::Manual, RunMode::Normal)
            .expect("run");

        assert_eq!(
            run.outcome,
            RunOutcome::FailedAtStep {
                step: 4,
                name: "apply-migrations".to_string()
            }
        );
        assert!(fixture.manager.stops.borrow().is_empty(), "services must stay up");
        assert!(
            run.steps.iter().all(|s| !s.name.starts_with("restart-")),
            "no restart results may appear after a fatal step"
        );
        assert!(!config.lock_path().exists(), "lock released on failure");
    }

    #[test]
    fn concurrent_run_fails_fast_on_lock() {
        let root = TempDir::new().expect("tempdir");
        let config = test_config(&root);
        let fixture = Fixture::behind();

        let _held = RunLock::acquire(&config.lock_path()).expect("hold lock");
        let err = Orchestrator::new(&config, fixture.ops())
            .execute(TriggerReason::Manual, RunMode::Normal)
            .unwrap_err();

        assert!(err.to_string().contains("another run holds the lock"));
        assert_eq!(*fixture.tree.fetches.borrow(), 0, "no work before the lock");
        let lines = journal_lines(&config);
        assert!(lines[1].contains("run aborted"));
    }

    #[test]
    fn refresh_only_skips_check_and_apply() {
        let root = TempDir::new().expect("tempdir");
        let config = test_config(&root);
        let fixture = Fixture::behind();

        let run = Orchestrator::new(&config, fixture.ops())
            .execute(TriggerReason::Manual, RunMode::RefreshOnly)
            .expect("run");

        assert_eq!(run.outcome, RunOutcome::Succeeded);
        assert_eq!(*fixture.tree.fetches.borrow(), 0);
        assert_eq!(*fixture.tree.fast_forwards.borrow(), 0);
        assert_eq!(run.local, None);
        let names: Vec<&str> = run.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["restart-web"]);
    }

    #[test]
    fn unhealthy_restart_names_the_service() {
        let root = TempDir::new().expect("tempdir");
        let config = test_config(&root);
        let mut fixture = Fixture::behind();
        fixture.manager.never_healthy = vec!["web"];

        let run = Orchestrator::new(&config, fixture.ops())
            .execute(TriggerReason::Scheduled, RunMode::Normal)
            .expect("run");

        assert_eq!(
            run.outcome,
            RunOutcome::FailedAtServiceRestart {
                services: vec!["web".into()]
            }
        );
        assert!(!run.outcome.is_success());
        let lines = journal_lines(&config);
        assert!(lines
            .last()
            .unwrap()
            .contains("outcome=failed-at-service-restart services=web"));
    }

    #[test]
    fn flag_invalidation_recorded_after_success() {
        let root = TempDir::new().expect("tempdir");
        let config = test_config(&root);
        let mut fixture = Fixture::behind();
        fixture.flag_cache = Some(MockFlagCache::default());

        let run = Orchestrator::new(&config, fixture.ops())
            .execute(TriggerReason::Scheduled, RunMode::Normal)
            .expect("run");

        assert_eq!(run.outcome, RunOutcome::Succeeded);
        assert_eq!(run.steps.last().unwrap().name, "invalidate-update-flag");
        assert_eq!(
            *fixture.flag_cache.as_ref().unwrap().invalidations.borrow(),
            1
        );
    }

    #[test]
    fn lock_released_after_successful_run() {
        let root = TempDir::new().expect("tempdir");
        let config = test_config(&root);
        let fixture = Fixture::behind();

        Orchestrator::new(&config, fixture.ops())
            .execute(TriggerReason::Manual, RunMode::Normal)
            .expect("run");

        assert!(!config.lock_path().exists());
        let _reacquire = RunLock::acquire(&config.lock_path()).expect("reacquire");
    }
}
