//! Service restart cycle.
//!
//! Per service, in config order: request a stop, wait out the grace
//! period, kill stragglers, wipe the bytecode cache, request a start,
//! then poll health against a deadline. The poll is bounded; there is no
//! blind fixed sleep between start and verdict.
//!
//! After a cycle where every service came up healthy, the shared update
//! flag is invalidated once, so app processes stop advertising an update
//! that is already deployed.

use std::path::Path;
use std::time::{Duration, Instant};

use upkeep_core::config::TimingConfig;
use upkeep_core::types::{ManagedService, ServiceName, StepResult, StepStatus};

use crate::ops::{ProcessManager, UpdateFlagCache};

/// Restart deadlines, as `Duration`s rather than raw config integers.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTiming {
    pub stop_grace: Duration,
    pub health_timeout: Duration,
    pub health_poll_interval: Duration,
}

impl From<&TimingConfig> for SupervisorTiming {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            stop_grace: Duration::from_secs(timing.stop_grace_secs),
            health_timeout: Duration::from_secs(timing.health_timeout_secs),
            health_poll_interval: Duration::from_millis(timing.health_poll_interval_ms),
        }
    }
}

/// What the restart cycle did, service by service.
#[derive(Debug)]
pub struct RestartReport {
    pub all_healthy: bool,
    pub per_service: Vec<StepResult>,
    pub unhealthy: Vec<ServiceName>,
    /// Present when the update flag was touched after a healthy cycle.
    /// Failure here never flips the cycle itself to unhealthy; the action
    /// is idempotent and the next run retries it.
    pub flag_invalidated: Option<StepResult>,
}

pub struct Supervisor<'a> {
    manager: &'a dyn ProcessManager,
    flag_cache: Option<&'a dyn UpdateFlagCache>,
    timing: SupervisorTiming,
}

impl<'a> Supervisor<'a> {
    pub fn new(
        manager: &'a dyn ProcessManager,
        flag_cache: Option<&'a dyn UpdateFlagCache>,
        timing: SupervisorTiming,
    ) -> Self {
        Self {
            manager,
            flag_cache,
            timing,
        }
    }

    /// Cycle every service in order. An unhealthy service does not stop
    /// the cycle for the ones after it. Zero services is a vacuous
    /// success. Re-running against already-healthy services converges to
    /// the same healthy state.
    pub fn restart_all(&self, services: &[ManagedService]) -> RestartReport {
        let mut per_service = Vec::with_capacity(services.len());
        let mut unhealthy = Vec::new();

        for service in services {
            let result = self.restart_one(service);
            if result.status == StepStatus::Failed {
                tracing::warn!("service {}: {}", service.name, result.detail);
                unhealthy.push(service.name.clone());
            } else {
                tracing::info!(
                    "service {}: healthy ({} ms)",
                    service.name,
                    result.duration_ms
                );
            }
            per_service.push(result);
        }

        let all_healthy = unhealthy.is_empty();
        let flag_invalidated = if all_healthy {
            self.invalidate_flag()
        } else {
            None
        };

        RestartReport {
            all_healthy,
            per_service,
            unhealthy,
            flag_invalidated,
        }
    }

    fn restart_one(&self, service: &ManagedService) -> StepResult {
        let name = format!("restart-{}", service.name);
        let started = Instant::now();

        if let Err(e) = self.manager.request_stop(service) {
            return StepResult::failed(name, format!("stop: {e}"), ms(started));
        }
        std::thread::sleep(self.timing.stop_grace);
        if let Err(e) = self.manager.terminate_stragglers(service) {
            return StepResult::failed(name, format!("straggler kill: {e}"), ms(started));
        }

        let mut cache_note = String::new();
        if let Some(cache_dir) = &service.cache_dir {
            match clear_cache_dir(cache_dir) {
                Ok(removed) => cache_note = format!(", {removed} cache entries cleared"),
                Err(e) => {
                    return StepResult::failed(
                        name,
                        format!("cache wipe at {}: {e}", cache_dir.display()),
                        ms(started),
                    );
                }
            }
        }

        if let Err(e) = self.manager.request_start(service) {
            return StepResult::failed(name, format!("start: {e}"), ms(started));
        }

        match self.poll_health(service) {
            Ok(polls) => StepResult::ok(
                name,
                format!("healthy after {polls} probe(s){cache_note}"),
                ms(started),
            ),
            Err(detail) => StepResult::failed(name, detail, ms(started)),
        }
    }

    /// Probe until the service reports running or the deadline passes.
    /// A probe error counts the same as "not yet up"; the service may
    /// still be binding its socket.
    fn poll_health(&self, service: &ManagedService) -> Result<usize, String> {
        let deadline = Instant::now() + self.timing.health_timeout;
        let mut polls = 0usize;
        loop {
            polls += 1;
            match self.manager.is_running(service) {
                Ok(true) => return Ok(polls),
                Ok(false) => {}
                Err(e) => tracing::debug!("health probe for {}: {e}", service.name),
            }
            if Instant::now() >= deadline {
                return Err(format!(
                    "no healthy signal within {}s ({polls} probe(s))",
                    self.timing.health_timeout.as_secs()
                ));
            }
            std::thread::sleep(self.timing.health_poll_interval);
        }
    }

    fn invalidate_flag(&self) -> Option<StepResult> {
        let cache = self.flag_cache?;
        let started = Instant::now();
        Some(match cache.invalidate() {
            Ok(()) => StepResult::ok("invalidate-update-flag", "update flag removed", ms(started)),
            Err(e) => {
                tracing::warn!("update flag invalidation failed: {e}");
                StepResult::failed("invalidate-update-flag", e.to_string(), ms(started))
            }
        })
    }
}

/// Remove everything inside `dir`, keeping the directory itself.
///
/// A missing directory counts as already clear. Returns the number of
/// top-level entries removed.
pub fn clear_cache_dir(dir: &Path) -> Result<usize, std::io::Error> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut removed = 0usize;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

fn ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
