//! systemctl-backed process manager.

use upkeep_core::types::ManagedService;
use upkeep_engine::ops::{OpError, ProcessManager};

use crate::command::{self, Captured};
use crate::error::HostError;

/// Drives managed services through `systemctl` and clears stragglers with
/// `pkill`. Stopping an already-stopped unit exits zero, so the engine's
/// "not running is a valid pre-state" contract holds without special
/// casing here; a unit systemd has never heard of is still an error.
#[derive(Debug)]
pub struct SystemdManager;

impl SystemdManager {
    pub fn new() -> Self {
        Self
    }

    fn systemctl(&self, args: &[&str]) -> Result<Captured, HostError> {
        command::run("systemctl", args, None)
    }

    fn systemctl_checked(&self, args: &[&str]) -> Result<(), OpError> {
        let captured = self.systemctl(args).map_err(op_err)?;
        if captured.status_ok {
            return Ok(());
        }
        Err(OpError(format!(
            "systemctl {} failed ({}): {}",
            args.join(" "),
            captured.status,
            command::join_output(&captured)
        )))
    }
}

impl ProcessManager for SystemdManager {
    fn request_stop(&self, service: &ManagedService) -> Result<(), OpError> {
        self.systemctl_checked(&["stop", &service.unit])
    }

    fn terminate_stragglers(&self, service: &ManagedService) -> Result<(), OpError> {
        let Some(pattern) = &service.straggler_pattern else {
            return Ok(());
        };
        let captured = command::run("pkill", &["-9", "-f", pattern], None).map_err(op_err)?;
        // pkill exits 1 when nothing matched, which after a clean stop is
        // the expected case.
        match captured.code {
            Some(0) | Some(1) => Ok(()),
            _ => Err(OpError(format!(
                "pkill -f {pattern} failed ({}): {}",
                captured.status,
                command::join_output(&captured)
            ))),
        }
    }

    fn request_start(&self, service: &ManagedService) -> Result<(), OpError> {
        self.systemctl_checked(&["start", &service.unit])
    }

    fn is_running(&self, service: &ManagedService) -> Result<bool, OpError> {
        let captured = self
            .systemctl(&["is-active", "--quiet", &service.unit])
            .map_err(op_err)?;
        Ok(captured.status_ok)
    }
}

fn op_err(err: HostError) -> OpError {
    OpError(err.to_string())
}

#[cfg(test)]
mod tests {
    use upkeep_core::types::ServiceName;

    use super::*;

    fn service_without_pattern() -> ManagedService {
        ManagedService {
            name: ServiceName::from("web"),
            unit: "my-app.service".to_string(),
            straggler_pattern: None,
            cache_dir: None,
        }
    }

    #[test]
    fn no_straggler_pattern_means_nothing_to_kill() {
        let manager = SystemdManager::new();
        manager
            .terminate_stragglers(&service_without_pattern())
            .unwrap();
    }
}
