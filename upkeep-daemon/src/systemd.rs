//! systemd unit management for the daemon.
//!
//! `upkeep daemon install` writes `/etc/systemd/system/upkeepd.service`
//! pointing at the current binary and enables it. The daemon itself
//! supplies the boot-delayed and daily runs, so one unit is all the
//! scheduling the host needs.

use std::path::{Path, PathBuf};
use std::process::Command;

use upkeep_core::config::UpkeepConfig;

use crate::error::{io_err, DaemonError};
use crate::paths::{self, DAEMON_UNIT};

/// Render the daemon's systemd unit.
pub fn generate_unit(binary: &Path, config_path: &Path, logs_dir: &Path) -> String {
    format!(
        "[Unit]\n\
         Description=upkeep deployment update daemon\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         ExecStart={binary} daemon start --config {config}\n\
         Restart=always\n\
         RestartSec=5\n\
         StandardOutput=append:{stdout}\n\
         StandardError=append:{stderr}\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        binary = binary.display(),
        config = config_path.display(),
        stdout = paths::stdout_log_path(logs_dir).display(),
        stderr = paths::stderr_log_path(logs_dir).display(),
    )
}

/// Write the unit, reload systemd, enable and (re)start the daemon.
/// Returns the installed unit path.
pub fn install(config: &UpkeepConfig, config_path: &Path) -> Result<PathBuf, DaemonError> {
    ensure_linux()?;

    let binary = std::env::current_exe().map_err(|e| io_err("current-exe", e))?;
    let logs = config.logs_dir();
    if !logs.exists() {
        std::fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }

    let unit_path = paths::system_unit_path();
    let unit = generate_unit(&binary, config_path, &logs);
    std::fs::write(&unit_path, unit).map_err(|e| io_err(&unit_path, e))?;

    run_systemctl(vec!["daemon-reload".to_string()], false)?;
    run_systemctl(vec!["enable".to_string(), DAEMON_UNIT.to_string()], false)?;
    run_systemctl(vec!["restart".to_string(), DAEMON_UNIT.to_string()], false)?;

    Ok(unit_path)
}

/// Stop and disable the daemon, remove its unit, reload systemd.
pub fn uninstall() -> Result<(), DaemonError> {
    ensure_linux()?;

    // The unit may never have been installed; disable failures are fine.
    run_systemctl(
        vec![
            "disable".to_string(),
            "--now".to_string(),
            DAEMON_UNIT.to_string(),
        ],
        true,
    )?;

    let unit_path = paths::system_unit_path();
    match std::fs::remove_file(&unit_path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(&unit_path, err)),
    }

    run_systemctl(vec!["daemon-reload".to_string()], false)?;
    Ok(())
}

fn run_systemctl(args: Vec<String>, ignore_failure: bool) -> Result<(), DaemonError> {
    let output = Command::new("systemctl")
        .args(&args)
        .output()
        .map_err(|e| io_err("systemctl", e))?;

    if !output.status.success() && !ignore_failure {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DaemonError::Systemd(format!(
            "systemctl {} failed (status {}): {} {}",
            args.join(" "),
            output.status,
            stdout.trim(),
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn ensure_linux() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn ensure_linux() -> Result<(), DaemonError> {
    Err(DaemonError::Systemd(
        "daemon install requires Linux with systemd".to_string(),
    ))
}
