//! Daemon file names and locations. The socket and lock paths come from
//! the config; only the daemon's own artifacts are named here.

use std::path::{Path, PathBuf};

/// systemd unit the daemon installs under.
pub const DAEMON_UNIT: &str = "upkeepd.service";

pub const DAEMON_STDOUT_LOG: &str = "upkeepd.log";
pub const DAEMON_STDERR_LOG: &str = "upkeepd-err.log";

pub fn stdout_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(DAEMON_STDERR_LOG)
}

/// `/etc/systemd/system/upkeepd.service`
pub fn system_unit_path() -> PathBuf {
    PathBuf::from("/etc/systemd/system").join(DAEMON_UNIT)
}
