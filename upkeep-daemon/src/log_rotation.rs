//! Size-based rotation for the daemon's own log files.
//!
//! `upkeepd.log` and `upkeepd-err.log` roll over at 10 MiB into numbered
//! copies, newest first: `upkeepd.log.1` … `upkeepd.log.5`. The run
//! journal is append-only forever and is never touched here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths;

/// Threshold above which a log file is rotated (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated copies kept per log file.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if its size reaches `max_bytes`.
///
/// The oldest copy is deleted, `<name>.<n>` shifts to `<name>.<n+1>`, the
/// live file becomes `<name>.1`, and a fresh empty file replaces it so the
/// daemon always has a writable path. Returns whether a rotation happened;
/// a missing file is simply not rotated.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = rotated_path(log_path, n);
        if src.exists() {
            fs::rename(&src, rotated_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))?;

    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Rotate both daemon logs under `logs_dir`. A failure on one file is
/// logged and does not block the other.
pub fn rotate_logs(logs_dir: &Path) {
    let stdout_log = paths::stdout_log_path(logs_dir);
    let stderr_log = paths::stderr_log_path(logs_dir);

    for log_path in [&stdout_log, &stderr_log] {
        match rotate_if_needed(log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `upkeepd.log` → `upkeepd.log.<n>`
fn rotated_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(paths::DAEMON_STDOUT_LOG);
    base.with_file_name(format!("{name}.{n}"))
}
