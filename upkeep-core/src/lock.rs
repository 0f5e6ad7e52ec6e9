//! Exclusive run lock.
//!
//! At most one run may execute at a time, whether it came from the CLI,
//! the daemon schedule, or the trigger poller. The lock is a file created
//! with `O_CREAT | O_EXCL`; holding the guard means owning the file, and
//! dropping the guard removes it on every exit path.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use crate::error::{io_err, CoreError};

/// Guard over the run lock file. Acquire with [`RunLock::acquire`]; the
/// file is removed when the guard drops.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock, failing fast with [`CoreError::LockHeld`] when some
    /// other run owns it. There is no waiting and no retry here; callers
    /// that want queueing do it above this layer.
    pub fn acquire(path: &Path) -> Result<RunLock, CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
        }
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut file) => {
                let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                let _ = writeln!(file, "pid={} acquired={stamp}", std::process::id());
                Ok(RunLock {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(CoreError::LockHeld {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(io_err(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
