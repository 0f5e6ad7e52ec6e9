//! File-based update flag.

use std::path::PathBuf;

use upkeep_engine::ops::{OpError, UpdateFlagCache};

/// The application reads a marker file to decide whether to show its
/// "update available" banner. Removing the file after a successful run
/// makes it recompute on next request.
#[derive(Debug)]
pub struct FileFlagCache {
    path: PathBuf,
}

impl FileFlagCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UpdateFlagCache for FileFlagCache {
    fn invalidate(&self) -> Result<(), OpError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("removed update flag {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(OpError(format!(
                "remove update flag {}: {err}",
                self.path.display()
            ))),
        }
    }
}
