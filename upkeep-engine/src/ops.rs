//! Seams between the engine and the host system.
//!
//! The engine never shells out or touches a service manager itself; it
//! drives these traits. upkeep-host provides the real implementations,
//! tests provide scripted ones.

use thiserror::Error;

use upkeep_core::types::{ManagedService, Revision};

/// Failure reading or advancing the source tree.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The remote could not be reached. Nothing was changed.
    #[error("remote unreachable: {0}")]
    Network(String),

    /// Local and remote histories can no longer fast-forward.
    #[error("histories diverged: {0}")]
    Diverged(String),

    #[error("{0}")]
    Other(String),
}

/// Opaque failure from a configured step command or service action.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct OpError(pub String);

/// The deployment checkout.
pub trait SourceTree {
    /// Refresh remote tracking refs. Must not touch the working tree.
    fn fetch_remote(&self) -> Result<(), SourceError>;

    fn local_revision(&self) -> Result<Revision, SourceError>;

    /// Head of the tracked remote branch, as of the last fetch.
    fn remote_revision(&self) -> Result<Revision, SourceError>;

    fn has_local_edits(&self) -> Result<bool, SourceError>;

    /// Move local edits out of the way, recoverably, under `label`.
    fn snapshot_edits(&self, label: &str) -> Result<(), SourceError>;

    /// Advance the working tree to the remote revision. Fast-forward only;
    /// a divergent history is an error, never a forced move.
    fn fast_forward(&self) -> Result<(), SourceError>;
}

/// Step 3: third-party dependency refresh.
pub trait DependencyInstaller {
    /// Returns a short success detail (typically the command's last line).
    fn refresh(&self) -> Result<String, OpError>;
}

/// Step 4: pending schema migrations.
pub trait MigrationRunner {
    fn apply_pending(&self) -> Result<String, OpError>;
}

/// Step 5: static asset rebuild.
pub trait AssetPipeline {
    fn rebuild(&self) -> Result<String, OpError>;
}

/// Service manager for the long-running app processes.
///
/// `request_stop` must treat "not currently running" as a valid pre-state
/// and return Ok; a crashed service gets restarted, not reported.
pub trait ProcessManager {
    fn request_stop(&self, service: &ManagedService) -> Result<(), OpError>;

    /// Kill worker processes that survived the stop. No-op for services
    /// without a straggler pattern.
    fn terminate_stragglers(&self, service: &ManagedService) -> Result<(), OpError>;

    fn request_start(&self, service: &ManagedService) -> Result<(), OpError>;

    /// One health probe. Transient probe failures are treated by the
    /// caller like "not yet running", so implementations should not retry
    /// internally.
    fn is_running(&self, service: &ManagedService) -> Result<bool, OpError>;
}

/// The shared "update available" marker other app processes read.
pub trait UpdateFlagCache {
    /// Remove the marker. Must be idempotent: a missing marker is success.
    fn invalidate(&self) -> Result<(), OpError>;
}
