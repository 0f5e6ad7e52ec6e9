//! Update detection.
//!
//! A check refreshes the remote tracking refs and compares revisions by
//! equality. It never touches the working tree, so it is safe to run at
//! any time, including while the app serves traffic.

use serde::Serialize;

use upkeep_core::types::Revision;

use crate::error::EngineError;
use crate::ops::SourceTree;

/// Result of comparing the deployed revision against the remote head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub up_to_date: bool,
    pub local: Revision,
    pub remote: Revision,
}

/// Fetch remote refs and compare `HEAD` with the tracked branch head.
///
/// `Revision` equality is the whole comparison; there is no notion of
/// "newer", only "same" and "different".
pub fn check(tree: &dyn SourceTree) -> Result<CheckReport, EngineError> {
    tree.fetch_remote()?;
    let local = tree.local_revision()?;
    let remote = tree.remote_revision()?;
    let up_to_date = local == remote;
    if up_to_date {
        tracing::debug!("up to date at {}", local.short());
    } else {
        tracing::info!("update available: {} -> {}", local.short(), remote.short());
    }
    Ok(CheckReport {
        up_to_date,
        local,
        remote,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
