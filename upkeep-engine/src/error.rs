//! Error types for upkeep-engine.

use thiserror::Error;

use upkeep_core::CoreError;

use crate::ops::SourceError;

/// Errors that abort a run before the pipeline starts.
///
/// Once the first pipeline step has run, failures are data, recorded as
/// step results inside the run's outcome, never surfaced here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The remote was unreachable during the check.
    #[error("network error: {0}")]
    Network(String),

    /// A source-tree read failed during the check.
    #[error("source tree error: {0}")]
    Source(String),

    /// Config, journal, or lock failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<SourceError> for EngineError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Network(msg) => EngineError::Network(msg),
            SourceError::Diverged(msg) | SourceError::Other(msg) => EngineError::Source(msg),
        }
    }
}
