//! Error types for upkeep-host.

use thiserror::Error;

/// All errors that can arise wiring or driving host collaborators.
#[derive(Debug, Error)]
pub enum HostError {
    /// The program could not be spawned at all (missing binary, perms).
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("`{program}` failed ({status}): {detail}")]
    CommandFailed {
        program: String,
        status: String,
        detail: String,
    },

    /// A pipeline step was configured with an empty argv.
    #[error("step `{step}` has no command configured")]
    EmptyCommand { step: &'static str },
}
