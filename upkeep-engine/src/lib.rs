//! # upkeep-engine
//!
//! Update checking, the five-step apply pipeline, and the service restart
//! cycle. Everything here is synchronous and written against the trait
//! seams in [`ops`]; upkeep-host supplies the real git/systemctl-backed
//! implementations.
//!
//! Call [`Orchestrator::execute`] for a whole run, or [`checker::check`]
//! for a read-only staleness probe.

pub mod applier;
pub mod checker;
pub mod error;
pub mod ops;
pub mod orchestrator;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod mock;

pub use applier::{Applier, ApplyReport};
pub use checker::{check, CheckReport};
pub use error::EngineError;
pub use orchestrator::{Collaborators, Orchestrator, RunMode};
pub use supervisor::{RestartReport, Supervisor, SupervisorTiming};
