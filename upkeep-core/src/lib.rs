//! Upkeep core library — domain types, config, journal, run lock, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes, run records, outcomes
//! - [`error`] — [`CoreError`]
//! - [`config`] — load / save / init / path resolution
//! - [`journal`] — append-only run journal, summary readers
//! - [`lock`] — exclusive run lock guard

pub mod config;
pub mod error;
pub mod journal;
pub mod lock;
pub mod types;

pub use config::{StepCommands, TimingConfig, UpkeepConfig};
pub use error::CoreError;
pub use journal::{Journal, RunSummary};
pub use lock::RunLock;
pub use types::{
    ApplyStep, ManagedService, Revision, RunOutcome, ServiceName, StepResult, StepStatus,
    TriggerReason, UpdateRun,
};
