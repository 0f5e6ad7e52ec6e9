//! Domain types for upkeep runs.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed source revision identifier.
///
/// Revisions are opaque: two revisions can be compared for equality and
/// nothing else. There is deliberately no `Ord` here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(pub String);

impl Revision {
    /// Abbreviated form for log lines and tables.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(10)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed name for a managed service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName(pub String);

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What caused a run to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerReason {
    Scheduled,
    Boot,
    Manual,
    TriggerFile,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Scheduled => write!(f, "scheduled"),
            TriggerReason::Boot => write!(f, "boot"),
            TriggerReason::Manual => write!(f, "manual"),
            TriggerReason::TriggerFile => write!(f, "trigger-file"),
        }
    }
}

/// Outcome of a single pipeline or service step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Skipped,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Ok => write!(f, "ok"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The fixed update pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    Snapshot,
    Integrate,
    Dependencies,
    Migrations,
    Assets,
}

impl ApplyStep {
    pub const SEQUENCE: [ApplyStep; 5] = [
        ApplyStep::Snapshot,
        ApplyStep::Integrate,
        ApplyStep::Dependencies,
        ApplyStep::Migrations,
        ApplyStep::Assets,
    ];

    /// 1-based position in the pipeline, as reported by `failed-at-step N`.
    pub fn position(&self) -> usize {
        match self {
            ApplyStep::Snapshot => 1,
            ApplyStep::Integrate => 2,
            ApplyStep::Dependencies => 3,
            ApplyStep::Migrations => 4,
            ApplyStep::Assets => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApplyStep::Snapshot => "snapshot-local-edits",
            ApplyStep::Integrate => "integrate-remote",
            ApplyStep::Dependencies => "refresh-dependencies",
            ApplyStep::Migrations => "apply-migrations",
            ApplyStep::Assets => "refresh-assets",
        }
    }
}

impl fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum RunOutcome {
    UpToDate,
    Succeeded,
    FailedAtStep { step: usize, name: String },
    FailedAtServiceRestart { services: Vec<ServiceName> },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::UpToDate | RunOutcome::Succeeded)
    }

    /// The bare outcome word, without per-variant detail.
    pub fn key(&self) -> &'static str {
        match self {
            RunOutcome::UpToDate => "up-to-date",
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::FailedAtStep { .. } => "failed-at-step",
            RunOutcome::FailedAtServiceRestart { .. } => "failed-at-service-restart",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::UpToDate => write!(f, "up-to-date"),
            RunOutcome::Succeeded => write!(f, "succeeded"),
            RunOutcome::FailedAtStep { step, name } => {
                write!(f, "failed-at-step {step} ({name})")
            }
            RunOutcome::FailedAtServiceRestart { services } => {
                let names: Vec<&str> = services.iter().map(|s| s.0.as_str()).collect();
                write!(f, "failed-at-service-restart ({})", names.join(", "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Record of one attempted step, kept in run order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    /// Free-form diagnostic text: trailing command output, error detail.
    pub detail: String,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn ok(name: impl Into<String>, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Ok,
            detail: detail.into(),
            duration_ms,
        }
    }

    pub fn skipped(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Skipped,
            detail: detail.into(),
            duration_ms: 0,
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Failed,
            detail: detail.into(),
            duration_ms,
        }
    }
}

/// Full record of one update run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRun {
    pub started_at: DateTime<Utc>,
    pub reason: TriggerReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<Revision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<Revision>,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    pub outcome: RunOutcome,
    pub duration_ms: u64,
}

/// One long-running process under the supervisor's care.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedService {
    pub name: ServiceName,
    /// Service-manager unit name, e.g. `docs-web.service`.
    pub unit: String,
    /// `pkill -f` pattern for worker processes that survive a stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub straggler_pattern: Option<String>,
    /// Process-local bytecode cache wiped before the service restarts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
