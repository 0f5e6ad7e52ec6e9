//! Append-only run journal.
//!
//! One timestamped line per logical event: run start, each step, run end.
//! The journal is the durable record of what happened to the deployment;
//! it is only ever appended to. Daemon logs rotate, this file does not.
//!
//! Line shape is `<rfc3339> <event> key=value ...` with an optional
//! free-form `detail=` tail, so lines stay greppable and [`parse_finished`]
//! can rebuild run summaries for `upkeep status`.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use crate::error::{io_err, CoreError};
use crate::types::{RunOutcome, StepResult, TriggerReason, UpdateRun};

// ---------------------------------------------------------------------------
// 1. Writer
// ---------------------------------------------------------------------------

/// Handle on the journal file. Cheap to clone; every call re-opens in
/// append mode so concurrent writers interleave whole lines.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_started(&self, reason: TriggerReason) -> Result<(), CoreError> {
        self.append(&format!("run started reason={reason}"))
    }

    pub fn step(&self, step: &StepResult) -> Result<(), CoreError> {
        self.append(&format!(
            "step name={} status={} duration_ms={} detail={}",
            step.name,
            step.status,
            step.duration_ms,
            compact(&step.detail)
        ))
    }

    pub fn run_finished(&self, run: &UpdateRun) -> Result<(), CoreError> {
        let mut line = format!(
            "run finished reason={} outcome={}",
            run.reason,
            run.outcome.key()
        );
        match &run.outcome {
            RunOutcome::FailedAtStep { step, name } => {
                line.push_str(&format!(" step={step} name={name}"));
            }
            RunOutcome::FailedAtServiceRestart { services } => {
                let names: Vec<&str> = services.iter().map(|s| s.0.as_str()).collect();
                line.push_str(&format!(" services={}", names.join(",")));
            }
            RunOutcome::UpToDate | RunOutcome::Succeeded => {}
        }
        if let Some(local) = &run.local {
            line.push_str(&format!(" local={}", local.short()));
        }
        if let Some(remote) = &run.remote {
            line.push_str(&format!(" remote={}", remote.short()));
        }
        line.push_str(&format!(
            " steps={} duration_ms={}",
            run.steps.len(),
            run.duration_ms
        ));
        self.append(&line)
    }

    /// A run that ended before producing an outcome (lock held, config
    /// unreadable, remote unreachable during check).
    pub fn run_aborted(&self, reason: TriggerReason, error: &str) -> Result<(), CoreError> {
        self.append(&format!(
            "run aborted reason={reason} detail={}",
            compact(error)
        ))
    }

    pub fn note(&self, message: &str) -> Result<(), CoreError> {
        self.append(&compact(message))
    }

    fn append(&self, line: &str) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        writeln!(file, "{stamp} {line}").map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

/// Newlines inside a journal field would split the record.
fn compact(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// 2. Readers
// ---------------------------------------------------------------------------

/// Last `limit` lines of the journal, oldest first.
///
/// A missing journal reads as empty: nothing has ever run.
pub fn tail_at(path: &Path, limit: usize) -> Result<Vec<String>, CoreError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut window = VecDeque::with_capacity(limit);
    for line in contents.lines() {
        if window.len() == limit {
            window.pop_front();
        }
        window.push_back(line.to_string());
    }
    Ok(window.into_iter().collect())
}

/// Summary of one completed run, recovered from a `run finished` line.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RunSummary {
    pub finished_at: String,
    pub reason: String,
    /// Full outcome text, e.g. `failed-at-step 4 (apply-migrations)`.
    pub outcome: String,
    /// The bare outcome word, for filtering.
    pub outcome_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome_key.as_str(), "up-to-date" | "succeeded")
    }
}

/// Parse a single journal line; `None` unless it is a `run finished` record.
pub fn parse_finished(line: &str) -> Option<RunSummary> {
    let (stamp, rest) = line.split_once(' ')?;
    let rest = rest.strip_prefix("run finished ")?;

    let mut fields = std::collections::BTreeMap::new();
    for token in rest.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            fields.insert(key, value);
        }
    }

    let key = (*fields.get("outcome")?).to_string();
    let outcome = match key.as_str() {
        "failed-at-step" => match (fields.get("step"), fields.get("name")) {
            (Some(step), Some(name)) => format!("failed-at-step {step} ({name})"),
            _ => key.clone(),
        },
        "failed-at-service-restart" => match fields.get("services") {
            Some(services) => format!(
                "failed-at-service-restart ({})",
                services.split(',').collect::<Vec<_>>().join(", ")
            ),
            None => key.clone(),
        },
        _ => key.clone(),
    };

    Some(RunSummary {
        finished_at: stamp.to_string(),
        reason: fields.get("reason").unwrap_or(&"unknown").to_string(),
        outcome,
        outcome_key: key,
        local: fields.get("local").map(|s| s.to_string()),
        remote: fields.get("remote").map(|s| s.to_string()),
        duration_ms: fields.get("duration_ms").and_then(|s| s.parse().ok()),
    })
}

/// The last `limit` completed runs, most recent first.
pub fn recent_runs_at(path: &Path, limit: usize) -> Result<Vec<RunSummary>, CoreError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut runs: Vec<RunSummary> = contents.lines().filter_map(parse_finished).collect();
    runs.reverse();
    runs.truncate(limit);
    Ok(runs)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
