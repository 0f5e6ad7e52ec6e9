//! Deployment configuration file.
//!
//! # Storage layout
//!
//! ```text
//! /etc/upkeep/config.yaml   (system installs — mode 0600)
//! ~/.upkeep/config.yaml     (per-user installs — fallback)
//! ```
//!
//! Resolution order: explicit `--config` flag, then `$UPKEEP_CONFIG`, then
//! the system path if present, then the home path.
//!
//! # API pattern
//!
//! Every load/save function takes an explicit path; the only ambient lookup
//! is [`resolve_path`], called once at the CLI/daemon boundary.
//! Tests must NEVER call `resolve_path`; always pass explicit paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::{ManagedService, ServiceName};

/// Environment override for the config location.
pub const CONFIG_ENV: &str = "UPKEEP_CONFIG";

// ---------------------------------------------------------------------------
// 1. Config model
// ---------------------------------------------------------------------------

/// Root of the upkeep YAML config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpkeepConfig {
    /// Absolute path to the deployment source tree (a git checkout).
    pub tree: PathBuf,

    /// Remote and branch the tree tracks.
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Run lock, control socket, and daemon logs live under here.
    pub state_dir: PathBuf,

    /// Append-only run journal. Never rotated, never truncated.
    pub journal_path: PathBuf,

    /// Marker file the daemon polls; its presence requests a run.
    pub trigger_path: PathBuf,

    /// Shared "update available" marker removed after a healthy restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_flag_path: Option<PathBuf>,

    /// Services restarted after a successful update, in order.
    #[serde(default)]
    pub services: Vec<ManagedService>,

    #[serde(default)]
    pub commands: StepCommands,

    #[serde(default)]
    pub timing: TimingConfig,
}

impl UpkeepConfig {
    /// `<state_dir>/run.lock`
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("run.lock")
    }

    /// `<state_dir>/upkeepd.sock`
    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("upkeepd.sock")
    }

    /// `<state_dir>/logs/`
    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}

/// Argv for each configurable pipeline step, run from the tree root.
///
/// An empty argv is rejected when the step runner is built, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StepCommands {
    #[serde(default)]
    pub refresh_dependencies: Vec<String>,
    #[serde(default)]
    pub apply_migrations: Vec<String>,
    #[serde(default)]
    pub refresh_assets: Vec<String>,
}

/// Intervals and deadlines. All bounded; nothing in a run waits forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Grace between a stop request and straggler termination.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// Deadline for a restarted service to report healthy.
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
    #[serde(default = "default_health_poll")]
    pub health_poll_interval_ms: u64,

    /// How often the daemon looks for the trigger file.
    #[serde(default = "default_trigger_poll")]
    pub trigger_poll_secs: u64,

    /// Pause after daemon start before the boot run.
    #[serde(default = "default_boot_delay")]
    pub boot_delay_secs: u64,

    /// Interval between scheduled runs.
    #[serde(default = "default_schedule")]
    pub schedule_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stop_grace_secs: default_stop_grace(),
            health_timeout_secs: default_health_timeout(),
            health_poll_interval_ms: default_health_poll(),
            trigger_poll_secs: default_trigger_poll(),
            boot_delay_secs: default_boot_delay(),
            schedule_interval_secs: default_schedule(),
        }
    }
}

fn default_remote() -> String {
    "origin".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_stop_grace() -> u64 {
    5
}
fn default_health_timeout() -> u64 {
    60
}
fn default_health_poll() -> u64 {
    500
}
fn default_trigger_poll() -> u64 {
    60
}
fn default_boot_delay() -> u64 {
    120
}
fn default_schedule() -> u64 {
    86_400
}

// ---------------------------------------------------------------------------
// 2. Path resolution
// ---------------------------------------------------------------------------

/// `/etc/upkeep/config.yaml` — pure, no I/O.
pub fn system_path() -> PathBuf {
    PathBuf::from("/etc/upkeep/config.yaml")
}

/// `<home>/.upkeep/config.yaml` — pure, no I/O.
pub fn home_path_at(home: &Path) -> PathBuf {
    home.join(".upkeep").join("config.yaml")
}

/// Pick the config path for this invocation.
///
/// The returned path is not checked for existence (except the system path,
/// which only wins when present); [`load`] reports a missing file.
pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf, CoreError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Some(env_path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(env_path));
    }
    let system = system_path();
    if system.exists() {
        return Ok(system);
    }
    let home = dirs::home_dir().ok_or(CoreError::HomeNotFound)?;
    Ok(home_path_at(&home))
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load the config from `path`.
///
/// Returns `CoreError::ConfigNotFound` if absent,
/// `CoreError::Parse` (with path + line context) if malformed YAML.
pub fn load(path: &Path) -> Result<UpkeepConfig, CoreError> {
    if !path.exists() {
        return Err(CoreError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config to `path`.
///
/// Write flow: serialize → `.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem).
pub fn save(path: &Path, config: &UpkeepConfig) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            set_dir_permissions(parent)?;
        }
    }
    let tmp_path = tmp_sibling(path);
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 5. Init
// ---------------------------------------------------------------------------

/// Write a starter config for `tree` at `path`.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(path: &Path, tree: &Path) -> Result<UpkeepConfig, CoreError> {
    if path.exists() {
        return load(path);
    }
    let config = starter(tree);
    save(path, &config)?;
    Ok(config)
}

/// Default config for a freshly adopted tree. All paths live under `tree`
/// so a per-user install works before anything else is provisioned.
pub fn starter(tree: &Path) -> UpkeepConfig {
    UpkeepConfig {
        tree: tree.to_path_buf(),
        remote: default_remote(),
        branch: default_branch(),
        state_dir: tree.join(".upkeep"),
        journal_path: tree.join("logs").join("upkeep.log"),
        trigger_path: tree.join("tmp").join("update-trigger"),
        update_flag_path: Some(tree.join("tmp").join("update-available")),
        services: vec![ManagedService {
            name: ServiceName::from("web"),
            unit: "my-app.service".to_string(),
            straggler_pattern: None,
            cache_dir: None,
        }],
        commands: StepCommands {
            refresh_dependencies: argv(&["venv/bin/pip", "install", "-r", "requirements.txt"]),
            apply_migrations: argv(&["venv/bin/python", "manage.py", "migrate", "--noinput"]),
            refresh_assets: argv(&["venv/bin/python", "manage.py", "collectstatic", "--noinput"]),
        },
        timing: TimingConfig::default(),
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.yaml".to_string());
    path.with_file_name(format!("{file_name}.tmp"))
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
