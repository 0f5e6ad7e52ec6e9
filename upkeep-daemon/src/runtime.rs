use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

use upkeep_core::config::UpkeepConfig;
use upkeep_core::journal::Journal;
use upkeep_core::types::{TriggerReason, UpdateRun};
use upkeep_engine::orchestrator::{Orchestrator, RunMode};
use upkeep_host::HostCollaborators;

use crate::error::{io_err, DaemonError};
use crate::paths;
use crate::protocol::{DaemonRequest, DaemonResponse};

/// One queued deployment run. Detached triggers (poller, schedule) leave
/// `respond_to` empty; socket clients wait on the oneshot for the record.
struct RunJob {
    reason: TriggerReason,
    mode: RunMode,
    respond_to: Option<oneshot::Sender<Result<RunRecord, String>>>,
}

/// Compact description of a completed run, kept for `status` and returned
/// to socket `run` clients.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub reason: String,
    pub outcome: String,
    pub outcome_key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    pub steps: usize,
    pub duration_ms: u64,
    pub finished_at_unix: u64,
}

#[derive(Debug, Clone, Default)]
struct DaemonState {
    run_in_progress: bool,
    runs_completed: u64,
    last_run: Option<RunRecord>,
}

type SharedState = std::sync::Arc<RwLock<DaemonState>>;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: UpkeepConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon runtime: trigger poller, schedule, run processor,
/// control socket, log rotation, and ctrl-c handling.
pub async fn run(config: UpkeepConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&config)?;
    // Surface an unrunnable config (empty step argv) at start, not at the
    // first 4 a.m. run.
    HostCollaborators::from_config(&config)?;

    let state: SharedState = std::sync::Arc::new(RwLock::new(DaemonState::default()));
    let started_at_unix = unix_seconds_now();

    let (run_tx, run_rx) = mpsc::channel::<RunJob>(2);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let poller_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let run_tx = run_tx.clone();
        tokio::spawn(async move {
            let result = trigger_poller_task(config, run_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let schedule_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let run_tx = run_tx.clone();
        tokio::spawn(async move {
            let result = schedule_task(config, run_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = run_processor_task(config, state, run_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let state = state.clone();
        let run_tx = run_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                config,
                state,
                run_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let logs_dir = config.logs_dir();
        tokio::spawn(async move {
            let result = log_rotation_task(logs_dir, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (poller_result, schedule_result, processor_result, socket_result, rotation_result, signal_result) = tokio::join!(
        poller_handle,
        schedule_handle,
        processor_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("trigger_poller", poller_result)?;
    handle_join("schedule", schedule_result)?;
    handle_join("run_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Trigger poller and schedule
// ---------------------------------------------------------------------------

async fn trigger_poller_task(
    config: UpkeepConfig,
    run_tx: mpsc::Sender<RunJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let journal = Journal::new(&config.journal_path);
    let poll = Duration::from_secs(config.timing.trigger_poll_secs.max(1));
    let mut interval = tokio::time::interval(poll);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick
    tracing::info!(
        path = %config.trigger_path.display(),
        every_secs = poll.as_secs(),
        "watching for trigger marker",
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match take_trigger(&config.trigger_path) {
                    Ok(true) => {
                        tracing::info!(path = %config.trigger_path.display(), "trigger marker found");
                        enqueue_detached(&run_tx, &journal, TriggerReason::TriggerFile);
                    }
                    Ok(false) => {}
                    Err(err) => {
                        tracing::warn!(path = %config.trigger_path.display(), error = %err, "trigger poll failed");
                    }
                }
            }
        }
    }
    Ok(())
}

/// Remove the marker if present. Removal is the claim: the marker is gone
/// before the run is queued, so a marker recreated mid-run requests a
/// fresh run instead of being swallowed.
fn take_trigger(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

async fn schedule_task(
    config: UpkeepConfig,
    run_tx: mpsc::Sender<RunJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let journal = Journal::new(&config.journal_path);

    tokio::select! {
        _ = shutdown_rx.recv() => return Ok(()),
        _ = tokio::time::sleep(Duration::from_secs(config.timing.boot_delay_secs)) => {}
    }
    tracing::info!("boot delay elapsed, queueing boot run");
    enqueue_detached(&run_tx, &journal, TriggerReason::Boot);

    let every = Duration::from_secs(config.timing.schedule_interval_secs.max(1));
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                enqueue_detached(&run_tx, &journal, TriggerReason::Scheduled);
            }
        }
    }
    Ok(())
}

/// Queue a run without waiting for it. A full queue means a run is active
/// and another already waiting; this trigger adds nothing and is dropped,
/// with a journal note so the drop is auditable.
fn enqueue_detached(run_tx: &mpsc::Sender<RunJob>, journal: &Journal, reason: TriggerReason) {
    let job = RunJob {
        reason,
        mode: RunMode::Normal,
        respond_to: None,
    };
    match run_tx.try_send(job) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(reason = %reason, "run queue full, dropping trigger");
            if let Err(err) = journal.note(&format!("trigger dropped reason={reason} run queue full")) {
                tracing::warn!(error = %err, "journal write failed");
            }
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(reason = %reason, "run queue closed, daemon shutting down");
        }
    }
}

// ---------------------------------------------------------------------------
// Run processor
// ---------------------------------------------------------------------------

async fn run_processor_task(
    config: UpkeepConfig,
    state: SharedState,
    mut run_rx: mpsc::Receiver<RunJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = run_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let reason = job.reason;

                {
                    let mut guard = state.write().await;
                    guard.run_in_progress = true;
                }

                let run_config = config.clone();
                let mode = job.mode;
                let outcome = tokio::task::spawn_blocking(move || {
                    execute_run(&run_config, reason, mode)
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("run task join error: {err}")))?;

                {
                    let mut guard = state.write().await;
                    guard.run_in_progress = false;
                    if let Ok(record) = &outcome {
                        guard.runs_completed += 1;
                        guard.last_run = Some(record.clone());
                    }
                }

                match &outcome {
                    Ok(record) => tracing::info!(
                        reason = %record.reason,
                        outcome = %record.outcome,
                        duration_ms = record.duration_ms,
                        "run finished",
                    ),
                    Err(err) => tracing::warn!(reason = %reason, error = %err, "run aborted"),
                }

                if let Some(respond_to) = job.respond_to {
                    let _ = respond_to.send(outcome);
                }
            }
        }
    }
    Ok(())
}

/// One full engine run against real host collaborators. Blocking; runs
/// inside `spawn_blocking`.
fn execute_run(
    config: &UpkeepConfig,
    reason: TriggerReason,
    mode: RunMode,
) -> Result<RunRecord, String> {
    let host = HostCollaborators::from_config(config).map_err(|err| err.to_string())?;
    let orchestrator = Orchestrator::new(config, host.ops());
    let run = orchestrator.execute(reason, mode).map_err(|err| err.to_string())?;
    Ok(run_record(&run))
}

fn run_record(run: &UpdateRun) -> RunRecord {
    RunRecord {
        reason: run.reason.to_string(),
        outcome: run.outcome.to_string(),
        outcome_key: run.outcome.key().to_string(),
        success: run.outcome.is_success(),
        local: run.local.as_ref().map(|r| r.short().to_string()),
        remote: run.remote.as_ref().map(|r| r.short().to_string()),
        steps: run.steps.len(),
        duration_ms: run.duration_ms,
        finished_at_unix: unix_seconds_now(),
    }
}

// ---------------------------------------------------------------------------
// Control socket
// ---------------------------------------------------------------------------

async fn socket_server_task(
    config: UpkeepConfig,
    state: SharedState,
    run_tx: mpsc::Sender<RunJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = config.socket_path();
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let config = config.clone();
                let state = state.clone();
                let run_tx = run_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        config,
                        state,
                        run_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    config: UpkeepConfig,
    state: SharedState,
    run_tx: mpsc::Sender<RunJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        let response = match cmd.as_str() {
            "status" => {
                let payload =
                    build_status_payload(&config, &state, started_at_unix).await;
                DaemonResponse::ok(payload)
            }
            "run" => match enqueue_run(&run_tx, TriggerReason::Manual, RunMode::Normal).await {
                Ok(record) => DaemonResponse::ok(json!(record)),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    config: &UpkeepConfig,
    state: &SharedState,
    started_at_unix: u64,
) -> Value {
    let snapshot = { state.read().await.clone() };

    json!({
        "running": true,
        "unit": paths::DAEMON_UNIT,
        "started_at_unix": started_at_unix,
        "run_in_progress": snapshot.run_in_progress,
        "runs_completed": snapshot.runs_completed,
        "last_run": snapshot.last_run,
        "tree": config.tree.display().to_string(),
        "socket": config.socket_path().display().to_string(),
    })
}

/// Queue a run and wait for its record. Used by socket clients; waits for
/// queue space instead of dropping.
async fn enqueue_run(
    run_tx: &mpsc::Sender<RunJob>,
    reason: TriggerReason,
    mode: RunMode,
) -> Result<RunRecord, DaemonError> {
    let (tx, rx) = oneshot::channel();
    run_tx
        .send(RunJob {
            reason,
            mode,
            respond_to: Some(tx),
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("run queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("run response"))?;
    outcome.map_err(DaemonError::Protocol)
}

// ---------------------------------------------------------------------------
// Log rotation and shutdown plumbing
// ---------------------------------------------------------------------------

async fn log_rotation_task(
    logs_dir: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // skip the immediate tick; no rotation at startup

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let logs_dir = logs_dir.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&logs_dir);
                })
                .await
                .ok(); // rotation failures are logged inside rotate_logs
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(config: &UpkeepConfig) -> Result<(), DaemonError> {
    let state_dir = &config.state_dir;
    if !state_dir.exists() {
        fs::create_dir_all(state_dir).map_err(|e| io_err(state_dir, e))?;
    }
    let logs = config.logs_dir();
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }
    if let Some(trigger_parent) = config.trigger_path.parent() {
        if !trigger_parent.exists() {
            fs::create_dir_all(trigger_parent).map_err(|e| io_err(trigger_parent, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
