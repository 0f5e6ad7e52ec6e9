//! Captured-output process runner shared by the git, step, and systemctl
//! collaborators. Every invocation records exit status, stdout, and stderr
//! so failures carry the tool's own words back into step details.

use std::path::Path;
use std::process::Command;

use crate::error::HostError;

/// Output of a finished command, streams decoded lossily and trimmed.
#[derive(Debug)]
pub(crate) struct Captured {
    pub status_ok: bool,
    pub status: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command to completion and capture its output. Only spawn failures
/// are errors here; a non-zero exit comes back as a `Captured` for the
/// caller to interpret.
pub(crate) fn run(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
) -> Result<Captured, HostError> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    let output = command.output().map_err(|source| HostError::Spawn {
        program: program.to_string(),
        source,
    })?;
    Ok(Captured {
        status_ok: output.status.success(),
        status: output.status.to_string(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Run a command and require success, folding both output streams into the
/// error detail.
pub(crate) fn run_checked(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
) -> Result<Captured, HostError> {
    let captured = run(program, args, cwd)?;
    if captured.status_ok {
        return Ok(captured);
    }
    Err(HostError::CommandFailed {
        program: program.to_string(),
        status: captured.status.clone(),
        detail: join_output(&captured),
    })
}

/// Merge stdout and stderr into one line of detail.
pub(crate) fn join_output(captured: &Captured) -> String {
    let joined = match (captured.stdout.is_empty(), captured.stderr.is_empty()) {
        (false, false) => format!("{} {}", captured.stdout, captured.stderr),
        (false, true) => captured.stdout.clone(),
        (true, false) => captured.stderr.clone(),
        (true, true) => return "<no output>".to_string(),
    };
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Last non-empty line of a command's output, for step summaries.
pub(crate) fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).last()
}
