//! Configured pipeline step commands.
//!
//! Dependency refresh, migrations, and asset rebuilds are all operator
//! supplied argv lists run in the deployment tree. One type serves all
//! three engine traits; the engine decides which role it plays.

use std::path::{Path, PathBuf};

use upkeep_engine::ops::{AssetPipeline, DependencyInstaller, MigrationRunner, OpError};

use crate::command;
use crate::error::HostError;

#[derive(Debug)]
pub struct CommandStep {
    step: &'static str,
    argv: Vec<String>,
    cwd: PathBuf,
}

impl CommandStep {
    /// Rejects an empty argv up front so a misconfigured step fails at
    /// wiring time, before any run has touched the tree.
    pub fn new(step: &'static str, argv: &[String], cwd: &Path) -> Result<Self, HostError> {
        if argv.is_empty() {
            return Err(HostError::EmptyCommand { step });
        }
        Ok(Self {
            step,
            argv: argv.to_vec(),
            cwd: cwd.to_path_buf(),
        })
    }

    pub fn step(&self) -> &'static str {
        self.step
    }

    fn invoke(&self) -> Result<String, OpError> {
        let (program, rest) = match self.argv.split_first() {
            Some(parts) => parts,
            None => return Err(OpError(format!("step `{}` has no command", self.step))),
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        match command::run_checked(program, &args, Some(&self.cwd)) {
            Ok(captured) => Ok(command::last_line(&captured.stdout)
                .unwrap_or("done")
                .to_string()),
            Err(err) => Err(OpError(err.to_string())),
        }
    }
}

impl DependencyInstaller for CommandStep {
    fn refresh(&self) -> Result<String, OpError> {
        self.invoke()
    }
}

impl MigrationRunner for CommandStep {
    fn apply_pending(&self) -> Result<String, OpError> {
        self.invoke()
    }
}

impl AssetPipeline for CommandStep {
    fn rebuild(&self) -> Result<String, OpError> {
        self.invoke()
    }
}
