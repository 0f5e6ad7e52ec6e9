//! Git-backed source tree.
//!
//! Maps the engine's [`SourceTree`] operations onto plain git commands run
//! in the deployment checkout. History is only ever moved by fast-forward;
//! a checkout whose history has diverged from the tracking branch is left
//! untouched and reported as such.

use std::path::{Path, PathBuf};

use upkeep_core::config::UpkeepConfig;
use upkeep_core::types::Revision;
use upkeep_engine::ops::{SourceError, SourceTree};

use crate::command::{self, Captured};
use crate::error::HostError;

#[derive(Debug)]
pub struct GitSourceTree {
    repo: PathBuf,
    remote: String,
    branch: String,
}

impl GitSourceTree {
    pub fn new(
        repo: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            repo: repo.into(),
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    pub fn from_config(config: &UpkeepConfig) -> Self {
        Self::new(
            config.tree.clone(),
            config.remote.clone(),
            config.branch.clone(),
        )
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// The remote-tracking ref updates are taken from, e.g. `origin/main`.
    fn tracking_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    fn git(&self, args: &[&str]) -> Result<Captured, HostError> {
        command::run_checked("git", args, Some(&self.repo))
    }

    fn revision_of(&self, rev: &str) -> Result<Revision, SourceError> {
        let captured = self.git(&["rev-parse", rev]).map_err(other)?;
        match captured.stdout.lines().next() {
            Some(line) if !line.trim().is_empty() => Ok(Revision::from(line.trim())),
            _ => Err(SourceError::Other(format!(
                "git rev-parse {rev} produced no output"
            ))),
        }
    }
}

impl SourceTree for GitSourceTree {
    fn fetch_remote(&self) -> Result<(), SourceError> {
        match self.git(&["fetch", "--quiet", &self.remote, &self.branch]) {
            Ok(_) => Ok(()),
            Err(err) => {
                let detail = err.to_string();
                if is_network_failure(&detail) {
                    Err(SourceError::Network(detail))
                } else {
                    Err(SourceError::Other(detail))
                }
            }
        }
    }

    fn local_revision(&self) -> Result<Revision, SourceError> {
        self.revision_of("HEAD")
    }

    fn remote_revision(&self) -> Result<Revision, SourceError> {
        self.revision_of(&self.tracking_ref())
    }

    fn has_local_edits(&self) -> Result<bool, SourceError> {
        let captured = self.git(&["status", "--porcelain"]).map_err(other)?;
        Ok(!captured.stdout.is_empty())
    }

    fn snapshot_edits(&self, label: &str) -> Result<(), SourceError> {
        self.git(&["stash", "push", "--include-untracked", "-m", label])
            .map_err(other)?;
        Ok(())
    }

    fn fast_forward(&self) -> Result<(), SourceError> {
        let tracking = self.tracking_ref();
        match self.git(&["merge", "--ff-only", &tracking]) {
            Ok(_) => Ok(()),
            Err(err) => {
                let detail = err.to_string();
                if is_fast_forward_refusal(&detail) {
                    Err(SourceError::Diverged(detail))
                } else {
                    Err(SourceError::Other(detail))
                }
            }
        }
    }
}

fn other(err: HostError) -> SourceError {
    SourceError::Other(err.to_string())
}

/// Recognize fetch failures caused by the remote being unreachable rather
/// than by repository state.
pub(crate) fn is_network_failure(detail: &str) -> bool {
    let lowered = detail.to_lowercase();
    [
        "could not resolve host",
        "unable to access",
        "connection refused",
        "connection timed out",
        "network is unreachable",
        "operation timed out",
    ]
    .iter()
    .any(|needle| lowered.contains(needle))
}

/// Recognize git's refusal to merge because the histories have diverged.
pub(crate) fn is_fast_forward_refusal(detail: &str) -> bool {
    let lowered = detail.to_lowercase();
    ["not possible to fast-forward", "diverging branches", "have diverged"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn tracking_ref_joins_remote_and_branch() {
        let tree = GitSourceTree::new("/srv/app", "origin", "main");
        assert_eq!(tree.tracking_ref(), "origin/main");
    }

    #[rstest]
    #[case("fatal: unable to access 'https://example.com/app.git/': Could not resolve host: example.com")]
    #[case("ssh: connect to host example.com port 22: Connection refused")]
    #[case("fatal: unable to access 'https://example.com/app.git/': Connection timed out")]
    fn real_fetch_errors_classify_as_network(#[case] stderr: &str) {
        assert!(is_network_failure(stderr));
    }

    #[test]
    fn repository_errors_do_not_classify_as_network() {
        assert!(!is_network_failure(
            "fatal: couldn't find remote ref refs/heads/main"
        ));
        assert!(!is_network_failure("fatal: not a git repository"));
    }

    #[rstest]
    #[case("fatal: Not possible to fast-forward, aborting.")]
    #[case("hint: Diverging branches can't be fast-forwarded, you need to either:")]
    fn merge_refusals_classify_as_diverged(#[case] stderr: &str) {
        assert!(is_fast_forward_refusal(stderr));
    }

    #[test]
    fn ordinary_merge_errors_stay_other() {
        assert!(!is_fast_forward_refusal(
            "fatal: refusing to merge unrelated histories"
        ));
    }
}
