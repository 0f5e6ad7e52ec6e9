//! # upkeep-host
//!
//! Real implementations of the engine's collaborator traits: a git-backed
//! source tree, operator-configured step commands, a systemctl process
//! manager, and the file-based update flag. Everything here shells out;
//! the engine above it never does.

mod command;

pub mod cache;
pub mod error;
pub mod git;
pub mod steps;
pub mod systemd;

pub use cache::FileFlagCache;
pub use error::HostError;
pub use git::GitSourceTree;
pub use steps::CommandStep;
pub use systemd::SystemdManager;

use upkeep_core::config::UpkeepConfig;
use upkeep_engine::orchestrator::Collaborators;
use upkeep_engine::ops::UpdateFlagCache;

/// The full set of host collaborators wired from one config. Owns the
/// concrete values; [`HostCollaborators::ops`] borrows them as the trait
/// objects the orchestrator works against.
#[derive(Debug)]
pub struct HostCollaborators {
    pub tree: GitSourceTree,
    pub dependencies: CommandStep,
    pub migrations: CommandStep,
    pub assets: CommandStep,
    pub manager: SystemdManager,
    pub flag_cache: Option<FileFlagCache>,
}

impl HostCollaborators {
    /// Wire every collaborator from config. Fails when a step command is
    /// configured without an argv.
    pub fn from_config(config: &UpkeepConfig) -> Result<Self, HostError> {
        Ok(Self {
            tree: GitSourceTree::from_config(config),
            dependencies: CommandStep::new(
                "refresh-dependencies",
                &config.commands.refresh_dependencies,
                &config.tree,
            )?,
            migrations: CommandStep::new(
                "apply-migrations",
                &config.commands.apply_migrations,
                &config.tree,
            )?,
            assets: CommandStep::new(
                "refresh-assets",
                &config.commands.refresh_assets,
                &config.tree,
            )?,
            manager: SystemdManager::new(),
            flag_cache: config
                .update_flag_path
                .as_ref()
                .map(|path| FileFlagCache::new(path.clone())),
        })
    }

    pub fn ops(&self) -> Collaborators<'_> {
        Collaborators {
            tree: &self.tree,
            dependencies: &self.dependencies,
            migrations: &self.migrations,
            assets: &self.assets,
            manager: &self.manager,
            flag_cache: self
                .flag_cache
                .as_ref()
                .map(|cache| cache as &dyn UpdateFlagCache),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use upkeep_core::config;

    use super::*;

    #[test]
    fn starter_config_wires_every_collaborator() {
        let starter = config::starter(Path::new("/srv/my-app"));
        let host = HostCollaborators::from_config(&starter).unwrap();
        assert!(host.flag_cache.is_some());
        assert_eq!(host.dependencies.step(), "refresh-dependencies");
    }

    #[test]
    fn empty_step_command_fails_wiring() {
        let mut starter = config::starter(Path::new("/srv/my-app"));
        starter.commands.apply_migrations.clear();
        let err = HostCollaborators::from_config(&starter).unwrap_err();
        assert!(err.to_string().contains("apply-migrations"));
    }
}
