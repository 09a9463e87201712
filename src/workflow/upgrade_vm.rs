use std::sync::Arc;

use crate::alias::QualifiedName;
use crate::engine::{Executor, Outcome, Workflow};
use crate::error::Result;
use crate::registry::RepositoryFactory;
use crate::storage::{SourceInfo, TypedStorage};

use super::{Install, InstallEnv};

/// Reinstall one VM when its repository now offers a newer version.
#[derive(Clone)]
pub struct UpgradeVm {
    pub name: QualifiedName,
    pub sources: TypedStorage<SourceInfo>,
    pub repositories: RepositoryFactory,
    pub env: InstallEnv,
    pub executor: Arc<dyn Executor>,
}

impl Workflow for UpgradeVm {
    fn name(&self) -> String {
        format!("upgrade-vm {}", self.name)
    }

    fn execute(&self) -> Result<Outcome> {
        let key = self.name.to_string();
        let Some(installed) = self.env.installed_vms.find(&key)? else {
            tracing::info!(vm = %key, "not installed, nothing to upgrade");
            return Ok(Outcome::Skipped);
        };

        if !self.sources.has(&self.name.repo.to_string())? {
            tracing::warn!(vm = %key, "repository is no longer tracked, skipping");
            return Ok(Outcome::Skipped);
        }
        let repository = self.repositories.repository(&self.name.repo);
        let Some(definition) = repository.vms.find(&self.name.plugin)? else {
            tracing::warn!(vm = %key, "definition no longer exists, skipping");
            return Ok(Outcome::Skipped);
        };

        let available = definition.definition.version;
        if installed.version >= available {
            tracing::debug!(vm = %key, version = %installed.version, "already up to date");
            return Ok(Outcome::AlreadyUpToDate);
        }

        tracing::info!(vm = %key, from = %installed.version, to = %available, "upgrading");
        self.executor.execute(&Install {
            name: self.name.clone(),
            repository,
            env: self.env.clone(),
            force: true,
        })
    }
}
