use std::fs;
use std::path::PathBuf;

use crate::alias::RepoAlias;
use crate::config::CORE_ALIAS;
use crate::engine::{Outcome, Workflow};
use crate::error::{IoContext, Result};
use crate::registry::{Repository, ReverseIndex};
use crate::storage::{SourceInfo, TypedStorage};

/// Stop tracking a repository and drop everything learned from it.
/// Installed binaries stay where they are.
#[derive(Debug, Clone)]
pub struct RemoveRepository {
    pub alias: RepoAlias,
    pub sources: TypedStorage<SourceInfo>,
    pub repository: Repository,
    pub reverse_index: ReverseIndex,
    pub checkout: PathBuf,
}

impl Workflow for RemoveRepository {
    fn name(&self) -> String {
        format!("remove-repository {}", self.alias)
    }

    fn execute(&self) -> Result<Outcome> {
        let key = self.alias.to_string();
        if key == CORE_ALIAS {
            tracing::warn!(alias = %key, "the core repository cannot be removed");
            return Ok(Outcome::Skipped);
        }

        let vms = self.repository.vms.keys()?;
        let subnets = self.repository.subnets.keys()?;
        for plugin in &vms {
            self.repository.vms.delete(plugin)?;
        }
        for plugin in &subnets {
            self.repository.subnets.delete(plugin)?;
        }
        for plugin in vms.iter().chain(&subnets) {
            self.reverse_index.unregister(plugin, &self.alias)?;
        }

        if self.checkout.exists() {
            fs::remove_dir_all(&self.checkout)
                .io_context(|| format!("Failed to remove {}", self.checkout.display()))?;
        }

        if !self.sources.has(&key)? {
            tracing::info!(alias = %key, "repository is not tracked");
            return Ok(Outcome::Skipped);
        }
        self.sources.delete(&key)?;
        tracing::info!(alias = %key, definitions = vms.len() + subnets.len(), "removed repository");
        Ok(Outcome::Done)
    }
}
