use std::sync::Arc;

use crate::engine::{Executor, Outcome, Workflow};
use crate::error::Result;
use crate::registry::RepositoryFactory;
use crate::storage::{SourceInfo, TypedStorage};

use super::{InstallEnv, UpgradeVm};

/// Upgrade every installed VM.
#[derive(Clone)]
pub struct Upgrade {
    pub sources: TypedStorage<SourceInfo>,
    pub repositories: RepositoryFactory,
    pub env: InstallEnv,
    pub executor: Arc<dyn Executor>,
}

impl Workflow for Upgrade {
    fn name(&self) -> String {
        "upgrade".to_string()
    }

    fn execute(&self) -> Result<Outcome> {
        let mut upgraded = 0usize;
        for key in self.env.installed_vms.keys()? {
            let outcome = self.executor.execute(&UpgradeVm {
                name: key.parse()?,
                sources: self.sources.clone(),
                repositories: self.repositories.clone(),
                env: self.env.clone(),
                executor: Arc::clone(&self.executor),
            })?;
            if outcome.changed() {
                upgraded += 1;
            }
        }

        if upgraded == 0 {
            tracing::info!("no changes detected");
            return Ok(Outcome::AlreadyUpToDate);
        }
        tracing::info!(upgraded, "upgrade finished");
        Ok(Outcome::Done)
    }
}
