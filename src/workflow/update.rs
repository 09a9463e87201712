use std::path::PathBuf;
use std::sync::Arc;

use crate::alias::RepoAlias;
use crate::engine::{Executor, Outcome, Workflow};
use crate::error::Result;
use crate::registry::{RepositoryFactory, ReverseIndex};
use crate::storage::{SourceInfo, TypedStorage};
use crate::vcs::VersionControl;

use super::UpdateRepository;

/// Sync every tracked repository and reload the ones whose head moved.
#[derive(Clone)]
pub struct Update {
    pub sources: TypedStorage<SourceInfo>,
    pub repositories: RepositoryFactory,
    pub reverse_index: ReverseIndex,
    pub vcs: Arc<dyn VersionControl>,
    /// Root of the local checkouts, `<dir>/<org>/<repo>`.
    pub repositories_dir: PathBuf,
    pub executor: Arc<dyn Executor>,
}

impl Workflow for Update {
    fn name(&self) -> String {
        "update".to_string()
    }

    fn execute(&self) -> Result<Outcome> {
        let mut updated = 0usize;
        for (key, source) in self.sources.iter()? {
            let alias: RepoAlias = key.parse()?;
            let checkout = self.repositories_dir.join(alias.relative_path());

            let latest = self.vcs.sync(&source.url, &checkout, &source.branch)?;
            if latest == source.commit {
                tracing::info!(alias = %alias, commit = %latest, "already at latest");
                continue;
            }

            self.executor.execute(&UpdateRepository {
                repository: self.repositories.repository(&alias),
                reverse_index: self.reverse_index.clone(),
                sources: self.sources.clone(),
                vcs: Arc::clone(&self.vcs),
                checkout,
                latest,
                source,
                alias,
            })?;
            updated += 1;
        }

        if updated == 0 {
            return Ok(Outcome::AlreadyUpToDate);
        }
        Ok(Outcome::Done)
    }
}
