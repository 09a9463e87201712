use crate::alias::RepoAlias;
use crate::engine::{Outcome, Workflow};
use crate::error::{Error, Result};
use crate::storage::{Commit, SourceInfo, TypedStorage};

/// Start tracking a repository. Definitions arrive with the next update.
#[derive(Debug, Clone)]
pub struct AddRepository {
    pub sources: TypedStorage<SourceInfo>,
    pub alias: RepoAlias,
    pub url: String,
    pub branch: String,
}

impl Workflow for AddRepository {
    fn name(&self) -> String {
        format!("add-repository {}", self.alias)
    }

    fn execute(&self) -> Result<Outcome> {
        let key = self.alias.to_string();
        if self.sources.has(&key)? {
            return Err(Error::RepositoryExists(key));
        }

        self.sources.put(
            &key,
            &SourceInfo {
                alias: key.clone(),
                url: self.url.clone(),
                branch: self.branch.clone(),
                commit: Commit::zero(),
            },
        )?;
        tracing::info!(alias = %self.alias, url = %self.url, branch = %self.branch, "added repository");
        Ok(Outcome::Done)
    }
}
