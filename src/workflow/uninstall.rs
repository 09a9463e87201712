use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::alias::QualifiedName;
use crate::engine::{Outcome, Workflow};
use crate::error::{IoContext, Result};
use crate::registry::Repository;
use crate::storage::{InstallInfo, TypedStorage};

/// Remove an installed VM binary and its record.
#[derive(Debug, Clone)]
pub struct Uninstall {
    pub name: QualifiedName,
    pub repository: Repository,
    pub installed_vms: TypedStorage<InstallInfo>,
    pub plugin_dir: PathBuf,
}

impl Workflow for Uninstall {
    fn name(&self) -> String {
        format!("uninstall {}", self.name)
    }

    fn execute(&self) -> Result<Outcome> {
        let key = self.name.to_string();
        let Some(info) = self.installed_vms.find(&key)? else {
            tracing::info!(vm = %key, "not installed, nothing to do");
            return Ok(Outcome::Skipped);
        };

        let id = match self.repository.vms.find(&self.name.plugin)? {
            Some(definition) => definition.definition.id,
            None => {
                tracing::warn!(
                    vm = %key,
                    "definition no longer exists in its repository, removing recorded binary"
                );
                info.id.clone()
            }
        };

        let binary = self.plugin_dir.join(&id);
        match fs::remove_file(&binary) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %binary.display(), "binary already gone");
            }
            Err(err) => {
                return Err(err).io_context(|| format!("Failed to remove {}", binary.display()))
            }
        }

        self.installed_vms.delete(&key)?;
        tracing::info!(vm = %key, "uninstalled");
        Ok(Outcome::Done)
    }
}
