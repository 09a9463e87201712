use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::alias::{is_valid_plugin_name, RepoAlias};
use crate::engine::{Outcome, Workflow};
use crate::error::{Error, IoContext, Result};
use crate::registry::{Repository, ReverseIndex};
use crate::storage::{Commit, Definition, SourceInfo, TypedStorage};
use crate::types::{PluginDefinition, Subnet, Vm};
use crate::vcs::VersionControl;

/// Load a synced checkout into the registry and drop definitions the new
/// commit no longer carries. The source's commit is advanced last, so an
/// interrupted load is redone on the next update.
#[derive(Clone)]
pub struct UpdateRepository {
    pub alias: RepoAlias,
    pub source: SourceInfo,
    pub checkout: PathBuf,
    pub latest: Commit,
    pub repository: Repository,
    pub reverse_index: ReverseIndex,
    pub sources: TypedStorage<SourceInfo>,
    pub vcs: Arc<dyn VersionControl>,
}

impl Workflow for UpdateRepository {
    fn name(&self) -> String {
        format!("update-repository {}", self.alias)
    }

    fn execute(&self) -> Result<Outcome> {
        tracing::info!(
            alias = %self.alias,
            from = %self.source.commit,
            to = %self.latest,
            "updating repository"
        );

        let vms = self.load::<Vm>(&self.repository.vms)?;
        let subnets = self.load::<Subnet>(&self.repository.subnets)?;

        let mut removed = self.collect_stale(&self.repository.vms)?;
        removed.extend(self.collect_stale(&self.repository.subnets)?);
        for plugin in &removed {
            // VM and subnet aliases share the index; keep the entry while
            // either table still defines the alias.
            if !self.repository.defines(plugin)? {
                self.reverse_index.unregister(plugin, &self.alias)?;
            }
        }

        self.sources.put(
            &self.alias.to_string(),
            &SourceInfo {
                commit: self.latest.clone(),
                ..self.source.clone()
            },
        )?;

        tracing::info!(
            alias = %self.alias,
            vms,
            subnets,
            removed = removed.len(),
            "repository updated"
        );
        Ok(Outcome::Done)
    }
}

impl UpdateRepository {
    /// Write every definition under `<checkout>/<T::DIR>` stamped with the
    /// latest commit and the commit that last touched its file. Definitions
    /// whose alias or id is not a plain file name are skipped. Returns how
    /// many were loaded.
    fn load<T: PluginDefinition>(&self, table: &TypedStorage<Definition<T>>) -> Result<usize> {
        let dir = self.checkout.join(T::DIR);
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::InvalidDefinition {
                    path: dir,
                    reason: "not a directory".to_string(),
                })
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(dir = %dir.display(), "no definitions of this kind");
                return Ok(0);
            }
            Err(err) => {
                return Err(err).io_context(|| format!("Failed to stat {}", dir.display()))
            }
        }

        let mut loaded = 0;
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| Error::Io {
                context: format!("Failed to read {}", dir.display()),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            let stem = match file_name.rfind('.') {
                Some(idx) => &file_name[..idx],
                None => &file_name[..],
            };
            if stem.is_empty() {
                continue;
            }

            let definition: T = parse_definition(entry.path())?;
            let alias = definition.alias().to_string();
            if !is_valid_plugin_name(&alias) || !is_valid_plugin_name(definition.id()) {
                tracing::warn!(
                    file = %entry.path().display(),
                    alias = %alias,
                    id = %definition.id(),
                    "skipping definition with an unsafe alias or id"
                );
                continue;
            }
            if alias != stem {
                tracing::warn!(
                    file = %entry.path().display(),
                    alias = %alias,
                    "definition alias differs from its file name"
                );
            }

            let relative = entry.path().strip_prefix(&self.checkout).unwrap_or(entry.path());
            let modified = self.vcs.last_modified(&self.checkout, relative)?;

            table.put(
                &alias,
                &Definition {
                    definition,
                    commit: self.latest.clone(),
                    modified,
                },
            )?;
            self.reverse_index.register(&alias, &self.alias)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Delete definitions not rewritten by this load. Returns their keys.
    fn collect_stale<T: PluginDefinition>(
        &self,
        table: &TypedStorage<Definition<T>>,
    ) -> Result<Vec<String>> {
        let mut removed = vec![];
        for (key, definition) in table.iter()? {
            if definition.commit == self.latest {
                continue;
            }
            tracing::info!(alias = %self.alias, plugin = %key, "removing stale definition");
            table.delete(&key)?;
            removed.push(key);
        }
        Ok(removed)
    }
}

fn parse_definition<T: PluginDefinition>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).io_context(|| format!("Failed to read {}", path.display()))?;
    let mut document: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_slice(&bytes).map_err(|source| Error::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    let value = document
        .remove(T::KEY)
        .ok_or_else(|| Error::InvalidDefinition {
            path: path.to_path_buf(),
            reason: format!("missing top-level '{}' key", T::KEY),
        })?;
    serde_yaml::from_value(value).map_err(|source| Error::Yaml {
        path: path.to_path_buf(),
        source,
    })
}
