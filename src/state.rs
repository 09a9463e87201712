//! The State File: tracked sources, reverse index and installed VMs.
//!
//! Loaded once per process into an in-memory store; every table is a
//! [`TypedStorage`] view over it. [`StateFile::commit`] exports the tables
//! into a single JSON document and replaces `apm.state` atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{IoContext, Result};
use crate::registry::ReverseIndex;
use crate::storage::{
    InstallInfo, KeyValueStore, MemoryStore, Namespace, RepoList, SourceInfo, TypedStorage,
    INSTALLED_VMS, REPO_LIST, SOURCES,
};

pub const STATE_FILE_NAME: &str = "apm.state";

/// On-disk form of the State File.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceInfo>,
    #[serde(default)]
    pub repo_list: BTreeMap<String, RepoList>,
    #[serde(default)]
    pub installed_vms: BTreeMap<String, InstallInfo>,
}

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
    sources: TypedStorage<SourceInfo>,
    repo_list: TypedStorage<RepoList>,
    installed_vms: TypedStorage<InstallInfo>,
}

impl StateFile {
    /// Load `<dir>/apm.state`. A missing file yields empty tables.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(STATE_FILE_NAME);
        let document = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => StateDocument::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => StateDocument::default(),
            Err(err) => {
                return Err(err).io_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        let state = Self {
            path,
            sources: TypedStorage::new(Arc::clone(&store), Namespace::root(SOURCES), "repository"),
            repo_list: TypedStorage::new(Arc::clone(&store), Namespace::root(REPO_LIST), "plugin"),
            installed_vms: TypedStorage::new(
                Arc::clone(&store),
                Namespace::root(INSTALLED_VMS),
                "installed vm",
            ),
        };

        for (alias, source) in &document.sources {
            state.sources.put(alias, source)?;
        }
        for (plugin, list) in &document.repo_list {
            state.repo_list.put(plugin, list)?;
        }
        for (name, info) in &document.installed_vms {
            state.installed_vms.put(name, info)?;
        }

        Ok(state)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sources(&self) -> TypedStorage<SourceInfo> {
        self.sources.clone()
    }

    /// Tracked repositories in alias order.
    pub fn repositories(&self) -> Result<Vec<SourceInfo>> {
        Ok(self
            .sources
            .iter()?
            .into_iter()
            .map(|(_, source)| source)
            .collect())
    }

    pub fn reverse_index(&self) -> ReverseIndex {
        ReverseIndex::new(self.repo_list.clone())
    }

    pub fn installed_vms(&self) -> TypedStorage<InstallInfo> {
        self.installed_vms.clone()
    }

    /// Current contents as the on-disk document.
    pub fn snapshot(&self) -> Result<StateDocument> {
        Ok(StateDocument {
            sources: self.sources.iter()?.into_iter().collect(),
            repo_list: self.repo_list.iter()?.into_iter().collect(),
            installed_vms: self.installed_vms.iter()?.into_iter().collect(),
        })
    }

    /// Write the current contents to disk (owner read/write only).
    pub fn commit(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.snapshot()?)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).io_context(|| format!("Failed to create {}", dir.display()))?;

        let tmp = dir.join(format!(".{STATE_FILE_NAME}.tmp"));
        write_private(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path).io_context(|| {
            format!("Failed to move {} to {}", tmp.display(), self.path.display())
        })
    }
}

fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut options = fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .io_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .io_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Commit;
    use crate::types::Version;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let state = StateFile::load(tmp.path()).unwrap();
        assert_eq!(state.snapshot().unwrap(), StateDocument::default());
    }

    #[test]
    fn repositories_are_listed_from_a_committed_file_alone() {
        let tmp = TempDir::new().unwrap();
        let state = StateFile::load(tmp.path()).unwrap();
        for alias in ["org/b", "org/a"] {
            state
                .sources()
                .put(
                    alias,
                    &SourceInfo {
                        alias: alias.to_string(),
                        url: format!("https://example.org/{alias}.git"),
                        branch: "main".to_string(),
                        commit: Commit::zero(),
                    },
                )
                .unwrap();
        }
        state.commit().unwrap();

        let listed = StateFile::load(tmp.path()).unwrap().repositories().unwrap();
        let aliases: Vec<_> = listed.iter().map(|s| s.alias.as_str()).collect();
        assert_eq!(aliases, vec!["org/a", "org/b"]);
        let mut names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec![STATE_FILE_NAME.to_string()]);
    }

    #[test]
    fn empty_state_roundtrips() {
        let tmp = TempDir::new().unwrap();
        StateFile::load(tmp.path()).unwrap().commit().unwrap();

        let reloaded = StateFile::load(tmp.path()).unwrap();
        assert_eq!(reloaded.snapshot().unwrap(), StateDocument::default());
    }

    #[test]
    fn populated_state_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let state = StateFile::load(tmp.path()).unwrap();

        state
            .sources()
            .put(
                "org/repo",
                &SourceInfo {
                    alias: "org/repo".into(),
                    url: "https://example.org/org/repo.git".into(),
                    branch: "main".into(),
                    commit: Commit::new("abc123"),
                },
            )
            .unwrap();
        state
            .reverse_index()
            .register("myvm", &"org/repo".parse().unwrap())
            .unwrap();
        state
            .installed_vms()
            .put(
                "org/repo:myvm",
                &InstallInfo {
                    id: "vmid".into(),
                    version: Version::new(1, 2, 3),
                    commit: Commit::new("abc123"),
                    installed_at: "2026-01-01T00:00:00Z".into(),
                },
            )
            .unwrap();
        state.commit().unwrap();

        let reloaded = StateFile::load(tmp.path()).unwrap();
        assert_eq!(reloaded.snapshot().unwrap(), state.snapshot().unwrap());
        assert_eq!(
            reloaded.snapshot().unwrap().repo_list["myvm"].repositories,
            vec!["org/repo".to_string()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn committed_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let state = StateFile::load(tmp.path()).unwrap();
        state.commit().unwrap();

        let mode = fs::metadata(state.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
