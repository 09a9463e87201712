//! Fakes and fixtures shared by unit tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::admin::AdminClient;
use crate::alias::RepoAlias;
use crate::engine::{Executor, Outcome, WorkflowEngine};
use crate::error::{Error, Result};
use crate::installer::Installer;
use crate::registry::{Repository, RepositoryFactory};
use crate::state::StateFile;
use crate::storage::{Commit, Definition, KeyValueStore, MemoryStore};
use crate::types::{Version, Vm};
use crate::vcs::VersionControl;
use crate::workflow::{AddRepository, InstallEnv, Update};

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub(crate) fn vm_yaml(alias: &str, version: &str, sha256: &str, install_script: &str) -> String {
    format!(
        "vm:\n  id: {alias}-id\n  alias: {alias}\n  installScript: \"{install_script}\"\n  binaryPath: build/{alias}\n  url: https://example.org/{alias}.tar.gz\n  sha256: \"{sha256}\"\n  version: {version}\n"
    )
}

pub(crate) fn subnet_yaml(alias: &str, vms: &[&str]) -> String {
    let mut out = format!("subnet:\n  id: {alias}-id\n  alias: {alias}\n  vms:\n");
    for vm in vms {
        out.push_str(&format!("    - {vm}\n"));
    }
    out
}

pub(crate) fn vm(alias: &str, version: Version, sha256: &str) -> Vm {
    Vm {
        id: format!("{alias}-id"),
        alias: alias.to_string(),
        homepage: String::new(),
        description: String::new(),
        maintainers: vec![],
        install_script: String::new(),
        binary_path: format!("build/{alias}"),
        url: format!("https://example.org/{alias}.tar.gz"),
        sha256: sha256.to_string(),
        version,
    }
}

/// Memory store that counts mutations.
#[derive(Debug, Default)]
pub(crate) struct CountingStore {
    inner: MemoryStore,
    writes: AtomicUsize,
}

impl CountingStore {
    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for CountingStore {
    fn has(&self, key: &[u8]) -> Result<bool> {
        self.inner.has(key)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key)
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan(prefix)
    }
}

/// A remote branch: head commit, the file tree at that commit and the commit
/// that last changed each file.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeRemote {
    pub(crate) head: String,
    pub(crate) files: BTreeMap<String, String>,
    pub(crate) modified: BTreeMap<String, String>,
}

/// Version control that "checks out" in-memory trees.
#[derive(Debug, Default)]
pub(crate) struct FakeVcs {
    remotes: Mutex<BTreeMap<String, FakeRemote>>,
    checkouts: Mutex<BTreeMap<PathBuf, FakeRemote>>,
    syncs: AtomicUsize,
}

impl FakeVcs {
    /// Push a new head. Files whose body is unchanged keep their previous
    /// last-modified commit.
    pub(crate) fn publish(&self, url: &str, head: &str, files: &[(&str, String)]) {
        let mut remotes = self.remotes.lock().unwrap();
        let previous = remotes.get(url).cloned().unwrap_or_default();
        let mut remote = FakeRemote {
            head: head.to_string(),
            ..FakeRemote::default()
        };
        for (path, body) in files {
            let modified = match (previous.files.get(*path), previous.modified.get(*path)) {
                (Some(old), Some(commit)) if old == body => commit.clone(),
                _ => head.to_string(),
            };
            remote.files.insert(path.to_string(), body.clone());
            remote.modified.insert(path.to_string(), modified);
        }
        remotes.insert(url.to_string(), remote);
    }

    /// Treat an existing directory as a checkout at `head` where every file
    /// was last changed by `head`.
    pub(crate) fn adopt(&self, path: &Path, head: &str) {
        self.checkouts.lock().unwrap().insert(
            path.to_path_buf(),
            FakeRemote {
                head: head.to_string(),
                ..FakeRemote::default()
            },
        );
    }

    pub(crate) fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

impl VersionControl for FakeVcs {
    fn sync(&self, url: &str, path: &Path, _branch: &str) -> Result<Commit> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        let remote = self
            .remotes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Git(format!("unknown remote {url}")))?;

        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        fs::create_dir_all(path)?;
        for (file, body) in &remote.files {
            let target = path.join(file);
            fs::create_dir_all(target.parent().unwrap())?;
            fs::write(target, body)?;
        }
        let head = Commit::new(remote.head.clone());
        self.checkouts
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), remote);
        Ok(head)
    }

    fn last_modified(&self, path: &Path, file: &Path) -> Result<Commit> {
        let checkouts = self.checkouts.lock().unwrap();
        let checkout = checkouts
            .get(path)
            .ok_or_else(|| Error::Git(format!("{} is not a checkout", path.display())))?;
        let file = file.to_string_lossy();
        Ok(Commit::new(
            checkout
                .modified
                .get(&*file)
                .unwrap_or(&checkout.head)
                .clone(),
        ))
    }
}

/// Installer that serves a fixed archive and "unpacks" a fixed file set.
#[derive(Debug, Default)]
pub(crate) struct FakeInstaller {
    pub(crate) archive: Vec<u8>,
    pub(crate) contents: Vec<(String, Vec<u8>)>,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl FakeInstaller {
    pub(crate) fn new(archive: &[u8], contents: &[(&str, &[u8])]) -> Self {
        Self {
            archive: archive.to_vec(),
            contents: contents
                .iter()
                .map(|(path, body)| (path.to_string(), body.to_vec()))
                .collect(),
            calls: Mutex::new(vec![]),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Installer for FakeInstaller {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.record(format!("download {url}"));
        fs::create_dir_all(dest.parent().unwrap())?;
        fs::write(dest, &self.archive)?;
        Ok(())
    }

    fn decompress(&self, archive: &Path, dest: &Path) -> Result<()> {
        assert!(archive.is_file(), "archive missing at decompress time");
        self.record("decompress".to_string());
        for (path, body) in &self.contents {
            let target = dest.join(path);
            fs::create_dir_all(target.parent().unwrap())?;
            fs::write(target, body)?;
        }
        Ok(())
    }

    fn install(&self, working_dir: &Path, args: &[String]) -> Result<()> {
        assert!(working_dir.is_dir(), "working dir missing at install time");
        self.record(format!("install {}", args.join(" ")));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeAdmin {
    pub(crate) offline: bool,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl FakeAdmin {
    pub(crate) fn offline() -> Self {
        Self {
            offline: true,
            calls: Mutex::new(vec![]),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn call(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.offline {
            return Err(Error::AdminUnreachable {
                endpoint: "127.0.0.1:9650/ext/admin".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl AdminClient for FakeAdmin {
    fn load_vms(&self) -> Result<()> {
        self.call("loadVMs".to_string())
    }

    fn whitelist_subnet(&self, subnet_id: &str) -> Result<()> {
        self.call(format!("whitelistSubnet {subnet_id}"))
    }
}

/// Temp apm directory with state, an in-memory definition store and fakes.
pub(crate) struct Fixture {
    pub(crate) tmp: TempDir,
    pub(crate) state: StateFile,
    pub(crate) store: Arc<CountingStore>,
    pub(crate) factory: RepositoryFactory,
    pub(crate) engine: Arc<WorkflowEngine>,
    pub(crate) vcs: Arc<FakeVcs>,
    pub(crate) installer: Arc<FakeInstaller>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with_installer(FakeInstaller::default())
    }

    pub(crate) fn with_installer(installer: FakeInstaller) -> Self {
        let tmp = TempDir::new().unwrap();
        let state = StateFile::load(tmp.path()).unwrap();
        let store = Arc::new(CountingStore::default());
        let factory = RepositoryFactory::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
        let engine = Arc::new(WorkflowEngine::new(state.clone()));
        Self {
            tmp,
            state,
            store,
            factory,
            engine,
            vcs: Arc::new(FakeVcs::default()),
            installer: Arc::new(installer),
        }
    }

    pub(crate) fn apm_dir(&self) -> &Path {
        self.tmp.path()
    }

    pub(crate) fn repositories_dir(&self) -> PathBuf {
        self.apm_dir().join("repositories")
    }

    pub(crate) fn tmp_dir(&self) -> PathBuf {
        self.apm_dir().join("tmp")
    }

    pub(crate) fn plugin_dir(&self) -> PathBuf {
        self.apm_dir().join("plugins")
    }

    pub(crate) fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.engine) as Arc<dyn Executor>
    }

    pub(crate) fn repository(&self, alias: &str) -> Repository {
        self.factory.repository(&alias.parse::<RepoAlias>().unwrap())
    }

    pub(crate) fn install_env(&self) -> InstallEnv {
        InstallEnv {
            installed_vms: self.state.installed_vms(),
            installer: Arc::clone(&self.installer) as Arc<dyn Installer>,
            tmp_dir: self.tmp_dir(),
            plugin_dir: self.plugin_dir(),
        }
    }

    /// Store a VM definition directly, bypassing repository sync.
    pub(crate) fn define_vm(&self, repo: &str, vm: Vm, commit: &str) {
        let alias: RepoAlias = repo.parse().unwrap();
        self.factory
            .repository(&alias)
            .vms
            .put(
                &vm.alias.clone(),
                &Definition {
                    definition: vm.clone(),
                    commit: Commit::new(commit),
                    modified: Commit::new(commit),
                },
            )
            .unwrap();
        self.state.reverse_index().register(&vm.alias, &alias).unwrap();
    }

    pub(crate) fn add_repository(&self, alias: &str, url: &str) {
        self.engine
            .execute(&AddRepository {
                sources: self.state.sources(),
                alias: alias.parse().unwrap(),
                url: url.to_string(),
                branch: "main".to_string(),
            })
            .unwrap();
    }

    pub(crate) fn update(&self) -> Result<Outcome> {
        self.engine.execute(&self.update_workflow())
    }

    pub(crate) fn update_workflow(&self) -> Update {
        Update {
            sources: self.state.sources(),
            repositories: self.factory.clone(),
            reverse_index: self.state.reverse_index(),
            vcs: Arc::clone(&self.vcs) as Arc<dyn VersionControl>,
            repositories_dir: self.repositories_dir(),
            executor: self.executor(),
        }
    }
}
