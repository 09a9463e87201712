//! Entry points for every apm command.

use std::fs;
use std::sync::Arc;

use crate::admin::{AdminClient, HttpAdminClient};
use crate::alias::RepoAlias;
use crate::config::{ApmConfig, CORE_ALIAS, CORE_BRANCH, CORE_URL};
use crate::engine::{Executor, Outcome, WorkflowEngine};
use crate::error::{IoContext, Result};
use crate::installer::{Installer, VmInstaller};
use crate::registry::RepositoryFactory;
use crate::state::StateFile;
use crate::storage::{DiskStore, SourceInfo};
use crate::vcs::{GitCli, VersionControl};
use crate::workflow::{
    AddRepository, Install, InstallEnv, JoinSubnet, RemoveRepository, Uninstall, Update,
    Upgrade, UpgradeVm,
};

/// External systems apm drives.
#[derive(Clone)]
pub struct Collaborators {
    pub vcs: Arc<dyn VersionControl>,
    pub installer: Arc<dyn Installer>,
    pub admin: Arc<dyn AdminClient>,
}

pub struct PluginManager {
    config: ApmConfig,
    state: StateFile,
    repositories: RepositoryFactory,
    engine: Arc<WorkflowEngine>,
    collaborators: Collaborators,
}

impl PluginManager {
    /// Open with git, HTTP download and the node admin API.
    pub fn open(config: ApmConfig) -> Result<Self> {
        let collaborators = Collaborators {
            vcs: Arc::new(GitCli::locate()?),
            installer: Arc::new(VmInstaller::new()?),
            admin: Arc::new(HttpAdminClient::new(&config.admin_api_endpoint)),
        };
        Self::with_collaborators(config, collaborators)
    }

    pub fn with_collaborators(config: ApmConfig, collaborators: Collaborators) -> Result<Self> {
        for dir in [
            config.apm_dir.clone(),
            config.repositories_dir(),
            config.tmp_dir(),
            config.plugin_dir.clone(),
        ] {
            fs::create_dir_all(&dir).io_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let store = DiskStore::open(&config.db_dir())?;
        let state = StateFile::load(&config.apm_dir)?;
        let engine = Arc::new(WorkflowEngine::new(state.clone()));

        Ok(Self {
            repositories: RepositoryFactory::new(Arc::new(store)),
            config,
            state,
            engine,
            collaborators,
        })
    }

    pub fn config(&self) -> &ApmConfig {
        &self.config
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    /// Track the core repository and sync it once.
    pub fn bootstrap(&self) -> Result<()> {
        let sources = self.state.sources();
        if !sources.has(CORE_ALIAS)? {
            tracing::info!(alias = CORE_ALIAS, "registering core repository");
            self.add_repository(CORE_ALIAS, CORE_URL, CORE_BRANCH)?;
        }
        if sources.get(CORE_ALIAS)?.commit.is_zero() {
            tracing::info!("core repository was never synced, updating");
            self.update()?;
        }
        Ok(())
    }

    pub fn add_repository(&self, alias: &str, url: &str, branch: &str) -> Result<Outcome> {
        self.engine.execute(&AddRepository {
            sources: self.state.sources(),
            alias: alias.parse()?,
            url: url.to_string(),
            branch: branch.to_string(),
        })
    }

    pub fn remove_repository(&self, alias: &str) -> Result<Outcome> {
        let alias: RepoAlias = alias.parse()?;
        self.engine.execute(&RemoveRepository {
            sources: self.state.sources(),
            repository: self.repositories.repository(&alias),
            reverse_index: self.state.reverse_index(),
            checkout: self.config.repositories_dir().join(alias.relative_path()),
            alias,
        })
    }

    pub fn list_repositories(&self) -> Result<Vec<SourceInfo>> {
        self.state.repositories()
    }

    pub fn update(&self) -> Result<Outcome> {
        self.engine.execute(&Update {
            sources: self.state.sources(),
            repositories: self.repositories.clone(),
            reverse_index: self.state.reverse_index(),
            vcs: Arc::clone(&self.collaborators.vcs),
            repositories_dir: self.config.repositories_dir(),
            executor: self.executor(),
        })
    }

    pub fn install(&self, name: &str) -> Result<Outcome> {
        let name = self.state.reverse_index().resolve(name)?;
        self.engine.execute(&Install {
            repository: self.repositories.repository(&name.repo),
            env: self.install_env(),
            force: false,
            name,
        })
    }

    pub fn uninstall(&self, name: &str) -> Result<Outcome> {
        let name = self.state.reverse_index().resolve(name)?;
        self.engine.execute(&Uninstall {
            repository: self.repositories.repository(&name.repo),
            installed_vms: self.state.installed_vms(),
            plugin_dir: self.config.plugin_dir.clone(),
            name,
        })
    }

    /// Upgrade one VM, or all installed VMs when `name` is `None`.
    pub fn upgrade(&self, name: Option<&str>) -> Result<Outcome> {
        match name {
            Some(name) => {
                let name = self.state.reverse_index().resolve(name)?;
                self.engine.execute(&UpgradeVm {
                    name,
                    sources: self.state.sources(),
                    repositories: self.repositories.clone(),
                    env: self.install_env(),
                    executor: self.executor(),
                })
            }
            None => self.engine.execute(&Upgrade {
                sources: self.state.sources(),
                repositories: self.repositories.clone(),
                env: self.install_env(),
                executor: self.executor(),
            }),
        }
    }

    pub fn join_subnet(&self, name: &str) -> Result<Outcome> {
        let name = self.state.reverse_index().resolve(name)?;
        self.engine.execute(&JoinSubnet {
            repository: self.repositories.repository(&name.repo),
            env: self.install_env(),
            admin: Arc::clone(&self.collaborators.admin),
            executor: self.executor(),
            name,
        })
    }

    fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.engine) as Arc<dyn Executor>
    }

    fn install_env(&self) -> InstallEnv {
        InstallEnv {
            installed_vms: self.state.installed_vms(),
            installer: Arc::clone(&self.collaborators.installer),
            tmp_dir: self.config.tmp_dir(),
            plugin_dir: self.config.plugin_dir.clone(),
        }
    }
}
