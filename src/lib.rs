//! apm: a plugin manager for Avalanche node virtual machines.
//!
//! apm tracks git repositories of plugin definitions, indexes the VMs and
//! subnets they describe, and installs VM binaries into the node's plugin
//! directory:
//!
//! - **Repositories** - add, remove, list and sync definition repositories
//! - **Registry** - per-repository definition tables plus a reverse index
//!   from plugin alias to the repositories offering it
//! - **Installation** - download, checksum, unpack, build and place binaries
//! - **Subnets** - install a subnet's VMs and notify the running node
//!
//! # Architecture
//!
//! ```text
//! PluginManager (manager)
//!     │
//!     ├── WorkflowEngine (engine) ── commits the StateFile after each workflow
//!     │       │
//!     │       └── workflow::{AddRepository, RemoveRepository, Update,
//!     │                      UpdateRepository, Install, Uninstall,
//!     │                      Upgrade, UpgradeVm, JoinSubnet}
//!     │
//!     ├── StateFile (state) ─────── sources, reverse index, installed VMs
//!     ├── RepositoryFactory ─────── definitions in DiskStore (<apm_dir>/db)
//!     │
//!     └── Collaborators
//!             ├── VersionControl (vcs::GitCli)
//!             ├── Installer      (installer::VmInstaller)
//!             └── AdminClient    (admin::HttpAdminClient)
//! ```
//!
//! Mutating commands run under [`lock::ProcessLock`] so only one apm process
//! writes the State File at a time.
//!
//! # Example
//!
//! ```rust,ignore
//! use apm::{ApmConfig, PluginManager};
//!
//! let apm = PluginManager::open(ApmConfig::defaults())?;
//! apm.bootstrap()?;
//! apm.install("spacesvm")?;
//! ```

pub mod admin;
pub mod alias;
pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
pub mod installer;
pub mod lock;
pub mod manager;
pub mod registry;
pub mod state;
pub mod storage;
pub mod types;
pub mod vcs;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ApmConfig;
pub use engine::Outcome;
pub use error::{Error, Result};
pub use manager::{Collaborators, PluginManager};
