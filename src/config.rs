//! Runtime configuration.
//!
//! Resolution order, later wins:
//!
//! 1. built-in defaults (`~/.apm`, `~/.avalanchego/plugins`, local node)
//! 2. the TOML config file, when one is given
//! 3. command-line flags

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, IoContext, Result};

pub const CORE_ALIAS: &str = "ava-labs/avalanche-plugins-core";
pub const CORE_URL: &str = "https://github.com/ava-labs/avalanche-plugins-core.git";
pub const CORE_BRANCH: &str = "master";

pub const DEFAULT_ADMIN_API_ENDPOINT: &str = "127.0.0.1:9650/ext/admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApmConfig {
    /// Root of all apm-owned state.
    pub apm_dir: PathBuf,
    /// Where installed VM binaries go.
    pub plugin_dir: PathBuf,
    pub admin_api_endpoint: String,
}

/// Shape of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct ConfigFile {
    apm_path: Option<PathBuf>,
    plugin_path: Option<PathBuf>,
    admin_api_endpoint: Option<String>,
}

impl ApmConfig {
    pub fn defaults() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            apm_dir: home.join(".apm"),
            plugin_dir: home.join(".avalanchego").join("plugins"),
            admin_api_endpoint: DEFAULT_ADMIN_API_ENDPOINT.to_string(),
        }
    }

    /// Defaults overlaid with `config_file`, if given.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::defaults();
        if let Some(path) = config_file {
            let text = fs::read_to_string(path)
                .io_context(|| format!("Failed to read config {}", path.display()))?;
            let file: ConfigFile = toml::from_str(&text).map_err(|source| Error::Toml {
                path: path.to_path_buf(),
                source,
            })?;
            config.apply(file.apm_path, file.plugin_path, file.admin_api_endpoint);
        }
        Ok(config)
    }

    /// Overlay any values that are set.
    pub fn apply(
        &mut self,
        apm_dir: Option<PathBuf>,
        plugin_dir: Option<PathBuf>,
        admin_api_endpoint: Option<String>,
    ) {
        if let Some(dir) = apm_dir {
            self.apm_dir = dir;
        }
        if let Some(dir) = plugin_dir {
            self.plugin_dir = dir;
        }
        if let Some(endpoint) = admin_api_endpoint {
            self.admin_api_endpoint = endpoint;
        }
    }

    pub fn repositories_dir(&self) -> PathBuf {
        self.apm_dir.join("repositories")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.apm_dir.join("tmp")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.apm_dir.join("db")
    }
}
