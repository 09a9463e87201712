use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Version;

/// A git commit id. The all-zero id marks a repository that was never synced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commit(String);

impl Commit {
    const ZERO: &'static str = "0000000000000000000000000000000000000000";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn zero() -> Self {
        Self(Self::ZERO.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Self::ZERO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Commit {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tracked plugin repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub alias: String,
    pub url: String,
    pub branch: String,
    /// Last commit whose definitions were fully loaded.
    #[serde(default)]
    pub commit: Commit,
}

/// A plugin definition loaded from one repository sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition<T> {
    pub definition: T,
    /// Sync commit that last wrote this entry. Staleness GC keys on it.
    pub commit: Commit,
    /// Last commit that touched the definition file.
    #[serde(default)]
    pub modified: Commit,
}

impl<T> Definition<T> {
    /// Commit recorded for an install of this definition.
    pub fn provenance(&self) -> &Commit {
        if self.modified.is_zero() {
            &self.commit
        } else {
            &self.modified
        }
    }
}

/// Repositories offering one plugin alias. Sorted, no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoList {
    pub repositories: Vec<String>,
}

impl RepoList {
    /// Sorted insert. Returns false if `repository` was already listed.
    pub fn insert(&mut self, repository: &str) -> bool {
        match self
            .repositories
            .binary_search_by(|listed| listed.as_str().cmp(repository))
        {
            Ok(_) => false,
            Err(idx) => {
                self.repositories.insert(idx, repository.to_string());
                true
            }
        }
    }

    /// Returns false if `repository` was not listed.
    pub fn remove(&mut self, repository: &str) -> bool {
        match self
            .repositories
            .binary_search_by(|listed| listed.as_str().cmp(repository))
        {
            Ok(idx) => {
                self.repositories.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

/// An installed VM binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallInfo {
    pub id: String,
    pub version: Version,
    /// Last commit touching the installed definition's file.
    pub commit: Commit,
    #[serde(default)]
    pub installed_at: String,
}
