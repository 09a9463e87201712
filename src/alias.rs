//! Repository aliases (`organization/repository`) and qualified plugin names
//! (`organization/repository:plugin`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::storage::RepoList;

pub const ALIAS_DELIMITER: char = '/';
pub const QUALIFIED_NAME_DELIMITER: char = ':';

/// Identifies a tracked repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoAlias {
    pub organization: String,
    pub repository: String,
}

impl RepoAlias {
    /// Relative path used for on-disk copies of this repository.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.organization).join(&self.repository)
    }
}

impl FromStr for RepoAlias {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(ALIAS_DELIMITER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(organization), Some(repository), None)
                if valid_segment(organization) && valid_segment(repository) =>
            {
                Ok(Self {
                    organization: organization.to_string(),
                    repository: repository.to_string(),
                })
            }
            _ => Err(Error::InvalidAlias(s.to_string())),
        }
    }
}

impl fmt::Display for RepoAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{ALIAS_DELIMITER}{}", self.organization, self.repository)
    }
}

/// Unambiguous reference to one plugin in one repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    pub repo: RepoAlias,
    pub plugin: String,
}

impl QualifiedName {
    pub fn new(repo: RepoAlias, plugin: impl Into<String>) -> Self {
        Self {
            repo,
            plugin: plugin.into(),
        }
    }

    pub fn is_qualified(name: &str) -> bool {
        name.contains(QUALIFIED_NAME_DELIMITER)
    }
}

impl FromStr for QualifiedName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (repo, plugin) = s
            .split_once(QUALIFIED_NAME_DELIMITER)
            .ok_or_else(|| Error::InvalidQualifiedName(s.to_string()))?;
        if !is_valid_plugin_name(plugin) {
            return Err(Error::InvalidQualifiedName(s.to_string()));
        }
        let repo = repo
            .parse()
            .map_err(|_| Error::InvalidQualifiedName(s.to_string()))?;
        Ok(Self::new(repo, plugin))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{QUALIFIED_NAME_DELIMITER}{}", self.repo, self.plugin)
    }
}

/// Turn a user-supplied name into a qualified name.
///
/// Qualified input is parsed as-is. A bare plugin alias is looked up in the
/// reverse index (`lookup`) and must be offered by exactly one repository.
pub fn resolve<F>(name: &str, lookup: F) -> Result<QualifiedName>
where
    F: FnOnce(&str) -> Result<Option<RepoList>>,
{
    if QualifiedName::is_qualified(name) {
        return name.parse();
    }
    if !is_valid_plugin_name(name) {
        return Err(Error::InvalidQualifiedName(name.to_string()));
    }

    let repositories = lookup(name)?
        .map(|list| list.repositories)
        .unwrap_or_default();

    match repositories.as_slice() {
        [] => Err(Error::not_found("plugin", name)),
        [only] => Ok(QualifiedName::new(only.parse()?, name)),
        _ => Err(Error::Ambiguous {
            alias: name.to_string(),
            candidates: repositories,
        }),
    }
}

/// Plugin aliases and VM ids name files under the scratch and plugin
/// directories. Each must be one plain path component.
pub fn is_valid_plugin_name(name: &str) -> bool {
    valid_segment(name) && !name.contains(QUALIFIED_NAME_DELIMITER)
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains([ALIAS_DELIMITER, '\\', '\0'])
        && !segment.chars().any(char::is_whitespace)
}
