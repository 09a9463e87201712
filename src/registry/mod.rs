//! Definition registry: per-repository definition tables plus the global
//! reverse index from plugin alias to the repositories offering it.

use std::sync::Arc;

use crate::alias::{self, QualifiedName, RepoAlias};
use crate::error::Result;
use crate::storage::{
    Definition, KeyValueStore, Namespace, RepoList, TypedStorage, REPOSITORY,
};
use crate::types::{Subnet, Vm};

/// Definition tables of one repository.
#[derive(Debug, Clone)]
pub struct Repository {
    pub alias: RepoAlias,
    pub vms: TypedStorage<Definition<Vm>>,
    pub subnets: TypedStorage<Definition<Subnet>>,
}

impl Repository {
    pub fn vm(&self, plugin: &str) -> Result<Definition<Vm>> {
        self.vms.get(plugin)
    }

    pub fn subnet(&self, plugin: &str) -> Result<Definition<Subnet>> {
        self.subnets.get(plugin)
    }

    /// Whether any definition of this repository still uses `plugin`.
    pub fn defines(&self, plugin: &str) -> Result<bool> {
        Ok(self.vms.has(plugin)? || self.subnets.has(plugin)?)
    }
}

/// Hands out [`Repository`] views over the shared definition store.
#[derive(Debug, Clone)]
pub struct RepositoryFactory {
    store: Arc<dyn KeyValueStore>,
}

impl RepositoryFactory {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn repository(&self, alias: &RepoAlias) -> Repository {
        let base = Namespace::root(REPOSITORY).child(&alias.to_string());
        Repository {
            alias: alias.clone(),
            vms: TypedStorage::new(Arc::clone(&self.store), base.child("vm"), "vm"),
            subnets: TypedStorage::new(Arc::clone(&self.store), base.child("subnet"), "subnet"),
        }
    }
}

/// Plugin alias -> repositories defining it.
#[derive(Debug, Clone)]
pub struct ReverseIndex {
    table: TypedStorage<RepoList>,
}

impl ReverseIndex {
    pub fn new(table: TypedStorage<RepoList>) -> Self {
        Self { table }
    }

    /// Record that `repository` offers `plugin`. Writes only when the
    /// repository was not listed yet.
    pub fn register(&self, plugin: &str, repository: &RepoAlias) -> Result<bool> {
        let mut list = self.table.find(plugin)?.unwrap_or_default();
        if !list.insert(&repository.to_string()) {
            return Ok(false);
        }
        self.table.put(plugin, &list)?;
        Ok(true)
    }

    /// Drop `repository` from `plugin`'s list, deleting the entry once empty.
    pub fn unregister(&self, plugin: &str, repository: &RepoAlias) -> Result<bool> {
        let Some(mut list) = self.table.find(plugin)? else {
            return Ok(false);
        };
        if !list.remove(&repository.to_string()) {
            return Ok(false);
        }
        if list.is_empty() {
            self.table.delete(plugin)?;
        } else {
            self.table.put(plugin, &list)?;
        }
        Ok(true)
    }

    pub fn lookup(&self, plugin: &str) -> Result<Option<RepoList>> {
        self.table.find(plugin)
    }

    pub fn entries(&self) -> Result<Vec<(String, RepoList)>> {
        self.table.iter()
    }

    /// Resolve a qualified or bare plugin name.
    pub fn resolve(&self, name: &str) -> Result<QualifiedName> {
        alias::resolve(name, |plugin| self.lookup(plugin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::{MemoryStore, REPO_LIST};
    use pretty_assertions::assert_eq;

    fn index() -> ReverseIndex {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        ReverseIndex::new(TypedStorage::new(store, Namespace::root(REPO_LIST), "plugin"))
    }

    fn repo(alias: &str) -> RepoAlias {
        alias.parse().unwrap()
    }

    #[test]
    fn register_is_sorted_and_deduplicated() {
        let index = index();
        assert!(index.register("foo", &repo("org/r2")).unwrap());
        assert!(index.register("foo", &repo("org/r1")).unwrap());
        assert!(!index.register("foo", &repo("org/r2")).unwrap());

        assert_eq!(
            index.lookup("foo").unwrap().unwrap().repositories,
            vec!["org/r1".to_string(), "org/r2".to_string()]
        );
    }

    #[test]
    fn unregister_deletes_empty_entries() {
        let index = index();
        index.register("foo", &repo("org/r1")).unwrap();
        index.register("foo", &repo("org/r2")).unwrap();

        assert!(index.unregister("foo", &repo("org/r1")).unwrap());
        assert_eq!(
            index.lookup("foo").unwrap().unwrap().repositories,
            vec!["org/r2".to_string()]
        );
        assert!(index.unregister("foo", &repo("org/r2")).unwrap());
        assert_eq!(index.lookup("foo").unwrap(), None);
        assert!(!index.unregister("foo", &repo("org/r2")).unwrap());
    }

    #[test]
    fn resolve_goes_through_the_index() {
        let index = index();
        index.register("foo", &repo("org/r1")).unwrap();
        assert_eq!(index.resolve("foo").unwrap().to_string(), "org/r1:foo");

        index.register("foo", &repo("org/r2")).unwrap();
        assert!(matches!(
            index.resolve("foo"),
            Err(Error::Ambiguous { .. })
        ));
    }

    #[test]
    fn repositories_are_isolated() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        let factory = RepositoryFactory::new(store);
        let a = factory.repository(&repo("org/a"));
        let b = factory.repository(&repo("org/b"));

        let subnet = Subnet {
            id: "id".into(),
            alias: "s".into(),
            homepage: String::new(),
            description: String::new(),
            maintainers: vec![],
            vms: vec![],
            config: None,
        };
        a.subnets
            .put(
                "s",
                &Definition {
                    definition: subnet,
                    commit: Default::default(),
                    modified: Default::default(),
                },
            )
            .unwrap();

        assert!(a.defines("s").unwrap());
        assert!(!b.defines("s").unwrap());
        assert!(a.vm("s").unwrap_err().is_not_found());
    }
}
