//! Byte-oriented key-value storage and the typed tables built on top of it.
//!
//! Every registry in apm is a [`TypedStorage`] bound to one namespace of a
//! [`KeyValueStore`]:
//!
//! ```text
//! StateFile (MemoryStore, persisted as apm.state)
//!     ├── sources\0                 alias      -> SourceInfo
//!     ├── repo_list\0               plugin     -> RepoList
//!     └── installed_vms\0           qualified  -> InstallInfo
//!
//! DiskStore (<apm_dir>/db)
//!     ├── repository\0<alias>\0vm\0      plugin -> Definition<Vm>
//!     └── repository\0<alias>\0subnet\0  plugin -> Definition<Subnet>
//! ```
//!
//! A namespace is a list of segments, each encoded as its bytes followed by a
//! `0x00` terminator. Aliases and plugin names never contain `0x00`, so two
//! distinct namespaces can never produce overlapping keys.

mod disk;
mod memory;
mod records;

pub use disk::DiskStore;
pub(crate) use disk::atomic_rename;
pub use memory::MemoryStore;
pub use records::{Commit, Definition, InstallInfo, RepoList, SourceInfo};

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

pub const SOURCES: &str = "sources";
pub const REPO_LIST: &str = "repo_list";
pub const INSTALLED_VMS: &str = "installed_vms";
pub const REPOSITORY: &str = "repository";

const SEGMENT_TERMINATOR: u8 = 0;

/// Ordered, byte-oriented key-value store.
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    fn has(&self, key: &[u8]) -> Result<bool>;
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Key prefix of one logical table.
#[derive(Clone, PartialEq, Eq)]
pub struct Namespace(Vec<u8>);

impl Namespace {
    pub fn root(segment: &str) -> Self {
        Self(Vec::new()).child(segment)
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(segment.as_bytes());
        bytes.push(SEGMENT_TERMINATOR);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn key(&self, key: &str) -> Vec<u8> {
        let mut out = self.0.clone();
        out.extend_from_slice(key.as_bytes());
        out
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = String::from_utf8_lossy(&self.0).replace('\0', "/");
        write!(f, "Namespace({text})")
    }
}

/// A value type bound to one namespace of a shared store.
///
/// Values are stored as JSON. Serialization and backing-store errors are
/// returned unchanged.
pub struct TypedStorage<V> {
    store: Arc<dyn KeyValueStore>,
    namespace: Namespace,
    what: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for TypedStorage<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
            what: self.what,
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for TypedStorage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedStorage")
            .field("namespace", &self.namespace)
            .field("what", &self.what)
            .finish()
    }
}

impl<V: Serialize + DeserializeOwned> TypedStorage<V> {
    /// `what` names the stored entity in `NotFound` errors.
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: Namespace, what: &'static str) -> Self {
        Self {
            store,
            namespace,
            what,
            _value: PhantomData,
        }
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.store.has(&self.namespace.key(key))
    }

    pub fn put(&self, key: &str, value: &V) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.put(&self.namespace.key(key), &bytes)
    }

    pub fn get(&self, key: &str) -> Result<V> {
        self.find(key)?
            .ok_or_else(|| Error::not_found(self.what, key))
    }

    pub fn find(&self, key: &str) -> Result<Option<V>> {
        match self.store.get(&self.namespace.key(key))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(&self.namespace.key(key))
    }

    /// Entries of this table in ascending key order.
    pub fn iter(&self) -> Result<Vec<(String, V)>> {
        let prefix = self.namespace.as_bytes();
        self.store
            .scan(prefix)?
            .into_iter()
            .map(|(key, bytes)| {
                let key = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
                Ok((key, serde_json::from_slice(&bytes)?))
            })
            .collect()
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.iter()?.into_iter().map(|(key, _)| key).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(store: &Arc<dyn KeyValueStore>, name: &str) -> TypedStorage<u32> {
        TypedStorage::new(Arc::clone(store), Namespace::root(name), "number")
    }

    #[test]
    fn put_get_has_delete() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        let numbers = table(&store, "numbers");

        assert!(!numbers.has("one").unwrap());
        numbers.put("one", &1).unwrap();
        assert!(numbers.has("one").unwrap());
        assert_eq!(numbers.get("one").unwrap(), 1);

        numbers.delete("one").unwrap();
        assert!(numbers.get("one").unwrap_err().is_not_found());
        assert_eq!(numbers.find("one").unwrap(), None);
    }

    #[test]
    fn iteration_is_ordered_and_strips_prefix() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        let numbers = table(&store, "numbers");
        numbers.put("c", &3).unwrap();
        numbers.put("a", &1).unwrap();
        numbers.put("b", &2).unwrap();

        assert_eq!(
            numbers.iter().unwrap(),
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3)
            ]
        );
    }

    #[test]
    fn namespaces_do_not_collide() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        // "vm" + "s" and "vms" would collide under naive concatenation.
        let short = table(&store, "vm");
        let long = table(&store, "vms");
        short.put("sx", &1).unwrap();
        long.put("x", &2).unwrap();

        assert_eq!(short.keys().unwrap(), vec!["sx".to_string()]);
        assert_eq!(long.keys().unwrap(), vec!["x".to_string()]);
    }

    #[test]
    fn nested_namespaces_are_isolated_from_parent_scans() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        let repo = Namespace::root(REPOSITORY).child("org/a");
        let vms: TypedStorage<u32> = TypedStorage::new(Arc::clone(&store), repo.child("vm"), "vm");
        let other: TypedStorage<u32> = TypedStorage::new(
            Arc::clone(&store),
            Namespace::root(REPOSITORY).child("org/ab").child("vm"),
            "vm",
        );
        vms.put("x", &1).unwrap();
        other.put("y", &2).unwrap();

        assert_eq!(vms.keys().unwrap(), vec!["x".to_string()]);
        assert_eq!(other.keys().unwrap(), vec!["y".to_string()]);
    }
}
