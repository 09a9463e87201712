//! Directory-backed key-value store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/kv/<hex(key)>                    value bytes
//! <root>/kv/<chunk>.d/<chunk>.d/<rest>     same, for long keys
//! <root>/tmp/                              staging area for atomic writes
//! ```
//!
//! The lowercase hex encoding of the key is split into chunks of at most
//! [`CHUNK`] characters. Every chunk but the last names a `.d` directory, so
//! no path component exceeds the file-name limit and a key never collides
//! with a directory of a longer key.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use walkdir::WalkDir;

use super::KeyValueStore;
use crate::error::{Error, IoContext, Result};

/// Hex characters per path component.
const CHUNK: usize = 128;
const DIR_SUFFIX: &str = ".d";

#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open (and create if needed) the store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let store = Self {
            root: root.to_path_buf(),
        };
        store.ensure_layout()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_layout(&self) -> Result<()> {
        for dir in [self.kv_dir(), self.tmp_dir()] {
            fs::create_dir_all(&dir)
                .io_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    fn kv_dir(&self) -> PathBuf {
        self.root.join("kv")
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn entry_path(&self, key: &[u8]) -> PathBuf {
        let hex = hex_encode(key);
        let mut path = self.kv_dir();
        let mut rest = hex.as_str();
        while rest.len() > CHUNK {
            let (head, tail) = rest.split_at(CHUNK);
            path.push(format!("{head}{DIR_SUFFIX}"));
            rest = tail;
        }
        path.push(rest);
        path
    }

    /// Key of the entry stored at `path`, if it is one.
    fn entry_key(&self, path: &Path) -> Option<Vec<u8>> {
        let relative = path.strip_prefix(self.kv_dir()).ok()?;
        let mut hex = String::new();
        let mut components = relative.iter().peekable();
        while let Some(component) = components.next() {
            let component = component.to_str()?;
            if components.peek().is_some() {
                hex.push_str(component.strip_suffix(DIR_SUFFIX)?);
            } else {
                hex.push_str(component);
            }
        }
        hex_decode(&hex)
    }

    /// Remove `.d` directories left empty by a delete.
    fn prune_empty_dirs(&self, path: &Path) {
        let kv = self.kv_dir();
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == kv || fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

impl KeyValueStore for DiskStore {
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.entry_path(key).is_file())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).io_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let path = self.entry_path(key);
        let tmp = self.tmp_dir().join(tmp_name("entry"));
        fs::write(&tmp, value).io_context(|| format!("Failed to write {}", tmp.display()))?;
        atomic_rename(&tmp, &path)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_dirs(&path);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).io_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let dir = self.kv_dir();

        let mut out = vec![];
        for entry in WalkDir::new(&dir).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                // Removed between listing and descending.
                Err(err) if err.io_error().map(|e| e.kind()) == Some(ErrorKind::NotFound) => {
                    continue
                }
                Err(err) => {
                    return Err(Error::Io {
                        context: format!("Failed to read {}", dir.display()),
                        source: err.into(),
                    })
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.entry_key(entry.path()) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            match fs::read(entry.path()) {
                Ok(value) => out.push((key, value)),
                // Deleted between listing and reading.
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(err)
                        .io_context(|| format!("Failed to read {}", entry.path().display()))
                }
            }
        }

        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

/// Unique-enough name for a staging file.
pub(crate) fn tmp_name(prefix: &str) -> String {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{prefix}-{}-{n}", std::process::id())
}

pub(crate) fn atomic_rename(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .io_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let rename_err = match fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    // Fall back to copy+remove (e.g. EXDEV).
    if let Err(source) = fs::copy(src, dst) {
        return Err(Error::Io {
            context: format!(
                "Failed to move {} to {} (rename: {rename_err})",
                src.display(),
                dst.display()
            ),
            source,
        });
    }
    fs::remove_file(src).io_context(|| format!("Failed to remove tmp {}", src.display()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}
