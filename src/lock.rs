//! Cross-process exclusion for commands that mutate apm state.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, IoContext, Result};

pub const LOCK_FILE_NAME: &str = "apm.lock";

/// RAII guard over `<apm_dir>/apm.lock`. Unlocks on drop.
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    /// Take the lock without waiting. Fails with [`Error::Locked`] when
    /// another process holds it.
    pub fn acquire(apm_dir: &Path) -> Result<Self> {
        fs::create_dir_all(apm_dir)
            .io_context(|| format!("Failed to create {}", apm_dir.display()))?;
        let path = apm_dir.join(LOCK_FILE_NAME);

        // Never unlink the lock file: a second process could then create a
        // fresh file at the same path and lock that one instead.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .io_context(|| format!("Failed to create lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::Locked { path });
        }

        tracing::debug!(path = %path.display(), "acquired apm lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
