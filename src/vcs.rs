//! Version-control driver used to sync plugin repositories.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, IoContext, Result};
use crate::storage::Commit;

pub trait VersionControl {
    /// Make `path` a checkout of `branch` at the remote head and return that
    /// head commit. Clones on first use.
    fn sync(&self, url: &str, path: &Path, branch: &str) -> Result<Commit>;

    /// Last commit touching `file` (relative to the checkout at `path`).
    fn last_modified(&self, path: &Path, file: &Path) -> Result<Commit>;
}

/// Shells out to the `git` binary found on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
    git: PathBuf,
}

impl GitCli {
    pub fn locate() -> Result<Self> {
        let git = which::which("git")
            .map_err(|e| Error::Git(format!("git binary not found in PATH: {e}")))?;
        Ok(Self { git })
    }

    pub fn with_binary(git: PathBuf) -> Self {
        Self { git }
    }

    fn run<I, S>(&self, cwd: Option<&Path>, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.git);
        cmd.args(args);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        let output = cmd
            .output()
            .io_context(|| format!("Failed to run {}", self.git.display()))?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::CommandFailed {
            program: "git".to_string(),
            status: output.status.to_string(),
            output: format!("{}\n{}", stdout.trim(), stderr.trim()),
        })
    }

    fn head(&self, path: &Path) -> Result<Commit> {
        let id = self.run(Some(path), ["rev-parse", "HEAD"])?;
        if id.is_empty() {
            return Err(Error::Git(format!(
                "rev-parse returned nothing in {}",
                path.display()
            )));
        }
        Ok(Commit::new(id))
    }
}

impl VersionControl for GitCli {
    fn sync(&self, url: &str, path: &Path, branch: &str) -> Result<Commit> {
        if path.join(".git").is_dir() {
            tracing::debug!(path = %path.display(), branch, "fetching");
            self.run(Some(path), ["fetch", "--quiet", "origin", branch])?;
            self.run(
                Some(path),
                ["reset", "--quiet", "--hard", &format!("origin/{branch}")],
            )?;
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .io_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tracing::info!(url, path = %path.display(), branch, "cloning");
            self.run(
                None,
                [
                    OsStr::new("clone"),
                    OsStr::new("--quiet"),
                    OsStr::new("--branch"),
                    OsStr::new(branch),
                    OsStr::new("--single-branch"),
                    OsStr::new(url),
                    path.as_os_str(),
                ],
            )?;
        }
        self.head(path)
    }

    fn last_modified(&self, path: &Path, file: &Path) -> Result<Commit> {
        let id = self.run(
            Some(path),
            [
                OsStr::new("log"),
                OsStr::new("-1"),
                OsStr::new("--format=%H"),
                OsStr::new("--"),
                file.as_os_str(),
            ],
        )?;
        if id.is_empty() {
            return Err(Error::Git(format!(
                "no commit touches {} in {}",
                file.display(),
                path.display()
            )));
        }
        Ok(Commit::new(id))
    }
}
