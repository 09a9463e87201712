use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::alias::{is_valid_plugin_name, QualifiedName};
use crate::checksum::sha256_file;
use crate::engine::{Outcome, Workflow};
use crate::error::{Error, IoContext, Result};
use crate::installer::Installer;
use crate::registry::Repository;
use crate::storage::{atomic_rename, InstallInfo, TypedStorage};

/// Where installs happen and where they are recorded.
#[derive(Clone)]
pub struct InstallEnv {
    pub installed_vms: TypedStorage<InstallInfo>,
    pub installer: Arc<dyn Installer>,
    /// Scratch root for archives and build trees.
    pub tmp_dir: PathBuf,
    /// Destination of installed binaries, named by VM id.
    pub plugin_dir: PathBuf,
}

/// Download, verify, build and place one VM binary.
#[derive(Clone)]
pub struct Install {
    pub name: QualifiedName,
    pub repository: Repository,
    pub env: InstallEnv,
    /// Reinstall even when already recorded as installed.
    pub force: bool,
}

impl Workflow for Install {
    fn name(&self) -> String {
        format!("install {}", self.name)
    }

    fn execute(&self) -> Result<Outcome> {
        let key = self.name.to_string();
        if !is_valid_plugin_name(&self.name.plugin) {
            return Err(Error::InvalidQualifiedName(key));
        }
        let definition = self.repository.vm(&self.name.plugin)?;
        if !self.force && self.env.installed_vms.has(&key)? {
            tracing::info!(vm = %key, "already installed, skipping");
            return Ok(Outcome::Skipped);
        }

        let vm = &definition.definition;
        tracing::info!(vm = %key, version = %vm.version, "installing");

        let scratch = ScratchSpace::new(&self.env.tmp_dir, &self.name)?;

        self.env.installer.download(&vm.url, &scratch.archive)?;
        let actual = sha256_file(&scratch.archive)?;
        if actual != vm.sha256 {
            return Err(Error::ChecksumMismatch {
                name: key,
                expected: vm.sha256.clone(),
                actual,
            });
        }

        self.env
            .installer
            .decompress(&scratch.archive, &scratch.working_dir)?;

        let args: Vec<String> = vm
            .install_script
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if args.is_empty() {
            tracing::debug!(vm = %key, "no install script");
        } else {
            self.env.installer.install(&scratch.working_dir, &args)?;
        }

        let built = scratch.working_dir.join(&vm.binary_path);
        let target = self.env.plugin_dir.join(&vm.id);
        atomic_rename(&built, &target)?;
        make_executable(&target)?;
        drop(scratch);

        self.env.installed_vms.put(
            &key,
            &InstallInfo {
                id: vm.id.clone(),
                version: vm.version,
                commit: definition.provenance().clone(),
                installed_at: OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .unwrap_or_default(),
            },
        )?;
        tracing::info!(vm = %key, path = %target.display(), "installed");
        Ok(Outcome::Done)
    }
}

/// Archive and build tree of one install. Both are removed on drop.
struct ScratchSpace {
    archive: PathBuf,
    working_dir: PathBuf,
}

impl ScratchSpace {
    fn new(tmp_dir: &Path, name: &QualifiedName) -> Result<Self> {
        let base = tmp_dir.join(name.repo.relative_path());
        fs::create_dir_all(&base).io_context(|| format!("Failed to create {}", base.display()))?;

        let scratch = Self {
            archive: base.join(format!("{}.tar.gz", name.plugin)),
            working_dir: base.join(&name.plugin),
        };
        // Leftovers from an interrupted run.
        scratch.clean();
        fs::create_dir_all(&scratch.working_dir)
            .io_context(|| format!("Failed to create {}", scratch.working_dir.display()))?;
        Ok(scratch)
    }

    fn clean(&self) {
        let _ = fs::remove_file(&self.archive);
        let _ = fs::remove_dir_all(&self.working_dir);
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        self.clean();
        tracing::debug!(dir = %self.working_dir.display(), "removed scratch space");
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .io_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
