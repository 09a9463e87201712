//! Fetching, unpacking and building plugin artifacts.

use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use crate::error::{Error, IoContext, Result};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

pub trait Installer {
    fn download(&self, url: &str, dest: &Path) -> Result<()>;

    /// Unpack `archive` into `dest`, dropping the archive's top-level
    /// directory.
    fn decompress(&self, archive: &Path, dest: &Path) -> Result<()>;

    /// Run `args[0]` with the remaining args inside `working_dir`.
    fn install(&self, working_dir: &Path, args: &[String]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct VmInstaller {
    client: reqwest::blocking::Client,
}

impl VmInstaller {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("apm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| Error::Download {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

impl Installer for VmInstaller {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tracing::info!(url, dest = %dest.display(), "downloading");

        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|source| Error::Download {
                url: url.to_string(),
                source,
            })?;
        let total = response.content_length();

        let mut out =
            File::create(dest).io_context(|| format!("Failed to create {}", dest.display()))?;
        let mut buf = vec![0u8; 64 * 1024];
        let mut written = 0u64;
        let mut last_report = Instant::now();
        loop {
            let n = response
                .read(&mut buf)
                .io_context(|| format!("Failed to read response body from {url}"))?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])
                .io_context(|| format!("Failed to write {}", dest.display()))?;
            written += n as u64;

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                last_report = Instant::now();
                match total {
                    Some(total) => tracing::info!(url, written, total, "download progress"),
                    None => tracing::info!(url, written, "download progress"),
                }
            }
        }
        out.flush()
            .io_context(|| format!("Failed to flush {}", dest.display()))?;

        tracing::info!(url, bytes = written, "download finished");
        Ok(())
    }

    fn decompress(&self, archive: &Path, dest: &Path) -> Result<()> {
        let reader = open_archive(archive)?;
        fs::create_dir_all(dest).io_context(|| format!("Failed to create {}", dest.display()))?;

        let mut tar = tar::Archive::new(reader);
        let entries = tar
            .entries()
            .io_context(|| format!("Failed to read {}", archive.display()))?;
        for entry in entries {
            let mut entry =
                entry.io_context(|| format!("Failed to read entry in {}", archive.display()))?;
            let path = entry
                .path()
                .io_context(|| format!("Invalid entry path in {}", archive.display()))?
                .into_owned();
            let Some(relative) = strip_first_component(&path)? else {
                continue;
            };
            reject_symlinked_ancestors(dest, &relative, &path)?;

            let target = dest.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .io_context(|| format!("Failed to create {}", parent.display()))?;
            }

            match entry.header().entry_type() {
                tar::EntryType::Symlink => {
                    let link = entry
                        .link_name()
                        .io_context(|| format!("Invalid link in {}", archive.display()))?
                        .ok_or_else(|| Error::UnsafeArchiveEntry(path.clone()))?;
                    check_symlink_target(&relative, &link, &path)?;
                }
                tar::EntryType::Link => {
                    let link = entry
                        .link_name()
                        .io_context(|| format!("Invalid link in {}", archive.display()))?
                        .ok_or_else(|| Error::UnsafeArchiveEntry(path.clone()))?
                        .into_owned();
                    let source = strip_first_component(&link)?
                        .ok_or_else(|| Error::UnsafeArchiveEntry(path.clone()))?;
                    reject_symlinked_ancestors(dest, &source, &path)?;
                    let source = dest.join(source);
                    fs::hard_link(&source, &target).io_context(|| {
                        format!("Failed to link {} to {}", target.display(), source.display())
                    })?;
                    continue;
                }
                _ => {}
            }

            entry
                .unpack(&target)
                .io_context(|| format!("Failed to unpack {}", target.display()))?;
        }

        tracing::debug!(archive = %archive.display(), dest = %dest.display(), "unpacked");
        Ok(())
    }

    fn install(&self, working_dir: &Path, args: &[String]) -> Result<()> {
        let Some((program, rest)) = args.split_first() else {
            return Ok(());
        };
        tracing::info!(program, dir = %working_dir.display(), "running install script");

        let status = Command::new(program)
            .args(rest)
            .current_dir(working_dir)
            .status()
            .io_context(|| format!("Failed to run install script {program}"))?;
        if !status.success() {
            return Err(Error::CommandFailed {
                program: program.clone(),
                status: status.to_string(),
                output: String::new(),
            });
        }
        Ok(())
    }
}

/// Gzip, zstd or plain tar, chosen by the leading magic bytes.
fn open_archive(archive: &Path) -> Result<Box<dyn Read>> {
    let mut magic = [0u8; 4];
    let n = {
        let mut f =
            File::open(archive).io_context(|| format!("Failed to open {}", archive.display()))?;
        read_up_to(&mut f, &mut magic)
            .io_context(|| format!("Failed to read {}", archive.display()))?
    };
    let file = BufReader::new(
        File::open(archive).io_context(|| format!("Failed to open {}", archive.display()))?,
    );

    if n >= 2 && magic[..2] == GZIP_MAGIC {
        return Ok(Box::new(flate2::read::GzDecoder::new(file)));
    }
    if n == 4 && magic == ZSTD_MAGIC {
        let decoder = zstd::stream::read::Decoder::new(file)
            .io_context(|| format!("Failed to open zstd stream {}", archive.display()))?;
        return Ok(Box::new(decoder));
    }
    Ok(Box::new(file))
}

fn read_up_to(r: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Equivalent of `tar --strip-components 1`. Entries that would land outside
/// the destination are rejected.
fn strip_first_component(path: &Path) -> Result<Option<PathBuf>> {
    let mut out = PathBuf::new();
    for component in path.components().skip(1) {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(Error::UnsafeArchiveEntry(path.to_path_buf())),
        }
    }
    if out.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(out))
}

/// Refuse to write `relative` when it, or a directory on its way, is a
/// symlink, so nothing lands outside `dest` through a link unpacked earlier.
fn reject_symlinked_ancestors(dest: &Path, relative: &Path, entry: &Path) -> Result<()> {
    let mut current = dest.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(Error::UnsafeArchiveEntry(entry.to_path_buf()))
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) => {
                return Err(err).io_context(|| format!("Failed to stat {}", current.display()))
            }
        }
    }
    Ok(())
}

/// A symlink at `relative` may point to `link` only when the target stays
/// inside the destination: no absolute targets, and `..` only as leading
/// components that do not climb above the destination root.
fn check_symlink_target(relative: &Path, link: &Path, entry: &Path) -> Result<()> {
    let depth = relative.components().count().saturating_sub(1);
    let mut ups = 0;
    let mut descended = false;
    for component in link.components() {
        match component {
            Component::ParentDir if !descended => ups += 1,
            Component::Normal(_) => descended = true,
            Component::CurDir => {}
            _ => return Err(Error::UnsafeArchiveEntry(entry.to_path_buf())),
        }
    }
    if ups > depth {
        return Err(Error::UnsafeArchiveEntry(entry.to_path_buf()));
    }
    Ok(())
}
