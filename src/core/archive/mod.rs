//! Write-only archive abstraction
//!
//! The bundler never reads back what it writes. It only needs to know which
//! archive paths exist already (for content-addressed dedup and conflict
//! detection) and which host file produced an entry (for error messages).
//!
//! Two implementations:
//! - [`TarArchiveWriter`] - tar stream, optionally gzip-compressed
//! - [`NoopArchiveWriter`] - records entries without writing any bytes

mod noop;
mod tar_writer;

pub use noop::NoopArchiveWriter;
pub use tar_writer::TarArchiveWriter;

use crate::core::validation::{self, archive_path};
use crate::error::{BundleError, IoResultExt, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Kind of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    HardLink,
}

/// Metadata of a written entry, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Archive path (always `/`-separated)
    pub path: String,
    pub kind: EntryKind,
    /// Permission bits
    pub mode: u32,
    /// Payload size in bytes (0 for directories and links)
    pub size: u64,
    /// For hard links, the archive path holding the payload
    pub link_target: Option<String>,
}

impl EntryHeader {
    /// `ls -l` style mode string, e.g. `-rwxr-xr-x`
    pub fn mode_string(&self) -> String {
        let kind = match self.kind {
            EntryKind::File => '-',
            EntryKind::Directory => 'd',
            EntryKind::HardLink => 'h',
        };
        let mut out = String::with_capacity(10);
        out.push(kind);
        for shift in [6u32, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

impl fmt::Display for EntryHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:>10}  {}", self.mode_string(), self.size, self.path)?;
        if let Some(target) = &self.link_target {
            write!(f, " => {target}")?;
        }
        Ok(())
    }
}

/// Sequential writer for a bundle archive
///
/// Archive path arguments may use either separator; implementations normalize
/// them with [`validation::archive_path`]. A path is written at most once:
/// writing an existing file path is [`BundleError::DuplicateEntry`], while
/// re-adding an existing directory is a no-op.
pub trait ArchiveWriter {
    /// Copy a file's bytes and permission bits into the archive
    fn write_file(&mut self, archive_path: &str, source: &Path) -> Result<()>;

    /// Add a single directory entry, taking mode and mtime from `source`
    fn write_directory(&mut self, archive_path: &str, source: &Path) -> Result<()>;

    /// Record `new_path` as a second name for the payload at `existing_path`
    fn write_hard_link(&mut self, existing_path: &str, new_path: &str) -> Result<()>;

    /// Whether a file or hard link exists at `archive_path`
    fn has_file_entry(&self, archive_path: &str) -> bool;

    /// Whether `archive_path` is an entry or the parent of one
    fn has_entry(&self, archive_path: &str) -> bool;

    /// Host path that produced the entry at `archive_path`
    fn source_path(&self, archive_path: &str) -> Option<PathBuf>;

    /// All written entries, in write order
    fn headers(&self) -> &[EntryHeader];

    /// Finalize the underlying stream; further writes fail
    fn close(&mut self) -> Result<()>;

    /// Recursively add `source_dir` below `archive_path`
    ///
    /// Directories (including empty ones) are written before their contents,
    /// siblings in file-name order. Symlinks are followed so the archive only
    /// contains regular files and directories.
    fn write_dir(&mut self, archive_path: &str, source_dir: &Path) -> Result<()> {
        let root = validation::archive_path(archive_path)?;
        let meta = fs::metadata(source_dir).with_path(source_dir)?;
        if !meta.is_dir() {
            return Err(BundleError::fs(
                source_dir,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        for entry in WalkDir::new(source_dir)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry?;
            let rel = entry
                .path()
                .strip_prefix(source_dir)
                .map_err(|_| BundleError::InvalidArchivePath(entry.path().display().to_string()))?;
            let target = validation::join(&root, &validation::to_slash(rel))?;

            if entry.file_type().is_dir() {
                self.write_directory(&target, entry.path())?;
            } else {
                self.write_file(&target, entry.path())?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
struct IndexedEntry {
    kind: EntryKind,
    source: PathBuf,
    mode: u32,
    mtime: u64,
}

/// What a writer is asked to do for a given path after consulting the index
pub(crate) enum Admission {
    Write(String),
    AlreadyPresent,
}

/// Entry bookkeeping shared by all writers
#[derive(Debug, Default)]
pub(crate) struct EntryIndex {
    entries: HashMap<String, IndexedEntry>,
    headers: Vec<EntryHeader>,
    closed: bool,
}

impl EntryIndex {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(BundleError::ArchiveClosed);
        }
        Ok(())
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }

    /// Normalize and check that a file entry can be written at `raw`
    pub(crate) fn admit_file(&self, raw: &str) -> Result<String> {
        self.ensure_open()?;
        let path = archive_path(raw)?;
        if self.entries.contains_key(&path) {
            return Err(BundleError::DuplicateEntry(path));
        }
        Ok(path)
    }

    /// Normalize and check a directory entry; existing directories are skipped
    pub(crate) fn admit_directory(&self, raw: &str) -> Result<Admission> {
        self.ensure_open()?;
        let path = archive_path(raw)?;
        match self.entries.get(&path) {
            Some(e) if e.kind == EntryKind::Directory => Ok(Admission::AlreadyPresent),
            Some(_) => Err(BundleError::DuplicateEntry(path)),
            None => Ok(Admission::Write(path)),
        }
    }

    /// Resolve a link request into (existing, new, payload mode, payload mtime)
    pub(crate) fn admit_link(&self, existing: &str, new: &str) -> Result<(String, String, u32, u64)> {
        self.ensure_open()?;
        let existing_path = archive_path(existing)?;
        let new_path = archive_path(new)?;
        let target = match self.entries.get(&existing_path) {
            Some(e) if e.kind != EntryKind::Directory => e,
            _ => {
                return Err(BundleError::MissingLinkTarget {
                    target: existing_path,
                    link: new_path,
                })
            }
        };
        if self.entries.contains_key(&new_path) {
            return Err(BundleError::DuplicateEntry(new_path));
        }
        Ok((existing_path, new_path, target.mode, target.mtime))
    }

    pub(crate) fn record(
        &mut self,
        path: String,
        kind: EntryKind,
        source: PathBuf,
        mode: u32,
        size: u64,
        mtime: u64,
        link_target: Option<String>,
    ) {
        self.headers.push(EntryHeader {
            path: path.clone(),
            kind,
            mode,
            size,
            link_target,
        });
        self.entries.insert(
            path,
            IndexedEntry {
                kind,
                source,
                mode,
                mtime,
            },
        );
    }

    pub(crate) fn source_of(&self, raw: &str) -> Option<PathBuf> {
        let path = archive_path(raw).ok()?;
        self.entries.get(&path).map(|e| e.source.clone())
    }

    pub(crate) fn has_file(&self, raw: &str) -> bool {
        let Ok(path) = archive_path(raw) else {
            return false;
        };
        matches!(
            self.entries.get(&path),
            Some(e) if e.kind != EntryKind::Directory
        )
    }

    pub(crate) fn has_any(&self, raw: &str) -> bool {
        let Ok(path) = archive_path(raw) else {
            return false;
        };
        if self.entries.contains_key(&path) {
            return true;
        }
        let prefix = format!("{path}/");
        self.entries.keys().any(|k| k.starts_with(&prefix))
    }

    pub(crate) fn headers(&self) -> &[EntryHeader] {
        &self.headers
    }
}

/// Permission bits of a host file
#[cfg(unix)]
pub(crate) fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
pub(crate) fn file_mode(meta: &fs::Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Modification time in seconds since the epoch (0 if unavailable)
pub(crate) fn mtime_secs(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
