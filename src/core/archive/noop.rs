//! Archive writer that records entries without producing output
//!
//! Used for dry runs: the assembler still sees dedup and conflicts exactly as
//! it would with a real archive, and every source is stat'ed so missing
//! inputs fail the same way.

use super::{file_mode, mtime_secs, Admission, ArchiveWriter, EntryHeader, EntryIndex, EntryKind};
use crate::error::{BundleError, IoResultExt, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct NoopArchiveWriter {
    index: EntryIndex,
}

impl NoopArchiveWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveWriter for NoopArchiveWriter {
    fn write_file(&mut self, archive_path: &str, source: &Path) -> Result<()> {
        let path = self.index.admit_file(archive_path)?;
        let meta = fs::metadata(source).with_path(source)?;
        if meta.is_dir() {
            return Err(BundleError::fs(
                source,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "is a directory"),
            ));
        }
        self.index.record(
            path,
            EntryKind::File,
            source.to_path_buf(),
            file_mode(&meta),
            meta.len(),
            mtime_secs(&meta),
            None,
        );
        Ok(())
    }

    fn write_directory(&mut self, archive_path: &str, source: &Path) -> Result<()> {
        let path = match self.index.admit_directory(archive_path)? {
            Admission::Write(path) => path,
            Admission::AlreadyPresent => return Ok(()),
        };
        let meta = fs::metadata(source).with_path(source)?;
        self.index.record(
            path,
            EntryKind::Directory,
            source.to_path_buf(),
            file_mode(&meta),
            0,
            mtime_secs(&meta),
            None,
        );
        Ok(())
    }

    fn write_hard_link(&mut self, existing_path: &str, new_path: &str) -> Result<()> {
        let (existing, new, mode, mtime) = self.index.admit_link(existing_path, new_path)?;
        let source = self.index.source_of(&existing).unwrap_or_default();
        self.index
            .record(new, EntryKind::HardLink, source, mode, 0, mtime, Some(existing));
        Ok(())
    }

    fn has_file_entry(&self, archive_path: &str) -> bool {
        self.index.has_file(archive_path)
    }

    fn has_entry(&self, archive_path: &str) -> bool {
        self.index.has_any(archive_path)
    }

    fn source_path(&self, archive_path: &str) -> Option<PathBuf> {
        self.index.source_of(archive_path)
    }

    fn headers(&self) -> &[EntryHeader] {
        self.index.headers()
    }

    fn close(&mut self) -> Result<()> {
        self.index.ensure_open()?;
        self.index.mark_closed();
        Ok(())
    }
}
