//! Tar-backed archive writer

use super::{file_mode, mtime_secs, Admission, ArchiveWriter, EntryHeader, EntryIndex, EntryKind};
use crate::error::{BundleError, IoResultExt, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tracing::debug;

/// Output sink, optionally gzip-compressed
enum Sink<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

impl<W: Write> Sink<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Sink::Plain(w) => Ok(w),
            Sink::Gzip(w) => w.finish(),
        }
    }
}

/// Archive writer producing a (gzipped) tar stream
///
/// # Examples
///
/// ```rust,no_run
/// use fuzz_bundle::core::archive::{ArchiveWriter, TarArchiveWriter};
/// use std::fs::File;
/// use std::io::BufWriter;
/// use std::path::Path;
///
/// # fn main() -> fuzz_bundle::Result<()> {
/// let file = File::create("bundle.tar.gz")?;
/// let mut writer = TarArchiveWriter::new(BufWriter::new(file), true);
/// writer.write_file("bundle.yaml", Path::new("/tmp/bundle.yaml"))?;
/// writer.close()?;
/// # Ok(())
/// # }
/// ```
pub struct TarArchiveWriter<W: Write> {
    builder: Option<Builder<Sink<W>>>,
    index: EntryIndex,
}

impl<W: Write> TarArchiveWriter<W> {
    /// Create a writer on top of `writer`, gzip-compressing when `compress` is set
    pub fn new(writer: W, compress: bool) -> Self {
        let sink = if compress {
            Sink::Gzip(GzEncoder::new(writer, Compression::default()))
        } else {
            Sink::Plain(writer)
        };
        TarArchiveWriter {
            builder: Some(Builder::new(sink)),
            index: EntryIndex::default(),
        }
    }

    /// Finish the archive and hand back the underlying writer, flushed
    pub fn finish(mut self) -> Result<W> {
        self.finish_inner()
    }

    fn finish_inner(&mut self) -> Result<W> {
        let builder = self.builder.take().ok_or(BundleError::ArchiveClosed)?;
        self.index.mark_closed();
        let sink = builder.into_inner()?;
        let mut writer = sink.finish()?;
        writer.flush()?;
        Ok(writer)
    }

    fn builder(&mut self) -> Result<&mut Builder<Sink<W>>> {
        self.builder.as_mut().ok_or(BundleError::ArchiveClosed)
    }
}

fn new_header(entry_type: EntryType, mode: u32, size: u64, mtime: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(mtime);
    header
}

impl<W: Write> ArchiveWriter for TarArchiveWriter<W> {
    fn write_file(&mut self, archive_path: &str, source: &Path) -> Result<()> {
        let path = self.index.admit_file(archive_path)?;

        let file = File::open(source).with_path(source)?;
        let meta = file.metadata().with_path(source)?;
        if meta.is_dir() {
            return Err(BundleError::fs(
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "is a directory"),
            ));
        }

        let mode = file_mode(&meta);
        let mtime = mtime_secs(&meta);
        let mut header = new_header(EntryType::Regular, mode, meta.len(), mtime);
        self.builder()?
            .append_data(&mut header, &path, file)
            .with_path(source)?;

        debug!("Added {} as {}", source.display(), path);
        self.index.record(
            path,
            EntryKind::File,
            source.to_path_buf(),
            mode,
            meta.len(),
            mtime,
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
        let mode = file_mode(&meta);
        let mtime = mtime_secs(&meta);
        let mut header = new_header(EntryType::Directory, mode, 0, mtime);
        self.builder()?
            .append_data(&mut header, format!("{path}/"), io::empty())
            .with_path(source)?;

        self.index.record(
            path,
            EntryKind::Directory,
            source.to_path_buf(),
            mode,
            0,
            mtime,
            None,
        );
        Ok(())
    }

    fn write_hard_link(&mut self, existing_path: &str, new_path: &str) -> Result<()> {
        let (existing, new, mode, mtime) = self.index.admit_link(existing_path, new_path)?;

        let mut header = new_header(EntryType::Link, mode, 0, mtime);
        self.builder()?.append_link(&mut header, &new, &existing)?;

        debug!("Linked {} to {}", new, existing);
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
        self.finish_inner().map(drop)
    }
}
