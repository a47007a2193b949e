//! Content-addressed store inside the bundle
//!
//! In-tree runtime dependencies are stored once under
//! `cas/<first two hex digits>/<remaining hex digits>/<basename>` and every
//! variant-specific location becomes a hard link to that payload. Identical
//! libraries produced by several sanitizer builds therefore cost one copy.

use crate::core::archive::ArchiveWriter;
use crate::error::{IoResultExt, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::debug;

/// Top-level archive directory holding content-addressed payloads
pub const CAS_DIR: &str = "cas";

/// Hex-encoded SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_path(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_path(path)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Archive path for a payload with the given digest and basename
///
/// ```
/// use fuzz_bundle::core::cas::store_path;
///
/// assert_eq!(store_path("abcdef0123", "libfoo.so"), "cas/ab/cdef0123/libfoo.so");
/// ```
pub fn store_path(digest: &str, basename: &str) -> String {
    let (head, rest) = digest.split_at(2usize.min(digest.len()));
    format!("{CAS_DIR}/{head}/{rest}/{basename}")
}

/// Result of staging one file through the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBlob {
    pub digest: String,
    pub store_path: String,
    /// Whether this call wrote the payload (false if it was already stored)
    pub stored: bool,
}

/// Store `source` by content and link it at `link_path`
///
/// Symlinks are resolved first so the archive never holds an indirect
/// reference. The store entry keeps `source`'s own basename, which is the name
/// the dynamic loader asks for.
pub fn stage(writer: &mut dyn ArchiveWriter, source: &Path, link_path: &str) -> Result<StagedBlob> {
    let resolved = fs::canonicalize(source).with_path(source)?;
    let digest = sha256_file(&resolved)?;
    let basename = source
        .file_name()
        .unwrap_or(resolved.as_os_str())
        .to_string_lossy();
    let store_path = store_path(&digest, &basename);

    let stored = !writer.has_file_entry(&store_path);
    if stored {
        writer.write_file(&store_path, &resolved)?;
    } else {
        debug!("{} is already stored as {}", source.display(), store_path);
    }

    if !writer.has_file_entry(link_path) {
        writer.write_hard_link(&store_path, link_path)?;
    }

    Ok(StagedBlob {
        digest,
        store_path,
        stored,
    })
}
