//! Validation for archive paths and fuzz test names
//!
//! Archive paths are always relative, `/`-separated and free of `.`/`..`
//! segments, whatever the host's separator is. Every archive writer runs its
//! path arguments through [`archive_path`] so two hosts produce the same entry
//! names for the same layout.

use crate::error::{BundleError, Result};
use regex::Regex;
use std::path::{Component, Path};
use std::sync::LazyLock;

/// Characters that cannot appear in a fuzz test name
static FORBIDDEN_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\x00-\x1f\\:*?"<>|]"#).expect("static regex"));

/// Normalize a path fragment into a canonical archive path
///
/// # Rules
/// - `\` and `/` are both treated as separators; output uses `/` only
/// - Empty and `.` segments are dropped
/// - `..` segments, absolute paths and drive prefixes are rejected
/// - The result must contain at least one segment
///
/// # Examples
///
/// ```
/// use fuzz_bundle::core::validation::archive_path;
///
/// assert_eq!(archive_path("libfuzzer/address/./foo//bin").unwrap(), "libfuzzer/address/foo/bin");
/// assert_eq!(archive_path(r"cas\ab\cdef\lib.so").unwrap(), "cas/ab/cdef/lib.so");
/// assert!(archive_path("../escape").is_err());
/// assert!(archive_path("/absolute").is_err());
/// ```
pub fn archive_path(raw: &str) -> Result<String> {
    let unified = raw.replace('\\', "/");

    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(BundleError::InvalidArchivePath(format!(
            "{raw:?} is absolute"
        )));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(BundleError::InvalidArchivePath(format!(
                    "{raw:?} escapes the archive root"
                )))
            }
            s if s.contains('\0') => {
                return Err(BundleError::InvalidArchivePath(format!(
                    "{raw:?} contains a NUL byte"
                )))
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(BundleError::InvalidArchivePath(format!("{raw:?} is empty")));
    }

    Ok(segments.join("/"))
}

/// Render a relative host path with `/` separators
///
/// Only normal components are kept; the caller is expected to pass a path that
/// was produced by `strip_prefix` or similar.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().replace('\\', "/")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Join archive path fragments, normalizing the result
pub fn join(base: &str, rest: &str) -> Result<String> {
    if rest.is_empty() {
        return archive_path(base);
    }
    archive_path(&format!("{base}/{rest}"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// A fuzz test name usable as a path segment inside the archive
///
/// Names may contain `/` (Bazel-style package paths) but must otherwise be a
/// valid relative archive path and avoid characters that are not portable
/// across filesystems.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuzzTestName(String);

impl FuzzTestName {
    /// Validate a fuzz test name
    ///
    /// ```
    /// use fuzz_bundle::core::validation::FuzzTestName;
    ///
    /// assert!(FuzzTestName::new("my_fuzz_test").is_ok());
    /// assert!(FuzzTestName::new("src/parser_fuzz").is_ok());
    /// assert!(FuzzTestName::new("../oops").is_err());
    /// assert!(FuzzTestName::new("a:b").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if FORBIDDEN_NAME_CHARS.is_match(&name) {
            return Err(BundleError::InvalidFuzzTestName(format!(
                "{name:?} contains characters that are not allowed in a path"
            )));
        }
        let normalized = archive_path(&name)
            .map_err(|e| BundleError::InvalidFuzzTestName(format!("{name:?}: {e}")))?;
        Ok(FuzzTestName(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FuzzTestName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FuzzTestName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalizes_separators() {
        assert_eq!(archive_path(r"a\b/c").unwrap(), "a/b/c");
        assert_eq!(archive_path("./work_dir/").unwrap(), "work_dir");
    }

    #[test]
    fn test_rejects_escapes() {
        assert!(archive_path("a/../../b").is_err());
        assert!(archive_path("C:/Windows").is_err());
        assert!(archive_path(r"\\server\share").is_err());
        assert!(archive_path("").is_err());
        assert!(archive_path("./.").is_err());
    }

    #[test]
    fn test_to_slash() {
        let p: PathBuf = ["lib", "sub", "helper.so"].iter().collect();
        assert_eq!(to_slash(&p), "lib/sub/helper.so");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("libfuzzer/none/foo", "bin/foo").unwrap(), "libfuzzer/none/foo/bin/foo");
        assert_eq!(join("seeds", "").unwrap(), "seeds");
    }

    #[test]
    fn test_fuzz_test_name() {
        assert_eq!(FuzzTestName::new("./a//b").unwrap().as_str(), "a/b");
        assert!(FuzzTestName::new("").is_err());
        assert!(FuzzTestName::new("has\nnewline").is_err());
    }
}
