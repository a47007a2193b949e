//! Error types for bundle operations

use std::path::PathBuf;
use thiserror::Error;

/// Bundle operation result type
pub type Result<T> = std::result::Result<T, BundleError>;

/// Bundle operation errors
#[derive(Error, Debug)]
pub enum BundleError {
    /// A build-system adapter failed; the adapter's error is kept as the source
    #[error("build failed: {0}")]
    Builder(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Filesystem access to a specific path failed
    #[error("{}: {source}", path.display())]
    Fs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The fuzz test executable does not live inside its build directory
    #[error(
        "fuzz test executable ({}) is not below build directory ({})",
        executable.display(),
        build_dir.display()
    )]
    ExecutableOutsideBuildDir {
        executable: PathBuf,
        build_dir: PathBuf,
    },

    /// Two different external libraries want the same archive path
    #[error(
        "fuzz test {fuzz_test:?} has conflicting runtime dependencies: {} and {} (both map to {archive_path})",
        new.display(),
        existing.display()
    )]
    ConflictingRuntimeDependencies {
        fuzz_test: String,
        new: PathBuf,
        existing: PathBuf,
        archive_path: String,
    },

    /// A runtime dependency that cannot be staged
    #[error("invalid runtime dependency {}: {reason}", path.display())]
    InvalidRuntimeDependency { path: PathBuf, reason: String },

    /// An archive path was written twice
    #[error("archive already contains an entry at {0}")]
    DuplicateEntry(String),

    /// A hard link was requested for a path that has no entry yet
    #[error("cannot link {link} to {target}: {target} is not in the archive")]
    MissingLinkTarget { target: String, link: String },

    /// Archive path is absolute, empty or escapes the archive root
    #[error("invalid archive path: {0}")]
    InvalidArchivePath(String),

    /// Write attempted after `close()`
    #[error("archive writer is already closed")]
    ArchiveClosed,

    /// Fuzz test name cannot be used as a path segment
    #[error("invalid fuzz test name: {0}")]
    InvalidFuzzTestName(String),

    /// Malformed `--add` argument
    #[error("could not parse additional file argument {0:?}: {1}")]
    InvalidAdditionalFile(String, String),

    /// Build system not handled by this bundler
    #[error("unsupported build system for bundling: {0}")]
    UnsupportedBuildSystem(String),

    /// Options failed validation
    #[error("invalid bundle options: {0}")]
    InvalidOptions(String),

    /// No fuzzer records were produced
    #[error("no fuzz tests were bundled")]
    EmptyBundle,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal error
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration error
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl BundleError {
    /// Wrap an I/O error with the path it concerns
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BundleError::Fs {
            path: path.into(),
            source,
        }
    }

    /// Wrap an adapter error
    pub fn builder<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        BundleError::Builder(err.into())
    }
}

/// Attach a path to `std::io::Result` values
pub(crate) trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| BundleError::fs(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_names_path() {
        let err = BundleError::fs(
            "/tmp/missing.so",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.to_string().contains("/tmp/missing.so"));
    }

    #[test]
    fn test_conflict_names_both_sources() {
        let err = BundleError::ConflictingRuntimeDependencies {
            fuzz_test: "my_fuzz_test".to_string(),
            new: PathBuf::from("/opt/a/libfoo.so"),
            existing: PathBuf::from("/opt/b/libfoo.so"),
            archive_path: "libfuzzer/address/my_fuzz_test/external_libs/libfoo.so".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/opt/a/libfoo.so"));
        assert!(msg.contains("/opt/b/libfoo.so"));
    }
}
