//! Bundle metadata (`bundle.yaml`)
//!
//! Describes what the archive contains and how to run it:
//! - **run_environment**: container image the fuzzers expect
//! - **code_revision**: git commit/branch the bundle was built from
//! - **fuzzers**: one record per runnable fuzz test and engine/sanitizer

use crate::error::{BundleError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the metadata file at the archive root
pub const METADATA_FILE_NAME: &str = "bundle.yaml";

/// Top-level bundle description
///
/// # Examples
///
/// ```
/// use fuzz_bundle::core::metadata::{Engine, Fuzzer, Metadata, RunEnvironment};
///
/// let metadata = Metadata {
///     run_environment: RunEnvironment::docker("ubuntu:rolling"),
///     code_revision: None,
///     fuzzers: vec![Fuzzer::new("libfuzzer/address/foo/bin/foo", Engine::Libfuzzer)],
/// };
///
/// let yaml = metadata.to_yaml().unwrap();
/// assert_eq!(Metadata::from_yaml(&yaml).unwrap(), metadata);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub run_environment: RunEnvironment,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_revision: Option<CodeRevision>,

    #[serde(default)]
    pub fuzzers: Vec<Fuzzer>,
}

/// Environment in which the fuzzers are run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunEnvironment {
    /// Container image and tag, e.g. `debian:stable`
    #[serde(rename = "docker", alias = "Docker", default)]
    pub docker: String,
}

impl RunEnvironment {
    pub fn docker(image: impl Into<String>) -> Self {
        RunEnvironment {
            docker: image.into(),
        }
    }
}

/// Version-control state of the bundled sources
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeRevision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitRevision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GitRevision {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
}

impl GitRevision {
    pub fn is_empty(&self) -> bool {
        self.commit.is_empty() && self.branch.is_empty()
    }
}

/// Driver expected to execute a packaged fuzz test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Engine {
    /// libFuzzer binary built with sanitizers
    Libfuzzer,
    /// Coverage-instrumented binary replayed by the LLVM coverage tools
    LlvmCov,
    /// JVM fuzz test (packaged by the JVM bundler)
    JavaLibfuzzer,
}

/// Options passed to the fuzz test at run time
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// `KEY=VALUE` entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

impl EngineOptions {
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.env.is_empty()
    }
}

/// One runnable fuzz test in the archive
///
/// Every non-empty path is archive-relative and refers to an entry that
/// exists in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fuzzer {
    /// Fuzz test name (C/C++ fuzz tests)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,

    /// Display name (JVM fuzz tests)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Archive path of the executable
    pub path: String,

    pub engine: Engine,

    /// Upper-case sanitizer name; empty for coverage
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sanitizer: String,

    /// Root of the project *sources*; the key name is historical
    #[serde(rename = "build_dir", default)]
    pub project_dir: PathBuf,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dictionary: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub seeds: String,

    /// Archive path of a separate debug-symbol bundle (`.dSYM`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub debug_symbols: String,

    /// Archive directories to add to the dynamic loader's search path
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub library_paths: Vec<String>,

    /// Archive paths to add to the JVM class path
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtime_paths: Vec<String>,

    #[serde(default, skip_serializing_if = "EngineOptions::is_empty")]
    pub engine_options: EngineOptions,

    /// Maximum run time in seconds; 0 means unlimited
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_run_time: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl Fuzzer {
    pub fn new(path: impl Into<String>, engine: Engine) -> Self {
        Fuzzer {
            target: String::new(),
            name: String::new(),
            path: path.into(),
            engine,
            sanitizer: String::new(),
            project_dir: PathBuf::new(),
            dictionary: String::new(),
            seeds: String::new(),
            debug_symbols: String::new(),
            library_paths: Vec::new(),
            runtime_paths: Vec::new(),
            engine_options: EngineOptions::default(),
            max_run_time: 0,
        }
    }

    /// All non-empty archive paths this record refers to
    pub fn archive_paths(&self) -> impl Iterator<Item = &str> {
        [
            self.path.as_str(),
            self.dictionary.as_str(),
            self.seeds.as_str(),
            self.debug_symbols.as_str(),
        ]
        .into_iter()
        .chain(self.library_paths.iter().map(String::as_str))
        .chain(self.runtime_paths.iter().map(String::as_str))
        .filter(|p| !p.is_empty())
    }
}

impl Metadata {
    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse from YAML
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Read a `bundle.yaml` from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).with_path(path)?;
        Self::from_yaml(&data)
    }

    /// Check the bundle invariants
    ///
    /// - at least one fuzzer record
    /// - every path a record names satisfies `exists`
    pub fn validate(&self, exists: impl Fn(&str) -> bool) -> Result<()> {
        if self.fuzzers.is_empty() {
            return Err(BundleError::EmptyBundle);
        }
        for fuzzer in &self.fuzzers {
            if let Some(missing) = fuzzer.archive_paths().find(|p| !exists(p)) {
                return Err(BundleError::InvalidArchivePath(format!(
                    "fuzzer {:?} refers to {missing}, which is not in the archive",
                    fuzzer.path
                )));
            }
        }
        Ok(())
    }
}
