//! Bundle configuration
//!
//! [`BundleOptions`] is plain data: it can be built with
//! [`BundleOptions::builder`], loaded from TOML, or filled in from CLI flags.
//! The helpers here turn it into the concrete values the orchestrator needs
//! (output path, image, variants, environment, extra files).

use crate::core::build::{BuildSystem, BuildVariant};
use crate::core::classify::TargetOs;
use crate::core::validation::{self, FuzzTestName};
use crate::error::{BundleError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Archive extension appended to output paths
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Archive directory that is the fuzzers' working directory
pub const WORK_DIR: &str = "work_dir";

/// Run image for native fuzz tests
pub const DEFAULT_NATIVE_IMAGE: &str = "ubuntu:rolling";

/// Run image for JVM fuzz tests
pub const DEFAULT_JVM_IMAGE: &str = "eclipse-temurin:20";

/// Everything the orchestrator needs to produce one bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleOptions {
    pub build_system: BuildSystem,
    pub project_dir: PathBuf,
    /// Fuzz tests to bundle; empty means "all" where the builder can list them
    pub fuzz_tests: Vec<String>,
    /// Variants to build; `None` selects [`default_variants`]
    pub variants: Option<Vec<BuildVariant>>,
    pub dictionary: Option<PathBuf>,
    pub seed_corpus_dirs: Vec<PathBuf>,
    pub engine_args: Vec<String>,
    /// `KEY=VALUE` or bare `KEY` (taken from the local environment)
    pub env: Vec<String>,
    /// Maximum run time per fuzz test in seconds; 0 means unlimited
    pub timeout_secs: u64,
    pub docker_image: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    /// `SOURCE` or `SOURCE;TARGET` entries
    pub additional_files: Vec<String>,
    pub build_log: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub build_system_args: Vec<String>,
}

impl BundleOptions {
    pub fn builder() -> BundleOptionsBuilder {
        BundleOptionsBuilder::new()
    }

    /// Load options from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).with_path(path)?;
        Ok(toml::from_str(&data)?)
    }

    /// Check that the options describe a bundle this crate can produce
    pub fn validate(&self) -> Result<()> {
        if !self.build_system.is_native() {
            return Err(BundleError::UnsupportedBuildSystem(
                self.build_system.to_string(),
            ));
        }
        if self.fuzz_tests.is_empty() && self.build_system != BuildSystem::CMake {
            return Err(BundleError::InvalidOptions(format!(
                "at least one fuzz test must be specified for build system {}",
                self.build_system
            )));
        }
        let mut seen = HashSet::new();
        for name in &self.fuzz_tests {
            FuzzTestName::new(name.as_str())?;
            if !seen.insert(name.as_str()) {
                return Err(BundleError::InvalidOptions(format!(
                    "fuzz test {name:?} is specified more than once"
                )));
            }
        }
        for arg in &self.additional_files {
            AdditionalFile::parse(arg)?;
        }
        if let Some(variants) = &self.variants {
            if variants.is_empty() {
                return Err(BundleError::InvalidOptions(
                    "variant list is empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Where the archive is written
    ///
    /// ```
    /// use fuzz_bundle::core::options::BundleOptions;
    /// use std::path::PathBuf;
    ///
    /// let opts = BundleOptions::builder().fuzz_test("parser::fuzz_json").build_unchecked();
    /// assert_eq!(opts.output_path(), PathBuf::from("parser_fuzz_json.tar.gz"));
    /// ```
    pub fn output_path(&self) -> PathBuf {
        if let Some(path) = &self.output_path {
            let raw = path.to_string_lossy();
            if raw.ends_with(ARCHIVE_EXTENSION) {
                return path.clone();
            }
            debug!("Output path was missing the {ARCHIVE_EXTENSION} extension, adding it");
            return PathBuf::from(format!("{raw}{ARCHIVE_EXTENSION}"));
        }

        match self.fuzz_tests.as_slice() {
            [single] => {
                let name = single.replace("::", "_");
                let base = Path::new(&name)
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or(name.clone());
                PathBuf::from(format!("{base}{ARCHIVE_EXTENSION}"))
            }
            _ => PathBuf::from(format!("fuzz_tests{ARCHIVE_EXTENSION}")),
        }
    }

    /// Container image recorded in the run environment
    pub fn docker_image(&self) -> String {
        match &self.docker_image {
            Some(image) if !image.is_empty() => image.clone(),
            _ => match self.build_system {
                BuildSystem::Maven | BuildSystem::Gradle => DEFAULT_JVM_IMAGE.to_string(),
                _ => DEFAULT_NATIVE_IMAGE.to_string(),
            },
        }
    }

    /// Variants to build, in order
    pub fn variants(&self, os: TargetOs) -> Vec<BuildVariant> {
        self.variants
            .clone()
            .unwrap_or_else(|| default_variants(os))
    }

    /// Runtime environment of every fuzzer, resolved against the local one
    pub fn resolved_env(&self) -> Vec<String> {
        resolve_env(&self.env, |key| std::env::var(key).ok())
    }

    /// Parsed additional-file arguments with sources made absolute
    pub fn additional_files(&self) -> Result<Vec<AdditionalFile>> {
        self.additional_files
            .iter()
            .map(|arg| {
                let mut file = AdditionalFile::parse(arg)?;
                if file.source.is_relative() {
                    file.source = self.project_dir.join(&file.source);
                }
                Ok(file)
            })
            .collect()
    }
}

/// Sanitizer builds, then a coverage build where the platform has one
pub fn default_variants(os: TargetOs) -> Vec<BuildVariant> {
    if os == TargetOs::Windows {
        vec![BuildVariant::fuzzing(["address"])]
    } else {
        vec![
            BuildVariant::fuzzing(["address", "undefined"]),
            BuildVariant::coverage(),
        ]
    }
}

/// Expand bare `KEY` entries from `lookup`; unset keys are dropped
pub fn resolve_env(raw: &[String], lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let mut env = Vec::with_capacity(raw.len());
    for entry in raw {
        if entry.contains('=') {
            env.push(entry.clone());
        } else if let Some(value) = lookup(entry) {
            env.push(format!("{entry}={value}"));
        }
    }
    env
}

/// Set `key` to `value`, replacing an existing entry for `key`
pub fn set_env(env: &mut Vec<String>, key: &str, value: &str) {
    let entry = format!("{key}={value}");
    let existing = env
        .iter()
        .position(|e| e.split_once('=').map_or(e.as_str(), |(k, _)| k) == key);
    match existing {
        Some(i) => env[i] = entry,
        None => env.push(entry),
    }
}

/// A file or directory copied verbatim into the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalFile {
    pub source: PathBuf,
    /// Normalized archive path
    pub target: String,
}

impl AdditionalFile {
    /// Parse `SOURCE` (lands in `work_dir/<basename>`) or `SOURCE;TARGET`
    pub fn parse(arg: &str) -> Result<Self> {
        let invalid = |reason: &str| BundleError::InvalidAdditionalFile(arg.to_string(), reason.to_string());

        let parts: Vec<&str> = arg.split(';').collect();
        let (source, target) = match parts.as_slice() {
            [source] => {
                let base = Path::new(source)
                    .file_name()
                    .ok_or_else(|| invalid("source has no file name"))?
                    .to_string_lossy()
                    .into_owned();
                (*source, format!("{WORK_DIR}/{base}"))
            }
            [source, target] => (*source, target.to_string()),
            _ => return Err(invalid("expected SOURCE or SOURCE;TARGET")),
        };

        if source.is_empty() || target.is_empty() {
            return Err(invalid("source and target must not be empty"));
        }
        if Path::new(&target).is_absolute() || target.starts_with('/') {
            return Err(invalid("target has to be a relative path"));
        }
        let target = validation::archive_path(&target).map_err(|e| invalid(&e.to_string()))?;

        Ok(AdditionalFile {
            source: PathBuf::from(source),
            target,
        })
    }
}

/// Fluent construction of [`BundleOptions`]
///
/// ```
/// use fuzz_bundle::core::build::BuildSystem;
/// use fuzz_bundle::core::options::BundleOptions;
///
/// let opts = BundleOptions::builder()
///     .build_system(BuildSystem::Bazel)
///     .project_dir("/src/project")
///     .fuzz_test("fuzz/parser_fuzz")
///     .timeout_secs(600)
///     .build()
///     .unwrap();
/// assert_eq!(opts.docker_image(), "ubuntu:rolling");
/// ```
#[derive(Debug, Clone, Default)]
pub struct BundleOptionsBuilder {
    opts: BundleOptions,
}

impl BundleOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_system(mut self, build_system: BuildSystem) -> Self {
        self.opts.build_system = build_system;
        self
    }

    pub fn project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts.project_dir = dir.into();
        self
    }

    pub fn fuzz_test(mut self, name: impl Into<String>) -> Self {
        self.opts.fuzz_tests.push(name.into());
        self
    }

    pub fn variant(mut self, variant: BuildVariant) -> Self {
        self.opts.variants.get_or_insert_with(Vec::new).push(variant);
        self
    }

    pub fn dictionary(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.dictionary = Some(path.into());
        self
    }

    pub fn seed_corpus_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts.seed_corpus_dirs.push(dir.into());
        self
    }

    pub fn engine_arg(mut self, arg: impl Into<String>) -> Self {
        self.opts.engine_args.push(arg.into());
        self
    }

    pub fn env(mut self, entry: impl Into<String>) -> Self {
        self.opts.env.push(entry.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.opts.timeout_secs = secs;
        self
    }

    pub fn docker_image(mut self, image: impl Into<String>) -> Self {
        self.opts.docker_image = Some(image.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.opts.branch = Some(branch.into());
        self
    }

    pub fn commit(mut self, commit: impl Into<String>) -> Self {
        self.opts.commit = Some(commit.into());
        self
    }

    pub fn additional_file(mut self, arg: impl Into<String>) -> Self {
        self.opts.additional_files.push(arg.into());
        self
    }

    pub fn build_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.build_log = Some(path.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.output_path = Some(path.into());
        self
    }

    pub fn build_system_arg(mut self, arg: impl Into<String>) -> Self {
        self.opts.build_system_args.push(arg.into());
        self
    }

    /// Validate and return the options
    pub fn build(self) -> Result<BundleOptions> {
        self.opts.validate()?;
        Ok(self.opts)
    }

    /// Return the options without validation
    pub fn build_unchecked(self) -> BundleOptions {
        self.opts
    }
}
