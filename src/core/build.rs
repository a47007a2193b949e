//! Build results handed to the bundler by build-system adapters
//!
//! The bundler does not compile anything. An adapter implementing
//! [`FuzzTestBuilder`] builds one variant at a time and reports, per fuzz
//! test, where the executable, its build tree and its runtime dependencies
//! are.

use crate::error::{BundleError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Sanitizer value marking a coverage-instrumented build
pub const COVERAGE: &str = "coverage";

/// Sanitizer that cannot be packaged on its own
pub const UNDEFINED_BEHAVIOR: &str = "undefined";

/// What a build produced for one fuzz test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Canonical path of the fuzz test executable
    pub executable: PathBuf,
    /// Canonical path of the fuzz test's generated corpus directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_corpus: Option<PathBuf>,
    /// Canonical path of the fuzz test's default seed corpus directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_corpus: Option<PathBuf>,
    /// Canonical path of the fuzz test's default dictionary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<PathBuf>,
    /// Canonical path of the build directory
    pub build_dir: PathBuf,
    /// Canonical paths of the runtime dependencies
    #[serde(default)]
    pub runtime_deps: Vec<PathBuf>,
}

/// Build result of a C/C++ fuzz test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CBuildResult {
    /// Unique name of the fuzz test, usable as a path
    pub name: String,
    /// Sanitizers of this build; `["coverage"]` marks a coverage build
    #[serde(default)]
    pub sanitizers: Vec<String>,
    /// Directory that source paths in debug info are relative to
    pub project_dir: PathBuf,
    #[serde(flatten)]
    pub build: BuildResult,
}

impl CBuildResult {
    pub fn is_coverage(&self) -> bool {
        is_coverage_build(&self.sanitizers)
    }
}

/// Whether a sanitizer set denotes a coverage build
pub fn is_coverage_build(sanitizers: &[String]) -> bool {
    matches!(sanitizers, [only] if only == COVERAGE)
}

/// One instrumentation configuration to build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildVariant {
    pub sanitizers: Vec<String>,
}

impl BuildVariant {
    pub fn fuzzing<I, S>(sanitizers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BuildVariant {
            sanitizers: sanitizers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn coverage() -> Self {
        BuildVariant {
            sanitizers: vec![COVERAGE.to_string()],
        }
    }

    pub fn is_coverage(&self) -> bool {
        is_coverage_build(&self.sanitizers)
    }

    /// Whether `sanitizers` names the same set as this variant
    pub fn matches(&self, sanitizers: &[String]) -> bool {
        let mut mine = self.sanitizers.clone();
        let mut theirs = sanitizers.to_vec();
        mine.sort();
        theirs.sort();
        mine == theirs
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_coverage() {
            f.write_str("coverage")
        } else {
            f.write_str("fuzzing")
        }
    }
}

/// Supported build systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    #[default]
    CMake,
    Bazel,
    Other,
    Maven,
    Gradle,
}

impl BuildSystem {
    /// Build systems producing native libFuzzer binaries
    pub fn is_native(self) -> bool {
        matches!(self, BuildSystem::CMake | BuildSystem::Bazel | BuildSystem::Other)
    }
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildSystem::CMake => "cmake",
            BuildSystem::Bazel => "bazel",
            BuildSystem::Other => "other",
            BuildSystem::Maven => "maven",
            BuildSystem::Gradle => "gradle",
        };
        f.write_str(name)
    }
}

impl FromStr for BuildSystem {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cmake" => Ok(BuildSystem::CMake),
            "bazel" => Ok(BuildSystem::Bazel),
            "other" => Ok(BuildSystem::Other),
            "maven" => Ok(BuildSystem::Maven),
            "gradle" => Ok(BuildSystem::Gradle),
            _ => Err(BundleError::UnsupportedBuildSystem(s.to_string())),
        }
    }
}

/// Adapter that builds fuzz tests for one variant
///
/// Implementations own compilation and dependency discovery. An empty
/// `fuzz_tests` slice asks for every fuzz test the build system knows about;
/// adapters that cannot enumerate fuzz tests should return an error.
pub trait FuzzTestBuilder {
    fn build(&mut self, variant: &BuildVariant, fuzz_tests: &[String]) -> Result<Vec<CBuildResult>>;
}

impl<B: FuzzTestBuilder + ?Sized> FuzzTestBuilder for Box<B> {
    fn build(&mut self, variant: &BuildVariant, fuzz_tests: &[String]) -> Result<Vec<CBuildResult>> {
        (**self).build(variant, fuzz_tests)
    }
}
