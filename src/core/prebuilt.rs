//! Builder adapter serving results of builds that already ran
//!
//! The manifest is a JSON document listing one [`CBuildResult`] per fuzz
//! test and sanitizer set:
//!
//! ```json
//! {
//!   "results": [
//!     {
//!       "name": "parser_fuzz",
//!       "sanitizers": ["address", "undefined"],
//!       "project_dir": "..",
//!       "executable": "build/parser_fuzz",
//!       "build_dir": "build",
//!       "runtime_deps": ["build/libparser.so"]
//!     }
//!   ]
//! }
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use crate::core::build::{BuildVariant, CBuildResult, FuzzTestBuilder};
use crate::error::{BundleError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrebuiltManifest {
    #[serde(default)]
    pub results: Vec<CBuildResult>,
}

/// [`FuzzTestBuilder`] backed by a list of finished builds
#[derive(Debug, Clone, Default)]
pub struct PrebuiltBuilder {
    results: Vec<CBuildResult>,
}

impl PrebuiltBuilder {
    pub fn new(results: Vec<CBuildResult>) -> Self {
        PrebuiltBuilder { results }
    }

    /// Load a JSON manifest, resolving relative paths against its directory
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).with_path(path)?;
        let manifest: PrebuiltManifest = serde_json::from_str(&data)?;
        let base = path.parent().unwrap_or(Path::new(""));

        let results = manifest
            .results
            .into_iter()
            .map(|r| absolutize(r, base))
            .collect::<Vec<_>>();
        debug!("Loaded {} build results from {}", results.len(), path.display());
        Ok(Self::new(results))
    }

    pub fn results(&self) -> &[CBuildResult] {
        &self.results
    }
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path
    }
}

fn absolutize(mut r: CBuildResult, base: &Path) -> CBuildResult {
    let b = &mut r.build;
    b.executable = resolve(base, std::mem::take(&mut b.executable));
    b.build_dir = resolve(base, std::mem::take(&mut b.build_dir));
    b.generated_corpus = b.generated_corpus.take().map(|p| resolve(base, p));
    b.seed_corpus = b.seed_corpus.take().map(|p| resolve(base, p));
    b.dictionary = b.dictionary.take().map(|p| resolve(base, p));
    b.runtime_deps = std::mem::take(&mut b.runtime_deps)
        .into_iter()
        .map(|p| resolve(base, p))
        .collect();
    r.project_dir = resolve(base, std::mem::take(&mut r.project_dir));
    r
}

impl FuzzTestBuilder for PrebuiltBuilder {
    fn build(&mut self, variant: &BuildVariant, fuzz_tests: &[String]) -> Result<Vec<CBuildResult>> {
        let matching: Vec<&CBuildResult> = self
            .results
            .iter()
            .filter(|r| variant.matches(&r.sanitizers))
            .collect();

        if fuzz_tests.is_empty() {
            if matching.is_empty() {
                return Err(BundleError::builder(format!(
                    "no build results for sanitizers [{}]",
                    variant.sanitizers.join(", ")
                )));
            }
            return Ok(matching.into_iter().cloned().collect());
        }

        fuzz_tests
            .iter()
            .map(|name| {
                matching
                    .iter()
                    .find(|r| &r.name == name)
                    .map(|r| (*r).clone())
                    .ok_or_else(|| {
                        BundleError::builder(format!(
                            "no build result for fuzz test {name:?} with sanitizers [{}]",
                            variant.sanitizers.join(", ")
                        ))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::build::BuildResult;
    use std::fs;
    use tempfile::TempDir;

    fn result(name: &str, sanitizers: &[&str]) -> CBuildResult {
        CBuildResult {
            name: name.to_string(),
            sanitizers: sanitizers.iter().map(|s| s.to_string()).collect(),
            project_dir: PathBuf::from("/src"),
            build: BuildResult {
                executable: PathBuf::from(format!("/src/build/{name}")),
                generated_corpus: None,
                seed_corpus: None,
                dictionary: None,
                build_dir: PathBuf::from("/src/build"),
                runtime_deps: Vec::new(),
            },
        }
    }

    #[test]
    fn test_selects_by_variant_and_name() -> Result<()> {
        let mut builder = PrebuiltBuilder::new(vec![
            result("a", &["undefined", "address"]),
            result("b", &["address", "undefined"]),
            result("a", &["coverage"]),
        ]);

        let fuzzing = BuildVariant::fuzzing(["address", "undefined"]);
        let all = builder.build(&fuzzing, &[])?;
        assert_eq!(all.len(), 2);

        let only_b = builder.build(&fuzzing, &["b".to_string()])?;
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].name, "b");

        let coverage = builder.build(&BuildVariant::coverage(), &["a".to_string()])?;
        assert!(coverage[0].is_coverage());
        Ok(())
    }

    #[test]
    fn test_missing_result_is_builder_error() {
        let mut builder = PrebuiltBuilder::new(vec![result("a", &["address"])]);
        let err = builder
            .build(&BuildVariant::coverage(), &["a".to_string()])
            .unwrap_err();
        assert!(matches!(err, BundleError::Builder(_)));
        assert!(err.to_string().contains("coverage"));
    }

    #[test]
    fn test_manifest_paths_are_relative_to_manifest() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join("results.json");
        fs::write(
            &manifest,
            r#"{"results": [{
                "name": "t",
                "sanitizers": ["address"],
                "project_dir": ".",
                "executable": "build/t",
                "build_dir": "build",
                "dictionary": "t.dict",
                "runtime_deps": ["build/libt.so", "/usr/lib/libz.so"]
            }]}"#,
        )?;

        let builder = PrebuiltBuilder::from_path(&manifest)?;
        let r = &builder.results()[0];
        assert_eq!(r.build.executable, temp_dir.path().join("build/t"));
        assert_eq!(r.build.dictionary, Some(temp_dir.path().join("t.dict")));
        assert_eq!(r.build.runtime_deps[1], PathBuf::from("/usr/lib/libz.so"));
        Ok(())
    }
}
