//! Per-fuzz-test artifact layout
//!
//! For every build result the assembler writes, below a prefix
//! `<engine>/<sanitizers>/<fuzz test>`:
//!
//! ```text
//! bin/<build-dir-relative executable>      executable (+ .dSYM beside it)
//! bin/<build-dir-relative library>         hard links into cas/
//! external_libs/<basename>                 libraries from outside any system dir
//! dict                                     dictionary
//! seeds/<corpus dir basename>[-n]/...      seed corpora
//! ```
//!
//! and returns the [`Fuzzer`] records describing them together with the
//! system libraries the run image has to provide.

use crate::core::archive::ArchiveWriter;
use crate::core::build::{is_coverage_build, CBuildResult, UNDEFINED_BEHAVIOR};
use crate::core::cas::{self, sha256_file};
use crate::core::classify::{lexical_normalize, Classifier, DependencyKind};
use crate::core::metadata::{Engine, EngineOptions, Fuzzer};
use crate::core::options::set_env;
use crate::core::validation::{self, FuzzTestName};
use crate::error::{BundleError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment marker telling a packaged fuzz test not to re-invoke the tool
pub const NO_REINVOKE_ENV: (&str, &str) = ("NO_CIFUZZ", "1");

/// Engine flags of coverage records: crash-resistant merge into the
/// (initially empty) working directory
pub const COVERAGE_MERGE_FLAGS: [&str; 2] = ["-merge=1", "."];

const ENGINE_SEGMENT: &str = "libfuzzer";
const COVERAGE_ENGINE_SEGMENT: &str = "replayer";

/// Settings shared by every assembled fuzz test
#[derive(Debug, Clone, Default)]
pub struct AssemblerOptions {
    /// Dictionary used instead of each build's default one
    pub dictionary: Option<PathBuf>,
    /// Seed corpora added after each build's default seed corpus
    pub seed_corpus_dirs: Vec<PathBuf>,
    pub engine_args: Vec<String>,
    /// Resolved `KEY=VALUE` entries
    pub env: Vec<String>,
    pub timeout_secs: u64,
    /// Add the directories of in-tree libraries to `library_paths`
    pub in_tree_library_paths: bool,
}

/// Output of one [`ArtifactAssembler::assemble`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    pub fuzzers: Vec<Fuzzer>,
    /// Uncommon system libraries left to the run image
    pub system_deps: Vec<PathBuf>,
}

/// Archive prefix of a build result, e.g. `libfuzzer/address+undefined/foo`
///
/// ```
/// use fuzz_bundle::core::assembler::fuzz_test_prefix;
///
/// let prefix = fuzz_test_prefix("foo", &["undefined".into(), "address".into()]).unwrap();
/// assert_eq!(prefix, "libfuzzer/address+undefined/foo");
///
/// let prefix = fuzz_test_prefix("foo", &["coverage".into()]).unwrap();
/// assert_eq!(prefix, "replayer/coverage/foo");
/// ```
pub fn fuzz_test_prefix(name: &str, sanitizers: &[String]) -> Result<String> {
    let name = FuzzTestName::new(name)?;
    let engine = if is_coverage_build(sanitizers) {
        COVERAGE_ENGINE_SEGMENT
    } else {
        ENGINE_SEGMENT
    };
    let mut sorted = sanitizers.to_vec();
    sorted.sort();
    let segment = if sorted.is_empty() {
        "none".to_string()
    } else {
        sorted.join("+")
    };
    validation::archive_path(&format!("{engine}/{segment}/{name}"))
}

/// A dependency path with its symlinks resolved where possible
struct Dependency {
    path: PathBuf,
    resolved: PathBuf,
}

impl Dependency {
    fn new(path: &Path) -> Self {
        Dependency {
            path: path.to_path_buf(),
            resolved: fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
        }
    }

    fn basename(&self) -> String {
        self.path
            .file_name()
            .unwrap_or(self.resolved.as_os_str())
            .to_string_lossy()
            .into_owned()
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Path of `path` relative to `dir`, `/`-separated
fn relative_to(path: &Path, dir: &Path) -> Option<String> {
    lexical_normalize(path)
        .strip_prefix(lexical_normalize(dir))
        .ok()
        .map(validation::to_slash)
}

/// Lays out build results inside an archive
pub struct ArtifactAssembler<'a> {
    classifier: &'a Classifier,
    options: AssemblerOptions,
}

impl<'a> ArtifactAssembler<'a> {
    pub fn new(classifier: &'a Classifier, options: AssemblerOptions) -> Self {
        ArtifactAssembler {
            classifier,
            options,
        }
    }

    /// Write everything `result` needs at run time and describe it
    pub fn assemble(&self, writer: &mut dyn ArchiveWriter, result: &CBuildResult) -> Result<Assembly> {
        let build = &result.build;
        debug!("Assembling artifacts for {}", build.executable.display());

        let prefix = fuzz_test_prefix(&result.name, &result.sanitizers)?;
        let bin_prefix = validation::join(&prefix, "bin")?;

        let executable_rel = relative_to(&build.executable, &build.build_dir)
            .filter(|rel| !rel.is_empty())
            .ok_or_else(|| BundleError::ExecutableOutsideBuildDir {
                executable: build.executable.clone(),
                build_dir: build.build_dir.clone(),
            })?;
        let executable_path = validation::join(&bin_prefix, &executable_rel)?;
        writer.write_file(&executable_path, &build.executable)?;

        let mut debug_symbols = String::new();
        let mut dsym = build.executable.clone().into_os_string();
        dsym.push(".dSYM");
        let dsym = PathBuf::from(dsym);
        if dsym.is_dir() {
            debug_symbols = format!("{executable_path}.dSYM");
            writer.write_dir(&debug_symbols, &dsym)?;
        }

        let mut library_paths = Vec::new();
        let mut system_deps = Vec::new();
        let external_prefix = self.stage_runtime_deps(
            writer,
            result,
            &prefix,
            &bin_prefix,
            &mut library_paths,
            &mut system_deps,
        )?;
        if let Some(external_prefix) = external_prefix {
            library_paths.push(external_prefix);
        }

        let dictionary = self.stage_dictionary(writer, result, &prefix)?;
        let seeds = self.stage_seeds(writer, result, &prefix)?;

        let mut env = self.options.env.clone();
        set_env(&mut env, NO_REINVOKE_ENV.0, NO_REINVOKE_ENV.1);

        let mut base = Fuzzer::new(executable_path, Engine::Libfuzzer);
        base.target = result.name.clone();
        base.project_dir = result.project_dir.clone();
        base.dictionary = dictionary;
        base.seeds = seeds;
        base.debug_symbols = debug_symbols;
        base.library_paths = library_paths;
        base.engine_options = EngineOptions {
            flags: self.options.engine_args.clone(),
            env,
        };
        base.max_run_time = self.options.timeout_secs;

        let fuzzers = if result.is_coverage() {
            base.engine = Engine::LlvmCov;
            base.engine_options.flags = COVERAGE_MERGE_FLAGS.iter().map(|f| f.to_string()).collect();
            vec![base]
        } else {
            result
                .sanitizers
                .iter()
                .filter(|s| s.as_str() != UNDEFINED_BEHAVIOR)
                .map(|sanitizer| Fuzzer {
                    engine: Engine::Libfuzzer,
                    sanitizer: sanitizer.to_uppercase(),
                    ..base.clone()
                })
                .collect()
        };

        Ok(Assembly {
            fuzzers,
            system_deps,
        })
    }

    /// Classify and stage runtime dependencies
    ///
    /// Returns the external library directory if anything was placed there.
    fn stage_runtime_deps(
        &self,
        writer: &mut dyn ArchiveWriter,
        result: &CBuildResult,
        prefix: &str,
        bin_prefix: &str,
        library_paths: &mut Vec<String>,
        system_deps: &mut Vec<PathBuf>,
    ) -> Result<Option<String>> {
        let build_dir = &result.build.build_dir;
        let resolved_build_dir = fs::canonicalize(build_dir).unwrap_or_else(|_| build_dir.clone());

        // Regular files first so link targets precede the links
        let mut deps: Vec<&PathBuf> = result.build.runtime_deps.iter().collect();
        deps.sort_by_key(|d| is_symlink(d));

        let external_prefix = validation::join(prefix, "external_libs")?;
        let mut used_external = false;

        for dep in deps.into_iter().map(|d| Dependency::new(d)) {
            // Classify where the dependency really lives
            let kind = self.classifier.classify(&dep.resolved, &resolved_build_dir);
            debug!("Runtime dependency {} is {:?}", dep.path.display(), kind);

            // In-tree links keep the name the build used for them
            let in_tree_rel = match kind {
                DependencyKind::InTree => relative_to(&dep.path, build_dir)
                    .or_else(|| relative_to(&dep.resolved, &resolved_build_dir))
                    .filter(|rel| !rel.is_empty()),
                _ => None,
            };

            match (kind, in_tree_rel) {
                (DependencyKind::InTree, Some(rel)) => {
                    let link_path = validation::join(bin_prefix, &rel)?;
                    cas::stage(writer, &dep.path, &link_path)?;

                    if self.options.in_tree_library_paths {
                        let parent = rel.rsplit_once('/').map_or("", |(dir, _)| dir);
                        let library_path = validation::join(bin_prefix, parent)?;
                        if !library_paths.contains(&library_path) {
                            library_paths.push(library_path);
                        }
                    }
                }
                (DependencyKind::InTree, None) => {
                    return Err(BundleError::InvalidRuntimeDependency {
                        path: dep.path.clone(),
                        reason: "it is the build directory itself".to_string(),
                    });
                }
                (DependencyKind::WellKnownSystem, _) => {}
                (DependencyKind::UncommonSystem, _) => system_deps.push(dep.path.clone()),
                (DependencyKind::External, _) => {
                    let archive_path = validation::join(&external_prefix, &dep.basename())?;
                    if writer.has_file_entry(&archive_path) {
                        let existing = writer.source_path(&archive_path).unwrap_or_default();
                        if sha256_file(&dep.path)? != sha256_file(&existing)? {
                            return Err(BundleError::ConflictingRuntimeDependencies {
                                fuzz_test: result.name.clone(),
                                new: dep.path.clone(),
                                existing,
                                archive_path,
                            });
                        }
                        debug!(
                            "{} has the same content as {}, skipping",
                            dep.path.display(),
                            existing.display()
                        );
                    } else {
                        writer.write_file(&archive_path, &dep.path)?;
                    }
                    used_external = true;
                }
            }
        }

        Ok(used_external.then_some(external_prefix))
    }

    /// Explicit dictionary, else the build's default one if it exists
    fn stage_dictionary(&self, writer: &mut dyn ArchiveWriter, result: &CBuildResult, prefix: &str) -> Result<String> {
        let dictionary = self
            .options
            .dictionary
            .clone()
            .or_else(|| result.build.dictionary.clone().filter(|d| d.is_file()));

        let Some(dictionary) = dictionary else {
            return Ok(String::new());
        };
        debug!("Adding dictionary {}", dictionary.display());
        let archive_path = validation::join(prefix, "dict")?;
        writer.write_file(&archive_path, &dictionary)?;
        Ok(archive_path)
    }

    /// Default seed corpus first, then the configured ones, each in its own
    /// subdirectory so equal file names cannot collide
    fn stage_seeds(&self, writer: &mut dyn ArchiveWriter, result: &CBuildResult, prefix: &str) -> Result<String> {
        let mut corpus_dirs = Vec::new();
        if let Some(default) = result.build.seed_corpus.as_ref().filter(|d| d.is_dir()) {
            corpus_dirs.push(default.clone());
        }
        corpus_dirs.extend(self.options.seed_corpus_dirs.iter().cloned());

        if corpus_dirs.is_empty() {
            return Ok(String::new());
        }

        let seeds_dir = validation::join(prefix, "seeds")?;
        let mut used = Vec::with_capacity(corpus_dirs.len());
        for dir in &corpus_dirs {
            let base = dir
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "seeds".to_string());
            let base = validation::join(&seeds_dir, &base)?;
            let mut target = base.clone();
            let mut n = 1;
            while used.contains(&target) {
                target = format!("{base}-{n}");
                n += 1;
            }
            debug!("Adding seeds from {} as {}", dir.display(), target);
            writer.write_dir(&target, dir)?;
            used.push(target);
        }

        Ok(seeds_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::{EntryKind, NoopArchiveWriter};
    use crate::core::build::BuildResult;
    use crate::core::classify::TargetOs;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        root: PathBuf,
        build_dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let root = fs::canonicalize(temp_dir.path()).unwrap();
            let build_dir = root.join("build");
            fs::create_dir_all(&build_dir).unwrap();
            Fixture {
                _temp_dir: temp_dir,
                root,
                build_dir,
            }
        }

        fn file(&self, rel: &str, content: &[u8]) -> PathBuf {
            let path = self.root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn result(&self, name: &str, sanitizers: &[&str], deps: Vec<PathBuf>) -> CBuildResult {
            let executable = self.file(&format!("build/{name}"), b"\x7fELF");
            CBuildResult {
                name: name.to_string(),
                sanitizers: sanitizers.iter().map(|s| s.to_string()).collect(),
                project_dir: self.root.clone(),
                build: BuildResult {
                    executable,
                    generated_corpus: None,
                    seed_corpus: None,
                    dictionary: None,
                    build_dir: self.build_dir.clone(),
                    runtime_deps: deps,
                },
            }
        }
    }

    fn linux() -> Classifier {
        Classifier::new(TargetOs::Linux)
    }

    #[test]
    fn test_sanitizer_build_with_system_dependency() -> Result<()> {
        let fx = Fixture::new();
        let lib = fx.file("build/lib.so", b"in-tree library");
        let result = fx.result(
            "foo",
            &["address", "undefined"],
            vec![lib, PathBuf::from("/usr/lib/libBLAS.so")],
        );

        let classifier = linux();
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let mut writer = NoopArchiveWriter::new();
        let assembly = assembler.assemble(&mut writer, &result)?;

        assert_eq!(assembly.fuzzers.len(), 1);
        let fuzzer = &assembly.fuzzers[0];
        assert_eq!(fuzzer.sanitizer, "ADDRESS");
        assert_eq!(fuzzer.engine, Engine::Libfuzzer);
        assert_eq!(fuzzer.path, "libfuzzer/address+undefined/foo/bin/foo");
        assert_eq!(fuzzer.target, "foo");
        assert_eq!(fuzzer.engine_options.env, vec!["NO_CIFUZZ=1"]);
        assert!(fuzzer.library_paths.is_empty());
        assert_eq!(assembly.system_deps, vec![PathBuf::from("/usr/lib/libBLAS.so")]);

        assert!(writer.has_file_entry("libfuzzer/address+undefined/foo/bin/lib.so"));
        let stored = writer
            .headers()
            .iter()
            .filter(|h| h.kind == EntryKind::File && h.path.starts_with("cas/"))
            .count();
        assert_eq!(stored, 1);
        assert!(!writer.headers().iter().any(|h| h.path.contains("libBLAS")));
        Ok(())
    }

    #[test]
    fn test_coverage_ignores_engine_args() -> Result<()> {
        let fx = Fixture::new();
        let result = fx.result("foo", &["coverage"], Vec::new());

        let classifier = linux();
        let options = AssemblerOptions {
            engine_args: vec!["-dict=x".to_string()],
            timeout_secs: 30,
            ..Default::default()
        };
        let assembler = ArtifactAssembler::new(&classifier, options);
        let mut writer = NoopArchiveWriter::new();
        let assembly = assembler.assemble(&mut writer, &result)?;

        assert_eq!(assembly.fuzzers.len(), 1);
        let fuzzer = &assembly.fuzzers[0];
        assert_eq!(fuzzer.engine, Engine::LlvmCov);
        assert_eq!(fuzzer.sanitizer, "");
        assert_eq!(fuzzer.engine_options.flags, vec!["-merge=1", "."]);
        assert_eq!(fuzzer.path, "replayer/coverage/foo/bin/foo");
        assert_eq!(fuzzer.max_run_time, 30);
        Ok(())
    }

    #[test]
    fn test_lone_undefined_sanitizer_yields_no_record() -> Result<()> {
        let fx = Fixture::new();
        let result = fx.result("foo", &["undefined"], Vec::new());

        let classifier = linux();
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let assembly = assembler.assemble(&mut NoopArchiveWriter::new(), &result)?;
        assert!(assembly.fuzzers.is_empty());
        Ok(())
    }

    #[test]
    fn test_executable_outside_build_dir() {
        let fx = Fixture::new();
        let mut result = fx.result("foo", &["address"], Vec::new());
        result.build.executable = fx.file("elsewhere/foo", b"bin");

        let classifier = linux();
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let err = assembler
            .assemble(&mut NoopArchiveWriter::new(), &result)
            .unwrap_err();
        assert!(matches!(err, BundleError::ExecutableOutsideBuildDir { .. }));
    }

    #[test]
    fn test_external_library_collision() {
        let fx = Fixture::new();
        let a = fx.file("vendor-a/libext.so", b"version a");
        let b = fx.file("vendor-b/libext.so", b"version b");
        let result = fx.result("foo", &["address"], vec![a.clone(), b.clone()]);

        let classifier = linux();
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let mut writer = NoopArchiveWriter::new();
        let err = assembler.assemble(&mut writer, &result).unwrap_err();

        match err {
            BundleError::ConflictingRuntimeDependencies { new, existing, .. } => {
                assert_eq!(new, b);
                assert_eq!(existing, a);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The conflicting library was not written
        assert_eq!(
            writer
                .headers()
                .iter()
                .filter(|h| h.path.ends_with("external_libs/libext.so"))
                .count(),
            1
        );
    }

    #[test]
    fn test_identical_external_libraries_are_deduplicated() -> Result<()> {
        let fx = Fixture::new();
        let a = fx.file("vendor-a/libext.so", b"same");
        let b = fx.file("vendor-b/libext.so", b"same");
        let result = fx.result("foo", &["address"], vec![a, b]);

        let classifier = linux();
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let assembly = assembler.assemble(&mut NoopArchiveWriter::new(), &result)?;
        assert_eq!(
            assembly.fuzzers[0].library_paths,
            vec!["libfuzzer/address/foo/external_libs"]
        );
        Ok(())
    }

    #[test]
    fn test_in_tree_library_paths_dictionary_and_seeds() -> Result<()> {
        let fx = Fixture::new();
        let lib = fx.file("build/lib/libhelper.so", b"helper");
        let mut result = fx.result("foo", &["address"], vec![lib]);
        let default_seeds = fx.root.join("foo_seed_corpus");
        fx.file("foo_seed_corpus/a", b"1");
        fx.file("extra/seeds/b", b"2");
        fx.file("other/seeds/c", b"3");
        result.build.seed_corpus = Some(default_seeds);
        result.build.dictionary = Some(fx.file("foo.dict", b"\"kw\""));

        let classifier = linux();
        let options = AssemblerOptions {
            seed_corpus_dirs: vec![fx.root.join("extra/seeds"), fx.root.join("other/seeds")],
            in_tree_library_paths: true,
            ..Default::default()
        };
        let assembler = ArtifactAssembler::new(&classifier, options);
        let mut writer = NoopArchiveWriter::new();
        let assembly = assembler.assemble(&mut writer, &result)?;

        let fuzzer = &assembly.fuzzers[0];
        assert_eq!(fuzzer.library_paths, vec!["libfuzzer/address/foo/bin/lib"]);
        assert_eq!(fuzzer.dictionary, "libfuzzer/address/foo/dict");
        assert_eq!(fuzzer.seeds, "libfuzzer/address/foo/seeds");
        assert!(writer.has_file_entry("libfuzzer/address/foo/seeds/foo_seed_corpus/a"));
        assert!(writer.has_file_entry("libfuzzer/address/foo/seeds/seeds/b"));
        assert!(writer.has_file_entry("libfuzzer/address/foo/seeds/seeds-1/c"));
        Ok(())
    }

    #[test]
    fn test_explicit_dictionary_wins() -> Result<()> {
        let fx = Fixture::new();
        let mut result = fx.result("foo", &["address"], Vec::new());
        result.build.dictionary = Some(fx.file("default.dict", b"default"));
        let explicit = fx.file("explicit.dict", b"explicit");

        let classifier = linux();
        let options = AssemblerOptions {
            dictionary: Some(explicit.clone()),
            ..Default::default()
        };
        let assembler = ArtifactAssembler::new(&classifier, options);
        let mut writer = NoopArchiveWriter::new();
        assembler.assemble(&mut writer, &result)?;
        assert_eq!(writer.source_path("libfuzzer/address/foo/dict"), Some(explicit));
        Ok(())
    }

    #[test]
    fn test_debug_symbols_bundle() -> Result<()> {
        let fx = Fixture::new();
        let result = fx.result("foo", &["address"], Vec::new());
        fx.file("build/foo.dSYM/Contents/Info.plist", b"<plist/>");
        fx.file("build/foo.dSYM/Contents/Resources/DWARF/foo", b"dwarf");

        let classifier = Classifier::new(TargetOs::MacOs);
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let mut writer = NoopArchiveWriter::new();
        let assembly = assembler.assemble(&mut writer, &result)?;

        let fuzzer = &assembly.fuzzers[0];
        assert_eq!(fuzzer.debug_symbols, "libfuzzer/address/foo/bin/foo.dSYM");
        assert!(writer.has_entry("libfuzzer/address/foo/bin/foo.dSYM"));
        assert!(writer.has_file_entry("libfuzzer/address/foo/bin/foo.dSYM/Contents/Info.plist"));
        assert_eq!(
            writer.source_path("libfuzzer/address/foo/bin/foo.dSYM/Contents/Resources/DWARF/foo"),
            Some(fx.root.join("build/foo.dSYM/Contents/Resources/DWARF/foo"))
        );

        let metadata = crate::core::metadata::Metadata {
            run_environment: crate::core::metadata::RunEnvironment::docker("ubuntu:rolling"),
            code_revision: None,
            fuzzers: assembly.fuzzers,
        };
        metadata.validate(|p| writer.has_entry(p))?;
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_regular_files_are_staged_before_symlinks() -> Result<()> {
        let fx = Fixture::new();
        let target = fx.file("build/lib/libfoo.so.1", b"foo library");
        let link = fx.build_dir.join("lib/libfoo.so");
        std::os::unix::fs::symlink("libfoo.so.1", &link)?;
        // The symlink comes first in the build's list
        let result = fx.result("foo", &["address"], vec![link, target]);

        let classifier = linux();
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let mut writer = NoopArchiveWriter::new();
        assembler.assemble(&mut writer, &result)?;

        let position = |path: &str| {
            writer
                .headers()
                .iter()
                .position(|h| h.path == path)
                .unwrap_or_else(|| panic!("{path} not written"))
        };
        let regular = position("libfuzzer/address/foo/bin/lib/libfoo.so.1");
        let symlink = position("libfuzzer/address/foo/bin/lib/libfoo.so");
        assert!(regular < symlink);

        let first_payload = writer
            .headers()
            .iter()
            .position(|h| h.kind == EntryKind::File && h.path.starts_with("cas/"))
            .unwrap();
        assert!(first_payload < regular);
        assert!(writer.headers()[first_payload].path.ends_with("/libfoo.so.1"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_in_tree_symlink_to_external_library_is_not_stored() -> Result<()> {
        let fx = Fixture::new();
        let external = fx.file("vendor/libvendor.so.2", b"vendor library");
        let link = fx.build_dir.join("libvendor.so");
        std::os::unix::fs::symlink(&external, &link)?;
        let result = fx.result("foo", &["address"], vec![link]);

        let classifier = linux();
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let mut writer = NoopArchiveWriter::new();
        let assembly = assembler.assemble(&mut writer, &result)?;

        assert!(!writer.headers().iter().any(|h| h.path.starts_with("cas/")));
        assert!(!writer.has_entry("libfuzzer/address/foo/bin/libvendor.so"));
        assert!(writer.has_file_entry("libfuzzer/address/foo/external_libs/libvendor.so"));
        assert_eq!(
            assembly.fuzzers[0].library_paths,
            vec!["libfuzzer/address/foo/external_libs"]
        );
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_in_tree_symlink_to_system_library_is_dropped() -> Result<()> {
        let candidates = [
            "/lib/x86_64-linux-gnu/libc.so.6",
            "/usr/lib/x86_64-linux-gnu/libc.so.6",
            "/lib/aarch64-linux-gnu/libc.so.6",
            "/usr/lib/aarch64-linux-gnu/libc.so.6",
            "/lib64/libc.so.6",
            "/usr/lib64/libc.so.6",
            "/usr/lib/libc.so.6",
        ];
        let Some(system_lib) = candidates.iter().map(Path::new).find(|p| p.is_file()) else {
            return Ok(());
        };

        let fx = Fixture::new();
        let link = fx.build_dir.join("libsys.so");
        std::os::unix::fs::symlink(system_lib, &link)?;
        let result = fx.result("foo", &["address"], vec![link.clone()]);

        let classifier = linux();
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let mut writer = NoopArchiveWriter::new();
        let assembly = assembler.assemble(&mut writer, &result)?;

        assert!(!writer.headers().iter().any(|h| h.path.starts_with("cas/")));
        assert!(!writer.has_entry("libfuzzer/address/foo/bin/libsys.so"));
        assert!(!writer.headers().iter().any(|h| h.path.contains("external_libs")));
        // Older glibc names the real file libc-<version>.so, which is only reported
        assert!(assembly.system_deps.iter().all(|d| d == &link));
        Ok(())
    }

    #[test]
    fn test_build_dir_as_dependency_is_rejected() {
        let fx = Fixture::new();
        let result = fx.result("foo", &["address"], vec![fx.build_dir.clone()]);

        let classifier = linux();
        let assembler = ArtifactAssembler::new(&classifier, AssemblerOptions::default());
        let err = assembler
            .assemble(&mut NoopArchiveWriter::new(), &result)
            .unwrap_err();
        assert!(matches!(err, BundleError::InvalidRuntimeDependency { .. }));
    }
}
