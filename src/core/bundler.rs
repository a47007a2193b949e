//! Bundle orchestration
//!
//! [`Bundler::bundle`] runs the whole pipeline:
//!
//! 1. build every variant through the [`FuzzTestBuilder`]
//! 2. assemble each build result into the archive
//! 3. write `bundle.yaml`, `work_dir/`, additional files and the build log
//! 4. close the archive
//!
//! The scratch directory is removed on every exit path, and a failed run
//! removes the partially written archive.

use crate::core::archive::{ArchiveWriter, TarArchiveWriter};
use crate::core::assembler::{fuzz_test_prefix, ArtifactAssembler, AssemblerOptions};
use crate::core::build::{BuildSystem, CBuildResult, FuzzTestBuilder};
use crate::core::classify::{is_below, lexical_normalize, Classifier};
use crate::core::metadata::{Metadata, RunEnvironment, METADATA_FILE_NAME};
use crate::core::options::{BundleOptions, WORK_DIR};
use crate::core::vcs;
use crate::error::{BundleError, IoResultExt, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Archive path of the embedded build log
pub const BUILD_LOG_FILE_NAME: &str = "build.log";

/// Progress of a [`Bundler`] run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Build,
    Assemble,
    Metadata,
    Finalize,
    Done,
    Failed,
}

/// Output file that is deleted unless the bundle completes
struct PendingBundle {
    path: PathBuf,
    committed: bool,
}

impl PendingBundle {
    fn create(path: &Path) -> Result<(Self, File)> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let file = File::create(path).with_path(path)?;
        debug!("Bundle output path: {}", path.display());
        Ok((
            PendingBundle {
                path: path.to_path_buf(),
                committed: false,
            },
            file,
        ))
    }

    fn commit(mut self) -> PathBuf {
        self.committed = true;
        self.path.clone()
    }
}

impl Drop for PendingBundle {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_file(&self.path) {
                debug!("Could not remove incomplete bundle {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Drives one bundle from build to closed archive
pub struct Bundler<B> {
    opts: BundleOptions,
    builder: B,
    classifier: Classifier,
    stage: Stage,
}

impl<B: FuzzTestBuilder> Bundler<B> {
    pub fn new(opts: BundleOptions, builder: B) -> Self {
        Bundler {
            opts,
            builder,
            classifier: Classifier::for_host(),
            stage: Stage::Init,
        }
    }

    /// Use library conventions of another OS
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn options(&self) -> &BundleOptions {
        &self.opts
    }

    /// Produce the gzipped bundle and return its path
    pub fn bundle(&mut self) -> Result<PathBuf> {
        let (scratch, pending, file) = match self.prepare_output() {
            Ok(prepared) => prepared,
            Err(e) => {
                self.stage = Stage::Failed;
                return Err(e);
            }
        };

        let mut writer = TarArchiveWriter::new(BufWriter::new(file), true);
        self.bundle_into(&mut writer, scratch.path())?;

        Ok(pending.commit())
    }

    /// Validate the options, then create the scratch dir and output file
    fn prepare_output(&self) -> Result<(TempDir, PendingBundle, File)> {
        self.opts.validate()?;
        let scratch = tempfile::Builder::new()
            .prefix("fuzz-bundle-")
            .tempdir()?;
        let (pending, file) = PendingBundle::create(&self.opts.output_path())?;
        Ok((scratch, pending, file))
    }

    /// Run the pipeline against an arbitrary writer, closing it at the end
    ///
    /// `scratch` must be an empty directory owned by the caller.
    pub fn bundle_into(&mut self, writer: &mut dyn ArchiveWriter, scratch: &Path) -> Result<Metadata> {
        let result = self.run(writer, scratch);
        self.stage = match result {
            Ok(_) => Stage::Done,
            Err(_) => Stage::Failed,
        };
        result
    }

    fn run(&mut self, writer: &mut dyn ArchiveWriter, scratch: &Path) -> Result<Metadata> {
        self.stage = Stage::Build;
        let results = self.build_all_variants(scratch)?;

        self.stage = Stage::Assemble;
        info!("Creating bundle...");
        let assembler = ArtifactAssembler::new(
            &self.classifier,
            AssemblerOptions {
                dictionary: self.opts.dictionary.clone(),
                seed_corpus_dirs: self.opts.seed_corpus_dirs.clone(),
                engine_args: self.opts.engine_args.clone(),
                env: self.opts.resolved_env(),
                timeout_secs: self.opts.timeout_secs,
                in_tree_library_paths: self.opts.build_system == BuildSystem::Other,
            },
        );

        let mut fuzzers = Vec::new();
        let mut system_deps = BTreeSet::new();
        for result in &results {
            let assembly = assembler.assemble(writer, result)?;
            fuzzers.extend(assembly.fuzzers);
            system_deps.extend(assembly.system_deps);
        }

        let docker_image = self.opts.docker_image();
        if !system_deps.is_empty() {
            let list = system_deps
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n  ");
            warn!(
                "The following system libraries are not part of the bundle and have to be provided by the Docker image {docker_image:?}:\n  {list}"
            );
        }

        self.stage = Stage::Metadata;
        let metadata = Metadata {
            run_environment: RunEnvironment::docker(docker_image),
            code_revision: vcs::resolve_code_revision(
                vcs::git_revision(&self.opts.project_dir),
                self.opts.commit.as_deref(),
                self.opts.branch.as_deref(),
            ),
            fuzzers,
        };
        metadata.validate(|p| writer.has_entry(p))?;
        write_metadata(writer, &metadata, scratch)?;

        let work_dir = scratch.join(WORK_DIR);
        fs::create_dir(&work_dir).with_path(&work_dir)?;
        writer.write_dir(WORK_DIR, &work_dir)?;

        for file in self.opts.additional_files()? {
            debug!("Adding additional file {} as {}", file.source.display(), file.target);
            if file.source.is_dir() {
                writer.write_dir(&file.target, &file.source)?;
            } else {
                writer.write_file(&file.target, &file.source)?;
            }
        }

        if let Some(log) = &self.opts.build_log {
            writer.write_file(BUILD_LOG_FILE_NAME, log)?;
        }

        debug!("Content of bundle:\n{}", listing(writer));

        self.stage = Stage::Finalize;
        writer.close()?;
        Ok(metadata)
    }

    fn build_all_variants(&mut self, scratch: &Path) -> Result<Vec<CBuildResult>> {
        let relocate = self.opts.build_system == BuildSystem::Other;
        if relocate && !self.opts.build_system_args.is_empty() {
            warn!(
                "Passing additional arguments is not supported for build system type \"other\". These arguments are ignored: {}",
                self.opts.build_system_args.join(" ")
            );
        }

        let mut all = Vec::new();
        for variant in self.opts.variants(self.classifier.os()) {
            info!("Building for {variant}...");
            let results = self.builder.build(&variant, &self.opts.fuzz_tests)?;
            for mut result in results {
                if relocate {
                    let dest = scratch.join(fuzz_test_prefix(&result.name, &result.sanitizers)?);
                    relocate_to_scratch(&mut result, &dest)?;
                }
                all.push(result);
            }
        }
        Ok(all)
    }
}

fn write_metadata(writer: &mut dyn ArchiveWriter, metadata: &Metadata, scratch: &Path) -> Result<()> {
    let yaml = metadata.to_yaml()?;
    let path = scratch.join(METADATA_FILE_NAME);
    fs::write(&path, &yaml).with_path(&path)?;
    writer.write_file(METADATA_FILE_NAME, &path)?;
    debug!("Content of {METADATA_FILE_NAME}:\n{yaml}");
    Ok(())
}

/// One line per entry, sizes right-aligned
fn listing(writer: &dyn ArchiveWriter) -> String {
    writer
        .headers()
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    fs::copy(source, dest).with_path(source)?;
    Ok(())
}

/// Copy a build result's executable and in-tree libraries below `dest`
///
/// The "other" build system reuses one build directory for every variant,
/// so the next build would overwrite these files. Dependencies whose real
/// file lives outside the build directory are left where they are, so the
/// assembler still classifies them by their real location.
pub fn relocate_to_scratch(result: &mut CBuildResult, dest: &Path) -> Result<()> {
    let build_dir = lexical_normalize(&result.build.build_dir);
    let resolved_build_dir = fs::canonicalize(&build_dir).unwrap_or_else(|_| build_dir.clone());

    let executable = lexical_normalize(&result.build.executable);
    let executable_rel = executable
        .strip_prefix(&build_dir)
        .map_err(|_| BundleError::ExecutableOutsideBuildDir {
            executable: result.build.executable.clone(),
            build_dir: result.build.build_dir.clone(),
        })?
        .to_path_buf();
    let new_executable = dest.join(&executable_rel);
    copy_file(&result.build.executable, &new_executable)?;
    result.build.executable = new_executable;

    // Regular files before symlinks
    result.build.runtime_deps.sort_by_key(|d| {
        fs::symlink_metadata(d)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    });

    for dep in result.build.runtime_deps.iter_mut() {
        let Ok(rel) = lexical_normalize(dep).strip_prefix(&build_dir).map(Path::to_path_buf) else {
            continue;
        };
        let resolved = fs::canonicalize(&*dep).with_path(&*dep)?;
        if !is_below(&resolved, &resolved_build_dir) {
            debug!("{} resolves outside the build directory, not relocating", dep.display());
            continue;
        }
        let new_dep = dest.join(rel);
        copy_file(&resolved, &new_dep)?;
        *dep = new_dep;
    }

    result.build.build_dir = dest.to_path_buf();
    Ok(())
}
