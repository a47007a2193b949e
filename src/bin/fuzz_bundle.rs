//! fuzz-bundle CLI
//!
//! Bundles fuzz tests whose build results are listed in a JSON manifest

use anyhow::{Context, Result};
use clap::Parser;
use fuzz_bundle::{ArchiveWriter, BuildSystem, BundleOptions, Bundler, NoopArchiveWriter, PrebuiltBuilder};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fuzz-bundle")]
#[command(about = "Package built fuzz tests into a portable bundle")]
struct Args {
    /// Fuzz tests to bundle (all tests in the manifest if omitted, CMake only)
    fuzz_tests: Vec<String>,

    /// TOML file with bundle options; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON manifest describing the finished builds
    #[arg(long)]
    build_results: PathBuf,

    /// Build system that produced the results (cmake, bazel, other)
    #[arg(long)]
    build_system: Option<String>,

    /// Project root directory
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Output path of the bundle (.tar.gz is appended if missing)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Dictionary file
    #[arg(long)]
    dict: Option<PathBuf>,

    /// Additional seed corpus directory (repeatable)
    #[arg(long = "seed-corpus")]
    seed_corpus: Vec<PathBuf>,

    /// Command-line argument passed to the fuzzing engine (repeatable)
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// KEY=VALUE or KEY to take from the current environment (repeatable)
    #[arg(long)]
    env: Vec<String>,

    /// Maximum run time of each fuzz test in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Container image the fuzzers run in
    #[arg(long)]
    docker_image: Option<String>,

    /// Branch recorded in the bundle
    #[arg(long)]
    branch: Option<String>,

    /// Commit recorded in the bundle
    #[arg(long)]
    commit: Option<String>,

    /// Extra file or directory: SRC or SRC;DST (repeatable)
    #[arg(long = "add")]
    additional_files: Vec<String>,

    /// Build log to embed as build.log
    #[arg(long)]
    build_log: Option<PathBuf>,

    /// Assemble without writing an archive and print bundle.yaml
    #[arg(long)]
    dry_run: bool,

    /// Log every archive entry
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Merge flags over the config file
    fn into_options(self) -> Result<BundleOptions> {
        let mut opts = match &self.config {
            Some(path) => BundleOptions::from_toml_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => BundleOptions::default(),
        };

        if let Some(build_system) = &self.build_system {
            opts.build_system = build_system.parse::<BuildSystem>()?;
        }
        if let Some(dir) = self.project_dir {
            opts.project_dir = dir;
        } else if opts.project_dir.as_os_str().is_empty() {
            opts.project_dir = std::env::current_dir().context("failed to get working directory")?;
        }
        if !self.fuzz_tests.is_empty() {
            opts.fuzz_tests = self.fuzz_tests;
        }
        if self.output.is_some() {
            opts.output_path = self.output;
        }
        if self.dict.is_some() {
            opts.dictionary = self.dict;
        }
        opts.seed_corpus_dirs.extend(self.seed_corpus);
        opts.engine_args.extend(self.engine_args);
        opts.env.extend(self.env);
        if let Some(timeout) = self.timeout {
            opts.timeout_secs = timeout;
        }
        if self.docker_image.is_some() {
            opts.docker_image = self.docker_image;
        }
        if self.branch.is_some() {
            opts.branch = self.branch;
        }
        if self.commit.is_some() {
            opts.commit = self.commit;
        }
        opts.additional_files.extend(self.additional_files);
        if self.build_log.is_some() {
            opts.build_log = self.build_log;
        }

        opts.validate()?;
        Ok(opts)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let manifest = args.build_results.clone();
    let dry_run = args.dry_run;
    let opts = args.into_options()?;

    let builder = PrebuiltBuilder::from_path(&manifest)
        .with_context(|| format!("failed to load build results from {}", manifest.display()))?;
    let mut bundler = Bundler::new(opts, builder);

    if dry_run {
        let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
        let mut writer = NoopArchiveWriter::new();
        let metadata = bundler
            .bundle_into(&mut writer, scratch.path())
            .context("failed to assemble bundle")?;
        info!("Dry run: {} archive entries", writer.headers().len());
        print!("{}", metadata.to_yaml()?);
        return Ok(());
    }

    let bundle = bundler.bundle().context("failed to create bundle")?;
    info!("Successfully created bundle: {}", bundle.display());
    println!("{}", bundle.display());
    Ok(())
}
