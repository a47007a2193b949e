//! # fuzz-bundle - Portable Fuzz Test Bundles
//!
//! `fuzz-bundle` packages built fuzz tests into a self-describing archive that
//! runs unmodified on another machine:
//!
//! - **One prefix per fuzz test and variant**: `libfuzzer/address+undefined/my_fuzz/...`
//! - **Content-addressed libraries**: identical in-tree libraries are stored
//!   once under `cas/` and hard-linked everywhere they are needed
//! - **Dependency classification**: system libraries stay in the run image,
//!   external libraries travel in `external_libs/`
//! - **`bundle.yaml`**: machine-readable description of every runnable fuzzer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fuzz_bundle::{BundleOptions, Bundler, PrebuiltBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! // Build results produced by an earlier build step
//! let builder = PrebuiltBuilder::from_path("build/fuzz-results.json")?;
//!
//! let opts = BundleOptions::builder()
//!     .project_dir(".")
//!     .fuzz_test("parser_fuzz")
//!     .timeout_secs(3600)
//!     .build()?;
//!
//! let bundle = Bundler::new(opts, builder).bundle()?;
//! println!("Created {}", bundle.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Build Systems
//!
//! Anything that can report where its executables and libraries are can feed
//! the bundler by implementing [`FuzzTestBuilder`]:
//!
//! ```rust,no_run
//! use fuzz_bundle::{BuildVariant, CBuildResult, FuzzTestBuilder, Result};
//!
//! struct MyBuilder;
//!
//! impl FuzzTestBuilder for MyBuilder {
//!     fn build(&mut self, variant: &BuildVariant, fuzz_tests: &[String]) -> Result<Vec<CBuildResult>> {
//!         // Compile `fuzz_tests` with `variant.sanitizers` and describe the output
//!         # let _ = (variant, fuzz_tests);
//!         Ok(Vec::new())
//!     }
//! }
//! ```

pub mod core;
pub mod error;

pub use crate::core::{
    archive::{ArchiveWriter, EntryHeader, EntryKind, NoopArchiveWriter, TarArchiveWriter},
    assembler::{ArtifactAssembler, AssemblerOptions, Assembly},
    build::{BuildResult, BuildSystem, BuildVariant, CBuildResult, FuzzTestBuilder},
    bundler::{Bundler, Stage},
    classify::{Classifier, DependencyKind, TargetOs},
    metadata::{CodeRevision, Engine, EngineOptions, Fuzzer, GitRevision, Metadata, RunEnvironment},
    options::{AdditionalFile, BundleOptions, BundleOptionsBuilder},
    prebuilt::PrebuiltBuilder,
    validation::FuzzTestName,
};
pub use crate::error::{BundleError, Result};
