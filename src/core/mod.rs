//! Bundling engine
//!
//! Leaves first: archive writers, dependency classification and the
//! content-addressed store feed the per-fuzz-test [`assembler`], which the
//! [`bundler`] drives once per build result.

pub mod archive;
pub mod assembler;
pub mod build;
pub mod bundler;
pub mod cas;
pub mod classify;
pub mod metadata;
pub mod options;
pub mod prebuilt;
pub mod validation;
pub mod vcs;
