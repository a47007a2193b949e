//! Shared fixtures for integration tests

#![allow(dead_code)]

use flate2::read::GzDecoder;
use fuzz_bundle::{BuildResult, CBuildResult, Metadata};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, EntryType};
use tempfile::TempDir;

/// A fake project with a build directory
pub struct Project {
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub build_dir: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = fs::canonicalize(temp_dir.path()).unwrap();
        let build_dir = root.join("build");
        fs::create_dir_all(&build_dir).unwrap();
        Project {
            _temp_dir: temp_dir,
            root,
            build_dir,
        }
    }

    /// Write `content` at `rel` below the project root
    pub fn file(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Build result for `name`, whose executable lives at `build/<name>`
    pub fn result(&self, name: &str, sanitizers: &[&str], runtime_deps: Vec<PathBuf>) -> CBuildResult {
        let executable = self.build_dir.join(name);
        if !executable.exists() {
            self.file(&format!("build/{name}"), format!("executable {name}").as_bytes());
        }
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
                runtime_deps,
            },
        }
    }
}

/// An entry read back from a bundle
#[derive(Debug, Clone)]
pub struct ReadEntry {
    pub kind: EntryType,
    pub content: Vec<u8>,
    pub link_target: Option<String>,
}

/// Read every entry of a `.tar.gz`, keyed by path without trailing slash
pub fn read_bundle(path: &Path) -> BTreeMap<String, ReadEntry> {
    let mut archive = Archive::new(GzDecoder::new(File::open(path).unwrap()));
    let mut entries = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
        let kind = entry.header().entry_type();
        let link_target = entry
            .link_name()
            .unwrap()
            .map(|p| p.to_string_lossy().into_owned());
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.insert(
            name,
            ReadEntry {
                kind,
                content,
                link_target,
            },
        );
    }
    entries
}

/// Parse `bundle.yaml` out of a bundle
pub fn read_metadata(entries: &BTreeMap<String, ReadEntry>) -> Metadata {
    let yaml = String::from_utf8(entries["bundle.yaml"].content.clone()).unwrap();
    Metadata::from_yaml(&yaml).unwrap()
}
