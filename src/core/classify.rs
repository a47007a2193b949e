//! Runtime dependency classification
//!
//! Every runtime dependency of a fuzz test falls into exactly one category:
//!
//! 1. [`DependencyKind::InTree`] - produced by the project's build; stored in
//!    the content-addressed store
//! 2. [`DependencyKind::WellKnownSystem`] - present in any reasonable run
//!    image (dynamic linker, libc, libstdc++, ...); dropped silently
//! 3. [`DependencyKind::UncommonSystem`] - lives in a system library
//!    directory but may need extra packages in the run image; dropped and
//!    reported
//! 4. [`DependencyKind::External`] - anything else; shipped in the fuzz
//!    test's `external_libs` directory
//!
//! The per-OS knowledge is plain data ([`LIBRARY_TABLES`]); [`Classifier`]
//! only compiles it, so classification is testable without a filesystem.

use regex::Regex;
use std::path::{Component, Path, PathBuf};

/// Operating system whose library conventions apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetOs {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl TargetOs {
    /// The OS this binary was compiled for
    pub fn host() -> Self {
        match std::env::consts::OS {
            "linux" => TargetOs::Linux,
            "macos" => TargetOs::MacOs,
            "windows" => TargetOs::Windows,
            _ => TargetOs::Other,
        }
    }
}

/// Category of a runtime dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    InTree,
    WellKnownSystem,
    UncommonSystem,
    External,
}

/// Library conventions of one OS
pub struct LibraryTable {
    pub os: TargetOs,
    /// Unversioned basenames of libraries every run image provides
    pub well_known: &'static [&'static str],
    /// Directories holding system libraries
    pub system_dirs: &'static [&'static str],
    pub case_insensitive: bool,
}

/// Library conventions, indexed by OS
pub const LIBRARY_TABLES: &[LibraryTable] = &[
    LibraryTable {
        os: TargetOs::Linux,
        well_known: &[
            "ld-linux-x86-64.so",
            "ld-linux-aarch64.so",
            "libc.so",
            "libdl.so",
            "libgcc_s.so",
            "libm.so",
            "libpthread.so",
            "librt.so",
            "libstdc++.so",
        ],
        system_dirs: &["/lib", "/lib32", "/lib64", "/usr/lib", "/usr/lib32", "/usr/lib64"],
        case_insensitive: false,
    },
    LibraryTable {
        os: TargetOs::MacOs,
        well_known: &[
            "libSystem.B.dylib",
            "libc++.1.dylib",
            "libc++abi.dylib",
            "libobjc.A.dylib",
        ],
        system_dirs: &["/usr/lib", "/System/Library"],
        case_insensitive: false,
    },
    LibraryTable {
        os: TargetOs::Windows,
        well_known: &[
            "kernel32.dll",
            "msvcrt.dll",
            "ntdll.dll",
            "ucrtbase.dll",
            "vcruntime140.dll",
            "msvcp140.dll",
        ],
        system_dirs: &["C:/Windows/System32", "C:/Windows/SysWOW64"],
        case_insensitive: true,
    },
];

/// Build a regex matching `basename` plus optional version suffixes
/// (`libc.so`, `libc.so.6`, `libstdc++.so.6.0.30`) as the last path segment
fn versioned_library_regex(basename: &str, case_insensitive: bool) -> Regex {
    let flags = if case_insensitive { "(?i)" } else { "" };
    let pattern = format!(r"{flags}(^|/){}[.0-9]*$", regex::escape(basename));
    Regex::new(&pattern).expect("escaped library name is a valid regex")
}

/// Pure dependency classifier for one target OS
pub struct Classifier {
    os: TargetOs,
    well_known: Vec<Regex>,
    system_dirs: Vec<String>,
    case_insensitive: bool,
}

impl Classifier {
    /// Compile the library table for `os`; unknown OSes classify every
    /// out-of-tree dependency as external
    pub fn new(os: TargetOs) -> Self {
        match LIBRARY_TABLES.iter().find(|t| t.os == os) {
            Some(table) => Classifier {
                os,
                well_known: table
                    .well_known
                    .iter()
                    .map(|name| versioned_library_regex(name, table.case_insensitive))
                    .collect(),
                system_dirs: table
                    .system_dirs
                    .iter()
                    .map(|d| normalize_for_match(d, table.case_insensitive))
                    .collect(),
                case_insensitive: table.case_insensitive,
            },
            None => Classifier {
                os,
                well_known: Vec::new(),
                system_dirs: Vec::new(),
                case_insensitive: false,
            },
        }
    }

    pub fn for_host() -> Self {
        Self::new(TargetOs::host())
    }

    pub fn os(&self) -> TargetOs {
        self.os
    }

    /// Classify `dep` relative to the current build directory
    ///
    /// Both paths are compared lexically; callers that want symlinks resolved
    /// pass the resolved path.
    pub fn classify(&self, dep: &Path, build_dir: &Path) -> DependencyKind {
        if is_below(dep, build_dir) {
            DependencyKind::InTree
        } else if self.is_well_known_system_library(dep) {
            DependencyKind::WellKnownSystem
        } else if self.is_system_library(dep) {
            DependencyKind::UncommonSystem
        } else {
            DependencyKind::External
        }
    }

    pub fn is_well_known_system_library(&self, dep: &Path) -> bool {
        let dep = dep.to_string_lossy().replace('\\', "/");
        self.well_known.iter().any(|re| re.is_match(&dep))
    }

    /// Whether `dep` lives below one of the OS's system library directories
    pub fn is_system_library(&self, dep: &Path) -> bool {
        let dep = normalize_for_match(&dep.to_string_lossy(), self.case_insensitive);
        self.system_dirs
            .iter()
            .any(|dir| dep.len() > dir.len() && dep.starts_with(dir.as_str()) && dep.as_bytes()[dir.len()] == b'/')
    }
}

fn normalize_for_match(path: &str, case_insensitive: bool) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_end_matches('/');
    if case_insensitive {
        path.to_lowercase()
    } else {
        path.to_string()
    }
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` is `dir` or lies below it, compared lexically
pub fn is_below(path: &Path, dir: &Path) -> bool {
    lexical_normalize(path).starts_with(lexical_normalize(dir))
}
