//! Code revision lookup
//!
//! Git is queried through the `git` executable; a missing binary or a
//! directory outside a repository simply yields no revision.

use crate::core::metadata::{CodeRevision, GitRevision};
use std::path::Path;
use std::process::Command;
use tracing::debug;

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(dir).output();
    match output {
        Ok(out) if out.status.success() => {
            let value = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!value.is_empty()).then_some(value)
        }
        Ok(out) => {
            debug!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            );
            None
        }
        Err(e) => {
            debug!("could not run git: {e}");
            None
        }
    }
}

/// Full commit hash and branch name of the checkout at `dir`
///
/// A detached HEAD reports the branch as `HEAD`.
pub fn git_revision(dir: &Path) -> Option<GitRevision> {
    let commit = git(dir, &["rev-parse", "HEAD"])?;
    let branch = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_default();
    Some(GitRevision { commit, branch })
}

/// Combine the detected revision with explicit overrides
///
/// Returns `None` when neither source provides a commit or a branch.
pub fn resolve_code_revision(
    detected: Option<GitRevision>,
    commit: Option<&str>,
    branch: Option<&str>,
) -> Option<CodeRevision> {
    let mut git = detected.unwrap_or_default();
    if let Some(commit) = commit.filter(|c| !c.is_empty()) {
        git.commit = commit.to_string();
    }
    if let Some(branch) = branch.filter(|b| !b.is_empty()) {
        git.branch = branch.to_string();
    }
    if git.is_empty() {
        return None;
    }
    Some(CodeRevision { git: Some(git) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_win() {
        let detected = GitRevision {
            commit: "aaaa".to_string(),
            branch: "main".to_string(),
        };
        let revision = resolve_code_revision(Some(detected), Some("bbbb"), None).unwrap();
        let git = revision.git.unwrap();
        assert_eq!(git.commit, "bbbb");
        assert_eq!(git.branch, "main");
    }

    #[test]
    fn test_nothing_known_is_omitted() {
        assert!(resolve_code_revision(None, None, Some("")).is_none());
        let only_branch = resolve_code_revision(None, None, Some("release")).unwrap();
        assert_eq!(only_branch.git.unwrap().branch, "release");
    }

    #[test]
    fn test_outside_repository() {
        let temp_dir = TempDir::new().unwrap();
        // Fails either because git is absent or because the dir is not a checkout
        let nested = temp_dir.path().join("not-a-repo");
        std::fs::create_dir(&nested).unwrap();
        if let Some(rev) = git_revision(&nested) {
            // Temp dir may live inside a checkout on some CI hosts
            assert!(!rev.commit.is_empty());
        }
    }
}
