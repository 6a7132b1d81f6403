//! Local working tree seam.
//!
//! A [`Workspace`] is exclusively owned by one pipeline invocation. All paths
//! are relative to its root; absolute paths and `..` components are rejected.

mod git;

pub use git::GitWorkspace;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::errors::WorkspaceError;

#[async_trait]
pub trait Workspace: Send + Sync {
    fn root(&self) -> &Path;

    /// Check out `reference` (branch, remote branch or commit).
    async fn checkout(&self, reference: &str) -> Result<(), WorkspaceError>;

    /// Create `name` at the current HEAD and switch to it.
    async fn create_branch(&self, name: &str) -> Result<(), WorkspaceError>;

    /// File content, `None` if the file does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<String>, WorkspaceError>;

    /// Write `content`, creating parent directories as needed.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError>;

    /// Create a directory and its parents. Idempotent.
    async fn create_dir(&self, path: &str) -> Result<(), WorkspaceError>;

    async fn set_executable(&self, path: &str) -> Result<(), WorkspaceError>;

    async fn stage(&self, path: &str) -> Result<(), WorkspaceError>;

    /// True when the index differs from HEAD.
    async fn has_staged_changes(&self) -> Result<bool, WorkspaceError>;

    /// Commit the index and return the new commit id.
    async fn commit(&self, message: &str) -> Result<String, WorkspaceError>;

    /// Push the current HEAD to `branch` on the remote.
    async fn push(&self, branch: &str) -> Result<(), WorkspaceError>;
}

/// Validate a workspace-relative path.
pub fn validate_relative_path(path: &str) -> Result<PathBuf, WorkspaceError> {
    let candidate = Path::new(path);
    if path.trim().is_empty() {
        return Err(WorkspaceError::InvalidPath(path.to_string()));
    }

    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => {
                if clean.as_os_str().is_empty() && part == std::ffi::OsStr::new(".git") {
                    return Err(WorkspaceError::InvalidPath(path.to_string()));
                }
                clean.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WorkspaceError::InvalidPath(path.to_string()));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(WorkspaceError::InvalidPath(path.to_string()));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_accepted() {
        assert_eq!(
            validate_relative_path("src/main/App.java").unwrap(),
            PathBuf::from("src/main/App.java")
        );
        assert_eq!(validate_relative_path("./README.md").unwrap(), PathBuf::from("README.md"));
    }

    #[test]
    fn test_escaping_paths_rejected() {
        for bad in ["/etc/passwd", "../outside.txt", "src/../../x", "", ".", ".git/config"] {
            assert!(
                matches!(validate_relative_path(bad), Err(WorkspaceError::InvalidPath(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }
}
