use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use git2::{Repository, Signature, build::CheckoutBuilder};

use super::{Workspace, validate_relative_path};
use crate::errors::WorkspaceError;

const COMMITTER_NAME: &str = "autofix[bot]";
const COMMITTER_EMAIL: &str = "autofix[bot]@users.noreply.github.com";
const PUSH_TIMEOUT: Duration = Duration::from_secs(120);

/// git2-backed working tree. Pushes shell out to `git` so the runner's
/// credential helper is used.
pub struct GitWorkspace {
    root: PathBuf,
}

impl GitWorkspace {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        Repository::open(&root)?;
        Ok(Self { root })
    }

    fn repo(&self) -> Result<Repository, WorkspaceError> {
        Ok(Repository::open(&self.root)?)
    }

    fn resolve(&self, path: &str) -> Result<(PathBuf, PathBuf), WorkspaceError> {
        let relative = validate_relative_path(path)?;
        Ok((self.root.join(&relative), relative))
    }

    /// Signature from git config, falling back to the bot identity.
    fn signature(repo: &Repository) -> Result<Signature<'static>, WorkspaceError> {
        let (name, email) = match repo.config() {
            Ok(config) => (
                config
                    .get_string("user.name")
                    .unwrap_or_else(|_| COMMITTER_NAME.to_string()),
                config
                    .get_string("user.email")
                    .unwrap_or_else(|_| COMMITTER_EMAIL.to_string()),
            ),
            Err(_) => (COMMITTER_NAME.to_string(), COMMITTER_EMAIL.to_string()),
        };
        Ok(Signature::now(&name, &email)?)
    }

    /// Get the HEAD commit if it exists (returns None for unborn branches)
    fn head_commit(repo: &Repository) -> Option<git2::Commit<'_>> {
        repo.head().ok().and_then(|head| head.peel_to_commit().ok())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> WorkspaceError {
    WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl Workspace for GitWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn checkout(&self, reference: &str) -> Result<(), WorkspaceError> {
        let repo = self.repo()?;
        let (object, resolved) = match repo.revparse_ext(reference) {
            Ok(found) => found,
            Err(_) => repo.revparse_ext(&format!("origin/{}", reference))?,
        };

        repo.checkout_tree(&object, Some(CheckoutBuilder::new().safe()))?;
        match resolved {
            Some(r) if r.is_branch() => {
                let name = r
                    .name()
                    .ok_or_else(|| WorkspaceError::Git(format!("non UTF-8 reference for {}", reference)))?;
                repo.set_head(name)?;
            }
            _ => repo.set_head_detached(object.peel_to_commit()?.id())?,
        }

        tracing::debug!(reference, "Checked out");
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> Result<(), WorkspaceError> {
        let repo = self.repo()?;
        let head = Self::head_commit(&repo)
            .ok_or_else(|| WorkspaceError::Git("cannot branch from an unborn HEAD".to_string()))?;
        let branch = repo.branch(name, &head, false)?;
        let refname = branch
            .get()
            .name()
            .ok_or_else(|| WorkspaceError::Git(format!("non UTF-8 branch name {}", name)))?
            .to_string();
        repo.set_head(&refname)?;
        tracing::info!(branch = %name, "Created branch");
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, WorkspaceError> {
        let (full, _) = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full, e)),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let (full, _) = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| io_error(&full, e))
    }

    async fn create_dir(&self, path: &str) -> Result<(), WorkspaceError> {
        let (full, _) = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| io_error(&full, e))
    }

    async fn set_executable(&self, path: &str) -> Result<(), WorkspaceError> {
        let (full, _) = self.resolve(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&full, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| io_error(&full, e))?;
        }
        #[cfg(not(unix))]
        let _ = full;
        Ok(())
    }

    async fn stage(&self, path: &str) -> Result<(), WorkspaceError> {
        let (_, relative) = self.resolve(path)?;
        let repo = self.repo()?;
        let mut index = repo.index()?;
        index.add_path(&relative)?;
        index.write()?;
        Ok(())
    }

    async fn has_staged_changes(&self) -> Result<bool, WorkspaceError> {
        let repo = self.repo()?;
        let index = repo.index()?;
        let head_tree = match Self::head_commit(&repo) {
            Some(commit) => Some(commit.tree()?),
            None => None,
        };
        let diff = repo.diff_tree_to_index(head_tree.as_ref(), Some(&index), None)?;
        Ok(diff.deltas().len() > 0)
    }

    async fn commit(&self, message: &str) -> Result<String, WorkspaceError> {
        let repo = self.repo()?;
        let mut index = repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = Self::signature(&repo)?;

        let commit_id = match Self::head_commit(&repo) {
            Some(parent) => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?,
            None => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?,
        };

        tracing::info!(commit = %commit_id, "Committed changes");
        Ok(commit_id.to_string())
    }

    /// Push HEAD to `refs/heads/<branch>` on origin, whatever HEAD is
    /// attached to.
    async fn push(&self, branch: &str) -> Result<(), WorkspaceError> {
        let refspec = format!("HEAD:refs/heads/{}", branch);
        let child = tokio::process::Command::new("git")
            .args(["push", "origin", refspec.as_str()])
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkspaceError::Push {
                branch: branch.to_string(),
                message: e.to_string(),
            })?;

        let output = tokio::time::timeout(PUSH_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| WorkspaceError::Timeout {
                secs: PUSH_TIMEOUT.as_secs(),
            })?
            .map_err(|e| WorkspaceError::Push {
                branch: branch.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(WorkspaceError::Push {
                branch: branch.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::info!(branch, "Pushed branch");
        Ok(())
    }
}
