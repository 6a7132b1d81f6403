//! Applies a [`FixDescriptor`] to the workspace.
//!
//! Changes are applied in order. A change that cannot be applied is skipped
//! and recorded; the rest still go through. A commit is only attempted when
//! something is actually staged.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::errors::{ApplyError, WorkspaceError};
use crate::fix::{FileChange, FixDescriptor};
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChange {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedChange>,
}

impl ApplyReport {
    pub fn merge(&mut self, other: ApplyReport) {
        self.applied.extend(other.applied);
        self.skipped.extend(other.skipped);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { commit: String },
    NothingStaged,
}

/// Fresh branch name for one fix attempt on `issue`.
pub fn branch_name(issue: u64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ai-fix-issue-{}-{}", issue, &suffix[..8])
}

pub fn commit_message(issue: u64, title: &str) -> String {
    format!("Fix #{}: {}\n\nAI-generated fix", issue, title)
}

pub struct PatchApplicator {
    workspace: Arc<dyn Workspace>,
}

impl PatchApplicator {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }

    /// Check out `base` and create `branch` from it.
    pub async fn prepare_branch(&self, base: &str, branch: &str) -> Result<(), WorkspaceError> {
        self.workspace.checkout(base).await?;
        self.workspace.create_branch(branch).await
    }

    async fn apply_change(&self, change: &FileChange) -> Result<(), ApplyError> {
        match change {
            FileChange::Create { path, content } => {
                self.workspace.write_file(path, content).await?;
            }
            FileChange::Modify {
                path,
                original,
                replacement,
            } => {
                let current = self
                    .workspace
                    .read_file(path)
                    .await?
                    .ok_or_else(|| ApplyError::TargetMissing { path: path.clone() })?;
                if !current.contains(original.as_str()) {
                    return Err(ApplyError::OriginalNotFound { path: path.clone() });
                }
                let updated = current.replacen(original.as_str(), replacement, 1);
                self.workspace.write_file(path, &updated).await?;
            }
        }
        self.workspace.stage(change.path()).await?;
        Ok(())
    }

    /// Apply every change, staging what succeeds.
    pub async fn apply(&self, descriptor: &FixDescriptor) -> ApplyReport {
        let mut report = ApplyReport::default();
        for change in &descriptor.changes {
            match self.apply_change(change).await {
                Ok(()) => {
                    tracing::info!(path = %change.path(), "Applied change");
                    report.applied.push(change.path().to_string());
                }
                Err(e) => {
                    tracing::warn!(path = %change.path(), error = %e, "Skipping change");
                    report.skipped.push(SkippedChange {
                        path: change.path().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Commit staged changes, or report that there is nothing to commit.
    pub async fn commit(&self, message: &str) -> Result<CommitOutcome, WorkspaceError> {
        if !self.workspace.has_staged_changes().await? {
            return Ok(CommitOutcome::NothingStaged);
        }
        let commit = self.workspace.commit(message).await?;
        Ok(CommitOutcome::Committed { commit })
    }

    pub async fn push(&self, branch: &str) -> Result<(), WorkspaceError> {
        self.workspace.push(branch).await
    }
}
