use std::fmt;

use serde::Serialize;

use crate::events::{FIX_LABEL, IMPLEMENT_LABEL};
use crate::hosting::{Issue, PullRequestState, PullRequestSummary};

/// Where a command instance stands. Persisted nowhere; rebuilt each run from
/// issue labels and related pull requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Received,
    Labeled,
    ContextGathered,
    FixGenerated,
    PatchApplied,
    PrCreated,
    Reviewed,
    NoFixAvailable,
    NoApplicableChanges,
    PushFailed,
    Failed,
}

impl CommandState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandState::PrCreated
                | CommandState::Reviewed
                | CommandState::NoFixAvailable
                | CommandState::NoApplicableChanges
                | CommandState::PushFailed
                | CommandState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandState::Received => "received",
            CommandState::Labeled => "labeled",
            CommandState::ContextGathered => "context_gathered",
            CommandState::FixGenerated => "fix_generated",
            CommandState::PatchApplied => "patch_applied",
            CommandState::PrCreated => "pr_created",
            CommandState::Reviewed => "reviewed",
            CommandState::NoFixAvailable => "no_fix_available",
            CommandState::NoApplicableChanges => "no_applicable_changes",
            CommandState::PushFailed => "push_failed",
            CommandState::Failed => "failed",
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when the issue carries a label that requests automation.
pub fn is_flagged(issue: &Issue) -> bool {
    issue.has_label(FIX_LABEL) || issue.has_label(IMPLEMENT_LABEL)
}

/// Rebuild the observable state of an issue's command from external facts.
///
/// Intermediate states between `Labeled` and `PrCreated` only exist inside a
/// running pipeline and cannot be observed afterwards.
pub fn reconstruct_state(issue: &Issue, related: &[PullRequestSummary]) -> CommandState {
    if related.iter().any(|pr| pr.state == PullRequestState::Open) {
        return CommandState::PrCreated;
    }
    if !related.is_empty() {
        return CommandState::Reviewed;
    }
    if is_flagged(issue) {
        CommandState::Labeled
    } else {
        CommandState::Received
    }
}
