//! Comment and pull request texts posted by the orchestrator.

use std::fmt::Write as _;

use crate::events::FixMode;
use crate::fix::FixDescriptor;
use crate::hosting::{Issue, PullRequestSummary};
use crate::patch::ApplyReport;
use crate::verify::VerificationOutcome;

const SYSTEM_FOOTER: &str = "*This is handled by the autonomous AI system.*";
const STATUS_FOOTER: &str = "*This status report was generated by the autonomous AI system.*";
const MESSAGE_FOOTER: &str = "*This message was generated by the autonomous AI system.*";

pub const TRIAGE_FOOTER: &str =
    "\n\n---\n*I'm an AI assistant helping triage issues. If I've misunderstood something, please let me know.*";

pub fn acknowledgement(mode: FixMode) -> String {
    match mode {
        FixMode::Fix => format!(
            "I'll try to fix this issue automatically.\n\n\
             The `{}` label has been added, and the autonomous development system will analyze the issue and generate a fix.\n\n\
             You'll receive a notification when a pull request with a proposed fix is created. Please review the PR when it's ready.\n\n\
             {}",
            mode.label(),
            SYSTEM_FOOTER
        ),
        FixMode::Implement => format!(
            "I'll work on implementing this feature.\n\n\
             The `{}` label has been added, and the autonomous development system will analyze the request and start working on it.\n\n\
             Feature implementation may take longer than bug fixes. You'll receive a notification when a pull request with the implementation is created.\n\n\
             {}",
            mode.label(),
            SYSTEM_FOOTER
        ),
    }
}

pub fn status_in_progress(prs: &[PullRequestSummary]) -> String {
    let mut list = String::new();
    for pr in prs {
        let _ = writeln!(list, "- [#{}]({}): {}", pr.number, pr.html_url, pr.title);
    }
    format!(
        "## Status Report\n\n\
         This issue is currently being worked on by the autonomous development system.\n\n\
         **Active Pull Requests:**\n{}\n\
         Please review the PRs above to see the proposed changes.\n\n{}",
        list, STATUS_FOOTER
    )
}

pub fn status_queued() -> String {
    format!(
        "## Status Report\n\n\
         This issue is in the queue for automated handling. The AI system will analyze it and generate a fix or implementation soon.\n\n\
         No pull requests have been created yet. You'll be notified when a PR is available for review.\n\n{}",
        STATUS_FOOTER
    )
}

pub fn status_reviewed(prs: &[PullRequestSummary]) -> String {
    let mut list = String::new();
    for pr in prs {
        let _ = writeln!(list, "- [#{}]({}): {} ({:?})", pr.number, pr.html_url, pr.title, pr.state);
    }
    format!(
        "## Status Report\n\n\
         Automated work on this issue has been reviewed. No pull request is currently open.\n\n\
         **Previous Pull Requests:**\n{}\n{}",
        list, STATUS_FOOTER
    )
}

pub fn status_not_flagged(prefix: &str) -> String {
    format!(
        "## Status Report\n\n\
         This issue is not currently flagged for automated handling.\n\n\
         To request automated handling, please use one of the following commands:\n\
         - `{prefix} fix` - Request an automated bug fix\n\
         - `{prefix} implement` - Request an automated feature implementation\n\n{STATUS_FOOTER}"
    )
}

pub fn status_error() -> String {
    format!(
        "I'm sorry, I encountered an error while trying to get the status of this issue.\n\n\
         Please try again later or contact the repository maintainers if the problem persists.\n\n{}",
        MESSAGE_FOOTER
    )
}

pub fn help(prefix: &str) -> String {
    format!(
        "## AI Command Help\n\n\
         You can interact with the autonomous development system using the following commands:\n\n\
         | Command | Description | Usage |\n\
         |---------|-------------|-------|\n\
         | `{p} fix` | Request an automated bug fix | `{p} fix` |\n\
         | `{p} implement` | Request an automated feature implementation | `{p} implement` |\n\
         | `{p} analyze` | Request a detailed analysis | `{p} analyze [optional target]` |\n\
         | `{p} status` | Check implementation status | `{p} status` |\n\
         | `{p} help` | Show this help message | `{p} help` |\n\n\
         **Examples:**\n\
         - `{p} fix` - Flag an issue for automatic fixing\n\
         - `{p} analyze src/main/java/App.java` - Analyze a specific file\n\
         - `{p} status` - Check if any PRs have been created for this issue\n\n\
         *This help message was generated by the autonomous AI system.*",
        p = prefix
    )
}

pub fn analysis_prompt(issue: &Issue, target: Option<&str>) -> String {
    let body = if issue.body.is_empty() {
        "No description provided"
    } else {
        issue.body.as_str()
    };
    let target = match target {
        Some(t) => t.to_string(),
        None => format!("{} {}", issue.title, issue.body),
    };
    format!(
        "You are an AI assistant for a software development team.\n\n\
         Please provide a detailed analysis of the following issue/request:\n\n\
         Issue Title: {}\n\
         Issue Body: {}\n\n\
         Analysis Target: {}\n\n\
         Your analysis should include:\n\
         1. Root cause identification (for bugs)\n\
         2. Implementation approach (for features)\n\
         3. Potential challenges and considerations\n\
         4. Estimated complexity (low, medium, high)\n\
         5. Files likely to be affected\n\n\
         Be thorough but concise.",
        issue.title,
        body,
        target.trim()
    )
}

pub fn analysis(text: &str) -> String {
    format!(
        "## AI Analysis\n\n{}\n\n---\n\
         *This analysis was generated by the autonomous AI system. If you need clarification or have follow-up questions, please ask.*",
        text.trim()
    )
}

pub fn analysis_error() -> String {
    format!(
        "I'm sorry, I encountered an error while trying to analyze this issue.\n\n\
         Please try again later or contact the repository maintainers if the problem persists.\n\n{}",
        MESSAGE_FOOTER
    )
}

pub fn no_fix_available() -> String {
    format!(
        "I wasn't able to generate a fix for this issue automatically.\n\n\
         The AI system could not produce a usable set of changes. A maintainer will need to look at this one.\n\n{}",
        MESSAGE_FOOTER
    )
}

pub fn no_applicable_changes(report: &ApplyReport) -> String {
    let mut skipped = String::new();
    for change in &report.skipped {
        let _ = writeln!(skipped, "- `{}`: {}", change.path, change.reason);
    }
    format!(
        "I generated a fix for this issue, but none of the proposed changes could be applied to the current code.\n\n\
         **Skipped changes:**\n{}\n{}",
        skipped, MESSAGE_FOOTER
    )
}

pub fn push_failed(branch: &str) -> String {
    format!(
        "I generated and committed a fix on branch `{}`, but pushing it to the repository failed, so no pull request was created.\n\n{}",
        branch, MESSAGE_FOOTER
    )
}

pub fn failed(error: &str) -> String {
    format!(
        "I'm sorry, the automated fix for this issue failed: {}\n\n\
         Please try again later or contact the repository maintainers if the problem persists.\n\n{}",
        error, MESSAGE_FOOTER
    )
}

pub fn pull_request_created(url: &str) -> String {
    format!(
        "I've created a pull request with an AI-generated fix: {}\n\nPlease review the changes.",
        url
    )
}

pub fn pull_request_title(issue: &Issue) -> String {
    format!("Fix issue #{}: {}", issue.number, issue.title)
}

pub fn pull_request_body(
    issue: &Issue,
    descriptor: &FixDescriptor,
    report: &ApplyReport,
    verification: &VerificationOutcome,
) -> String {
    let explanation = if descriptor.explanation.is_empty() {
        "No explanation provided"
    } else {
        descriptor.explanation.as_str()
    };

    let mut body = format!(
        "This PR addresses issue #{}.\n\n## AI-Generated Fix Explanation\n{}\n\n## Changes Made\n",
        issue.number, explanation
    );
    for path in &report.applied {
        let _ = writeln!(body, "- `{}`", path);
    }
    if !report.skipped.is_empty() {
        body.push_str("\n## Skipped Changes\n");
        for change in &report.skipped {
            let _ = writeln!(body, "- `{}`: {}", change.path, change.reason);
        }
    }
    let _ = write!(
        body,
        "\n## Verification\n{}\n\n---\n\
         *This PR was automatically generated by the autonomous development system. Please review the changes carefully.*\n",
        verification.summary()
    );
    body
}

pub fn verification_tracking_title(issue: u64) -> String {
    format!("[Auto] Verification failing for fix of #{}", issue)
}

pub fn verification_tracking_body(issue: &Issue, branch: &str, verification: &VerificationOutcome) -> String {
    let diagnostic = verification
        .result
        .as_ref()
        .map(|r| crate::util::tail_chars(&r.diagnostic, 3000).to_string())
        .unwrap_or_default();
    format!(
        "The automated fix for #{} on branch `{}` still fails verification after the follow-up attempt.\n\n\
         ## Verification\n{}\n\n## Output\n```\n{}\n```\n\n{}",
        issue.number,
        branch,
        verification.summary(),
        diagnostic,
        MESSAGE_FOOTER
    )
}

pub fn self_test_title(category: &str) -> String {
    format!("[Auto] Fix {} issues detected by self-test", category)
}

pub fn self_test_body(check: &str, diagnostic: &str, proposal: Option<&FixDescriptor>) -> String {
    let mut body = format!(
        "The scheduled self-test (`{}`) found problems.\n\n## Output\n```\n{}\n```\n",
        check,
        crate::util::tail_chars(diagnostic, 3000)
    );
    if let Some(descriptor) = proposal {
        let _ = write!(body, "\n## Suggested Fix\n{}\n\nFiles involved:\n", descriptor.explanation);
        for change in &descriptor.changes {
            let _ = writeln!(body, "- `{}`", change.path());
        }
    }
    let _ = write!(body, "\n{}", MESSAGE_FOOTER);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::PullRequestState;
    use crate::patch::SkippedChange;
    use crate::testing::issue;

    #[test]
    fn test_status_texts() {
        assert!(status_not_flagged("/ai").contains("not currently flagged for automated handling"));
        assert!(status_not_flagged("/ai").contains("`/ai fix`"));
        let prs = [PullRequestSummary {
            number: 12,
            title: "Fix issue #7: Crash".into(),
            html_url: "https://github.com/o/r/pull/12".into(),
            state: PullRequestState::Open,
        }];
        assert!(status_in_progress(&prs).contains("- [#12](https://github.com/o/r/pull/12): Fix issue #7: Crash"));
    }

    #[test]
    fn test_pull_request_body_lists_changes() {
        let i = issue(7, "Crash", "");
        let descriptor = FixDescriptor {
            changes: Vec::new(),
            explanation: "Null check added.".into(),
        };
        let report = ApplyReport {
            applied: vec!["src/App.java".into()],
            skipped: vec![SkippedChange {
                path: "src/Gone.java".into(),
                reason: "Target file src/Gone.java does not exist".into(),
            }],
        };
        let body = pull_request_body(&i, &descriptor, &report, &VerificationOutcome::default());
        assert!(body.starts_with("This PR addresses issue #7."));
        assert!(body.contains("Null check added."));
        assert!(body.contains("- `src/App.java`"));
        assert!(body.contains("## Skipped Changes"));
        assert!(body.contains("Verification was not run."));
    }

    #[test]
    fn test_analysis_prompt_defaults_target_to_issue() {
        let i = issue(3, "Slow start", "Takes 10s");
        assert!(analysis_prompt(&i, None).contains("Analysis Target: Slow start Takes 10s"));
        assert!(analysis_prompt(&i, Some("App.java")).contains("Analysis Target: App.java"));
    }
}
