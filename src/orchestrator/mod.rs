//! PR/issue orchestration.
//!
//! The [`Orchestrator`] owns one invocation: it reacts to a classified event,
//! drives the fix pipeline through its states and makes sure every command
//! ends with exactly one explanatory comment.

pub mod messages;
mod state;

pub use state::{CommandState, is_flagged, reconstruct_state};

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::completion::{CompletionRequest, CompletionService, Decoded, request_decoded};
use crate::config::Settings;
use crate::context::ContextAssembler;
use crate::dashboard::{DashboardLog, DashboardLogEntry, LogCategory};
use crate::errors::{ParseError, PipelineError, TransportError};
use crate::events::{ATTENTION_LABEL, Command, EventAction, FixMode, TriageOutcome, Triager};
use crate::fix::{FixGenerator, FixTarget};
use crate::hosting::{
    HostingApi, Issue, IssueRef, NewIssue, NewPullRequest, PullRequestRef, PullRequestState, RepositoryInfo,
    normalize_title,
};
use crate::patch::{ApplyReport, CommitOutcome, PatchApplicator, branch_name, commit_message};
use crate::verifier::{FailureCategory, Verifier};
use crate::verify::{VerificationOutcome, VerifierLoop};
use crate::workspace::Workspace;

/// Label put on pull requests opened by the pipeline.
pub const PR_LABEL: &str = "ai-implementation";

/// The external collaborators of one invocation.
#[derive(Clone)]
pub struct Collaborators {
    pub hosting: Arc<dyn HostingApi>,
    pub completion: Arc<dyn CompletionService>,
    pub workspace: Arc<dyn Workspace>,
    pub verifier: Arc<dyn Verifier>,
}

/// How a fix pipeline run ended.
#[derive(Debug)]
pub enum FixOutcome {
    PrCreated {
        branch: String,
        pull_request: PullRequestRef,
        report: ApplyReport,
        verification: VerificationOutcome,
    },
    NoFixAvailable,
    NoApplicableChanges(ApplyReport),
    PushFailed {
        branch: String,
    },
}

impl FixOutcome {
    pub fn state(&self) -> CommandState {
        match self {
            FixOutcome::PrCreated { .. } => CommandState::PrCreated,
            FixOutcome::NoFixAvailable => CommandState::NoFixAvailable,
            FixOutcome::NoApplicableChanges(_) => CommandState::NoApplicableChanges,
            FixOutcome::PushFailed { .. } => CommandState::PushFailed,
        }
    }
}

#[derive(Debug)]
pub enum SelfTestOutcome {
    Passed,
    Failed {
        category: FailureCategory,
        /// Tracking issue, `None` when an equivalent one is already open.
        issue: Option<IssueRef>,
    },
}

pub struct Orchestrator {
    hosting: Arc<dyn HostingApi>,
    completion: Arc<dyn CompletionService>,
    context: ContextAssembler,
    generator: Arc<FixGenerator>,
    applicator: PatchApplicator,
    verifier_loop: VerifierLoop,
    triager: Triager,
    settings: Settings,
    dashboard: DashboardLog,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, settings: &Settings, dashboard_dir: &Path) -> Self {
        let Collaborators {
            hosting,
            completion,
            workspace,
            verifier,
        } = collaborators;

        let generator = Arc::new(FixGenerator::new(completion.clone(), &settings.completion));
        Self {
            context: ContextAssembler::new(
                hosting.clone(),
                completion.clone(),
                &settings.context,
                &settings.completion,
            ),
            applicator: PatchApplicator::new(workspace.clone()),
            verifier_loop: VerifierLoop::new(
                verifier,
                workspace,
                generator.clone(),
                &settings.verifier.markers,
                &settings.context,
            ),
            triager: Triager::new(completion.clone(), &settings.completion),
            generator,
            hosting,
            completion,
            settings: settings.clone(),
            dashboard: DashboardLog::new(dashboard_dir),
        }
    }

    /// React to a classified inbound event.
    pub async fn dispatch(&self, action: EventAction) -> Result<(), PipelineError> {
        match action {
            EventAction::Command { issue, command } => self.handle_command(&issue, &command).await,
            EventAction::Triage(issue) => self.triage(&issue).await.map(|_| ()),
            EventAction::RunPipeline { issue, mode } => {
                let state = self.run_fix_pipeline(issue.number, mode).await;
                tracing::info!(issue = issue.number, %state, "Fix pipeline finished");
                Ok(())
            }
            EventAction::SelfTest { check } => self.self_test(&check).await.map(|_| ()),
            EventAction::Ignored(reason) => {
                tracing::info!(%reason, "Ignoring event");
                Ok(())
            }
        }
    }

    async fn comment(&self, issue: u64, body: &str) -> Result<(), TransportError> {
        self.hosting.post_comment(issue, body).await.inspect_err(|e| {
            tracing::error!(issue, error = %e, "Failed to post comment");
        })
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Handle a comment command on `issue`.
    pub async fn handle_command(&self, issue: &Issue, command: &Command) -> Result<(), PipelineError> {
        tracing::info!(issue = issue.number, command = command.keyword(), "Handling command");
        let result = match command {
            Command::Fix => self.request_fix(issue, FixMode::Fix).await,
            Command::Implement => self.request_fix(issue, FixMode::Implement).await,
            Command::Status => self.report_status(issue).await,
            Command::Help => self
                .comment(issue.number, &messages::help(&self.settings.commands.prefix))
                .await
                .map_err(PipelineError::from),
            Command::Analyze { target } => self.analyze(issue, target.as_deref()).await,
        };

        let outcome = if result.is_ok() { "success" } else { "failure" };
        self.dashboard.record(
            LogCategory::Interactions,
            DashboardLogEntry::new(format!("command:{}", command.keyword()), outcome).for_issue(issue.number),
        );
        result
    }

    async fn request_fix(&self, issue: &Issue, mode: FixMode) -> Result<(), PipelineError> {
        self.hosting
            .add_labels(issue.number, &[mode.label().to_string()])
            .await
            .inspect_err(|e| tracing::error!(issue = issue.number, error = %e, "Failed to add label"))?;

        if let Err(e) = self.comment(issue.number, &messages::acknowledgement(mode)).await {
            tracing::warn!(issue = issue.number, error = %e, "Label added but acknowledgement failed");
        }
        Ok(())
    }

    async fn report_status(&self, issue: &Issue) -> Result<(), PipelineError> {
        let related = match self.hosting.search_pull_requests(issue.number).await {
            Ok(prs) => prs,
            Err(e) => {
                let _ = self.comment(issue.number, &messages::status_error()).await;
                return Err(e.into());
            }
        };

        let state = reconstruct_state(issue, &related);
        tracing::info!(issue = issue.number, %state, "Reconstructed command state");
        let body = match state {
            CommandState::PrCreated => {
                let open: Vec<_> = related
                    .iter()
                    .filter(|pr| pr.state == PullRequestState::Open)
                    .cloned()
                    .collect();
                messages::status_in_progress(&open)
            }
            CommandState::Reviewed => messages::status_reviewed(&related),
            _ if is_flagged(issue) => messages::status_queued(),
            _ => messages::status_not_flagged(&self.settings.commands.prefix),
        };
        self.comment(issue.number, &body).await?;
        Ok(())
    }

    async fn analyze(&self, issue: &Issue, target: Option<&str>) -> Result<(), PipelineError> {
        let request = CompletionRequest::new(
            messages::analysis_prompt(issue, target),
            self.settings.completion.reply_temperature,
            self.settings.completion.reply_max_tokens,
        );
        let decoded = request_decoded(self.completion.as_ref(), &request, |text| {
            let text = text.trim();
            if text.is_empty() {
                Err(ParseError::new("analysis", "empty response"))
            } else {
                Ok(text.to_string())
            }
        })
        .await;

        let body = match decoded {
            Decoded::Ok(text) => messages::analysis(&text),
            Decoded::Malformed(_) | Decoded::Unavailable(_) => messages::analysis_error(),
        };
        self.comment(issue.number, &body).await?;
        Ok(())
    }

    /// Read-only state of the command on issue `number`.
    pub async fn status(&self, number: u64) -> Result<CommandState, PipelineError> {
        let issue = self.hosting.get_issue(number).await?;
        let related = self.hosting.search_pull_requests(number).await?;
        Ok(reconstruct_state(&issue, &related))
    }

    // ── Fix pipeline ────────────────────────────────────────────────────

    /// Run the fix pipeline for issue `number` and post its terminal comment.
    pub async fn run_fix_pipeline(&self, number: u64, mode: FixMode) -> CommandState {
        let result = self.fix(number, mode).await;

        let (state, body) = match &result {
            Ok(FixOutcome::PrCreated { pull_request, .. }) => (
                CommandState::PrCreated,
                messages::pull_request_created(&pull_request.html_url),
            ),
            Ok(FixOutcome::NoFixAvailable) => (CommandState::NoFixAvailable, messages::no_fix_available()),
            Ok(FixOutcome::NoApplicableChanges(report)) => (
                CommandState::NoApplicableChanges,
                messages::no_applicable_changes(report),
            ),
            Ok(FixOutcome::PushFailed { branch }) => (CommandState::PushFailed, messages::push_failed(branch)),
            Err(e) => {
                tracing::error!(issue = number, error = %e, "Fix pipeline failed");
                (CommandState::Failed, messages::failed(&e.to_string()))
            }
        };

        let _ = self.comment(number, &body).await;

        let details = match &result {
            Ok(FixOutcome::PrCreated {
                branch,
                pull_request,
                report,
                verification,
            }) => json!({
                "branch": branch,
                "pull_request": pull_request.number,
                "applied": report.applied,
                "skipped": report.skipped,
                "verification_passed": verification.passed(),
                "follow_ups": verification.attempts,
            }),
            Ok(FixOutcome::PushFailed { branch }) => json!({ "branch": branch }),
            Ok(FixOutcome::NoApplicableChanges(report)) => json!({ "skipped": report.skipped }),
            Ok(FixOutcome::NoFixAvailable) => serde_json::Value::Null,
            Err(e) => json!({ "error": e.to_string() }),
        };
        self.dashboard.record(
            LogCategory::Implementations,
            DashboardLogEntry::new(format!("{:?}", mode).to_lowercase(), state.as_str())
                .for_issue(number)
                .with_details(details),
        );
        state
    }

    async fn fix(&self, number: u64, mode: FixMode) -> Result<FixOutcome, PipelineError> {
        let issue = self.hosting.get_issue(number).await?;
        let base = self.settings.hosting.base_branch.as_str();

        let context = self
            .context
            .assemble(&format!("{}\n\n{}", issue.title, issue.body), base)
            .await;
        tracing::info!(issue = number, state = %CommandState::ContextGathered, files = context.files.len());

        let Some(descriptor) = self
            .generator
            .generate(&FixTarget::Issue { issue: &issue, mode }, &context.files)
            .await
            .ok()
        else {
            return Ok(FixOutcome::NoFixAvailable);
        };
        tracing::info!(issue = number, state = %CommandState::FixGenerated, changes = descriptor.changes.len());

        let branch = branch_name(number);
        self.applicator.prepare_branch(base, &branch).await?;
        let report = self.applicator.apply(&descriptor).await;
        match self.applicator.commit(&commit_message(number, &issue.title)).await? {
            CommitOutcome::NothingStaged => return Ok(FixOutcome::NoApplicableChanges(report)),
            CommitOutcome::Committed { commit } => {
                tracing::info!(issue = number, state = %CommandState::PatchApplied, %branch, %commit);
            }
        }

        let verification = self.verifier_loop.run(&issue, &self.applicator).await;

        if let Err(e) = self.applicator.push(&branch).await {
            tracing::error!(issue = number, %branch, error = %e, "Push failed");
            return Ok(FixOutcome::PushFailed { branch });
        }

        let pull_request = self
            .hosting
            .create_pull_request(&NewPullRequest {
                title: messages::pull_request_title(&issue),
                body: messages::pull_request_body(&issue, &descriptor, &report, &verification),
                head: branch.clone(),
                base: base.to_string(),
            })
            .await?;
        tracing::info!(issue = number, pr = pull_request.number, url = %pull_request.html_url, "Created pull request");

        if let Err(e) = self
            .hosting
            .add_labels(pull_request.number, &[PR_LABEL.to_string()])
            .await
        {
            tracing::warn!(pr = pull_request.number, error = %e, "Failed to label pull request");
        }

        if verification.result.as_ref().is_some_and(|r| !r.passed) {
            let tracking = NewIssue {
                title: messages::verification_tracking_title(number),
                body: messages::verification_tracking_body(&issue, &branch, &verification),
                labels: vec!["bug".to_string(), "automated".to_string()],
            };
            if let Err(e) = self.create_issue_deduplicated(&tracking).await {
                tracing::warn!(issue = number, error = %e, "Failed to open verification tracking issue");
            }
        }

        Ok(FixOutcome::PrCreated {
            branch,
            pull_request,
            report,
            verification,
        })
    }

    // ── Triage ──────────────────────────────────────────────────────────

    /// Classify a new issue, label it and reply.
    pub async fn triage(&self, issue: &Issue) -> Result<TriageOutcome, PipelineError> {
        let repo = match self.hosting.get_repository().await {
            Ok(repo) => repo,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read repository details");
                RepositoryInfo {
                    full_name: "this repository".to_string(),
                    description: None,
                    default_branch: self.settings.hosting.base_branch.clone(),
                }
            }
        };

        let outcome = self.triager.triage(issue, &repo).await;
        let decision = &outcome.decision;

        let mut labels: Vec<String> = Vec::new();
        for label in decision.labels.iter().chain(std::iter::once(&decision.category)) {
            if !labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                labels.push(label.clone());
            }
        }
        if decision.requires_attention {
            labels.push(ATTENTION_LABEL.to_string());
        }
        if let Err(e) = self.hosting.add_labels(issue.number, &labels).await {
            tracing::warn!(issue = issue.number, error = %e, "Failed to apply triage labels");
        }

        let body = format!("{}{}", decision.response.trim(), messages::TRIAGE_FOOTER);
        self.comment(issue.number, &body).await?;

        self.dashboard.record(
            LogCategory::Triage,
            DashboardLogEntry::new("triage", decision.category.clone())
                .for_issue(issue.number)
                .with_details(json!({
                    "labels": labels,
                    "requires_attention": decision.requires_attention,
                    "complexity": decision.complexity,
                    "ai_fixable": decision.ai_fixable,
                    "source": format!("{:?}", outcome.source),
                })),
        );
        Ok(outcome)
    }

    // ── Self-test ───────────────────────────────────────────────────────

    /// Run the verifier against the workspace and track failures as issues.
    pub async fn self_test(&self, check: &str) -> Result<SelfTestOutcome, PipelineError> {
        let result = self.verifier_loop.verify().await?;
        if result.passed {
            self.dashboard.record(
                LogCategory::SelfTest,
                DashboardLogEntry::new(format!("self-test:{}", check), "passed"),
            );
            return Ok(SelfTestOutcome::Passed);
        }

        let proposal = self.verifier_loop.follow_up(None, &result).await.ok();
        let new_issue = NewIssue {
            title: messages::self_test_title(result.category.as_str()),
            body: messages::self_test_body(check, &result.diagnostic, proposal.as_ref()),
            labels: vec!["bug".to_string(), "automated".to_string()],
        };
        let issue = self.create_issue_deduplicated(&new_issue).await?;

        self.dashboard.record(
            LogCategory::SelfTest,
            DashboardLogEntry::new(format!("self-test:{}", check), "failed").with_details(json!({
                "category": result.category,
                "issue": issue.as_ref().map(|i| i.number),
                "fix_proposed": proposal.is_some(),
            })),
        );
        Ok(SelfTestOutcome::Failed {
            category: result.category,
            issue,
        })
    }

    /// Create `new_issue` unless an open issue already has the same title.
    pub async fn create_issue_deduplicated(&self, new_issue: &NewIssue) -> Result<Option<IssueRef>, TransportError> {
        let wanted = normalize_title(&new_issue.title);
        let open = self.hosting.list_open_issues().await?;
        if let Some(existing) = open.iter().find(|i| normalize_title(&i.title) == wanted) {
            tracing::info!(existing = existing.number, title = %new_issue.title, "Matching open issue exists, not creating");
            return Ok(None);
        }
        let created = self.hosting.create_issue(new_issue).await?;
        tracing::info!(issue = created.number, title = %new_issue.title, "Created issue");
        Ok(Some(created))
    }
}
