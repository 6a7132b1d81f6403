//! Verification feedback loop.
//!
//! After a patch is committed the verifier runs against the working tree. A
//! failure asks the fix generator for a follow-up descriptor, with the source
//! file named in the diagnostic attached when one can be found. Each failure
//! category gets at most one follow-up per run, so the loop is bounded by the
//! number of categories.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::completion::Decoded;
use crate::config::{ContextSettings, FailureMarkers};
use crate::context::{ContextFile, truncate_window};
use crate::errors::TransportError;
use crate::fix::{FixDescriptor, FixGenerator, FixTarget};
use crate::hosting::Issue;
use crate::patch::{ApplyReport, CommitOutcome, PatchApplicator};
use crate::verifier::{FailureCategory, VerificationResult, Verifier, classify};
use crate::workspace::Workspace;

/// Candidate file references in build output, e.g. `src/main/java/App.java`.
static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[A-Za-z0-9_.\-]+/)*[A-Za-z0-9_\-]+\.[A-Za-z][A-Za-z0-9]{0,5}\b").expect("valid regex")
});

const MAX_PATH_CANDIDATES: usize = 50;

/// Suffixes of `token` starting at each `/`, longest first.
fn path_suffixes(token: &str) -> Vec<&str> {
    let token = token.trim_start_matches('/');
    let mut suffixes = vec![token];
    for (idx, _) in token.match_indices('/') {
        let rest = &token[idx + 1..];
        if !rest.is_empty() {
            suffixes.push(rest);
        }
    }
    suffixes
}

pub fn follow_up_commit_message(issue: u64, category: FailureCategory) -> String {
    format!("Address {} for #{}\n\nAI-generated follow-up fix", category, issue)
}

/// One follow-up attempt for a failing category.
#[derive(Debug, Clone, Serialize)]
pub struct FollowUpAttempt {
    pub category: FailureCategory,
    pub report: Option<ApplyReport>,
    pub committed: bool,
}

#[derive(Debug, Default)]
pub struct VerificationOutcome {
    /// Last verifier result, `None` when the verifier never produced one.
    pub result: Option<VerificationResult>,
    pub attempts: Vec<FollowUpAttempt>,
    pub error: Option<String>,
}

impl VerificationOutcome {
    pub fn passed(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.passed)
    }

    /// Markdown summary for the pull request body.
    pub fn summary(&self) -> String {
        let mut out = match (&self.result, &self.error) {
            (Some(r), _) if r.passed => "All checks passed.".to_string(),
            (Some(r), _) => format!("Checks are still failing ({}).", r.category),
            (None, Some(e)) => format!("Verification could not run: {}", e),
            (None, None) => "Verification was not run.".to_string(),
        };
        for attempt in &self.attempts {
            let applied = attempt.report.as_ref().map(|r| r.applied.len()).unwrap_or(0);
            let _ = write!(
                out,
                "\n- Follow-up for {}: {} change(s) applied{}",
                attempt.category,
                applied,
                if attempt.committed { ", committed" } else { "" }
            );
        }
        out
    }
}

pub struct VerifierLoop {
    verifier: Arc<dyn Verifier>,
    workspace: Arc<dyn Workspace>,
    generator: Arc<FixGenerator>,
    markers: FailureMarkers,
    context: ContextSettings,
}

impl VerifierLoop {
    pub fn new(
        verifier: Arc<dyn Verifier>,
        workspace: Arc<dyn Workspace>,
        generator: Arc<FixGenerator>,
        markers: &FailureMarkers,
        context: &ContextSettings,
    ) -> Self {
        Self {
            verifier,
            workspace,
            generator,
            markers: markers.clone(),
            context: context.clone(),
        }
    }

    /// Run the verifier once and classify its output.
    pub async fn verify(&self) -> Result<VerificationResult, TransportError> {
        let output = self.verifier.run(self.workspace.root()).await?;
        let result = classify(&output, &self.markers);
        if result.passed {
            tracing::info!("Verification passed");
        } else {
            tracing::warn!(category = %result.category, exit_code = output.exit_code, "Verification failed");
        }
        Ok(result)
    }

    /// First file in the workspace referenced by `diagnostic`.
    pub async fn locate_source_file(&self, diagnostic: &str) -> Option<ContextFile> {
        let mut seen = HashSet::new();
        let tokens = PATH_TOKEN
            .find_iter(diagnostic)
            .map(|m| m.as_str())
            .filter(|t| seen.insert(*t))
            .take(MAX_PATH_CANDIDATES);

        for token in tokens {
            for candidate in path_suffixes(token) {
                if let Ok(Some(content)) = self.workspace.read_file(candidate).await {
                    let (content, truncated) = truncate_window(
                        &content,
                        self.context.truncate_threshold,
                        self.context.head_chars,
                        self.context.tail_chars,
                    );
                    tracing::debug!(path = candidate, "Attaching file referenced by diagnostic");
                    return Some(ContextFile {
                        path: candidate.to_string(),
                        content,
                        truncated,
                    });
                }
            }
        }
        None
    }

    /// Ask for a descriptor addressing a failed verification.
    pub async fn follow_up(&self, issue: Option<&Issue>, result: &VerificationResult) -> Decoded<FixDescriptor> {
        let files: Vec<ContextFile> = self.locate_source_file(&result.diagnostic).await.into_iter().collect();
        self.generator
            .generate(&FixTarget::Verification { issue, result }, &files)
            .await
    }

    /// Verify, and for each newly seen failure category apply and commit one
    /// follow-up fix. Stops on success, on a repeated category, or when no
    /// follow-up could be produced or applied.
    pub async fn run(&self, issue: &Issue, applicator: &PatchApplicator) -> VerificationOutcome {
        let mut outcome = VerificationOutcome::default();
        let mut attempted = HashSet::new();

        loop {
            let result = match self.verify().await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "Verifier did not run");
                    outcome.error = Some(e.to_string());
                    return outcome;
                }
            };

            if result.passed || !attempted.insert(result.category) {
                outcome.result = Some(result);
                return outcome;
            }

            let category = result.category;
            let descriptor = self.follow_up(Some(issue), &result).await.ok();
            outcome.result = Some(result);

            let Some(descriptor) = descriptor else {
                outcome.attempts.push(FollowUpAttempt {
                    category,
                    report: None,
                    committed: false,
                });
                return outcome;
            };

            let report = applicator.apply(&descriptor).await;
            let committed = match applicator
                .commit(&follow_up_commit_message(issue.number, category))
                .await
            {
                Ok(CommitOutcome::Committed { commit }) => {
                    tracing::info!(%commit, %category, "Committed follow-up fix");
                    true
                }
                Ok(CommitOutcome::NothingStaged) => false,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to commit follow-up fix");
                    false
                }
            };
            outcome.attempts.push(FollowUpAttempt {
                category,
                report: Some(report),
                committed,
            });
            if !committed {
                return outcome;
            }
        }
    }
}
