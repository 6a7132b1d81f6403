//! Event classification.
//!
//! Turns a raw webhook payload into an [`EventAction`]: a command to handle,
//! an issue to triage, a fix pipeline to run, a self-test sweep, or nothing.

mod command;
mod triage;

pub use command::{Command, CommandParser};
pub use triage::{
    ATTENTION_LABEL, DEFAULT_RESPONSE, TriageDecision, TriageOutcome, TriageSource, Triager, keyword_category,
    keyword_decision,
};

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::hosting::{Issue, IssueState};

pub const FIX_LABEL: &str = "ai-fix";
pub const IMPLEMENT_LABEL: &str = "ai-implement";

/// Check-run conclusions that warrant a self-test sweep.
const FAILING_CONCLUSIONS: &[&str] = &["failure", "timed_out", "action_required"];

/// Subset of the webhook payload the pipeline reads.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub action: String,
    pub issue: Option<EventIssue>,
    pub comment: Option<EventComment>,
    pub label: Option<EventLabel>,
    pub check_run: Option<EventCheckRun>,
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventIssue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub user: Option<EventUser>,
    #[serde(default)]
    pub labels: Vec<EventLabel>,
    pub state: Option<String>,
    /// Set when the "issue" is really a pull request.
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventUser {
    pub login: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl EventUser {
    pub fn is_bot(&self) -> bool {
        self.kind.eq_ignore_ascii_case("bot") || self.login.ends_with("[bot]")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventComment {
    pub body: String,
    pub user: Option<EventUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventCheckRun {
    pub name: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
}

impl From<&EventIssue> for Issue {
    fn from(raw: &EventIssue) -> Self {
        Issue {
            number: raw.number,
            title: raw.title.clone(),
            body: raw.body.clone().unwrap_or_default(),
            author: raw.user.as_ref().map(|u| u.login.clone()).unwrap_or_default(),
            labels: raw.labels.iter().map(|l| l.name.clone()).collect(),
            state: match raw.state.as_deref() {
                Some("closed") => IssueState::Closed,
                _ => IssueState::Open,
            },
        }
    }
}

impl InboundEvent {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event payload {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse event payload {}", path.display()))
    }
}

/// Which flavor of the fix pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMode {
    Fix,
    Implement,
}

impl FixMode {
    pub fn label(&self) -> &'static str {
        match self {
            FixMode::Fix => FIX_LABEL,
            FixMode::Implement => IMPLEMENT_LABEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventAction {
    Command { issue: Issue, command: Command },
    Triage(Issue),
    RunPipeline { issue: Issue, mode: FixMode },
    SelfTest { check: String },
    Ignored(String),
}

/// Classify an inbound event. Never fails: anything unrecognized is `Ignored`.
pub fn classify_event(event: &InboundEvent, parser: &CommandParser) -> EventAction {
    if let Some(check) = &event.check_run {
        if event.action != "completed" {
            return EventAction::Ignored(format!("check run {} not completed", check.name));
        }
        return match check.conclusion.as_deref() {
            Some(c) if FAILING_CONCLUSIONS.contains(&c) => EventAction::SelfTest {
                check: check.name.clone(),
            },
            other => EventAction::Ignored(format!(
                "check run {} concluded {}",
                check.name,
                other.unwrap_or("without a conclusion")
            )),
        };
    }

    let Some(raw_issue) = &event.issue else {
        return EventAction::Ignored(format!("no issue in '{}' event", event.action));
    };

    if let Some(comment) = &event.comment {
        if event.action != "created" {
            return EventAction::Ignored(format!("comment {}", event.action));
        }
        if comment.user.as_ref().is_some_and(EventUser::is_bot) {
            return EventAction::Ignored("comment authored by a bot".to_string());
        }
        return match parser.parse(&comment.body) {
            Some(command) => EventAction::Command {
                issue: raw_issue.into(),
                command,
            },
            None => EventAction::Ignored("comment contains no command".to_string()),
        };
    }

    if raw_issue.pull_request.is_some() {
        return EventAction::Ignored("pull request events are not handled".to_string());
    }

    match event.action.as_str() {
        "opened" => EventAction::Triage(raw_issue.into()),
        "labeled" => {
            let mode = match event.label.as_ref().map(|l| l.name.to_lowercase()).as_deref() {
                Some(FIX_LABEL) => FixMode::Fix,
                Some(IMPLEMENT_LABEL) => FixMode::Implement,
                _ => return EventAction::Ignored("label does not request automation".to_string()),
            };
            EventAction::RunPipeline {
                issue: raw_issue.into(),
                mode,
            }
        }
        other => EventAction::Ignored(format!("issue action '{}'", other)),
    }
}
