//! Repository hosting platform seam.
//!
//! [`HostingApi`] is a stateless facade over issues, pull requests, labels,
//! comments and file contents of one repository. [`GitHubClient`] implements
//! it over the GitHub REST API.

mod github;

pub use github::GitHubClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub author: String,
    pub labels: Vec<String>,
    pub state: IssueState,
}

impl Issue {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

/// A pull request that references an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: PullRequestState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryInfo {
    pub full_name: String,
    pub description: Option<String>,
    pub default_branch: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueRef {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestRef {
    pub number: u64,
    pub html_url: String,
}

#[async_trait]
pub trait HostingApi: Send + Sync {
    async fn get_issue(&self, number: u64) -> Result<Issue, TransportError>;

    async fn get_repository(&self) -> Result<RepositoryInfo, TransportError>;

    /// Open issues only; pull requests are filtered out.
    async fn list_open_issues(&self) -> Result<Vec<Issue>, TransportError>;

    /// Pull requests (any state) whose title or body reference `#issue`.
    async fn search_pull_requests(&self, issue: u64) -> Result<Vec<PullRequestSummary>, TransportError>;

    async fn add_labels(&self, issue: u64, labels: &[String]) -> Result<(), TransportError>;

    async fn post_comment(&self, issue: u64, body: &str) -> Result<(), TransportError>;

    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueRef, TransportError>;

    async fn create_pull_request(&self, pr: &NewPullRequest) -> Result<PullRequestRef, TransportError>;

    /// Blob paths of the tree at `reference`, recursively.
    async fn list_file_tree(&self, reference: &str) -> Result<Vec<String>, TransportError>;

    /// Raw file content at `reference`, `None` when the path does not exist.
    async fn get_file_content(&self, path: &str, reference: &str) -> Result<Option<String>, TransportError>;
}

/// Title key that ignores case and whitespace runs.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// True when `text` references `#number` and not a longer number with the
/// same prefix.
pub fn mentions_issue(text: &str, number: u64) -> bool {
    let needle = format!("#{}", number);
    text.match_indices(&needle).any(|(idx, _)| {
        !text[idx + needle.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}
