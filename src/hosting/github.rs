use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    HostingApi, Issue, IssueRef, IssueState, NewIssue, NewPullRequest, PullRequestRef, PullRequestState,
    PullRequestSummary, RepositoryInfo, mentions_issue,
};
use crate::config::{HostingSettings, RepoSlug};
use crate::errors::{Service, TransportError};
use crate::util::sanitize_error_body;

const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;
/// Upper bound on pages fetched for listings.
const MAX_PAGES: usize = 10;

/// GitHub REST client bound to one repository.
pub struct GitHubClient {
    http: Client,
    api_url: Url,
    repo: RepoSlug,
    token: String,
}

/// A GitHub issue (subset of fields).
#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    user: Option<GitHubUser>,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
    html_url: String,
    /// Pull requests also come through the issues endpoint.
    pull_request: Option<GitHubPullRef>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubPullRef {
    merged_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<GitHubIssue>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    full_name: String,
    description: Option<String>,
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    number: u64,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Serialize)]
struct CreateIssueRequest<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

#[derive(Serialize)]
struct CreatePrRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

impl From<GitHubIssue> for Issue {
    fn from(raw: GitHubIssue) -> Self {
        Issue {
            number: raw.number,
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            author: raw.user.map(|u| u.login).unwrap_or_default(),
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            state: if raw.state == "closed" {
                IssueState::Closed
            } else {
                IssueState::Open
            },
        }
    }
}

fn pull_request_summary(raw: GitHubIssue) -> PullRequestSummary {
    let merged = raw.pull_request.as_ref().is_some_and(|p| p.merged_at.is_some());
    let state = match (raw.state.as_str(), merged) {
        (_, true) => PullRequestState::Merged,
        ("closed", false) => PullRequestState::Closed,
        _ => PullRequestState::Open,
    };
    PullRequestSummary {
        number: raw.number,
        title: raw.title,
        html_url: raw.html_url,
        state,
    }
}

impl GitHubClient {
    pub fn new(settings: &HostingSettings, repo: RepoSlug, token: impl Into<String>) -> Result<Self, TransportError> {
        let api_url = Url::parse(&settings.api_url).map_err(|e| TransportError::Request {
            service: Service::Hosting,
            message: format!("invalid API URL '{}': {}", settings.api_url, e),
        })?;
        let http = Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("autofix/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::from_reqwest(Service::Hosting, e))?;
        Ok(Self {
            http,
            api_url,
            repo,
            token: token.into(),
        })
    }

    /// `{api_url}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Request {
                service: Service::Hosting,
                message: "API URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_url(&self, rest: &[&str]) -> Result<Url, TransportError> {
        let mut segments = vec!["repos", self.repo.owner.as_str(), self.repo.name.as_str()];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, TransportError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(Service::Hosting, e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TransportError::Status {
            service: Service::Hosting,
            status: status.as_u16(),
            body: sanitize_error_body(&body),
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, TransportError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::from_reqwest(Service::Hosting, e))
    }
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn get_issue(&self, number: u64) -> Result<Issue, TransportError> {
        let url = self.repo_url(&["issues", &number.to_string()])?;
        let raw: GitHubIssue = self.send_json(self.request(Method::GET, url)).await?;
        Ok(raw.into())
    }

    async fn get_repository(&self) -> Result<RepositoryInfo, TransportError> {
        let url = self.repo_url(&[])?;
        let raw: GitHubRepo = self.send_json(self.request(Method::GET, url)).await?;
        Ok(RepositoryInfo {
            full_name: raw.full_name,
            description: raw.description,
            default_branch: raw.default_branch,
        })
    }

    async fn list_open_issues(&self) -> Result<Vec<Issue>, TransportError> {
        let mut issues = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = self.repo_url(&["issues"])?;
            let per_page = PER_PAGE.to_string();
            let page_str = page.to_string();
            let builder = self.request(Method::GET, url).query(&[
                ("state", "open"),
                ("per_page", per_page.as_str()),
                ("page", page_str.as_str()),
            ]);
            let batch: Vec<GitHubIssue> = self.send_json(builder).await?;
            let count = batch.len();
            issues.extend(batch.into_iter().filter(|i| i.pull_request.is_none()).map(Issue::from));
            if count < PER_PAGE {
                break;
            }
        }
        Ok(issues)
    }

    async fn search_pull_requests(&self, issue: u64) -> Result<Vec<PullRequestSummary>, TransportError> {
        let url = self.url(&["search", "issues"])?;
        let query = format!("repo:{} is:pr \"#{}\"", self.repo, issue);
        let builder = self
            .request(Method::GET, url)
            .query(&[("q", query.as_str()), ("per_page", "50")]);
        let response: SearchResponse = self.send_json(builder).await?;

        Ok(response
            .items
            .into_iter()
            .filter(|item| {
                mentions_issue(&item.title, issue)
                    || item.body.as_deref().is_some_and(|b| mentions_issue(b, issue))
            })
            .map(pull_request_summary)
            .collect())
    }

    async fn add_labels(&self, issue: u64, labels: &[String]) -> Result<(), TransportError> {
        let url = self.repo_url(&["issues", &issue.to_string(), "labels"])?;
        let body = serde_json::json!({ "labels": labels });
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn post_comment(&self, issue: u64, body: &str) -> Result<(), TransportError> {
        let url = self.repo_url(&["issues", &issue.to_string(), "comments"])?;
        let payload = serde_json::json!({ "body": body });
        self.send(self.request(Method::POST, url).json(&payload)).await?;
        Ok(())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<IssueRef, TransportError> {
        let url = self.repo_url(&["issues"])?;
        let request = CreateIssueRequest {
            title: &issue.title,
            body: &issue.body,
            labels: &issue.labels,
        };
        let created: CreatedResponse = self.send_json(self.request(Method::POST, url).json(&request)).await?;
        Ok(IssueRef {
            number: created.number,
            html_url: created.html_url,
        })
    }

    async fn create_pull_request(&self, pr: &NewPullRequest) -> Result<PullRequestRef, TransportError> {
        let url = self.repo_url(&["pulls"])?;
        let request = CreatePrRequest {
            title: &pr.title,
            body: &pr.body,
            head: &pr.head,
            base: &pr.base,
        };
        let created: CreatedResponse = self.send_json(self.request(Method::POST, url).json(&request)).await?;
        Ok(PullRequestRef {
            number: created.number,
            html_url: created.html_url,
        })
    }

    async fn list_file_tree(&self, reference: &str) -> Result<Vec<String>, TransportError> {
        let url = self.repo_url(&["git", "trees", reference])?;
        let builder = self.request(Method::GET, url).query(&[("recursive", "1")]);
        let tree: TreeResponse = self.send_json(builder).await?;
        if tree.truncated {
            tracing::warn!(reference, "File tree listing was truncated by the API");
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect())
    }

    async fn get_file_content(&self, path: &str, reference: &str) -> Result<Option<String>, TransportError> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.repo_url(&segments)?;
        let builder = self
            .request(Method::GET, url)
            .header("Accept", "application/vnd.github.raw+json")
            .query(&[("ref", reference)]);

        match self.send(builder).await {
            Ok(resp) => resp
                .text()
                .await
                .map(Some)
                .map_err(|e| TransportError::from_reqwest(Service::Hosting, e)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
