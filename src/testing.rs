//! In-memory fakes of the collaborator traits, shared by unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::completion::{CompletionRequest, CompletionService};
use crate::errors::{Service, TransportError, WorkspaceError};
use crate::hosting::{
    HostingApi, Issue, IssueRef, IssueState, NewIssue, NewPullRequest, PullRequestRef, PullRequestSummary,
    RepositoryInfo,
};
use crate::verifier::{Verifier, VerifierOutput};
use crate::workspace::{Workspace, validate_relative_path};

pub fn issue(number: u64, title: &str, body: &str) -> Issue {
    Issue {
        number,
        title: title.to_string(),
        body: body.to_string(),
        author: "octocat".to_string(),
        labels: Vec::new(),
        state: IssueState::Open,
    }
}

fn scripted_failure(service: Service) -> TransportError {
    TransportError::Request {
        service,
        message: "no scripted response".to_string(),
    }
}

// ── Completion ──────────────────────────────────────────────────────────

pub struct FakeCompletion {
    responses: Mutex<VecDeque<Result<String, TransportError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    /// Answers with `responses` in order, then fails.
    pub fn new(responses: Vec<Result<String, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Self::new(vec![Err(TransportError::Timeout {
            service: Service::Completion,
        })])
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(scripted_failure(Service::Completion)))
    }
}

// ── Hosting ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct HostingState {
    issues: BTreeMap<u64, Issue>,
    pull_requests: HashMap<u64, Vec<PullRequestSummary>>,
    tree: Vec<String>,
    files: HashMap<String, String>,
    fail_tree: bool,
    fail_labels: bool,
    fail_pull_request: bool,
    labels_added: Vec<(u64, Vec<String>)>,
    comments: Vec<(u64, String)>,
    created_issues: Vec<NewIssue>,
    created_pull_requests: Vec<NewPullRequest>,
    next_number: u64,
}

pub struct FakeHosting {
    state: Mutex<HostingState>,
}

impl FakeHosting {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HostingState {
                next_number: 100,
                ..HostingState::default()
            }),
        })
    }

    pub fn add_issue(&self, issue: Issue) {
        self.state.lock().unwrap().issues.insert(issue.number, issue);
    }

    pub fn add_pull_request(&self, issue: u64, pr: PullRequestSummary) {
        self.state
            .lock()
            .unwrap()
            .pull_requests
            .entry(issue)
            .or_default()
            .push(pr);
    }

    pub fn set_tree(&self, paths: &[&str]) {
        self.state.lock().unwrap().tree = paths.iter().map(|p| p.to_string()).collect();
    }

    pub fn set_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
    }

    pub fn fail_tree(&self) {
        self.state.lock().unwrap().fail_tree = true;
    }

    pub fn fail_labels(&self) {
        self.state.lock().unwrap().fail_labels = true;
    }

    pub fn fail_pull_request(&self) {
        self.state.lock().unwrap().fail_pull_request = true;
    }

    pub fn labels_added(&self) -> Vec<(u64, Vec<String>)> {
        self.state.lock().unwrap().labels_added.clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn created_issues(&self) -> Vec<NewIssue> {
        self.state.lock().unwrap().created_issues.clone()
    }

    pub fn created_pull_requests(&self) -> Vec<NewPullRequest> {
        self.state.lock().unwrap().created_pull_requests.clone()
    }

    fn next_number(state: &mut HostingState) -> u64 {
        state.next_number += 1;
        state.next_number
    }
}

#[async_trait]
impl HostingApi for FakeHosting {
    async fn get_issue(&self, number: u64) -> Result<Issue, TransportError> {
        self.state
            .lock()
            .unwrap()
            .issues
            .get(&number)
            .cloned()
            .ok_or(TransportError::Status {
                service: Service::Hosting,
                status: 404,
                body: "Not Found".to_string(),
            })
    }

    async fn get_repository(&self) -> Result<RepositoryInfo, TransportError> {
        Ok(RepositoryInfo {
            full_name: "octo/widgets".to_string(),
            description: Some("Widget factory".to_string()),
            default_branch: "main".to_string(),
        })
    }

    async fn list_open_issues(&self) -> Result<Vec<Issue>, TransportError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .issues
            .values()
            .filter(|i| i.state == IssueState::Open)
            .cloned()
            .collect())
    }

    async fn search_pull_requests(&self, issue: u64) -> Result<Vec<PullRequestSummary>, TransportError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pull_requests
            .get(&issue)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_labels(&self, issue: u64, labels: &[String]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_labels {
            return Err(TransportError::Status {
                service: Service::Hosting,
                status: 403,
                body: "Forbidden".to_string(),
            });
        }
        state.labels_added.push((issue, labels.to_vec()));
        if let Some(existing) = state.issues.get_mut(&issue) {
            for label in labels {
                if !existing.has_label(label) {
                    existing.labels.push(label.clone());
                }
            }
        }
        Ok(())
    }

    async fn post_comment(&self, issue: u64, body: &str) -> Result<(), TransportError> {
        self.state.lock().unwrap().comments.push((issue, body.to_string()));
        Ok(())
    }

    async fn create_issue(&self, new_issue: &NewIssue) -> Result<IssueRef, TransportError> {
        let mut state = self.state.lock().unwrap();
        let number = Self::next_number(&mut state);
        state.created_issues.push(new_issue.clone());
        state.issues.insert(
            number,
            Issue {
                number,
                title: new_issue.title.clone(),
                body: new_issue.body.clone(),
                author: "autofix[bot]".to_string(),
                labels: new_issue.labels.clone(),
                state: IssueState::Open,
            },
        );
        Ok(IssueRef {
            number,
            html_url: format!("https://github.com/octo/widgets/issues/{}", number),
        })
    }

    async fn create_pull_request(&self, pr: &NewPullRequest) -> Result<PullRequestRef, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_pull_request {
            return Err(TransportError::Status {
                service: Service::Hosting,
                status: 422,
                body: "Validation Failed".to_string(),
            });
        }
        let number = Self::next_number(&mut state);
        state.created_pull_requests.push(pr.clone());
        Ok(PullRequestRef {
            number,
            html_url: format!("https://github.com/octo/widgets/pull/{}", number),
        })
    }

    async fn list_file_tree(&self, _reference: &str) -> Result<Vec<String>, TransportError> {
        let state = self.state.lock().unwrap();
        if state.fail_tree {
            return Err(TransportError::Timeout {
                service: Service::Hosting,
            });
        }
        Ok(state.tree.clone())
    }

    async fn get_file_content(&self, path: &str, _reference: &str) -> Result<Option<String>, TransportError> {
        Ok(self.state.lock().unwrap().files.get(path).cloned())
    }
}

// ── Verifier ────────────────────────────────────────────────────────────

pub struct FakeVerifier {
    outputs: Mutex<VecDeque<Result<VerifierOutput, TransportError>>>,
    runs: Mutex<usize>,
}

impl FakeVerifier {
    /// Returns `outputs` in order; the last `Ok` output repeats forever.
    pub fn new(outputs: Vec<Result<VerifierOutput, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            outputs: Mutex::new(outputs.into()),
            runs: Mutex::new(0),
        })
    }

    pub fn always(output: VerifierOutput) -> Arc<Self> {
        Self::new(vec![Ok(output)])
    }

    pub fn passing() -> Arc<Self> {
        Self::always(VerifierOutput::success())
    }

    /// Every run fails to start.
    pub fn broken() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn runs(&self) -> usize {
        *self.runs.lock().unwrap()
    }
}

#[async_trait]
impl Verifier for FakeVerifier {
    async fn run(&self, _target: &Path) -> Result<VerifierOutput, TransportError> {
        *self.runs.lock().unwrap() += 1;
        let mut outputs = self.outputs.lock().unwrap();
        if outputs.len() == 1
            && let Some(Ok(output)) = outputs.front()
        {
            return Ok(output.clone());
        }
        outputs
            .pop_front()
            .unwrap_or_else(|| Err(scripted_failure(Service::Verifier)))
    }
}

// ── Workspace ───────────────────────────────────────────────────────────

#[derive(Default)]
struct WorkspaceState {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    executables: BTreeSet<String>,
    staged: Vec<String>,
    commits: Vec<String>,
    checkouts: Vec<String>,
    branches: Vec<String>,
    pushes: Vec<String>,
    fail_push: bool,
    fail_commit: bool,
    fail_stage: bool,
}

pub struct FakeWorkspace {
    root: PathBuf,
    state: Mutex<WorkspaceState>,
}

impl FakeWorkspace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            root: PathBuf::from("fake-workspace"),
            state: Mutex::new(WorkspaceState::default()),
        })
    }

    pub fn set_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn is_executable(&self, path: &str) -> bool {
        self.state.lock().unwrap().executables.contains(path)
    }

    pub fn staged(&self) -> Vec<String> {
        self.state.lock().unwrap().staged.clone()
    }

    pub fn commits(&self) -> Vec<String> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn checkouts(&self) -> Vec<String> {
        self.state.lock().unwrap().checkouts.clone()
    }

    pub fn branches(&self) -> Vec<String> {
        self.state.lock().unwrap().branches.clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.state.lock().unwrap().pushes.clone()
    }

    pub fn fail_push(&self) {
        self.state.lock().unwrap().fail_push = true;
    }

    pub fn fail_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    pub fn fail_stage(&self) {
        self.state.lock().unwrap().fail_stage = true;
    }

    fn key(path: &str) -> Result<String, WorkspaceError> {
        Ok(validate_relative_path(path)?.to_string_lossy().into_owned())
    }
}

#[async_trait]
impl Workspace for FakeWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn checkout(&self, reference: &str) -> Result<(), WorkspaceError> {
        self.state.lock().unwrap().checkouts.push(reference.to_string());
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> Result<(), WorkspaceError> {
        self.state.lock().unwrap().branches.push(name.to_string());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, WorkspaceError> {
        let key = Self::key(path)?;
        Ok(self.state.lock().unwrap().files.get(&key).cloned())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        let key = Self::key(path)?;
        self.state.lock().unwrap().files.insert(key, content.to_string());
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), WorkspaceError> {
        let key = Self::key(path)?;
        self.state.lock().unwrap().dirs.insert(key);
        Ok(())
    }

    async fn set_executable(&self, path: &str) -> Result<(), WorkspaceError> {
        let key = Self::key(path)?;
        self.state.lock().unwrap().executables.insert(key);
        Ok(())
    }

    async fn stage(&self, path: &str) -> Result<(), WorkspaceError> {
        let key = Self::key(path)?;
        let mut state = self.state.lock().unwrap();
        if state.fail_stage {
            return Err(WorkspaceError::Git("index is locked".to_string()));
        }
        if !state.staged.contains(&key) {
            state.staged.push(key);
        }
        Ok(())
    }

    async fn has_staged_changes(&self) -> Result<bool, WorkspaceError> {
        Ok(!self.state.lock().unwrap().staged.is_empty())
    }

    async fn commit(&self, message: &str) -> Result<String, WorkspaceError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commit {
            return Err(WorkspaceError::Git("index is locked".to_string()));
        }
        state.staged.clear();
        state.commits.push(message.to_string());
        Ok(format!("{:040x}", state.commits.len()))
    }

    async fn push(&self, branch: &str) -> Result<(), WorkspaceError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_push {
            return Err(WorkspaceError::Push {
                branch: branch.to_string(),
                message: "remote rejected".to_string(),
            });
        }
        state.pushes.push(branch.to_string());
        Ok(())
    }
}
