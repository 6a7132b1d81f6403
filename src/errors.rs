//! Typed error hierarchy for the autofix pipeline.
//!
//! The enums follow the failure taxonomy of the pipeline:
//! - `TransportError`: talking to the hosting API, completion service or verifier failed
//! - `ParseError`: completion output did not match the expected shape
//! - `WorkspaceError` / `ApplyError`: working-tree and per-change failures
//! - `ConfigError`: missing credentials or identifiers, fatal at startup
//! - `PipelineError`: umbrella used by the orchestrator

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::verifier::FailureCategory;

/// External collaborator a transport failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Hosting,
    Completion,
    Verifier,
    Git,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Hosting => write!(f, "hosting API"),
            Service::Completion => write!(f, "completion service"),
            Service::Verifier => write!(f, "verifier"),
            Service::Git => write!(f, "git"),
        }
    }
}

/// Network or process failure while talking to an external collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{service} request timed out")]
    Timeout { service: Service },

    #[error("{service} returned status {status}: {body}")]
    Status {
        service: Service,
        status: u16,
        body: String,
    },

    #[error("{service} request failed: {message}")]
    Request { service: Service, message: String },

    #[error("{service} response could not be decoded: {message}")]
    Decode { service: Service, message: String },
}

impl TransportError {
    pub fn service(&self) -> Service {
        match self {
            TransportError::Timeout { service }
            | TransportError::Status { service, .. }
            | TransportError::Request { service, .. }
            | TransportError::Decode { service, .. } => *service,
        }
    }

    /// Map a reqwest failure, keeping timeouts distinguishable.
    pub fn from_reqwest(service: Service, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout { service }
        } else if err.is_decode() {
            TransportError::Decode {
                service,
                message: err.to_string(),
            }
        } else {
            TransportError::Request {
                service,
                message: err.without_url().to_string(),
            }
        }
    }

    /// True when the remote answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::Status { status: 404, .. })
    }
}

/// Structured completion output did not match the expected shape.
#[derive(Debug, Error)]
#[error("Failed to parse {what}: {message}")]
pub struct ParseError {
    pub what: &'static str,
    pub message: String,
}

impl ParseError {
    pub fn new(what: &'static str, message: impl Into<String>) -> Self {
        Self {
            what,
            message: message.into(),
        }
    }
}

/// Failures of the local working tree.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Path '{0}' escapes the workspace")]
    InvalidPath(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Git error: {0}")]
    Git(String),

    #[error("Failed to push branch {branch}: {message}")]
    Push { branch: String, message: String },

    #[error("Git operation timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl From<git2::Error> for WorkspaceError {
    fn from(err: git2::Error) -> Self {
        WorkspaceError::Git(err.message().to_string())
    }
}

/// A single FileChange could not be applied. Never fatal for the descriptor.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Original snippet not found in {path}")]
    OriginalNotFound { path: String },

    #[error("Target file {path} does not exist")]
    TargetMissing { path: String },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// Missing or malformed configuration. Fatal: the run aborts before any side effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid repository '{0}', expected owner/repo")]
    InvalidRepository(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Errors surfaced by the orchestrator and the recovery supervisor.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("Verification failed: {category}")]
    Verification { category: FailureCategory },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
