//! Build/test/static-analysis toolchain seam and output classification.
//!
//! The [`Verifier`] trait abstracts running the toolchain against a working
//! tree. [`classify`] turns raw output into a [`VerificationResult`] using the
//! configured text markers, checked in a fixed precedence:
//! test failure, then style violation, then static analysis.

mod command;

pub use command::CommandVerifier;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::FailureMarkers;
use crate::errors::TransportError;

/// Raw result of one verifier run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifierOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl VerifierOutput {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// stdout and stderr joined, the text markers are searched in.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    TestFailure,
    StyleViolation,
    StaticAnalysis,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::TestFailure => "test_failure",
            FailureCategory::StyleViolation => "style_violation",
            FailureCategory::StaticAnalysis => "static_analysis",
            FailureCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub category: FailureCategory,
    pub diagnostic: String,
}

impl VerificationResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            category: FailureCategory::Unknown,
            diagnostic: String::new(),
        }
    }

    pub fn fail(category: FailureCategory, diagnostic: impl Into<String>) -> Self {
        Self {
            passed: false,
            category,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Runs the project's checks against a working tree.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn run(&self, target: &Path) -> Result<VerifierOutput, TransportError>;
}

/// Classify verifier output. A zero exit code always passes.
pub fn classify(output: &VerifierOutput, markers: &FailureMarkers) -> VerificationResult {
    if output.exit_code == 0 {
        return VerificationResult::pass();
    }

    let text = output.combined();
    let contains_any = |needles: &[String]| needles.iter().any(|m| text.contains(m.as_str()));

    let category = if contains_any(&markers.test_failure) {
        FailureCategory::TestFailure
    } else if contains_any(&markers.style_violation) {
        FailureCategory::StyleViolation
    } else if contains_any(&markers.static_analysis) {
        FailureCategory::StaticAnalysis
    } else {
        FailureCategory::Unknown
    };

    VerificationResult::fail(category, text)
}
