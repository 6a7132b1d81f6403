//! Append-only dashboard logs.
//!
//! Each [`LogCategory`] is one JSON array file in the dashboard data
//! directory. Entries are only ever appended; nothing in the pipeline reads
//! them back. Write failures are non-essential and are logged, not returned.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Interactions,
    Implementations,
    Triage,
    HealthCheck,
    SelfTest,
    AutoFix,
}

impl LogCategory {
    pub fn file_name(&self) -> &'static str {
        match self {
            LogCategory::Interactions => "ai_interactions.json",
            LogCategory::Implementations => "ai_implementations.json",
            LogCategory::Triage => "issue_triage_logs.json",
            LogCategory::HealthCheck => "health_check_logs.json",
            LogCategory::SelfTest => "self_test_logs.json",
            LogCategory::AutoFix => "auto_fix_logs.json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<u64>,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl DashboardLogEntry {
    pub fn new(action: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: action.into(),
            issue: None,
            outcome: outcome.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn for_issue(mut self, issue: u64) -> Self {
        self.issue = Some(issue);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

pub struct DashboardLog {
    data_dir: PathBuf,
}

impl DashboardLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }

    pub fn path_for(&self, category: LogCategory) -> PathBuf {
        self.data_dir.join(category.file_name())
    }

    /// Append an entry. A missing, unreadable or corrupt file starts a fresh array.
    pub fn append(&self, category: LogCategory, entry: &DashboardLogEntry) -> Result<()> {
        let path = self.path_for(category);
        let mut entries: Vec<serde_json::Value> = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();

        entries.push(serde_json::to_value(entry).context("Failed to serialize log entry")?);

        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))?;
        let json = serde_json::to_string_pretty(&entries).context("Failed to serialize log")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Append and swallow failures.
    pub fn record(&self, category: LogCategory, entry: DashboardLogEntry) {
        if let Err(e) = self.append(category, &entry) {
            tracing::warn!(file = category.file_name(), error = %e, "Failed to write dashboard log");
        }
    }
}
