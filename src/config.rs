//! Runtime configuration for autofix.
//!
//! Configuration is resolved once at startup and passed explicitly to every
//! component. Layers, lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. `.autofix/autofix.toml` in the workspace root
//! 3. Environment variables (a `.env` file is loaded first)
//! 4. CLI flags (applied by the caller)
//!
//! # Configuration File Format
//!
//! ```toml
//! [hosting]
//! base_branch = "main"
//! timeout_secs = 30
//!
//! [completion]
//! model = "gpt-4-turbo"
//! fix_temperature = 0.2
//!
//! [context]
//! default_paths = ["src/main/java", "pom.xml", "README.md"]
//!
//! [[verifier.checks]]
//! name = "Unit Tests"
//! command = ["mvn", "test"]
//!
//! [recovery]
//! critical_scripts = ["ai_implementation.py"]
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Location of the settings file, relative to the workspace root.
pub const SETTINGS_FILE: &str = ".autofix/autofix.toml";

/// `owner/repo` identifier of the hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoSlug {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| ConfigError::InvalidRepository(raw.to_string()))?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(ConfigError::InvalidRepository(raw.to_string()));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostingSettings {
    pub api_url: String,
    pub timeout_secs: u64,
    pub base_branch: String,
}

impl Default for HostingSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            timeout_secs: 30,
            base_branch: "main".to_string(),
        }
    }
}

impl HostingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    /// OpenAI-compatible chat completions endpoint
    pub api_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Low temperature for code generation
    pub fix_temperature: f32,
    /// Used for conversational replies (analysis, triage)
    pub reply_temperature: f32,
    pub fix_max_tokens: u32,
    pub reply_max_tokens: u32,
    pub rank_max_tokens: u32,
    pub regenerate_max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4-turbo".to_string(),
            timeout_secs: 120,
            fix_temperature: 0.2,
            reply_temperature: 0.3,
            fix_max_tokens: 3000,
            reply_max_tokens: 1500,
            rank_max_tokens: 500,
            regenerate_max_tokens: 4000,
        }
    }
}

impl CompletionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Marker that introduces a command in a comment, e.g. `/ai fix`
    pub prefix: String,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            prefix: "/ai".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub max_ranked_files: usize,
    pub max_tree_paths: usize,
    /// Files longer than this many characters are cut to a head+tail window
    pub truncate_threshold: usize,
    pub head_chars: usize,
    pub tail_chars: usize,
    /// Aggregate character budget across all selected files
    pub total_budget: usize,
    pub max_file_bytes: u64,
    pub max_files_per_directory: usize,
    pub default_paths: Vec<String>,
    pub source_extensions: Vec<String>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_ranked_files: 5,
            max_tree_paths: 100,
            truncate_threshold: 2000,
            head_chars: 1000,
            tail_chars: 1000,
            total_budget: 24_000,
            max_file_bytes: 100_000,
            max_files_per_directory: 10,
            default_paths: vec![
                "src/main/java".to_string(),
                "pom.xml".to_string(),
                "README.md".to_string(),
            ],
            source_extensions: [".java", ".yml", ".xml", ".rs", ".py"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// A single verifier check, run without a shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckCommand {
    pub name: String,
    pub command: Vec<String>,
}

impl CheckCommand {
    pub fn new(name: &str, command: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Text markers used to classify verifier output, checked in this precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureMarkers {
    pub test_failure: Vec<String>,
    pub style_violation: Vec<String>,
    pub static_analysis: Vec<String>,
}

impl Default for FailureMarkers {
    fn default() -> Self {
        Self {
            test_failure: vec![
                "There are test failures".to_string(),
                "Tests in error".to_string(),
                "COMPILATION ERROR".to_string(),
            ],
            style_violation: vec!["Checkstyle violations".to_string(), "checkstyle".to_string()],
            static_analysis: vec!["SpotBugs violations".to_string(), "spotbugs".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    pub timeout_secs: u64,
    pub checks: Vec<CheckCommand>,
    pub markers: FailureMarkers,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 900,
            checks: vec![
                CheckCommand::new("Unit Tests", &["mvn", "test"]),
                CheckCommand::new("Checkstyle", &["mvn", "checkstyle:check"]),
                CheckCommand::new("SpotBugs", &["mvn", "spotbugs:check"]),
            ],
            markers: FailureMarkers::default(),
        }
    }
}

impl VerifierSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub scripts_dir: String,
    pub workflows_dir: String,
    pub critical_scripts: Vec<String>,
    pub critical_workflows: Vec<String>,
    pub required_dirs: Vec<String>,
    /// Log files created as empty JSON arrays inside the dashboard data dir
    pub data_files: Vec<String>,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        let to_strings =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            scripts_dir: ".github/scripts".to_string(),
            workflows_dir: ".github/workflows".to_string(),
            critical_scripts: to_strings(&[
                "ai_conversation_responder.py",
                "ai_implementation.py",
                "ai_triage_issue.py",
                "self_test_and_fix.py",
                "auto_fix_workflows.py",
                "system_recovery.py",
            ]),
            critical_workflows: to_strings(&[
                "ai_improvement_pr.yml",
                "issue_triage.yml",
                "pr_comment_response.yml",
                "self_test_and_fix.yml",
                "auto_fix_system.yml",
            ]),
            required_dirs: to_strings(&[
                ".github",
                ".github/scripts",
                ".github/workflows",
                "dashboard",
                "dashboard/src",
                "dashboard/src/data",
                "dashboard/src/pages",
                "dashboard/src/components",
                "dashboard/public",
                "docs",
                "docs/images",
            ]),
            data_files: to_strings(&[
                "ai_interactions.json",
                "ai_implementations.json",
                "issue_triage_logs.json",
                "health_check_logs.json",
                "self_test_logs.json",
                "auto_fix_logs.json",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub data_dir: String,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            data_dir: "dashboard/src/data".to_string(),
        }
    }
}

/// Everything that can be set in `.autofix/autofix.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hosting: HostingSettings,
    pub completion: CompletionSettings,
    pub commands: CommandSettings,
    pub context: ContextSettings,
    pub verifier: VerifierSettings,
    pub recovery: RecoverySettings,
    pub dashboard: DashboardSettings,
}

impl Settings {
    /// Load settings from the workspace. Returns defaults if the file doesn't exist.
    pub fn load(workspace_root: &Path) -> Result<Self, ConfigError> {
        let path = workspace_root.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path,
            message: e.to_string(),
        })
    }
}

/// Fully resolved configuration for one pipeline invocation.
#[derive(Clone)]
pub struct Config {
    pub repository: RepoSlug,
    pub github_token: String,
    pub completion_api_key: String,
    pub workspace_root: PathBuf,
    pub event_path: Option<PathBuf>,
    pub settings: Settings,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("repository", &self.repository)
            .field("github_token", &"<redacted>")
            .field("completion_api_key", &"<redacted>")
            .field("workspace_root", &self.workspace_root)
            .field("event_path", &self.event_path)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Config {
    /// Resolve configuration from the process environment.
    ///
    /// `workspace` overrides `GITHUB_WORKSPACE`, which in turn defaults to the
    /// current directory.
    pub fn load(workspace: Option<PathBuf>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(workspace, |key| std::env::var(key).ok())
    }

    /// Resolve configuration using `lookup` for environment values.
    pub fn from_lookup<F>(workspace: Option<PathBuf>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let github_token = non_empty("GITHUB_TOKEN").ok_or(ConfigError::MissingVar("GITHUB_TOKEN"))?;
        let completion_api_key =
            non_empty("OPENAI_API_KEY").ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;
        let repository: RepoSlug = non_empty("GITHUB_REPOSITORY")
            .ok_or(ConfigError::MissingVar("GITHUB_REPOSITORY"))?
            .parse()?;

        let workspace_root = match workspace {
            Some(dir) => dir,
            None => match non_empty("GITHUB_WORKSPACE") {
                Some(dir) => PathBuf::from(dir),
                None => std::env::current_dir().map_err(|source| ConfigError::Read {
                    path: PathBuf::from("."),
                    source,
                })?,
            },
        };

        let mut settings = Settings::load(&workspace_root)?;
        if let Some(model) = non_empty("AUTOFIX_MODEL") {
            settings.completion.model = model;
        }
        if let Some(url) = non_empty("AUTOFIX_COMPLETION_URL") {
            settings.completion.api_url = url;
        }
        if let Some(url) = non_empty("GITHUB_API_URL") {
            settings.hosting.api_url = url;
        }

        Ok(Self {
            repository,
            github_token,
            completion_api_key,
            workspace_root,
            event_path: non_empty("GITHUB_EVENT_PATH").map(PathBuf::from),
            settings,
        })
    }

    /// Directory holding the append-only dashboard log files.
    pub fn dashboard_dir(&self) -> PathBuf {
        self.workspace_root.join(&self.settings.dashboard.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("GITHUB_TOKEN", "ghs_test"),
        ("OPENAI_API_KEY", "sk-test"),
        ("GITHUB_REPOSITORY", "octo/widgets"),
    ];

    #[test]
    fn test_repo_slug_parse() {
        let slug: RepoSlug = "octo/widgets".parse().unwrap();
        assert_eq!(slug.owner, "octo");
        assert_eq!(slug.name, "widgets");
        assert_eq!(slug.to_string(), "octo/widgets");
    }

    #[test]
    fn test_repo_slug_rejects_malformed() {
        assert!("widgets".parse::<RepoSlug>().is_err());
        assert!("/widgets".parse::<RepoSlug>().is_err());
        assert!("octo/".parse::<RepoSlug>().is_err());
        assert!("octo/widgets/extra".parse::<RepoSlug>().is_err());
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_lookup(
            Some(dir.path().to_path_buf()),
            env(&[("OPENAI_API_KEY", "k"), ("GITHUB_REPOSITORY", "o/r")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("GITHUB_TOKEN")));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_lookup(
            Some(dir.path().to_path_buf()),
            env(&[
                ("GITHUB_TOKEN", "t"),
                ("OPENAI_API_KEY", "  "),
                ("GITHUB_REPOSITORY", "o/r"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("OPENAI_API_KEY")));
    }

    #[test]
    fn test_invalid_repository_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_lookup(
            Some(dir.path().to_path_buf()),
            env(&[
                ("GITHUB_TOKEN", "t"),
                ("OPENAI_API_KEY", "k"),
                ("GITHUB_REPOSITORY", "not-a-slug"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRepository(_)));
    }

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_lookup(Some(dir.path().to_path_buf()), env(REQUIRED)).unwrap();
        assert_eq!(config.repository.to_string(), "octo/widgets");
        assert_eq!(config.settings.hosting.base_branch, "main");
        assert_eq!(config.settings.commands.prefix, "/ai");
        assert_eq!(config.settings.context.max_ranked_files, 5);
        assert_eq!(config.settings.verifier.checks.len(), 3);
        assert_eq!(config.settings.recovery.critical_workflows.len(), 5);
        assert!(config.event_path.is_none());
    }

    #[test]
    fn test_settings_file_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".autofix")).unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"
[hosting]
base_branch = "develop"

[completion]
model = "gpt-4o-mini"

[[verifier.checks]]
name = "cargo"
command = ["cargo", "test"]
"#,
        )
        .unwrap();

        let config = Config::from_lookup(Some(dir.path().to_path_buf()), env(REQUIRED)).unwrap();
        assert_eq!(config.settings.hosting.base_branch, "develop");
        assert_eq!(config.settings.hosting.timeout_secs, 30);
        assert_eq!(config.settings.completion.model, "gpt-4o-mini");
        assert_eq!(config.settings.completion.fix_temperature, 0.2);
        assert_eq!(
            config.settings.verifier.checks,
            vec![CheckCommand::new("cargo", &["cargo", "test"])]
        );
        // Markers keep their defaults when only checks are overridden
        assert_eq!(config.settings.verifier.markers.test_failure.len(), 3);
    }

    #[test]
    fn test_env_overrides_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".autofix")).unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            "[completion]\nmodel = \"from-file\"\n",
        )
        .unwrap();
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("AUTOFIX_MODEL", "from-env"));
        pairs.push(("GITHUB_EVENT_PATH", "/tmp/event.json"));

        let config = Config::from_lookup(Some(dir.path().to_path_buf()), env(&pairs)).unwrap();
        assert_eq!(config.settings.completion.model, "from-env");
        assert_eq!(config.event_path, Some(PathBuf::from("/tmp/event.json")));
    }

    #[test]
    fn test_invalid_settings_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".autofix")).unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "not valid toml {{{{").unwrap();
        let err = Config::from_lookup(Some(dir.path().to_path_buf()), env(REQUIRED)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_lookup(Some(dir.path().to_path_buf()), env(REQUIRED)).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("ghs_test"));
        assert!(!debug.contains("sk-test"));
    }
}
