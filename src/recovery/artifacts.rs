//! The critical set and its syntactic checks.

use std::cell::RefCell;
use std::fmt;

use tree_sitter::Parser;

use crate::config::RecoverySettings;

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A failed set_language surfaces as a failed parse below
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Script,
    Workflow,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Script => f.write_str("script"),
            ArtifactKind::Workflow => f.write_str("workflow"),
        }
    }
}

/// One file the pipeline cannot run without.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineArtifact {
    pub name: String,
    pub kind: ArtifactKind,
    /// Workspace-relative location.
    pub path: String,
}

impl PipelineArtifact {
    pub fn new(name: &str, kind: ArtifactKind, dir: &str) -> Self {
        let dir = dir.trim_end_matches('/');
        Self {
            name: name.to_string(),
            kind,
            path: format!("{}/{}", dir, name),
        }
    }

    /// What the artifact does, derived from its name.
    pub fn purpose(&self) -> &'static str {
        let table: &[(&str, &str)] = match self.kind {
            ArtifactKind::Script => &[
                (
                    "conversation_responder",
                    "Script that responds to issue and pull request comments with helpful answers generated through the completion API",
                ),
                (
                    "implementation",
                    "Script that generates code changes for issues labeled 'ai-fix' or 'ai-implement' and opens a pull request",
                ),
                (
                    "triage",
                    "Script that analyzes new issues, categorizes them and applies appropriate labels",
                ),
                (
                    "self_test",
                    "Script that runs the repository's checks and reports or fixes the problems it finds",
                ),
                (
                    "auto_fix",
                    "Script that repairs failing workflow files and other automation scripts",
                ),
                (
                    "recovery",
                    "Script that recovers the automation system by regenerating missing or corrupted files",
                ),
            ],
            ArtifactKind::Workflow => &[
                ("improvement", "Workflow that triggers on the 'ai-fix' label to open a pull request with a fix"),
                ("issue_triage", "Workflow that analyzes and categorizes newly opened issues"),
                ("comment_response", "Workflow that responds to comments on issues and pull requests"),
                ("self_test", "Workflow that regularly runs the repository's checks"),
                ("auto_fix", "Workflow that repairs workflows and scripts when they fail"),
            ],
        };

        table
            .iter()
            .find(|(key, _)| self.name.contains(key))
            .map(|(_, purpose)| *purpose)
            .unwrap_or(match self.kind {
                ArtifactKind::Script => "A script for the autonomous development system",
                ArtifactKind::Workflow => "A workflow for the autonomous development system",
            })
    }

    /// Check `content` for this artifact's format.
    pub fn validate(&self, content: &str) -> Result<(), String> {
        if content.trim().is_empty() {
            return Err("file is empty".to_string());
        }
        match self.kind {
            ArtifactKind::Workflow => validate_workflow(content),
            ArtifactKind::Script if self.name.ends_with(".py") => validate_python(content),
            ArtifactKind::Script if self.name.ends_with(".sh") => {
                if content.starts_with("#!") {
                    Ok(())
                } else {
                    Err("missing shebang".to_string())
                }
            }
            ArtifactKind::Script => Ok(()),
        }
    }
}

fn validate_python(content: &str) -> Result<(), String> {
    let tree = PYTHON_PARSER
        .with(|p| p.borrow_mut().parse(content, None))
        .ok_or_else(|| "python parser unavailable".to_string())?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(format!(
            "python syntax error near line {}",
            first_error_line(&root).map(|l| l + 1).unwrap_or(0)
        ));
    }
    Ok(())
}

fn first_error_line(node: &tree_sitter::Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error()
            && let Some(line) = first_error_line(&child)
        {
            return Some(line);
        }
    }
    None
}

fn validate_workflow(content: &str) -> Result<(), String> {
    let value: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| format!("invalid YAML: {}", e))?;
    let mapping = value
        .as_mapping()
        .ok_or_else(|| "workflow is not a mapping".to_string())?;
    if !mapping.contains_key("jobs") {
        return Err("workflow has no jobs".to_string());
    }
    Ok(())
}

/// Every artifact named in the recovery settings, scripts first.
pub fn critical_set(settings: &RecoverySettings) -> Vec<PipelineArtifact> {
    let scripts = settings
        .critical_scripts
        .iter()
        .map(|name| PipelineArtifact::new(name, ArtifactKind::Script, &settings.scripts_dir));
    let workflows = settings
        .critical_workflows
        .iter()
        .map(|name| PipelineArtifact::new(name, ArtifactKind::Workflow, &settings.workflows_dir));
    scripts.chain(workflows).collect()
}
