//! Context assembly for fix generation.
//!
//! Selection is two-stage: the completion service ranks the most relevant
//! paths from the repository tree, then their contents are fetched through
//! the hosting API. Every file is cut to a head+tail window when it is long,
//! and the aggregate stays within `total_budget` characters.

use std::collections::HashSet;
use std::sync::Arc;

use crate::completion::decode::extract_json_array;
use crate::completion::{CompletionRequest, CompletionService, Decoded, request_decoded};
use crate::config::{CompletionSettings, ContextSettings};
use crate::errors::ParseError;
use crate::hosting::HostingApi;
use crate::util::{tail_chars, truncate_chars};

pub const TRUNCATION_MARKER: &str = "\n... (content truncated) ...\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Ranked,
    DefaultPaths,
}

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub files: Vec<ContextFile>,
    pub source: SelectionSource,
}

impl AssembledContext {
    pub fn total_chars(&self) -> usize {
        self.files.iter().map(|f| f.content.chars().count()).sum()
    }
}

/// Keep the first `head` and last `tail` characters around a marker when
/// `content` is longer than `threshold` characters.
pub fn truncate_window(content: &str, threshold: usize, head: usize, tail: usize) -> (String, bool) {
    if content.chars().count() <= threshold {
        return (content.to_string(), false);
    }
    let mut out = String::with_capacity(head + tail + TRUNCATION_MARKER.len());
    out.push_str(truncate_chars(content, head));
    out.push_str(TRUNCATION_MARKER);
    out.push_str(tail_chars(content, tail));
    (out, true)
}

fn parse_ranked_paths(text: &str) -> Result<Vec<String>, ParseError> {
    let flattened = text.replace('\n', " ");
    let array = extract_json_array(&flattened).ok_or_else(|| ParseError::new("ranked paths", "no JSON array found"))?;
    let paths: Vec<String> = serde_json::from_str(array).map_err(|e| ParseError::new("ranked paths", e.to_string()))?;
    let paths: Vec<String> = paths
        .into_iter()
        .map(|p| p.trim().trim_start_matches("./").to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if paths.is_empty() {
        return Err(ParseError::new("ranked paths", "empty list"));
    }
    Ok(paths)
}

pub struct ContextAssembler {
    hosting: Arc<dyn HostingApi>,
    completion: Arc<dyn CompletionService>,
    settings: ContextSettings,
    temperature: f32,
    max_tokens: u32,
}

impl ContextAssembler {
    pub fn new(
        hosting: Arc<dyn HostingApi>,
        completion: Arc<dyn CompletionService>,
        settings: &ContextSettings,
        completion_settings: &CompletionSettings,
    ) -> Self {
        Self {
            hosting,
            completion,
            settings: settings.clone(),
            temperature: completion_settings.reply_temperature,
            max_tokens: completion_settings.rank_max_tokens,
        }
    }

    pub fn truncate(&self, content: &str) -> (String, bool) {
        truncate_window(
            content,
            self.settings.truncate_threshold,
            self.settings.head_chars,
            self.settings.tail_chars,
        )
    }

    fn is_source_file(&self, path: &str) -> bool {
        self.settings
            .source_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }

    /// Select and fetch the files most relevant to `issue_text` at `reference`.
    pub async fn assemble(&self, issue_text: &str, reference: &str) -> AssembledContext {
        let tree = match self.hosting.list_file_tree(reference).await {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list repository tree");
                Vec::new()
            }
        };

        let (selected, source) = match self.rank(issue_text, &tree).await {
            Some(paths) => (paths, SelectionSource::Ranked),
            None => {
                tracing::info!("Using default context paths");
                (self.settings.default_paths.clone(), SelectionSource::DefaultPaths)
            }
        };

        let paths = self.expand(&selected, &tree);
        let files = self.fetch(&paths, reference).await;
        tracing::info!(files = files.len(), source = ?source, "Assembled context");
        AssembledContext { files, source }
    }

    async fn rank(&self, issue_text: &str, tree: &[String]) -> Option<Vec<String>> {
        let candidates: Vec<&str> = tree
            .iter()
            .filter(|p| self.is_source_file(p))
            .take(self.settings.max_tree_paths)
            .map(String::as_str)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let prompt = format!(
            "Given the following GitHub issue and list of files in the repository, identify which files \
             are most likely to be relevant for fixing the issue. Only include files that are directly \
             related to the issue and would need to be modified.\n\n\
             Issue: {issue}\n\n\
             Files in the repository:\n{files}\n\n\
             Return a JSON array of file paths (maximum {max}) that are most relevant. Example format:\n\
             [\"src/main/App.java\", \"config.yml\"]",
            issue = issue_text,
            files = candidates.join("\n"),
            max = self.settings.max_ranked_files,
        );

        let request = CompletionRequest::new(prompt, self.temperature, self.max_tokens);
        match request_decoded(self.completion.as_ref(), &request, parse_ranked_paths).await {
            Decoded::Ok(mut paths) => {
                paths.truncate(self.settings.max_ranked_files);
                Some(paths)
            }
            Decoded::Malformed(_) | Decoded::Unavailable(_) => None,
        }
    }

    /// Resolve directory paths to their first files and drop duplicates.
    fn expand(&self, selected: &[String], tree: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for path in selected {
            let path = path.trim_end_matches('/');
            if tree.is_empty() || tree.iter().any(|p| p == path) {
                if seen.insert(path.to_string()) {
                    out.push(path.to_string());
                }
                continue;
            }

            let prefix = format!("{}/", path);
            let children: Vec<&String> = tree
                .iter()
                .filter(|p| p.starts_with(&prefix) && self.is_source_file(p))
                .take(self.settings.max_files_per_directory)
                .collect();
            if children.is_empty() {
                tracing::debug!(path, "Selected path not in repository tree");
            }
            for child in children {
                if seen.insert(child.clone()) {
                    out.push(child.clone());
                }
            }
        }
        out
    }

    async fn fetch(&self, paths: &[String], reference: &str) -> Vec<ContextFile> {
        let mut files = Vec::new();
        let mut used = 0usize;

        for path in paths {
            let remaining = self.settings.total_budget.saturating_sub(used);
            if remaining == 0 {
                tracing::debug!(path = %path, "Context budget exhausted");
                break;
            }

            let content = match self.hosting.get_file_content(path, reference).await {
                Ok(Some(content)) => content,
                Ok(None) => {
                    tracing::debug!(path = %path, "Context file not found");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to fetch context file");
                    continue;
                }
            };
            if content.len() as u64 > self.settings.max_file_bytes {
                tracing::debug!(path = %path, bytes = content.len(), "Skipping oversized file");
                continue;
            }

            let (mut content, mut truncated) = self.truncate(&content);
            let len = content.chars().count();
            if len > remaining {
                // Not enough room for even a minimal window
                if remaining <= TRUNCATION_MARKER.len() * 2 {
                    break;
                }
                let room = remaining - TRUNCATION_MARKER.len();
                let head = room / 2;
                (content, truncated) = truncate_window(&content, remaining, head, room - head);
            }

            used += content.chars().count();
            files.push(ContextFile {
                path: path.clone(),
                content,
                truncated,
            });
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCompletion, FakeHosting};

    fn assembler(hosting: Arc<FakeHosting>, completion: Arc<FakeCompletion>, settings: ContextSettings) -> ContextAssembler {
        ContextAssembler::new(hosting, completion, &settings, &CompletionSettings::default())
    }

    #[test]
    fn test_truncate_window_keeps_head_and_tail() {
        let content = format!("{}{}{}", "a".repeat(1500), "b".repeat(500), "c".repeat(1000));
        let (out, truncated) = truncate_window(&content, 2000, 1000, 1000);
        assert!(truncated);
        assert!(out.starts_with(&"a".repeat(1000)));
        assert!(out.ends_with(&"c".repeat(1000)));
        assert!(out.contains("... (content truncated) ..."));
        assert!(!out.contains('b'));
    }

    #[test]
    fn test_truncate_window_short_content_untouched() {
        let (out, truncated) = truncate_window("class A {}", 2000, 1000, 1000);
        assert_eq!(out, "class A {}");
        assert!(!truncated);
    }

    #[test]
    fn test_parse_ranked_paths() {
        let paths = parse_ranked_paths("Here:\n[\"src/A.java\",\n \"./pom.xml\", \"\"]").unwrap();
        assert_eq!(paths, vec!["src/A.java", "pom.xml"]);
        assert!(parse_ranked_paths("[]").is_err());
        assert!(parse_ranked_paths("no list").is_err());
    }

    #[tokio::test]
    async fn test_ranked_selection_fetches_files() {
        let hosting = FakeHosting::new();
        hosting.set_tree(&["src/A.java", "src/B.java", "pom.xml"]);
        hosting.set_file("src/B.java", "class B {}");
        hosting.set_file("pom.xml", "<project/>");
        let completion = FakeCompletion::new(vec![Ok("[\"src/B.java\", \"pom.xml\", \"missing.java\"]".into())]);

        let ctx = assembler(hosting, completion.clone(), ContextSettings::default())
            .assemble("B is broken", "main")
            .await;

        assert_eq!(ctx.source, SelectionSource::Ranked);
        let paths: Vec<_> = ctx.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/B.java", "pom.xml"]);
        let prompt = &completion.requests()[0].prompt;
        assert!(prompt.contains("src/A.java"));
        assert!(prompt.contains("B is broken"));
    }

    #[tokio::test]
    async fn test_ranking_limited_to_max_files() {
        let hosting = FakeHosting::new();
        let tree: Vec<String> = (0..8).map(|i| format!("F{}.java", i)).collect();
        let tree_refs: Vec<&str> = tree.iter().map(String::as_str).collect();
        hosting.set_tree(&tree_refs);
        for path in &tree {
            hosting.set_file(path, "x");
        }
        let ranked = serde_json::to_string(&tree).unwrap();
        let completion = FakeCompletion::new(vec![Ok(ranked)]);

        let ctx = assembler(hosting, completion, ContextSettings::default())
            .assemble("issue", "main")
            .await;
        assert_eq!(ctx.files.len(), 5);
    }

    #[tokio::test]
    async fn test_unparsable_ranking_uses_default_paths_and_expands_directory() {
        let hosting = FakeHosting::new();
        let mut tree: Vec<String> = (0..12).map(|i| format!("src/main/java/C{:02}.java", i)).collect();
        tree.push("pom.xml".into());
        tree.push("README.md".into());
        let tree_refs: Vec<&str> = tree.iter().map(String::as_str).collect();
        hosting.set_tree(&tree_refs);
        for path in &tree {
            hosting.set_file(path, "content");
        }
        let completion = FakeCompletion::new(vec![Ok("I would look at the main class.".into())]);

        let ctx = assembler(hosting, completion, ContextSettings::default())
            .assemble("issue", "main")
            .await;

        assert_eq!(ctx.source, SelectionSource::DefaultPaths);
        let paths: Vec<_> = ctx.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths.len(), 12);
        assert_eq!(paths[0], "src/main/java/C00.java");
        assert_eq!(paths[9], "src/main/java/C09.java");
        assert_eq!(paths[10], "pom.xml");
        assert_eq!(paths[11], "README.md");
    }

    #[tokio::test]
    async fn test_oversized_files_skipped_and_budget_respected() {
        let hosting = FakeHosting::new();
        hosting.set_tree(&["big.java", "a.java", "b.java", "c.java"]);
        hosting.set_file("big.java", &"x".repeat(200));
        hosting.set_file("a.java", &"a".repeat(3000));
        hosting.set_file("b.java", &"b".repeat(3000));
        hosting.set_file("c.java", &"c".repeat(3000));
        let completion = FakeCompletion::new(vec![Ok("[\"big.java\", \"a.java\", \"b.java\", \"c.java\"]".into())]);

        let settings = ContextSettings {
            max_file_bytes: 150,
            ..ContextSettings::default()
        };
        let ctx = assembler(hosting.clone(), completion, settings).assemble("i", "main").await;
        assert!(ctx.files.iter().all(|f| f.path != "big.java"));
        assert!(ctx.files.iter().all(|f| f.truncated));

        let hosting2 = FakeHosting::new();
        hosting2.set_tree(&["a.java", "b.java", "c.java"]);
        hosting2.set_file("a.java", &"a".repeat(3000));
        hosting2.set_file("b.java", &"b".repeat(3000));
        hosting2.set_file("c.java", &"c".repeat(3000));
        let completion = FakeCompletion::new(vec![Ok("[\"a.java\", \"b.java\", \"c.java\"]".into())]);
        let tight = ContextSettings {
            total_budget: 3000,
            ..ContextSettings::default()
        };
        let ctx = assembler(hosting2, completion, tight).assemble("i", "main").await;
        assert!(ctx.total_chars() <= 3000);
        assert_eq!(ctx.files.len(), 2);
    }

    #[tokio::test]
    async fn test_tree_failure_falls_back_to_default_paths() {
        let hosting = FakeHosting::new();
        hosting.fail_tree();
        hosting.set_file("README.md", "# readme");
        let completion = FakeCompletion::new(vec![]);

        let ctx = assembler(hosting, completion.clone(), ContextSettings::default())
            .assemble("issue", "main")
            .await;
        assert_eq!(ctx.source, SelectionSource::DefaultPaths);
        assert_eq!(ctx.files.len(), 1);
        assert_eq!(ctx.files[0].path, "README.md");
        assert!(completion.requests().is_empty());
    }
}
