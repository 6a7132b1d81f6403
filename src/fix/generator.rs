use std::fmt::Write as _;
use std::sync::Arc;

use super::FixDescriptor;
use crate::completion::{CompletionRequest, CompletionService, Decoded, request_decoded};
use crate::config::CompletionSettings;
use crate::context::{ContextFile, truncate_window};
use crate::events::FixMode;
use crate::hosting::Issue;
use crate::verifier::VerificationResult;

/// Diagnostics are long build logs; the tail usually carries the error.
const DIAGNOSTIC_LIMIT: usize = 6000;
const DIAGNOSTIC_HEAD: usize = 1500;
const DIAGNOSTIC_TAIL: usize = 4500;

const OUTPUT_CONTRACT: &str = r#"Provide your solution in the following format:
```json
{
  "changes": [
    {
      "path": "path/to/file1",
      "action": "modify",
      "original": "exact code segment to replace",
      "replacement": "new code segment"
    },
    {
      "path": "path/to/file2",
      "action": "create",
      "content": "entire content of new file"
    }
  ],
  "explanation": "A clear explanation of the changes and how they fix the issue."
}
```

IMPORTANT: For 'modify' actions, 'original' must contain the EXACT text to be replaced, including all
whitespace and indentation. Do not use placeholders or partial code snippets in the 'original' field."#;

/// What the generated fix should address.
#[derive(Debug, Clone, Copy)]
pub enum FixTarget<'a> {
    Issue { issue: &'a Issue, mode: FixMode },
    Verification {
        issue: Option<&'a Issue>,
        result: &'a VerificationResult,
    },
}

fn render_files(files: &[ContextFile]) -> String {
    let mut out = String::new();
    for file in files {
        let _ = write!(out, "\nFile: {}\n```\n{}\n```\n", file.path, file.content);
    }
    out
}

pub fn build_prompt(target: &FixTarget<'_>, files: &[ContextFile]) -> String {
    let file_section = if files.is_empty() {
        "No repository files could be retrieved.".to_string()
    } else {
        format!("Here are the relevant files from the repository:\n{}", render_files(files))
    };

    let task = match target {
        FixTarget::Issue { issue, mode } => {
            let goal = match mode {
                FixMode::Fix => "fixing a GitHub issue by generating code changes",
                FixMode::Implement => "implementing the feature requested in a GitHub issue by generating code changes",
            };
            format!(
                "You are a software developer {goal}.\n\n\
                 Issue Title: {title}\n\
                 Issue Description: {body}",
                title = issue.title,
                body = if issue.body.is_empty() { "No description provided" } else { issue.body.as_str() },
            )
        }
        FixTarget::Verification { issue, result } => {
            let (diagnostic, _) = truncate_window(&result.diagnostic, DIAGNOSTIC_LIMIT, DIAGNOSTIC_HEAD, DIAGNOSTIC_TAIL);
            let origin = match issue {
                Some(issue) => format!("while fixing issue #{} ({})", issue.number, issue.title),
                None => "during a scheduled self-test".to_string(),
            };
            format!(
                "You are a software developer. The project's checks reported a {category} {origin}.\n\n\
                 Here is the error output:\n```\n{diagnostic}\n```",
                category = result.category,
            )
        }
    };

    format!(
        "{task}\n\n{file_section}\n\n\
         Follow these guidelines:\n\
         1. Understand the problem thoroughly before making changes.\n\
         2. Keep changes minimal and focused.\n\
         3. Maintain the existing code style and architecture.\n\
         4. Only modify files that need to be changed.\n\
         5. If a file needs to be created, provide the full content.\n\n\
         {OUTPUT_CONTRACT}"
    )
}

/// Produces a [`FixDescriptor`] from an issue or a failed verification.
pub struct FixGenerator {
    completion: Arc<dyn CompletionService>,
    temperature: f32,
    max_tokens: u32,
}

impl FixGenerator {
    pub fn new(completion: Arc<dyn CompletionService>, settings: &CompletionSettings) -> Self {
        Self {
            completion,
            temperature: settings.fix_temperature,
            max_tokens: settings.fix_max_tokens,
        }
    }

    pub async fn generate(&self, target: &FixTarget<'_>, files: &[ContextFile]) -> Decoded<FixDescriptor> {
        let request = CompletionRequest::new(build_prompt(target, files), self.temperature, self.max_tokens);
        request_decoded(self.completion.as_ref(), &request, FixDescriptor::parse).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCompletion, issue};
    use crate::verifier::FailureCategory;

    fn files() -> Vec<ContextFile> {
        vec![ContextFile {
            path: "src/App.java".into(),
            content: "class App {}".into(),
            truncated: false,
        }]
    }

    #[test]
    fn test_issue_prompt_contains_issue_and_files() {
        let i = issue(7, "Crash on load", "NPE in App");
        let prompt = build_prompt(&FixTarget::Issue { issue: &i, mode: FixMode::Fix }, &files());
        assert!(prompt.contains("Crash on load"));
        assert!(prompt.contains("NPE in App"));
        assert!(prompt.contains("File: src/App.java"));
        assert!(prompt.contains("\"action\": \"modify\""));
    }

    #[test]
    fn test_implement_prompt_wording() {
        let i = issue(8, "Dark mode", "");
        let prompt = build_prompt(&FixTarget::Issue { issue: &i, mode: FixMode::Implement }, &[]);
        assert!(prompt.contains("implementing the feature"));
        assert!(prompt.contains("No description provided"));
        assert!(prompt.contains("No repository files could be retrieved."));
    }

    #[test]
    fn test_verification_prompt_truncates_long_diagnostic() {
        let diagnostic = format!("{}{}", "head ".repeat(2000), "FINAL ERROR");
        let result = VerificationResult::fail(FailureCategory::TestFailure, diagnostic);
        let prompt = build_prompt(&FixTarget::Verification { issue: None, result: &result }, &[]);
        assert!(prompt.contains("test_failure during a scheduled self-test"));
        assert!(prompt.contains("FINAL ERROR"));
        assert!(prompt.contains("(content truncated)"));
    }

    #[tokio::test]
    async fn test_generate_uses_fix_parameters() {
        let completion = FakeCompletion::new(vec![Ok(
            r#"{"changes": [{"path": "a.txt", "action": "create", "content": "x"}], "explanation": "adds a"}"#.into(),
        )]);
        let generator = FixGenerator::new(completion.clone(), &CompletionSettings::default());
        let i = issue(1, "t", "b");
        let decoded = generator
            .generate(&FixTarget::Issue { issue: &i, mode: FixMode::Fix }, &[])
            .await;
        assert_eq!(decoded.ok().unwrap().explanation, "adds a");

        let req = &completion.requests()[0];
        assert_eq!(req.temperature, 0.2);
        assert_eq!(req.max_tokens, 3000);
    }

    #[tokio::test]
    async fn test_generate_malformed_is_not_a_crash() {
        let completion = FakeCompletion::new(vec![Ok("Sorry, I can't.".into())]);
        let generator = FixGenerator::new(completion, &CompletionSettings::default());
        let i = issue(1, "t", "b");
        let decoded = generator
            .generate(&FixTarget::Issue { issue: &i, mode: FixMode::Fix }, &[])
            .await;
        assert!(matches!(decoded, Decoded::Malformed(_)));
    }
}
