//! New-issue triage: model classification with a deterministic keyword fallback.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::completion::decode::decode_json_object;
use crate::completion::{CompletionRequest, CompletionService, Decoded, request_decoded};
use crate::config::CompletionSettings;
use crate::hosting::{Issue, RepositoryInfo};

pub const DEFAULT_RESPONSE: &str = "Thank you for your issue! Our team will look into it.";
pub const ATTENTION_LABEL: &str = "attention-needed";

/// Labels that already determine an issue's type.
const TYPE_LABELS: &[&str] = &["bug", "enhancement", "feature", "documentation", "question"];

/// Substring keyword table, first match wins.
const KEYWORD_TABLE: &[(&str, &[&str])] = &[
    ("bug", &["bug", "error", "fix", "issue", "problem", "crash"]),
    ("feature", &["feature", "add", "new"]),
    ("enhancement", &["enhance", "improve", "optimization"]),
    ("documentation", &["doc", "documentation", "explain"]),
    ("question", &["how", "?", "question", "help"]),
];

const DEFAULT_CATEGORY: &str = "enhancement";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageDecision {
    pub category: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub requires_attention: bool,
    #[serde(default = "default_complexity")]
    pub complexity: String,
    #[serde(default)]
    pub ai_fixable: bool,
}

fn default_complexity() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageSource {
    Model,
    KeywordFallback,
}

#[derive(Debug, Clone)]
pub struct TriageOutcome {
    pub decision: TriageDecision,
    pub source: TriageSource,
}

/// Category from existing type labels, then from keywords in title and body.
pub fn keyword_category(issue: &Issue) -> &'static str {
    for label in &issue.labels {
        if let Some(known) = TYPE_LABELS.iter().find(|t| label.eq_ignore_ascii_case(t)) {
            return *known;
        }
    }

    let title = issue.title.to_lowercase();
    let body = issue.body.to_lowercase();
    KEYWORD_TABLE
        .iter()
        .find(|(_, terms)| terms.iter().any(|t| title.contains(t) || body.contains(t)))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

pub fn keyword_decision(issue: &Issue) -> TriageDecision {
    let category = keyword_category(issue);
    TriageDecision {
        category: category.to_string(),
        labels: vec![category.to_string()],
        response: DEFAULT_RESPONSE.to_string(),
        requires_attention: false,
        complexity: default_complexity(),
        ai_fixable: false,
    }
}

fn build_prompt(issue: &Issue, repo: &RepositoryInfo) -> String {
    format!(
        r#"You are an assistant helping the maintainers of a software project triage new issues.

Analyze this GitHub issue and categorize it:

Repository: {repo_name}
Repository Description: {description}
Issue Title: {title}
Issue Body:
{body}

Return your analysis in this JSON format:
```json
{{
  "category": "One of: bug, feature_request, question, enhancement, or documentation",
  "labels": ["array", "of", "suggested", "label", "names"],
  "response": "Your suggested initial response to the issue",
  "requires_attention": false,
  "complexity": "low/medium/high",
  "ai_fixable": false
}}
```

Choose labels from common GitHub labels such as bug, feature, enhancement, documentation,
question, good first issue, help wanted, priority: low/medium/high.

For the response, be helpful and welcoming. For bugs ask for missing reproduction details,
for features give initial thoughts, for questions answer or ask for clarification.
Do not promise timelines or guaranteed implementations."#,
        repo_name = repo.full_name,
        description = repo.description.as_deref().unwrap_or("No description"),
        title = issue.title,
        body = if issue.body.is_empty() { "No description provided" } else { issue.body.as_str() },
    )
}

pub struct Triager {
    completion: Arc<dyn CompletionService>,
    temperature: f32,
    max_tokens: u32,
}

impl Triager {
    pub fn new(completion: Arc<dyn CompletionService>, settings: &CompletionSettings) -> Self {
        Self {
            completion,
            temperature: settings.reply_temperature,
            max_tokens: settings.reply_max_tokens,
        }
    }

    pub async fn triage(&self, issue: &Issue, repo: &RepositoryInfo) -> TriageOutcome {
        let request = CompletionRequest::new(build_prompt(issue, repo), self.temperature, self.max_tokens);
        let decoded = request_decoded(self.completion.as_ref(), &request, |text| {
            decode_json_object::<TriageDecision>(text, "triage decision")
        })
        .await;

        match decoded {
            Decoded::Ok(mut decision) => {
                decision.category = decision.category.trim().to_lowercase();
                decision.labels.retain(|l| !l.trim().is_empty());
                if decision.response.trim().is_empty() {
                    decision.response = DEFAULT_RESPONSE.to_string();
                }
                TriageOutcome {
                    decision,
                    source: TriageSource::Model,
                }
            }
            Decoded::Malformed(_) | Decoded::Unavailable(_) => {
                let decision = keyword_decision(issue);
                tracing::info!(issue = issue.number, category = %decision.category, "Using keyword triage fallback");
                TriageOutcome {
                    decision,
                    source: TriageSource::KeywordFallback,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCompletion, issue};

    fn repo() -> RepositoryInfo {
        RepositoryInfo {
            full_name: "octo/widgets".into(),
            description: Some("Widgets".into()),
            default_branch: "main".into(),
        }
    }

    #[test]
    fn test_keyword_table_order() {
        assert_eq!(keyword_category(&issue(1, "Crash on startup", "")), "bug");
        assert_eq!(keyword_category(&issue(1, "Add dark mode", "")), "feature");
        assert_eq!(keyword_category(&issue(1, "Improve speed", "")), "enhancement");
        assert_eq!(keyword_category(&issue(1, "Docs for setup", "")), "documentation");
        assert_eq!(keyword_category(&issue(1, "How do I configure this", "")), "question");
        assert_eq!(keyword_category(&issue(1, "Widgets", "Wobbly")), "enhancement");
    }

    #[test]
    fn test_keyword_matches_body_and_first_row_wins() {
        // "error" (bug) beats "new" (feature)
        assert_eq!(keyword_category(&issue(1, "New widget", "throws an error")), "bug");
    }

    #[test]
    fn test_existing_type_label_takes_precedence() {
        let mut i = issue(1, "Crash on startup", "");
        i.labels = vec!["priority: high".into(), "Documentation".into()];
        assert_eq!(keyword_category(&i), "documentation");
    }

    #[tokio::test]
    async fn test_model_decision_used_when_valid() {
        let completion = FakeCompletion::new(vec![Ok(r#"```json
{"category": "Bug", "labels": ["bug", ""], "response": "Thanks!", "requires_attention": true, "complexity": "low", "ai_fixable": true}
```"#
            .to_string())]);
        let triager = Triager::new(completion.clone(), &CompletionSettings::default());
        let outcome = triager.triage(&issue(4, "Crash", "boom"), &repo()).await;

        assert_eq!(outcome.source, TriageSource::Model);
        assert_eq!(outcome.decision.category, "bug");
        assert_eq!(outcome.decision.labels, vec!["bug"]);
        assert!(outcome.decision.requires_attention);

        let requests = completion.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.3);
        assert!(requests[0].prompt.contains("octo/widgets"));
        assert!(requests[0].prompt.contains("boom"));
    }

    #[tokio::test]
    async fn test_malformed_response_falls_back_to_keywords() {
        let completion = FakeCompletion::new(vec![Ok("I think this is a bug.".to_string())]);
        let triager = Triager::new(completion, &CompletionSettings::default());
        let outcome = triager.triage(&issue(4, "App crash", ""), &repo()).await;
        assert_eq!(outcome.source, TriageSource::KeywordFallback);
        assert_eq!(outcome.decision.category, "bug");
        assert_eq!(outcome.decision.response, DEFAULT_RESPONSE);
    }

    #[tokio::test]
    async fn test_missing_category_is_malformed() {
        let completion = FakeCompletion::new(vec![Ok(r#"{"labels": ["bug"]}"#.to_string())]);
        let triager = Triager::new(completion, &CompletionSettings::default());
        let outcome = triager.triage(&issue(4, "Add export", ""), &repo()).await;
        assert_eq!(outcome.source, TriageSource::KeywordFallback);
        assert_eq!(outcome.decision.category, "feature");
    }

    #[tokio::test]
    async fn test_unavailable_service_falls_back() {
        let completion = FakeCompletion::unavailable();
        let triager = Triager::new(completion, &CompletionSettings::default());
        let outcome = triager.triage(&issue(4, "Question about setup?", ""), &repo()).await;
        assert_eq!(outcome.source, TriageSource::KeywordFallback);
    }
}
