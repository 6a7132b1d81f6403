use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionRequest, CompletionService};
use crate::config::CompletionSettings;
use crate::errors::{Service, TransportError};
use crate::util::sanitize_error_body;

/// OpenAI-compatible chat completions client.
pub struct ChatCompletionClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionClient {
    pub fn new(settings: &CompletionSettings, api_key: impl Into<String>) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("autofix/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::from_reqwest(Service::Completion, e))?;
        Ok(Self {
            http,
            api_url: settings.api_url.clone(),
            api_key: api_key.into(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TransportError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(
            model = %self.model,
            temperature = request.temperature,
            max_tokens = request.max_tokens,
            prompt_chars = request.prompt.len(),
            "Requesting completion"
        );

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(Service::Completion, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(Service::Completion, e))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                service: Service::Completion,
                status: status.as_u16(),
                body: sanitize_error_body(&text),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| TransportError::Decode {
            service: Service::Completion,
            message: e.to_string(),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransportError::Decode {
                service: Service::Completion,
                message: "response contained no choices".to_string(),
            })
    }
}
