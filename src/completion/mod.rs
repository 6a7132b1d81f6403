//! Completion service seam.
//!
//! Every call site that expects structured output goes through [`Decoded`],
//! so a transport failure or an unparsable answer always lands on an explicit
//! fallback path instead of propagating.

mod client;
pub mod decode;

pub use client::ChatCompletionClient;

use async_trait::async_trait;

use crate::errors::{ParseError, TransportError};

/// One prompt plus sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            max_tokens,
        }
    }
}

/// Stateless text generation: `complete(prompt, temperature, max_tokens) -> text`.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TransportError>;
}

/// Typed outcome of a completion call that should yield a `T`.
#[derive(Debug)]
pub enum Decoded<T> {
    Ok(T),
    /// The service answered but the text did not decode. Carries the raw text.
    Malformed(String),
    /// The service could not be reached or returned an error.
    Unavailable(String),
}

impl<T> Decoded<T> {
    /// Combine a transport result with a decoder, logging the fallback cause.
    pub fn from_response<F>(response: Result<String, TransportError>, decode: F) -> Self
    where
        F: FnOnce(&str) -> Result<T, ParseError>,
    {
        match response {
            Err(e) => {
                tracing::warn!(error = %e, "Completion unavailable");
                Decoded::Unavailable(e.to_string())
            }
            Ok(text) => match decode(&text) {
                Ok(value) => Decoded::Ok(value),
                Err(e) => {
                    tracing::warn!(error = %e, "Completion output malformed");
                    Decoded::Malformed(text)
                }
            },
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Decoded::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Decoded::Ok(_))
    }
}

/// Send `request` and decode the answer with `decode`.
pub async fn request_decoded<T, F>(
    service: &dyn CompletionService,
    request: &CompletionRequest,
    decode: F,
) -> Decoded<T>
where
    F: FnOnce(&str) -> Result<T, ParseError>,
{
    Decoded::from_response(service.complete(request).await, decode)
}
