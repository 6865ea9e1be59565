//! Summarisation provider infrastructure adapter.
//!
//! Implements the [`pipeline::Summarizer`] trait for OpenAI-compatible chat
//! completion endpoints. Other providers are added as new `impl` blocks in
//! this crate without any changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting and response
//! parsing live here. The [`pipeline`] crate sees only
//! [`pipeline::Summarizer`].
//!
//! ## Behaviour
//!
//! - [`SummarizerMode::Demo`] (no key configured) returns [`MOCK_SUMMARY`]
//!   without touching the network. This is the designed default, not an
//!   error path.
//! - [`SummarizerMode::Live`] sends exactly one `POST {base}/chat/completions`
//!   with a fixed system instruction and the prompt as the user turn, and
//!   returns the first choice's message content.
//! - Any failure is logged and surfaces as `None`.

use async_trait::async_trait;
use pipeline::Summarizer;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model requested when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Output-length bound sent with every request.
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// System turn sent ahead of every prompt.
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that summarizes project tasks.";

/// Returned in demo mode regardless of the prompt.
pub const MOCK_SUMMARY: &str = "Mock AI Summary: Tasks are progressing well. Main focus areas include bug fixes and feature development.";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures talking to the completion API.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The request could not be sent or the body not read.
    #[error("Completion request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Completion API returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body was not the expected JSON shape.
    #[error("Completion response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Whether the summariser talks to the network. Selected once at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizerMode {
    /// Return [`MOCK_SUMMARY`] without network access.
    Demo,
    /// Call the API with this bearer key.
    Live {
        /// Completion API key.
        api_key: String,
    },
}

impl SummarizerMode {
    /// `Live` for a non-blank key, `Demo` otherwise.
    pub fn from_api_key(api_key: Option<&str>) -> Self {
        match api_key.map(str::trim) {
            Some(key) if !key.is_empty() => Self::Live {
                api_key: key.to_string(),
            },
            _ => Self::Demo,
        }
    }
}

/// Endpoint settings for [`OpenAiSummarizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Output-length bound.
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl OpenAiConfig {
    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output-length bound.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Chat-completions summariser.
#[derive(Debug, Clone)]
pub struct OpenAiSummarizer {
    http: reqwest::Client,
    config: OpenAiConfig,
    mode: SummarizerMode,
}

impl OpenAiSummarizer {
    /// Creates a summariser with default endpoint settings.
    pub fn new(mode: SummarizerMode) -> Self {
        Self::with_config(mode, OpenAiConfig::default())
    }

    /// Creates a summariser with explicit endpoint settings.
    pub fn with_config(mode: SummarizerMode, config: OpenAiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            mode,
        }
    }

    /// The mode this summariser was built in.
    pub fn mode(&self) -> &SummarizerMode {
        &self.mode
    }

    /// Sends `prompt` and returns the first choice's content, surfacing any
    /// failure. In demo mode returns [`MOCK_SUMMARY`].
    ///
    /// `Ok(None)` means the API answered but produced no choice content.
    #[instrument(skip_all, fields(model = %self.config.model, prompt_len = prompt.len()))]
    pub async fn try_summarize(&self, prompt: &str) -> Result<Option<String>, LlmError> {
        let SummarizerMode::Live { api_key } = &self.mode else {
            debug!("No completion API key; returning mock summary");
            return Ok(Some(MOCK_SUMMARY.to_string()));
        };

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(LlmError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(LlmError::Decode)?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, prompt: &str) -> Option<String> {
        match self.try_summarize(prompt).await {
            Ok(summary) => summary,
            Err(error) => {
                warn!(%error, "Summarisation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_mode_returns_mock_summary() {
        let summarizer = OpenAiSummarizer::new(SummarizerMode::Demo);

        assert_eq!(
            summarizer.summarize("anything at all").await.as_deref(),
            Some(MOCK_SUMMARY)
        );
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatCompletionRequest {
            model: DEFAULT_MODEL,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: "prompt",
                },
            ],
            max_tokens: DEFAULT_MAX_TOKENS,
        };

        let value = serde_json::to_value(&request).expect("serialise");

        assert_eq!(
            value,
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": SYSTEM_INSTRUCTION},
                    {"role": "user", "content": "prompt"}
                ],
                "max_tokens": 500
            })
        );
    }

    #[test]
    fn test_mode_from_api_key() {
        assert_eq!(SummarizerMode::from_api_key(Some("")), SummarizerMode::Demo);
        assert!(matches!(
            SummarizerMode::from_api_key(Some("sk-1")),
            SummarizerMode::Live { .. }
        ));
    }
}
