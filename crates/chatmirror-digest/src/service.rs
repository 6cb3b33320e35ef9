//! The extraction service seam and an OpenAI-compatible HTTP client for it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use chatmirror_core::{MirrorError, MirrorResult};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const STAGE: &str = "extract";
const ERROR_BODY_LIMIT: usize = 500;

/// Anything that turns a prompt into a free-text reply.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> MirrorResult<String>;
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
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

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Client for any `/chat/completions` endpoint.
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> MirrorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MirrorError::upstream(STAGE, None, format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }
}

#[async_trait]
impl ExtractionService for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> MirrorResult<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        };

        debug!("POST {} ({} prompt chars)", self.endpoint, prompt.len());
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MirrorError::upstream(STAGE, None, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response.text().await);
            return Err(MirrorError::upstream(STAGE, Some(status.as_u16()), message));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            MirrorError::upstream(STAGE, Some(status.as_u16()), format!("unreadable response: {}", e))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| MirrorError::upstream(STAGE, Some(status.as_u16()), "response had no message content"))
    }
}

fn error_message<E: std::fmt::Display>(body: Result<String, E>) -> String {
    let body = match body {
        Ok(body) => body,
        Err(e) => return format!("error body could not be read: {}", e),
    };
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(&body) {
        return envelope.error.message;
    }
    body.chars().take(ERROR_BODY_LIMIT).collect()
}
