//! Prompt generation via a local Ollama server.
//!
//! Best-effort helper: given a query (and optionally an image), ask a
//! local model for text to use as a generation prompt. Plain text in,
//! plain text out; callers decide what to do when it fails.

use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Fallback system prompt when the caller supplies none.
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers queries regardless of the subject matter.";

/// Errors from the Ollama chat API.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Ollama returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for Ollama's non-streaming chat endpoint.
pub struct PromptGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl PromptGenerator {
    /// Create a generator against `base_url` (e.g. `http://127.0.0.1:11434`)
    /// using `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Ask the model for a text response to `query`.
    pub async fn generate(
        &self,
        query: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        self.chat(query, system_prompt, None).await
    }

    /// Ask the model to answer `query` about the image at `image_path`.
    pub async fn describe_image(
        &self,
        image_path: impl AsRef<Path>,
        query: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        let bytes = std::fs::read(image_path)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.chat(query, system_prompt, Some(vec![encoded])).await
    }

    async fn chat(
        &self,
        query: &str,
        system_prompt: Option<&str>,
        images: Option<Vec<String>>,
    ) -> Result<String, LlmError> {
        let messages = [
            ChatMessage {
                role: "system",
                content: system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT),
                images: None,
            },
            ChatMessage {
                role: "user",
                content: query,
                images,
            },
        ];

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        tracing::debug!(model = %self.model, chars = parsed.message.content.len(), "LLM response");
        Ok(parsed.message.content)
    }
}
