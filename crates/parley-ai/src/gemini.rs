//! Google Gemini `generateContent` adapter
//!
//! Gemini takes a single text prompt here, so the conversation is flattened to
//! the system message plus the last message.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::message::{ChatMessage, CompletionRequest, Role};
use crate::provider::{check_status, non_blank, ChatProvider, ProviderError, REQUEST_TIMEOUT};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Placeholder when Gemini returns no candidate text
pub const GEMINI_NO_RESPONSE: &str = "I'm not sure how to respond.";

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<Arc<String>>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, base_url: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("Parley/0.1.0")
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.map(Arc::new),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// `"<system>\n\nUser: <last>"`, or just the last message without a system prompt
pub fn combined_prompt(messages: &[ChatMessage]) -> String {
    let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
    match messages.iter().find(|m| m.role == Role::System) {
        Some(system) => format!("{}\n\nUser: {}", system.content, last),
        None => last.to_string(),
    }
}

fn candidate_text(json: &serde_json::Value) -> Option<String> {
    non_blank(json["candidates"][0]["content"]["parts"][0]["text"].as_str())
}

#[async_trait]
impl ChatProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn placeholder(&self) -> &'static str {
        GEMINI_NO_RESPONSE
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Option<String>, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ProviderError::MissingApiKey("Gemini"))?;
        let prompt = combined_prompt(&request.messages);

        debug!("Gemini request: model={} prompt_chars={}", request.model, prompt.len());

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, request.model
            ))
            .query(&[("key", api_key.as_str())])
            .json(&serde_json::json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "temperature": request.temperature,
                    "maxOutputTokens": request.max_tokens,
                },
            }))
            .send()
            .await?;

        let json: serde_json::Value = check_status(response).await?.json().await?;
        Ok(candidate_text(&json))
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
