//! Llama models over an OpenAI-compatible host (Together AI, or a local Ollama)

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::message::CompletionRequest;
use crate::provider::{check_status, first_choice_text, ChatProvider, ProviderError, REQUEST_TIMEOUT};

pub const TOGETHER_API_BASE: &str = "https://api.together.xyz/v1";
pub const OLLAMA_API_BASE: &str = "http://localhost:11434/v1";

#[derive(Clone)]
pub struct LlamaClient {
    client: reqwest::Client,
    api_key: Option<Arc<String>>,
    base_url: String,
}

impl LlamaClient {
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

    /// Local hosts (Ollama) run without a key
    pub fn is_local(&self) -> bool {
        let host = self
            .base_url
            .split("://")
            .nth(1)
            .unwrap_or(self.base_url.as_str())
            .split(|c| c == '/' || c == ':')
            .next()
            .unwrap_or_default();
        matches!(host, "localhost" | "127.0.0.1")
    }
}

#[async_trait]
impl ChatProvider for LlamaClient {
    fn name(&self) -> &str {
        "llama"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Option<String>, ProviderError> {
        if self.api_key.is_none() && !self.is_local() {
            return Err(ProviderError::MissingApiKey("Llama host"));
        }

        debug!("Llama request to {}: model={}", self.base_url, request.model);

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&serde_json::json!({
                "model": request.model,
                "messages": request.messages,
                "temperature": request.temperature,
                "max_tokens": request.max_tokens,
                "stream": false,
            }));
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;
        let json: serde_json::Value = check_status(response).await?.json().await?;
        Ok(first_choice_text(&json))
    }
}

impl std::fmt::Debug for LlamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlamaClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
