//! OpenRouter chat-completions adapter
//!
//! Also serves the `anthropic` provider: OpenRouter proxies Claude models, so
//! that provider is an OpenRouter client pinned to a single model.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::message::CompletionRequest;
use crate::provider::{check_status, first_choice_text, ChatProvider, ProviderError, REQUEST_TIMEOUT};

pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Model the `anthropic` provider is routed to
pub const ANTHROPIC_VIA_OPENROUTER_MODEL: &str = "anthropic/claude-3-haiku";

#[derive(Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: Option<Arc<String>>,
    base_url: String,
    name: &'static str,
    pinned_model: Option<&'static str>,
}

impl OpenRouterClient {
    pub fn new(api_key: Option<String>, base_url: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("Parley/0.1.0")
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.map(Arc::new),
            base_url: base_url.trim_end_matches('/').to_string(),
            name: "openrouter",
            pinned_model: None,
        })
    }

    /// The `anthropic` provider: same API, fixed Claude model
    pub fn anthropic(api_key: Option<String>, base_url: &str) -> Result<Self, ProviderError> {
        let mut client = Self::new(api_key, base_url)?;
        client.name = "anthropic";
        client.pinned_model = Some(ANTHROPIC_VIA_OPENROUTER_MODEL);
        Ok(client)
    }
}

#[async_trait]
impl ChatProvider for OpenRouterClient {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Option<String>, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ProviderError::MissingApiKey("OpenRouter"))?;
        let model = self.pinned_model.unwrap_or(request.model.as_str());

        debug!("OpenRouter request: model={} messages={}", model, request.messages.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&serde_json::json!({
                "model": model,
                "messages": request.messages,
                "temperature": request.temperature,
                "max_tokens": request.max_tokens,
            }))
            .send()
            .await?;

        let json: serde_json::Value = check_status(response).await?.json().await?;
        Ok(first_choice_text(&json))
    }
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
