//! AI Responder: provider dispatch with a single fallback
//!
//! The provider name on a request picks a registered adapter. An unknown name
//! or any adapter failure is logged and the request is retried once against
//! the fallback provider/model. `ask` never fails: callers always get text,
//! and `Completion::placeholder` tells them when that text is a stand-in.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::catalog;
use crate::message::{ChatMessage, CompletionRequest};
use crate::provider::{ChatProvider, ProviderError, NO_RESPONSE};

pub const DEFAULT_PROVIDER: &str = "openrouter";
pub const DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub messages: Vec<ChatMessage>,
    pub provider: String,
    /// Overrides the provider's catalog default when set
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl AskRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            provider: DEFAULT_PROVIDER.to_string(),
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// A completion plus which backend produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub provider: String,
    pub model: String,
    /// The requested provider failed and the default answered instead
    pub degraded: bool,
    /// `text` is a stand-in: the model answered empty or nothing answered
    pub placeholder: bool,
}

pub struct AiResponder {
    providers: HashMap<String, Arc<dyn ChatProvider>>,
    fallback_provider: String,
    fallback_model: String,
}

impl Default for AiResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl AiResponder {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            fallback_provider: DEFAULT_PROVIDER.to_string(),
            fallback_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Register an adapter under its own name
    pub fn with_provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_fallback(mut self, provider: &str, model: &str) -> Self {
        self.fallback_provider = provider.to_string();
        self.fallback_model = model.to_string();
        self
    }

    pub fn has(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    /// Model used when the request names none
    pub fn resolve_model(&self, provider: &str, model: Option<&str>) -> String {
        model
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .or_else(|| catalog::provider_info(provider).map(|p| p.default_model.to_string()))
            .unwrap_or_else(|| self.fallback_model.clone())
    }

    async fn dispatch(
        &self,
        provider: &str,
        request: &CompletionRequest,
    ) -> Result<(String, bool), ProviderError> {
        let adapter = self
            .providers
            .get(provider)
            .ok_or_else(|| ProviderError::UnsupportedProvider(provider.to_string()))?;

        Ok(match adapter.complete(request).await? {
            Some(text) => (text, false),
            None => {
                warn!("{} answered without content", provider);
                (adapter.placeholder().to_string(), true)
            }
        })
    }

    pub async fn ask(&self, ask: AskRequest) -> Completion {
        let model = self.resolve_model(&ask.provider, ask.model.as_deref());
        let mut request = CompletionRequest {
            messages: ask.messages,
            model,
            temperature: ask.temperature,
            max_tokens: ask.max_tokens,
        };

        match self.dispatch(&ask.provider, &request).await {
            Ok((text, placeholder)) => {
                debug!("{} answered with {} chars", ask.provider, text.len());
                return Completion {
                    text,
                    provider: ask.provider,
                    model: request.model,
                    degraded: false,
                    placeholder,
                };
            }
            Err(e) => {
                warn!(
                    "Error with {} AI service, falling back to {}/{}: {}",
                    ask.provider, self.fallback_provider, self.fallback_model, e
                );
            }
        }

        request.model = self.fallback_model.clone();
        let (text, placeholder) = match self.dispatch(&self.fallback_provider, &request).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Fallback provider {} failed: {}", self.fallback_provider, e);
                (NO_RESPONSE.to_string(), true)
            }
        };

        Completion {
            text,
            provider: self.fallback_provider.clone(),
            model: request.model,
            degraded: true,
            placeholder,
        }
    }
}
