use async_trait::async_trait;
use std::time::Duration;

use crate::message::CompletionRequest;

/// Timeout applied to every provider HTTP client
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Placeholder text when an OpenAI-shaped API answers without content
pub const NO_RESPONSE: &str = "No response from model";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("API key required for {0}")]
    MissingApiKey(&'static str),
    #[error("Unsupported AI provider: {0}")]
    UnsupportedProvider(String),
}

/// A chat-completion backend.
///
/// Implementations return the first completion's text, or `None` when the
/// API answered without usable content.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Text shown in place of an empty answer
    fn placeholder(&self) -> &'static str {
        NO_RESPONSE
    }

    async fn complete(&self, request: &CompletionRequest)
        -> Result<Option<String>, ProviderError>;
}

/// Turn a non-success response into `ProviderError::Api`
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

/// Blank answers count as no answer
pub(crate) fn non_blank(text: Option<&str>) -> Option<String> {
    text.filter(|s| !s.trim().is_empty()).map(str::to_string)
}

/// Pull `choices[0].message.content` out of an OpenAI-shaped response
pub(crate) fn first_choice_text(json: &serde_json::Value) -> Option<String> {
    non_blank(json["choices"][0]["message"]["content"].as_str())
}
