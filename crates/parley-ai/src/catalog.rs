//! Known providers, their models and defaults

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub models: &'static [&'static str],
    pub default_model: &'static str,
}

pub const PROVIDERS: &[ProviderInfo] = &[
    ProviderInfo {
        id: "openrouter",
        name: "OpenRouter",
        models: &[
            "mistralai/mistral-7b-instruct",
            "anthropic/claude-3-haiku",
            "meta-llama/Llama-2-70b-chat-hf",
            "meta-llama/Llama-2-13b-chat-hf",
            "openai/gpt-3.5-turbo",
            "openai/gpt-4",
        ],
        default_model: "mistralai/mistral-7b-instruct",
    },
    ProviderInfo {
        id: "gemini",
        name: "Google Gemini",
        models: &["gemini-1.5-flash", "gemini-1.5-pro", "gemini-pro"],
        default_model: "gemini-1.5-flash",
    },
    ProviderInfo {
        id: "llama",
        name: "Meta Llama",
        models: &[
            "meta-llama/Llama-2-70b-chat-hf",
            "meta-llama/Llama-2-13b-chat-hf",
            "meta-llama/Llama-2-7b-chat-hf",
            "meta-llama/Llama-3-8b-chat-hf",
            "meta-llama/Llama-3-70b-chat-hf",
        ],
        default_model: "meta-llama/Llama-2-70b-chat-hf",
    },
    ProviderInfo {
        id: "anthropic",
        name: "Anthropic Claude",
        models: &["claude-3-haiku", "claude-3-sonnet", "claude-3-opus"],
        default_model: "claude-3-haiku",
    },
];

pub fn available_providers() -> &'static [ProviderInfo] {
    PROVIDERS
}

pub fn provider_info(id: &str) -> Option<&'static ProviderInfo> {
    PROVIDERS.iter().find(|p| p.id == id)
}

/// Empty for unknown providers
pub fn models_for_provider(id: &str) -> &'static [&'static str] {
    provider_info(id).map(|p| p.models).unwrap_or(&[])
}
