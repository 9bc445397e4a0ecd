//! Parley AI - language-model backends behind one responder
//!
//! - message: role-tagged chat messages
//! - provider: the `ChatProvider` trait and shared error type
//! - openrouter / gemini / llama: HTTP adapters
//! - catalog: known providers and models
//! - responder: dispatch with fallback to a default provider

pub mod catalog;
pub mod gemini;
pub mod llama;
pub mod message;
pub mod openrouter;
pub mod provider;
pub mod responder;

pub use gemini::GeminiClient;
pub use llama::LlamaClient;
pub use message::{ChatMessage, CompletionRequest, Role};
pub use openrouter::OpenRouterClient;
pub use provider::{ChatProvider, ProviderError};
pub use responder::{AiResponder, AskRequest, Completion};
