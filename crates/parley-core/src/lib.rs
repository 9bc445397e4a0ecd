//! Parley Core Library
//!
//! Meeting lifecycle service: call platform webhooks, the AI greeting,
//! and post-call transcript summaries.

pub mod call_platform;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod greeting;
pub mod jobs;
pub mod processing;
pub mod router;
pub mod schema;
pub mod server;
pub mod signature;
pub mod steps;
pub mod storage;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use config::Config;
pub use error::WebhookError;
pub use events::WebhookEvent;
pub use router::WebhookRouter;
pub use storage::{Meeting, MeetingStatus, MeetingStore};
