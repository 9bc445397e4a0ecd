use anyhow::{Context, Result};
use std::time::Duration;

use parley_ai::gemini::GEMINI_API_BASE;
use parley_ai::llama::TOGETHER_API_BASE;
use parley_ai::openrouter::OPENROUTER_API_BASE;
use parley_ai::responder::{DEFAULT_MODEL, DEFAULT_PROVIDER};

use crate::call_platform::{STREAM_CHAT_BASE, STREAM_VIDEO_BASE};
use crate::processing::{DEFAULT_SUMMARY_MODEL, DEFAULT_SUMMARY_PROVIDER};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    // Call platform (Stream). The secret also keys webhook signatures.
    pub stream_api_key: String,
    pub stream_api_secret: String,
    pub stream_video_url: String,
    pub stream_chat_url: String,

    pub openrouter_api_key: Option<String>,
    pub openrouter_api_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_api_url: String,
    pub llama_api_key: Option<String>,
    pub llama_api_url: String,

    /// Where `ask` goes when the requested provider fails
    pub fallback_provider: String,
    pub fallback_model: String,

    /// Provider and model used for meeting summaries
    pub summary_provider: String,
    pub summary_model: String,

    pub http_port: u16,

    pub job_poll_interval: Duration,
    pub job_step_max_attempts: u32,
    pub job_step_retry_delay: Duration,
    pub saga_max_attempts: u32,
    pub saga_retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).with_context(|| format!("{} must be set", name))
        };
        let or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let millis = |name: &str, default: u64| {
            Duration::from_millis(lookup(name).and_then(|v| v.parse().ok()).unwrap_or(default))
        };
        let attempts = |name: &str| {
            lookup(name)
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3)
                .max(1)
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,

            stream_api_key: required("STREAM_API_KEY")?,
            stream_api_secret: required("STREAM_API_SECRET")?,
            stream_video_url: or("STREAM_VIDEO_URL", STREAM_VIDEO_BASE),
            stream_chat_url: or("STREAM_CHAT_URL", STREAM_CHAT_BASE),

            openrouter_api_key: lookup("OPENROUTER_API_KEY"),
            openrouter_api_url: or("OPENROUTER_API_URL", OPENROUTER_API_BASE),
            gemini_api_key: lookup("GEMINI_API_KEY"),
            gemini_api_url: or("GEMINI_API_URL", GEMINI_API_BASE),
            llama_api_key: lookup("LLAMA_API_KEY").or_else(|| lookup("TOGETHER_API_KEY")),
            llama_api_url: or("LLAMA_API_URL", TOGETHER_API_BASE),

            fallback_provider: or("AI_FALLBACK_PROVIDER", DEFAULT_PROVIDER),
            fallback_model: or("AI_FALLBACK_MODEL", DEFAULT_MODEL),
            summary_provider: or("SUMMARY_PROVIDER", DEFAULT_SUMMARY_PROVIDER),
            summary_model: or("SUMMARY_MODEL", DEFAULT_SUMMARY_MODEL),

            http_port: or("HTTP_PORT", "3000")
                .parse()
                .context("HTTP_PORT must be a valid port number")?,

            job_poll_interval: Duration::from_secs(
                lookup("JOB_POLL_INTERVAL_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),
            job_step_max_attempts: attempts("JOB_STEP_MAX_ATTEMPTS"),
            job_step_retry_delay: millis("JOB_STEP_RETRY_DELAY_MS", 2000),
            saga_max_attempts: attempts("SAGA_MAX_ATTEMPTS"),
            saga_retry_delay: millis("SAGA_RETRY_DELAY_MS", 250),
        })
    }
}
