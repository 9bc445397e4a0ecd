//! Post-call processing: transcript to stored summary
//!
//! Runs off the request path. Every failure ends with the meeting forced to
//! `completed` without a summary, so a meeting never stays in `processing`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use parley_ai::{AiResponder, AskRequest, ChatMessage};

use crate::steps::{run_step, RetryPolicy, StepError};
use crate::storage::MeetingStore;

pub const DEFAULT_SUMMARY_PROVIDER: &str = "gemini";
pub const DEFAULT_SUMMARY_MODEL: &str = "gemini-1.5-flash";
pub const UNKNOWN_SPEAKER: &str = "Unknown";

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub const SUMMARIZER_PROMPT: &str = r#"You summarize meeting transcripts.
The transcript is a JSON array of lines, each with the speaker's name under "user.name" and what they said under "text".

Reply in markdown with exactly these sections:

### Overview
A short narrative of what the meeting covered: decisions, topics and outcomes.

### Notes
Thematic sections. Each section gets a heading with an approximate time range, followed by bullet points of the key points, questions and action items.

Example:

#### Kickoff (00:00 - 03:10)
- Introductions
- Agreed on the agenda

#### Budget review (03:10 - 12:45)
- Q3 spend is under forecast
- Follow up: confirm vendor contracts"#;

/// One line of a call transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptItem {
    pub speaker_id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub text: String,
    pub start_ts: i64,
    pub stop_ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
}

/// A transcript line with the speaker's display name attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedItem {
    #[serde(flatten)]
    pub item: TranscriptItem,
    pub user: Speaker,
}

/// JSON Lines, blank lines skipped
pub fn parse_transcript(raw: &str) -> Result<Vec<TranscriptItem>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid transcript line {}", n + 1))
        })
        .collect()
}

/// Distinct speaker ids, in a stable order
pub fn speaker_ids(items: &[TranscriptItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.speaker_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn attribute_speakers(
    items: Vec<TranscriptItem>,
    names: &HashMap<String, String>,
) -> Vec<AttributedItem> {
    items
        .into_iter()
        .map(|item| {
            let name = names
                .get(&item.speaker_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string());
            AttributedItem {
                item,
                user: Speaker { name },
            }
        })
        .collect()
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpTranscriptSource {
    client: reqwest::Client,
}

impl HttpTranscriptSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent("Parley/0.1.0")
            .build()
            .context("Failed to build transcript HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TranscriptSource for HttpTranscriptSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Transcript request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Transcript download returned {}", status);
        }

        response.text().await.context("Failed to read transcript body")
    }
}

pub struct MeetingProcessor {
    store: Arc<dyn MeetingStore>,
    transcripts: Arc<dyn TranscriptSource>,
    responder: Arc<AiResponder>,
    policy: RetryPolicy,
    summary_provider: String,
    summary_model: String,
}

impl MeetingProcessor {
    pub fn new(
        store: Arc<dyn MeetingStore>,
        transcripts: Arc<dyn TranscriptSource>,
        responder: Arc<AiResponder>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            transcripts,
            responder,
            policy,
            summary_provider: DEFAULT_SUMMARY_PROVIDER.to_string(),
            summary_model: DEFAULT_SUMMARY_MODEL.to_string(),
        }
    }

    pub fn with_summary_model(mut self, provider: &str, model: &str) -> Self {
        self.summary_provider = provider.to_string();
        self.summary_model = model.to_string();
        self
    }

    /// Never fails: errors are logged and the meeting is completed without a summary
    pub async fn run(&self, meeting_id: &str, transcript_url: &str) {
        info!("Processing meeting {}", meeting_id);

        match self.summarize(meeting_id, transcript_url).await {
            Ok(()) => info!("Saved summary for meeting {}", meeting_id),
            Err(e) => {
                error!("Processing meeting {} failed: {}", meeting_id, e);
                if let Err(e) = self.store.complete(meeting_id, None) {
                    error!("Failed to complete meeting {}: {}", meeting_id, e);
                }
            }
        }
    }

    async fn summarize(&self, meeting_id: &str, transcript_url: &str) -> Result<(), StepError> {
        let policy = &self.policy;
        let store = self.store.as_ref();
        let transcripts = self.transcripts.as_ref();

        let raw = run_step(policy, "fetch-transcript", || transcripts.fetch(transcript_url)).await?;

        // Parsing is deterministic, a retry would fail the same way
        let raw = raw.as_str();
        let items = run_step(&RetryPolicy::new(1, Duration::ZERO), "parse-transcript", || async move {
            parse_transcript(raw)
        })
        .await?;

        let ids = speaker_ids(&items);
        let ids = ids.as_slice();
        let names = run_step(policy, "add-speakers", || async move { store.speaker_names(ids) }).await?;
        let attributed = attribute_speakers(items, &names);

        let transcript = serde_json::to_string(&attributed).map_err(|e| StepError {
            step: "add-speakers",
            attempts: 1,
            message: e.to_string(),
        })?;

        let summary = run_step(policy, "summarize", || self.ask_summary(&transcript)).await?;

        let summary = summary.as_str();
        run_step(policy, "save-summary", || async move {
            store.complete(meeting_id, Some(summary))
        })
        .await
    }

    async fn ask_summary(&self, transcript: &str) -> Result<String> {
        let completion = self
            .responder
            .ask(AskRequest {
                provider: self.summary_provider.clone(),
                model: Some(self.summary_model.clone()),
                ..AskRequest::new(vec![
                    ChatMessage::system(SUMMARIZER_PROMPT),
                    ChatMessage::user(transcript),
                ])
            })
            .await;

        if completion.degraded {
            warn!(
                "Summary came from fallback {}/{}",
                completion.provider, completion.model
            );
        }
        if completion.placeholder {
            anyhow::bail!(
                "{} produced no summary: {:?}",
                completion.provider,
                completion.text
            );
        }
        Ok(completion.text)
    }
}
