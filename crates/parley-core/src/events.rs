//! Typed webhook events from the call platform
//!
//! Bodies are decoded into a closed enum keyed on `type`. Types this service
//! does not act on decode to `Unsupported` and are acknowledged.

use serde::Deserialize;

use crate::error::WebhookError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CallCustom {
    #[serde(rename = "meetingId", default)]
    pub meeting_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CallInfo {
    #[serde(default)]
    pub custom: CallCustom,
}

/// Events that carry the meeting id in `call.custom.meetingId`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallEvent {
    #[serde(default)]
    pub call: CallInfo,
}

/// Events that only carry the composite `call_cid`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CidEvent {
    pub call_cid: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallAsset {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptionReady {
    pub call_cid: String,
    pub call_transcription: CallAsset,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordingReady {
    pub call_cid: String,
    pub call_recording: CallAsset,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookEvent {
    #[serde(rename = "call.session_started")]
    SessionStarted(CallEvent),
    #[serde(rename = "call.session_participant_left")]
    ParticipantLeft(CidEvent),
    #[serde(rename = "call.session_ended")]
    SessionEnded(CallEvent),
    #[serde(rename = "call.transcription_ready")]
    TranscriptionReady(TranscriptionReady),
    #[serde(rename = "call.recording_ready")]
    RecordingReady(RecordingReady),
    #[serde(other)]
    Unsupported,
}

impl WebhookEvent {
    /// Decode a verified body
    pub fn decode(body: &str) -> Result<Self, WebhookError> {
        serde_json::from_str(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEvent::SessionStarted(_) => "call.session_started",
            WebhookEvent::ParticipantLeft(_) => "call.session_participant_left",
            WebhookEvent::SessionEnded(_) => "call.session_ended",
            WebhookEvent::TranscriptionReady(_) => "call.transcription_ready",
            WebhookEvent::RecordingReady(_) => "call.recording_ready",
            WebhookEvent::Unsupported => "unsupported",
        }
    }
}

impl CallEvent {
    pub fn meeting_id(&self) -> Option<&str> {
        self.call
            .custom
            .meeting_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }
}

/// `"<type>:<id>"` → `id`
pub fn meeting_id_from_cid(call_cid: &str) -> Option<&str> {
    call_cid.split(':').nth(1).filter(|id| !id.is_empty())
}
