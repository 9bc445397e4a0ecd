//! Meeting lifecycle driven by call platform webhooks
//!
//! ```text
//! upcoming --session_started--> active --session_ended--> processing --job--> completed
//! ```
//!
//! Transitions are guarded updates in storage, so duplicate or out-of-order
//! deliveries are either no-ops or 404s.

use std::sync::Arc;
use tracing::{debug, info, warn};

use parley_ai::AiResponder;

use crate::call_platform::CallPlatform;
use crate::error::WebhookError;
use crate::events::{meeting_id_from_cid, CallEvent, CidEvent, RecordingReady, TranscriptionReady, WebhookEvent};
use crate::greeting::GreetingSaga;
use crate::jobs::{JobQueue, ProcessingRequest};
use crate::steps::RetryPolicy;
use crate::storage::MeetingStore;

pub struct WebhookRouter {
    store: Arc<dyn MeetingStore>,
    platform: Arc<dyn CallPlatform>,
    responder: Arc<AiResponder>,
    jobs: Arc<dyn JobQueue>,
    saga_policy: RetryPolicy,
}

impl WebhookRouter {
    pub fn new(
        store: Arc<dyn MeetingStore>,
        platform: Arc<dyn CallPlatform>,
        responder: Arc<AiResponder>,
        jobs: Arc<dyn JobQueue>,
        saga_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            platform,
            responder,
            jobs,
            saga_policy,
        }
    }

    pub async fn handle(&self, event: WebhookEvent) -> Result<(), WebhookError> {
        debug!("Handling {} event", event.kind());

        match event {
            WebhookEvent::SessionStarted(event) => self.session_started(event).await,
            WebhookEvent::ParticipantLeft(event) => self.participant_left(event).await,
            WebhookEvent::SessionEnded(event) => self.session_ended(event),
            WebhookEvent::TranscriptionReady(event) => self.transcription_ready(event),
            WebhookEvent::RecordingReady(event) => self.recording_ready(event),
            WebhookEvent::Unsupported => {
                debug!("Ignoring unsupported event type");
                Ok(())
            }
        }
    }

    async fn session_started(&self, event: CallEvent) -> Result<(), WebhookError> {
        let meeting_id = event
            .meeting_id()
            .ok_or(WebhookError::MissingMeetingId("call.session_started"))?;

        let meeting = self
            .store
            .claim_for_start(meeting_id)?
            .ok_or_else(|| WebhookError::MeetingNotFound(meeting_id.to_string()))?;
        info!("Meeting {} is now active", meeting_id);

        let agent = self
            .store
            .get_agent(&meeting.agent_id)?
            .ok_or_else(|| WebhookError::AgentNotFound(meeting.agent_id.clone()))?;

        GreetingSaga::new(
            self.platform.as_ref(),
            self.responder.as_ref(),
            self.saga_policy,
        )
        .run(&meeting, &agent)
        .await
        .map_err(|e| WebhookError::Upstream(e.to_string()))
    }

    async fn participant_left(&self, event: CidEvent) -> Result<(), WebhookError> {
        let meeting_id = meeting_id_from_cid(&event.call_cid)
            .ok_or(WebhookError::MissingMeetingId("call.session_participant_left"))?;

        if let Err(e) = self.platform.end_call(meeting_id).await {
            warn!("Failed to end call {}: {}", meeting_id, e);
        }
        Ok(())
    }

    fn session_ended(&self, event: CallEvent) -> Result<(), WebhookError> {
        let meeting_id = event
            .meeting_id()
            .ok_or(WebhookError::MissingMeetingId("call.session_ended"))?;

        if self.store.mark_processing(meeting_id)? {
            info!("Meeting {} ended, awaiting transcript", meeting_id);
        } else {
            debug!("Meeting {} was not active, nothing to end", meeting_id);
        }
        Ok(())
    }

    fn transcription_ready(&self, event: TranscriptionReady) -> Result<(), WebhookError> {
        let meeting_id = meeting_id_from_cid(&event.call_cid)
            .ok_or(WebhookError::MissingMeetingId("call.transcription_ready"))?;
        let url = event.call_transcription.url;

        self.store
            .set_transcript_url(meeting_id, &url)?
            .ok_or_else(|| WebhookError::MeetingNotFound(meeting_id.to_string()))?;

        let job_id = self.jobs.enqueue(
            ProcessingRequest {
                meeting_id: meeting_id.to_string(),
                transcript_url: url,
            }
            .into(),
        )?;
        info!("Queued processing job {} for meeting {}", job_id, meeting_id);
        Ok(())
    }

    fn recording_ready(&self, event: RecordingReady) -> Result<(), WebhookError> {
        let meeting_id = meeting_id_from_cid(&event.call_cid)
            .ok_or(WebhookError::MissingMeetingId("call.recording_ready"))?;

        if !self
            .store
            .set_recording_url(meeting_id, &event.call_recording.url)?
        {
            debug!("No meeting {} for recording", meeting_id);
        }
        Ok(())
    }
}
