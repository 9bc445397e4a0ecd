//! Agent replies to chat messages sent in a meeting's channel

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use parley_ai::{AiResponder, AskRequest};

use crate::call_platform::CallPlatform;
use crate::greeting::agent_request;
use crate::jobs::ChatReplyRequest;
use crate::steps::{run_step, RetryPolicy, StepError};
use crate::storage::{Agent, MeetingStore};

pub const CHAT_CHANNEL_TYPE: &str = "messaging";

/// One reply per job, so a requeued job reposts the same message
pub fn reply_message_id(job_id: Uuid) -> String {
    format!("reply-{}", job_id)
}

/// `None` when the agent has no instructions: such agents stay quiet in chat
pub fn chat_request(agent: &Agent, message: &str) -> Option<AskRequest> {
    if agent.instructions.trim().is_empty() {
        return None;
    }
    Some(agent_request(agent, &agent.instructions, message))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    Replied,
    UnknownAgent,
    NoInstructions,
}

pub struct ChatResponder {
    store: Arc<dyn MeetingStore>,
    platform: Arc<dyn CallPlatform>,
    responder: Arc<AiResponder>,
    policy: RetryPolicy,
}

impl ChatResponder {
    pub fn new(
        store: Arc<dyn MeetingStore>,
        platform: Arc<dyn CallPlatform>,
        responder: Arc<AiResponder>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            platform,
            responder,
            policy,
        }
    }

    pub async fn reply(
        &self,
        job_id: Uuid,
        request: &ChatReplyRequest,
    ) -> Result<ChatOutcome, StepError> {
        let policy = &self.policy;
        let store = self.store.as_ref();
        let meeting_id = request.meeting_id.as_str();
        let agent_id = request.agent_id.as_str();

        let agent = run_step(policy, "fetch-agent", || async move {
            store.get_agent(agent_id)
        })
        .await?;

        let Some(agent) = agent else {
            warn!("Chat message for unknown agent {}", agent_id);
            return Ok(ChatOutcome::UnknownAgent);
        };
        let Some(ask) = chat_request(&agent, &request.message) else {
            return Ok(ChatOutcome::NoInstructions);
        };

        let answer = self.responder.ask(ask).await;
        if answer.degraded {
            warn!(
                "Chat reply in meeting {} came from fallback {}/{}",
                meeting_id, answer.provider, answer.model
            );
        }

        run_step(policy, "ensure-channel", || {
            self.platform
                .ensure_channel(CHAT_CHANNEL_TYPE, meeting_id, agent_id)
        })
        .await?;

        let message_id = reply_message_id(job_id);
        run_step(policy, "send-reply", || {
            self.platform.send_message(
                CHAT_CHANNEL_TYPE,
                meeting_id,
                &message_id,
                &answer.text,
                agent_id,
            )
        })
        .await?;

        info!("Agent {} replied in meeting {}", agent_id, meeting_id);
        Ok(ChatOutcome::Replied)
    }
}
