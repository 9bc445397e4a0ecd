//! Join-and-greet saga run when a meeting's call session starts
//!
//! Steps run in order and each is safe to repeat: joining is idempotent on the
//! platform, users are upserted, channels are get-or-create, and the greeting
//! carries a deterministic message id.

use tracing::{info, warn};

use parley_ai::{AiResponder, AskRequest, ChatMessage};

use crate::call_platform::CallPlatform;
use crate::steps::{run_step, RetryPolicy, StepError};
use crate::storage::{Agent, Meeting};

pub const DEFAULT_AGENT_PROMPT: &str = "You are a helpful AI agent in a meeting.";
pub const GREETING_REQUEST: &str = "The meeting has started. Please greet the participants.";
pub const MEETING_CHANNEL_TYPE: &str = "videocall";

pub fn greeting_message_id(meeting_id: &str) -> String {
    format!("{}-greeting", meeting_id)
}

/// A system + user exchange sent with the agent's provider settings
pub fn agent_request(agent: &Agent, system: &str, user: &str) -> AskRequest {
    AskRequest {
        messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
        provider: agent.ai_provider.clone(),
        model: Some(agent.ai_model.clone()).filter(|m| !m.trim().is_empty()),
        temperature: agent.temperature_value(),
        max_tokens: agent.max_tokens_value(),
    }
}

/// Ask the agent's configured model for a greeting
pub fn greeting_request(agent: &Agent) -> AskRequest {
    let system = if agent.instructions.trim().is_empty() {
        DEFAULT_AGENT_PROMPT
    } else {
        agent.instructions.as_str()
    };

    agent_request(agent, system, GREETING_REQUEST)
}

pub struct GreetingSaga<'a> {
    platform: &'a dyn CallPlatform,
    responder: &'a AiResponder,
    policy: RetryPolicy,
}

impl<'a> GreetingSaga<'a> {
    pub fn new(
        platform: &'a dyn CallPlatform,
        responder: &'a AiResponder,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            platform,
            responder,
            policy,
        }
    }

    pub async fn run(&self, meeting: &Meeting, agent: &Agent) -> Result<(), StepError> {
        let policy = &self.policy;
        let meeting_id = meeting.id.as_str();

        run_step(policy, "join-call", || {
            self.platform.join_call(meeting_id, &agent.id)
        })
        .await?;
        info!("Agent {} joined meeting {}", agent.id, meeting_id);

        // The responder always answers, degraded or not
        let greeting = self.responder.ask(greeting_request(agent)).await;
        if greeting.degraded {
            warn!(
                "Greeting for meeting {} came from fallback {}/{}",
                meeting_id, greeting.provider, greeting.model
            );
        }

        run_step(policy, "register-chat-user", || {
            self.platform.upsert_chat_user(&agent.id, &agent.name)
        })
        .await?;

        run_step(policy, "ensure-channel", || {
            self.platform
                .ensure_channel(MEETING_CHANNEL_TYPE, meeting_id, &agent.id)
        })
        .await?;

        let message_id = greeting_message_id(meeting_id);
        run_step(policy, "post-greeting", || {
            self.platform.send_message(
                MEETING_CHANNEL_TYPE,
                meeting_id,
                &message_id,
                &greeting.text,
                &agent.id,
            )
        })
        .await?;

        info!("Posted greeting in meeting {}", meeting_id);
        Ok(())
    }
}
