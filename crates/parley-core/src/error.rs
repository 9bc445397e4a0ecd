use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Everything a webhook delivery can fail with, mapped onto the HTTP status
/// the call platform sees (it retries on non-2xx).
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing signature or API key")]
    MissingHeaders,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),
    #[error("Missing meeting ID in {0} event")]
    MissingMeetingId(&'static str),
    #[error("Meeting {0} not found or already started")]
    MeetingNotFound(String),
    #[error("Agent {0} not found for the meeting")]
    AgentNotFound(String),
    #[error("{0}")]
    Upstream(String),
    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MissingHeaders
            | WebhookError::InvalidPayload(_)
            | WebhookError::MissingMeetingId(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::MeetingNotFound(_) | WebhookError::AgentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            WebhookError::Upstream(_) | WebhookError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Webhook failed: {:#}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
