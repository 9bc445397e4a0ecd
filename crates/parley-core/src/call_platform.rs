//! Stream video/chat REST client
//!
//! Outbound commands to the call platform: join and end calls, register chat
//! users, create channels and post messages. Every request carries a short-lived
//! HS256 JWT signed with the API secret, with the public API key as `kid`.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const STREAM_VIDEO_BASE: &str = "https://video.stream-io-api.com";
pub const STREAM_CHAT_BASE: &str = "https://chat.stream-io-api.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifetime of tokens minted for a user (the agent joining a call)
pub const USER_TOKEN_TTL_SECS: i64 = 60 * 60;
/// `iat` is backdated to tolerate clock skew with the platform
pub const USER_TOKEN_BACKDATE_SECS: i64 = 60;
/// Lifetime of server-side tokens
pub const SERVER_TOKEN_TTL_SECS: i64 = 5 * 60;

/// Display name the agent joins calls with
const AGENT_DISPLAY_NAME: &str = "AI Agent";

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Failed to sign token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserClaims {
    pub user_id: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerClaims {
    pub user_id: String,
    pub server: bool,
    pub exp: i64,
}

/// Commands this service sends to the call platform
#[async_trait]
pub trait CallPlatform: Send + Sync {
    /// Join `user_id` to the default-type call `call_id`
    async fn join_call(&self, call_id: &str, user_id: &str) -> Result<(), PlatformError>;

    async fn end_call(&self, call_id: &str) -> Result<(), PlatformError>;

    async fn upsert_chat_user(&self, user_id: &str, name: &str) -> Result<(), PlatformError>;

    /// Get-or-create, safe to repeat
    async fn ensure_channel(
        &self,
        channel_type: &str,
        channel_id: &str,
        created_by: &str,
    ) -> Result<(), PlatformError>;

    /// Post as `user_id`. Reposting the same `message_id` is a no-op.
    async fn send_message(
        &self,
        channel_type: &str,
        channel_id: &str,
        message_id: &str,
        text: &str,
        user_id: &str,
    ) -> Result<(), PlatformError>;
}

#[derive(Clone)]
pub struct StreamClient {
    client: reqwest::Client,
    api_key: Arc<String>,
    api_secret: Arc<String>,
    video_url: String,
    chat_url: String,
}

impl StreamClient {
    pub fn new(
        api_key: &str,
        api_secret: &str,
        video_url: &str,
        chat_url: &str,
    ) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("Parley/0.1.0")
            .build()?;

        Ok(Self {
            client,
            api_key: Arc::new(api_key.to_string()),
            api_secret: Arc::new(api_secret.to_string()),
            video_url: video_url.trim_end_matches('/').to_string(),
            chat_url: chat_url.trim_end_matches('/').to_string(),
        })
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, PlatformError> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.api_key.to_string());
        Ok(encode(
            &header,
            claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )?)
    }

    /// One-hour token scoped to a single user
    pub fn user_token(&self, user_id: &str) -> Result<String, PlatformError> {
        let now = Utc::now().timestamp();
        self.sign(&UserClaims {
            user_id: user_id.to_string(),
            exp: now + USER_TOKEN_TTL_SECS,
            iat: now - USER_TOKEN_BACKDATE_SECS,
        })
    }

    /// Five-minute server-side token
    pub fn server_token(&self) -> Result<String, PlatformError> {
        self.sign(&ServerClaims {
            user_id: "server".to_string(),
            server: true,
            exp: Utc::now().timestamp() + SERVER_TOKEN_TTL_SECS,
        })
    }

    fn call_url(&self, call_id: &str, action: &str) -> String {
        format!("{}/api/v1/call/default/{}/{}", self.video_url, call_id, action)
    }

    async fn post_chat(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, PlatformError> {
        let response = self
            .client
            .post(format!("{}{}", self.chat_url, path))
            .query(&[("api_key", self.api_key.as_str())])
            .header("Authorization", self.server_token()?)
            .header("stream-auth-type", "jwt")
            .json(&body)
            .send()
            .await?;
        Ok(response)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(PlatformError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

#[async_trait]
impl CallPlatform for StreamClient {
    async fn join_call(&self, call_id: &str, user_id: &str) -> Result<(), PlatformError> {
        info!("Joining agent {} to call {}", user_id, call_id);

        let response = self
            .client
            .post(self.call_url(call_id, "join"))
            .query(&[("api_key", self.api_key.as_str())])
            .bearer_auth(self.user_token(user_id)?)
            .json(&json!({
                "user": { "id": user_id, "name": AGENT_DISPLAY_NAME, "role": "user" }
            }))
            .send()
            .await?;

        debug!("Join call response: {}", response.status());
        check_status(response).await?;
        Ok(())
    }

    async fn end_call(&self, call_id: &str) -> Result<(), PlatformError> {
        info!("Ending call {}", call_id);

        let response = self
            .client
            .post(self.call_url(call_id, "end"))
            .query(&[("api_key", self.api_key.as_str())])
            .bearer_auth(self.server_token()?)
            .json(&json!({}))
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn upsert_chat_user(&self, user_id: &str, name: &str) -> Result<(), PlatformError> {
        let mut users = serde_json::Map::new();
        users.insert(user_id.to_string(), json!({ "id": user_id, "name": name }));

        let response = self.post_chat("/users", json!({ "users": users })).await?;
        check_status(response).await?;
        Ok(())
    }

    async fn ensure_channel(
        &self,
        channel_type: &str,
        channel_id: &str,
        created_by: &str,
    ) -> Result<(), PlatformError> {
        let response = self
            .post_chat(
                &format!("/channels/{}/{}/query", channel_type, channel_id),
                json!({ "data": { "created_by_id": created_by } }),
            )
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel_type: &str,
        channel_id: &str,
        message_id: &str,
        text: &str,
        user_id: &str,
    ) -> Result<(), PlatformError> {
        let response = self
            .post_chat(
                &format!("/channels/{}/{}/message", channel_type, channel_id),
                json!({ "message": { "id": message_id, "text": text, "user_id": user_id } }),
            )
            .await?;

        match check_status(response).await {
            Ok(_) => Ok(()),
            Err(PlatformError::Api { status: 400, message }) if message.contains("already exists") => {
                debug!("Message {} already posted", message_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("video_url", &self.video_url)
            .field("chat_url", &self.chat_url)
            .finish()
    }
}
