use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::WebhookError;
use crate::events::WebhookEvent;
use crate::router::WebhookRouter;
use crate::signature::{verify_signature, API_KEY_HEADER, SIGNATURE_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<WebhookRouter>,
    /// Shared secret the platform signs deliveries with
    pub webhook_secret: Arc<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Authenticate, decode and route one delivery
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, WebhookError> {
    let (Some(signature), Some(_api_key)) = (
        header(&headers, SIGNATURE_HEADER),
        header(&headers, API_KEY_HEADER),
    ) else {
        return Err(WebhookError::MissingHeaders);
    };

    if !verify_signature(&body, signature, &state.webhook_secret) {
        return Err(WebhookError::InvalidSignature);
    }

    let event = WebhookEvent::decode(&body)?;
    state.router.handle(event).await?;

    Ok(Json(json!({ "status": "ok" })))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/webhook", post(webhook))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign;
    use crate::steps::RetryPolicy;
    use crate::storage::{MeetingStatus, MeetingStore};
    use crate::testing::{fake_responder, FakeJobQueue, FakePlatform, InMemoryStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "webhook-secret";

    fn state(store: Arc<InMemoryStore>) -> AppState {
        let router = WebhookRouter::new(
            store,
            Arc::new(FakePlatform::default()),
            Arc::new(fake_responder("Hello")),
            Arc::new(FakeJobQueue::default()),
            RetryPolicy::new(1, Duration::ZERO),
        );
        AppState {
            router: Arc::new(router),
            webhook_secret: Arc::new(SECRET.to_string()),
        }
    }

    fn delivery(body: &str, signature: Option<&str>, api_key: Option<&str>) -> Request<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        if let Some(api_key) = api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        request.body(Body::from(body.to_string())).unwrap()
    }

    fn signed(body: &str) -> Request<Body> {
        delivery(body, Some(&sign(body, SECRET)), Some("public-key"))
    }

    async fn send(store: Arc<InMemoryStore>, request: Request<Body>) -> (StatusCode, Value) {
        let response = app(state(store)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(state(Arc::default()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_session_ended_delivery() {
        let store = Arc::new(InMemoryStore::default());
        store.insert_meeting("m1", MeetingStatus::Active, "a1");
        let body = r#"{"type":"call.session_ended","call":{"custom":{"meetingId":"m1"}}}"#;

        let (status, json) = send(store.clone(), signed(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "status": "ok" }));
        let meeting = store.get_meeting("m1").unwrap().unwrap();
        assert_eq!(meeting.status, MeetingStatus::Processing);
        assert!(meeting.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_recording_ready_delivery() {
        let store = Arc::new(InMemoryStore::default());
        store.insert_meeting("m1", MeetingStatus::Completed, "a1");
        let body = r#"{"type":"call.recording_ready","call_cid":"default:m1","call_recording":{"url":"https://x/y.mp4"}}"#;

        let (status, _) = send(store.clone(), signed(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            store.get_meeting("m1").unwrap().unwrap().recording_url.as_deref(),
            Some("https://x/y.mp4")
        );
    }

    #[tokio::test]
    async fn test_missing_headers_is_bad_request() {
        let body = r#"{"type":"call.session_ended"}"#;
        let signature = sign(body, SECRET);

        let (status, json) = send(Arc::default(), delivery(body, None, Some("k"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let (status, _) = send(Arc::default(), delivery(body, Some(&signature), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_signature_is_unauthorized_and_does_nothing() {
        let store = Arc::new(InMemoryStore::default());
        store.insert_meeting("m1", MeetingStatus::Active, "a1");
        let body = r#"{"type":"call.session_ended","call":{"custom":{"meetingId":"m1"}}}"#;
        let forged = sign(body, "wrong-secret");

        let (status, json) = send(store.clone(), delivery(body, Some(&forged), Some("k"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid signature");
        assert_eq!(
            store.get_meeting("m1").unwrap().unwrap().status,
            MeetingStatus::Active
        );
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let (status, _) = send(Arc::default(), signed("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_start_is_not_found() {
        let store = Arc::new(InMemoryStore::default());
        store.insert_meeting("m1", MeetingStatus::Completed, "a1");
        let body = r#"{"type":"call.session_started","call":{"custom":{"meetingId":"m1"}}}"#;

        let (status, json) = send(store, signed(body)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("m1"));
    }
}
