//! REST API Server for the digital twin
//!
//! Thin HTTP surface over the conversation service and session memory. The
//! session id travels in the request body, the query string, or the
//! `dt-session-id` cookie.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::conversation::ConversationService;
use crate::error::TwinError;
use crate::memory::lifecycle::{parse_session_id, SessionLifecycleManager};

pub const SESSION_COOKIE: &str = "dt-session-id";
const DEFAULT_CONVERSATION_LIMIT: usize = 20;
const GLOBAL_LISTING_LIMIT: usize = 20;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_id: Option<String>,
    pub limit: Option<usize>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::error(message))).into_response()
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ConversationService>,
}

impl ApiState {
    fn memory(&self) -> &SessionLifecycleManager {
        self.service.memory()
    }
}

/// =============================
/// Session Transport Helpers
/// =============================

fn session_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn session_cookie(id: Uuid, max_age_secs: u64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Secure; Path=/; Max-Age={}",
        SESSION_COOKIE, id, max_age_secs
    )
}

fn with_session_cookie(mut response: Response, id: Uuid, max_age_secs: u64) -> Response {
    if let Ok(value) = HeaderValue::from_str(&session_cookie(id, max_age_secs)) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

/// A present, non-blank `sessionId`, or a 400. An id that is not a UUID
/// names no session and resolves to `None`.
fn require_session(raw: Option<&str>) -> Result<Option<Uuid>, Response> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => Ok(parse_session_id(raw)),
        None => Err(fail(StatusCode::BAD_REQUEST, "sessionId is required")),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Ask Endpoint
/// =============================

async fn ask(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Response {
    let session_id = req
        .session_id
        .filter(|v| !v.trim().is_empty())
        .or_else(|| session_from_cookie(&headers));
    let question = req.question.unwrap_or_default();

    match state.service.ask(&question, session_id.as_deref()).await {
        Ok(answer) => {
            let max_age = state.memory().config().session_ttl.as_secs();
            let id = answer.session_id;
            let response = match &answer.generation_error {
                None => ok(&answer),
                Some(_) => (
                    StatusCode::OK,
                    Json(ApiResponse {
                        success: false,
                        data: serde_json::to_value(&answer).ok(),
                        error: Some("Failed to generate response".to_string()),
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    }),
                )
                    .into_response(),
            };
            with_session_cookie(response, id, max_age)
        }
        Err(TwinError::InvalidInput(message)) => fail(StatusCode::BAD_REQUEST, message),
        Err(e) => fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Ask handler failed: {}", e),
        ),
    }
}

/// =============================
/// Session Endpoints
/// =============================

async fn create_session(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Option<Json<SessionRequest>>,
) -> Response {
    let requested = body
        .and_then(|Json(req)| req.session_id)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| session_from_cookie(&headers));

    let id = state.memory().get_or_create(requested.as_deref()).await.into_value();
    let max_age = state.memory().config().session_ttl.as_secs();
    with_session_cookie(ok(serde_json::json!({ "sessionId": id })), id, max_age)
}

async fn validate_session(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let id = match require_session(query.session_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let exists = match id {
        Some(id) => state.memory().validate(id).await.into_value(),
        None => false,
    };
    ok(serde_json::json!({ "exists": exists }))
}

async fn session_details(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let id = match require_session(query.session_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let session = match id {
        Some(id) => state.memory().session_details(id).await.into_value(),
        None => None,
    };
    ok(session)
}

async fn session_summary(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let id = match require_session(query.session_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let summary = match id {
        Some(id) => state.memory().summarize(id).await.into_value(),
        None => String::new(),
    };
    ok(serde_json::json!({ "summary": summary }))
}

async fn session_stats(State(state): State<ApiState>) -> Response {
    ok(state.memory().statistics().await.into_value())
}

async fn cleanup_sessions(State(state): State<ApiState>) -> Response {
    let removed = state.memory().cleanup().await.into_value();
    ok(serde_json::json!({ "removed": removed }))
}

/// =============================
/// Conversation Endpoints
/// =============================

async fn get_conversation(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let raw = query.session_id.clone();
    let id = match require_session(raw.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let limit = query.limit.unwrap_or(DEFAULT_CONVERSATION_LIMIT);

    let (messages, session) = match id {
        Some(id) => (
            state.memory().history(id, Some(limit)).await.into_value(),
            state.memory().session_details(id).await.into_value(),
        ),
        None => (Vec::new(), None),
    };

    ok(serde_json::json!({
        "sessionId": raw,
        "messages": messages,
        "userInfo": session.as_ref().map(|s| &s.user_info),
        "conversationLength": session.as_ref().map_or(0, |s| s.message_count()),
        "totalMessages": session.as_ref().map_or(0, |s| s.metadata.total_messages),
    }))
}

async fn export_conversation(
    State(state): State<ApiState>,
    Json(req): Json<SessionRequest>,
) -> Response {
    let id = match require_session(req.session_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let export = match id {
        Some(id) => state.memory().export(id).await.into_value(),
        None => None,
    };
    let Some(export) = export else {
        return fail(StatusCode::NOT_FOUND, "Session not found");
    };

    let filename = export.filename();
    let mut document = serde_json::to_value(&export).unwrap_or_default();
    if let Some(fields) = document.as_object_mut() {
        fields.insert("filename".to_string(), serde_json::Value::String(filename));
    }
    ok(document)
}

async fn delete_conversation(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let id = match require_session(query.session_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let deleted = match id {
        Some(id) => state.memory().delete(id).await.into_value(),
        None => false,
    };
    ok(serde_json::json!({ "deleted": deleted }))
}

async fn global_conversations(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let exclude = query.session_id.as_deref().and_then(parse_session_id);
    let lines = state.memory().recent_global(exclude).await.into_value();
    let entries = state
        .memory()
        .global_entries(query.limit.unwrap_or(GLOBAL_LISTING_LIMIT))
        .await
        .into_value();

    ok(serde_json::json!({
        "conversations": lines,
        "entries": entries,
    }))
}

/// =============================
/// Router
/// =============================

pub fn create_router(service: Arc<ConversationService>) -> Router {
    let state = ApiState { service };

    Router::new()
        .route("/health", get(health))
        .route("/api/digital-twin", post(ask))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/validate", get(validate_session))
        .route("/api/sessions/details", get(session_details))
        .route("/api/sessions/summary", get(session_summary))
        .route("/api/sessions/stats", get(session_stats))
        .route("/api/sessions/cleanup", post(cleanup_sessions))
        .route(
            "/api/conversations",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/conversations/export", post(export_conversation))
        .route("/api/global-conversations", get(global_conversations))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    service: Arc<ConversationService>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(service);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::conversation::testing::EchoGenerator;
    use crate::store::InMemoryBackend;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router() -> Router {
        let memory = SessionLifecycleManager::new(
            Arc::new(InMemoryBackend::new()),
            MemoryConfig::default(),
        );
        let service = ConversationService::new(
            Arc::new(memory),
            Arc::new(EchoGenerator::default()),
            Duration::from_secs(1),
        );
        create_router(Arc::new(service))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_uri(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = send(&router(), get_uri("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ask_sets_cookie_and_continues_session() {
        let router = router();

        let (status, headers, body) = send(
            &router,
            post_json("/api/digital-twin", serde_json::json!({ "question": "Hi, I'm Jane Doe" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["conversationLength"], 2);
        assert_eq!(body["data"]["matches"], 1);

        let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("dt-session-id={}", session_id)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=86400"));

        let follow_up = Request::builder()
            .method("POST")
            .uri("/api/digital-twin")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, format!("theme=dark; dt-session-id={}", session_id))
            .body(Body::from(r#"{"question":"What do you build?"}"#))
            .unwrap();
        let (_, _, body) = send(&router, follow_up).await;
        assert_eq!(body["data"]["sessionId"], session_id.as_str());
        assert_eq!(body["data"]["conversationLength"], 4);
    }

    #[tokio::test]
    async fn test_blank_question_is_bad_request() {
        let (status, _, body) = send(
            &router(),
            post_json("/api/digital-twin", serde_json::json!({ "question": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _, _) =
            send(&router(), post_json("/api/digital-twin", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_session_id_is_bad_request() {
        let router = router();
        for uri in [
            "/api/conversations",
            "/api/sessions/validate",
            "/api/sessions/details",
            "/api/sessions/summary",
        ] {
            let (status, _, body) = send(&router, get_uri(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["error"], "sessionId is required");
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle_over_http() {
        let router = router();

        let (_, _, created) =
            send(&router, post_json("/api/sessions", serde_json::json!({}))).await;
        let id = created["data"]["sessionId"].as_str().unwrap().to_string();

        let (_, _, valid) =
            send(&router, get_uri(&format!("/api/sessions/validate?sessionId={}", id))).await;
        assert_eq!(valid["data"]["exists"], true);

        send(
            &router,
            post_json(
                "/api/digital-twin",
                serde_json::json!({ "question": "Tell me about your projects", "sessionId": id }),
            ),
        )
        .await;

        let (_, _, history) =
            send(&router, get_uri(&format!("/api/conversations?sessionId={}&limit=1", id))).await;
        assert_eq!(history["data"]["messages"].as_array().unwrap().len(), 1);
        assert_eq!(history["data"]["conversationLength"], 2);

        let (status, _, exported) = send(
            &router,
            post_json("/api/conversations/export", serde_json::json!({ "sessionId": id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(exported["data"]["stats"]["totalMessages"], 2);
        assert!(exported["data"]["filename"]
            .as_str()
            .unwrap()
            .starts_with(&format!("conversation_{}_", id)));

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/conversations?sessionId={}", id))
            .body(Body::empty())
            .unwrap();
        let (_, _, deleted) = send(&router, delete).await;
        assert_eq!(deleted["data"]["deleted"], true);

        let (status, _, _) = send(
            &router,
            post_json("/api/conversations/export", serde_json::json!({ "sessionId": id })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_and_cleanup() {
        let router = router();
        send(&router, post_json("/api/sessions", serde_json::json!({}))).await;

        let (_, _, stats) = send(&router, get_uri("/api/sessions/stats")).await;
        assert_eq!(stats["data"]["currentActive"], 1);

        let (_, _, cleaned) =
            send(&router, post_json("/api/sessions/cleanup", serde_json::json!({}))).await;
        assert_eq!(cleaned["data"]["removed"], 0);

        let (_, _, global) = send(&router, get_uri("/api/global-conversations")).await;
        assert!(global["data"]["conversations"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("a=1; dt-session-id=abc ; b=2"),
        );
        assert_eq!(session_from_cookie(&headers).as_deref(), Some("abc"));
        assert_eq!(session_from_cookie(&HeaderMap::new()), None);
    }
}
