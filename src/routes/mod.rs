//! API routes
//!
//! JSON surface consumed by the browser views. Every handler locks the demo state
//! for the duration of one call, so handlers and timer callbacks never interleave.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditSink};
use crate::catalog::Domain;
use crate::conversation::{ScriptedConversation, Turn};
use crate::core::{Account, ContextSnapshot, KycResult, PlaybackError, SessionId, SessionSnapshot};
use crate::AppState;

/// Errors returned to API clients
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

impl From<PlaybackError> for ApiError {
    fn from(err: PlaybackError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    turn_delay_ms: u64,
}

#[derive(Debug, Serialize)]
struct DomainSummary {
    key: &'static str,
    conversations: usize,
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    conversation_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AuditOrder {
    #[default]
    Oldest,
    Newest,
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    #[serde(default)]
    order: AuditOrder,
}

#[derive(Debug, Deserialize)]
struct AppendAuditRequest {
    name: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    domain: Domain,
}

#[derive(Debug, Deserialize)]
struct ProductRequest {
    product: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        turn_delay_ms: state.config.turn_delay_ms,
    })
}

async fn list_domains(State(state): State<AppState>) -> Json<Vec<DomainSummary>> {
    let demo = state.demo.lock().await;
    Json(
        Domain::ALL
            .iter()
            .map(|d| DomainSummary {
                key: d.key(),
                conversations: demo.catalog().list(*d).len(),
            })
            .collect(),
    )
}

async fn list_conversations(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Json<Vec<ScriptedConversation>> {
    let demo = state.demo.lock().await;
    Json(
        demo.list_conversations(&domain)
            .iter()
            .map(|c| c.as_ref().clone())
            .collect(),
    )
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionSnapshot>)> {
    let mut demo = state.demo.lock().await;
    let id = demo.create_session(&request.conversation_id)?;
    Ok((StatusCode::CREATED, Json(demo.engine().snapshot(id)?)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<SessionSnapshot>> {
    let demo = state.demo.lock().await;
    Ok(Json(demo.engine().snapshot(id)?))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> ApiResult<StatusCode> {
    let mut demo = state.demo.lock().await;
    demo.engine_mut().close_session(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revealed_turns(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> ApiResult<Json<Vec<Turn>>> {
    let demo = state.demo.lock().await;
    Ok(Json(demo.engine().revealed_turns(id)?))
}

async fn control_session(
    State(state): State<AppState>,
    Path((id, action)): Path<(SessionId, String)>,
) -> ApiResult<Json<SessionSnapshot>> {
    let mut demo = state.demo.lock().await;
    let engine = demo.engine_mut();
    match action.as_str() {
        "start" => engine.start(id)?,
        "pause" => engine.pause(id)?,
        "reset" => engine.reset(id)?,
        "skip" => engine.skip_to_end(id)?,
        other => return Err(ApiError::BadRequest(format!("unknown action '{}'", other))),
    }
    Ok(Json(engine.snapshot(id)?))
}

async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditEvent>> {
    let demo = state.demo.lock().await;
    Json(match query.order {
        AuditOrder::Oldest => demo.audit().all(),
        AuditOrder::Newest => demo.audit().newest_first(),
    })
}

async fn append_audit(
    State(state): State<AppState>,
    Json(request): Json<AppendAuditRequest>,
) -> ApiResult<StatusCode> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("event name is empty".into()));
    }
    let demo = state.demo.lock().await;
    demo.audit().append(&request.name, &request.detail);
    Ok(StatusCode::NO_CONTENT)
}

async fn get_context(State(state): State<AppState>) -> Json<ContextSnapshot> {
    let demo = state.demo.lock().await;
    Json(demo.context().snapshot())
}

async fn set_mode(
    State(state): State<AppState>,
    Json(request): Json<ModeRequest>,
) -> Json<ContextSnapshot> {
    let mut demo = state.demo.lock().await;
    demo.context_mut().set_mode(request.domain);
    Json(demo.context().snapshot())
}

async fn select_product(
    State(state): State<AppState>,
    Json(request): Json<ProductRequest>,
) -> Json<ContextSnapshot> {
    let mut demo = state.demo.lock().await;
    demo.context_mut().select_product(&request.product);
    Json(demo.context().snapshot())
}

async fn record_kyc(
    State(state): State<AppState>,
    Json(result): Json<KycResult>,
) -> Json<ContextSnapshot> {
    let mut demo = state.demo.lock().await;
    demo.context_mut().record_kyc(result);
    Json(demo.context().snapshot())
}

async fn open_account(
    State(state): State<AppState>,
    Json(request): Json<ProductRequest>,
) -> (StatusCode, Json<Account>) {
    let mut demo = state.demo.lock().await;
    let account = demo.context_mut().open_account(&request.product);
    (StatusCode::CREATED, Json(account))
}

async fn reset_all(State(state): State<AppState>) -> StatusCode {
    state.demo.lock().await.reset_all();
    StatusCode::NO_CONTENT
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/domains", get(list_domains))
        .route("/v1/domains/:domain/conversations", get(list_conversations))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:id", get(get_session).delete(close_session))
        .route("/v1/sessions/:id/turns", get(revealed_turns))
        .route("/v1/sessions/:id/:action", post(control_session))
        .route("/v1/audit", get(list_audit).post(append_audit))
        .route("/v1/context", get(get_context))
        .route("/v1/context/mode", put(set_mode))
        .route("/v1/context/product", put(select_product))
        .route("/v1/context/kyc", post(record_kyc))
        .route("/v1/context/accounts", post(open_account))
        .route("/v1/reset", post(reset_all))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::core::{DemoBank, TokioScheduler};

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            turn_delay_ms: 1000,
            preview_chars: 48,
            scripts_dir: None,
        }
    }

    fn app() -> Router {
        let config = test_config();
        let (scheduler, rx) = TokioScheduler::new();
        let demo = Arc::new(Mutex::new(DemoBank::new(
            Catalog::builtin().unwrap(),
            scheduler,
            config.playback(),
        )));
        tokio::spawn(crate::drive_timers(rx, Arc::clone(&demo)));
        router().with_state(AppState { config, demo })
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router, conversation_id: &str) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/v1/sessions",
            Some(json!({ "conversation_id": conversation_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_list_conversations() {
        let app = app();
        let (status, body) = call(&app, "GET", "/v1/domains/loan/conversations", None).await;
        assert_eq!(status, StatusCode::OK);
        let conversations = body.as_array().unwrap();
        assert!(!conversations.is_empty());
        assert!(conversations.iter().all(|c| c["domain"] == "loan"));

        let (status, body) = call(&app, "GET", "/v1/domains/mortgage/conversations", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_skip_and_audit_newest_first() {
        let app = app();
        let id = create(&app, "card-limit").await;

        let (status, body) = call(&app, "POST", &format!("/v1/sessions/{}/skip", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completed"], true);
        assert_eq!(body["last_index"], 2);
        assert_eq!(body["revealed"].as_array().unwrap().len(), 3);

        let (_, events) = call(&app, "GET", "/v1/audit?order=newest", None).await;
        let events = events.as_array().unwrap();
        assert_eq!(events[0]["name"], "Conversation completed");
        assert_eq!(events.last().unwrap()["name"], "Workflow changed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_playback_completes() {
        let app = app();
        let id = create(&app, "loan-auto").await;

        let (_, body) = call(&app, "POST", &format!("/v1/sessions/{}/start", id), None).await;
        assert_eq!(body["revealed"].as_array().unwrap().len(), 1);
        assert_eq!(body["playing"], true);

        tokio::time::sleep(Duration::from_secs(30)).await;

        let (_, turns) = call(&app, "GET", &format!("/v1/sessions/{}/turns", id), None).await;
        assert_eq!(turns.as_array().unwrap().len(), 3);
        let (_, body) = call(&app, "GET", &format!("/v1/sessions/{}", id), None).await;
        assert_eq!(body["completed"], true);
    }

    #[tokio::test]
    async fn test_unknown_session_and_action() {
        let app = app();
        let missing = SessionId::new();
        let (status, body) = call(&app, "GET", &format!("/v1/sessions/{}", missing), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let id = create(&app, "loan-auto").await;
        let (status, _) = call(&app, "POST", &format!("/v1/sessions/{}/rewind", id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "DELETE", &format!("/v1/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "POST", &format!("/v1/sessions/{}/start", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_global_reset() {
        let app = app();
        call(&app, "PUT", "/v1/context/product", Some(json!({ "product": "Voyager Rewards" }))).await;
        call(&app, "POST", "/v1/context/accounts", Some(json!({ "product": "Everyday Checking" }))).await;
        call(&app, "POST", "/v1/audit", Some(json!({ "name": "Report exported", "detail": "Q3" }))).await;
        let id = create(&app, "open-checking").await;

        let (_, events) = call(&app, "GET", "/v1/audit", None).await;
        assert_eq!(events[0]["name"], "Product selected");

        let (status, _) = call(&app, "POST", "/v1/reset", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, events) = call(&app, "GET", "/v1/audit", None).await;
        assert_eq!(events, json!([]));
        let (_, context) = call(&app, "GET", "/v1/context", None).await;
        assert_eq!(context["accounts"], json!([]));
        assert_eq!(context["selected_product"], Value::Null);
        let (status, _) = call(&app, "GET", &format!("/v1/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["turn_delay_ms"], 1000);
    }

    #[tokio::test]
    async fn test_empty_audit_name_rejected() {
        let app = app();
        let (status, _) = call(&app, "POST", "/v1/audit", Some(json!({ "name": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
