use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::{info, warn};

use crate::config::PacerConfig;
use crate::dedup::Deduplicator;
use crate::pacer::{RandomJitter, paced_stream_with};

/// Header carrying a client-chosen id for replay detection.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub config: PacerConfig,
    pub dedup: Mutex<Deduplicator>,
}

impl AppState {
    pub fn new(config: PacerConfig) -> Self {
        let dedup = Deduplicator::new(config.server.dedup_window(), config.server.dedup_capacity);
        Self {
            config,
            dedup: Mutex::new(dedup),
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Error mapping ─────────────────────────────────────────────────────

pub enum ApiError {
    Replay(String),
    LockPoisoned,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Replay(id) => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({ "error": format!("Request {} already processed", id) })),
            )
                .into_response(),
            ApiError::LockPoisoned => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Deduplicator lock poisoned" })),
            )
                .into_response(),
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/config", get(get_config))
        .route("/api/pace", post(pace))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_config(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.config.clone())
}

/// Relay the request body back through the pacer as a streamed
/// `text/plain` response.
async fn pace(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(id) = &request_id {
        let fresh = state
            .dedup
            .lock()
            .map_err(|_| ApiError::LockPoisoned)?
            .check_and_insert(id, Instant::now());
        if !fresh {
            warn!(request_id = %id, "Rejected replayed request");
            return Err(ApiError::Replay(id.clone()));
        }
    }

    info!(request_id = request_id.as_deref().unwrap_or("-"), "Pacing response");
    let paced = paced_stream_with(body.into_data_stream(), &state.config.pacing, RandomJitter);

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(paced),
    )
        .into_response())
}
