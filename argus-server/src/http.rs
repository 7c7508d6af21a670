// HTTP routes

use crate::connection_manager::ConnectionMetadata;
use crate::websocket::websocket_handler;
use crate::AppState;
use argus_core::{PipelineInfo, ProctorError, SessionId};
use argus_eye::frame::now_secs;
use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct SessionEntry {
    pub session_id: SessionId,
    pub metadata: ConnectionMetadata,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub active_sessions: usize,
    pub sessions: Vec<SessionEntry>,
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
pub struct PipelineInfoResponse {
    pub pipeline: PipelineInfo,
    pub connections: usize,
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub session_id: SessionId,
    pub cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<&ProctorError> for ErrorResponse {
    fn from(err: &ProctorError) -> Self {
        Self {
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.pipeline.config().server.cors_origins);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ws/sessions", get(sessions_handler))
        .route("/ws/sessions/:session_id", delete(clear_session_handler))
        .route("/ws/sessions/:session_id/summary", get(session_summary_handler))
        .route("/ws/pipeline/info", get(pipeline_info_handler))
        .route("/ws/:session_id", get(websocket_handler))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::DELETE])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

async fn root_handler() -> impl IntoResponse {
    Json(RootResponse {
        message: "Argus proctoring analytics".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.pipeline.is_running() {
        "healthy"
    } else {
        "shutting_down"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn sessions_handler(State(state): State<AppState>) -> impl IntoResponse {
    let sessions: Vec<SessionEntry> = state
        .connections
        .sessions()
        .into_iter()
        .map(|(session_id, metadata)| SessionEntry {
            session_id,
            metadata,
        })
        .collect();

    Json(SessionsResponse {
        active_sessions: sessions.len(),
        sessions,
        timestamp: now_secs(),
    })
}

async fn session_summary_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match state.pipeline.session_summary(&session_id) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(ErrorResponse::from(&e))).into_response(),
    }
}

async fn clear_session_handler(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let cleared = state.pipeline.clear_session(&session_id);
    Json(ClearResponse {
        session_id,
        cleared,
    })
}

async fn pipeline_info_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(PipelineInfoResponse {
        pipeline: state.pipeline.pipeline_info(),
        connections: state.connections.count(),
        timestamp: now_secs(),
    })
}
