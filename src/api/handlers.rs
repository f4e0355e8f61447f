//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{ArchivedListResponse, ErrorResponse, QueuedResponse, SessionResponse};
use super::AppState;
use crate::runtime::SseEvent;
use crate::transport::InboundEvent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Inbound participant traffic from the chat gateway
        .route("/api/participants/:id/events", post(post_event))
        // Session inspection
        .route("/api/participants/:id", get(get_session))
        .route("/api/participants/:id/stream", get(stream_session))
        .route("/api/participants/:id/archived", get(list_archived))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Participant Events
// ============================================================

async fn post_event(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
    Json(inbound): Json<InboundEvent>,
) -> Result<Json<QueuedResponse>, AppError> {
    let event = inbound
        .into_event()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    tracing::debug!(participant_id = %participant_id, kind = event.kind(), "Inbound event");

    state
        .runtime
        .send_event(&participant_id, event)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(QueuedResponse { queued: true }))
}

// ============================================================
// Session Inspection
// ============================================================

async fn get_session(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state
        .runtime
        .snapshot(&participant_id)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(SessionResponse {
        state: session.state.name(),
        session: serde_json::to_value(&session).unwrap_or(Value::Null),
    }))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Subscribe before reading the snapshot so no change falls in between
    let broadcast_rx = state
        .runtime
        .subscribe(&participant_id)
        .await
        .map_err(AppError::Internal)?;

    let session = state
        .runtime
        .snapshot(&participant_id)
        .await
        .map_err(AppError::Internal)?;

    let init_event = SseEvent::Init {
        session: serde_json::to_value(&session).unwrap_or(Value::Null),
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

async fn list_archived(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<Json<ArchivedListResponse>, AppError> {
    let archived = state
        .runtime
        .archived(&participant_id)
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(ArchivedListResponse {
        sessions: archived
            .into_iter()
            .map(|a| serde_json::to_value(a).unwrap_or(Value::Null))
            .collect(),
    }))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("interview-bot ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
