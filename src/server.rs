//! HTTP surface: inbound message intake and draft review.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::DatabaseError;
use crate::pipeline::{InboundMessage, ProcessingResult, WebhookProcessor};
use crate::store::DraftDecision;

/// Default page size for the draft list.
const DEFAULT_DRAFT_LIMIT: usize = 50;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<WebhookProcessor>,
}

/// Build the Axum router.
pub fn routes(processor: Arc<WebhookProcessor>) -> Router {
    let state = AppState { processor };

    Router::new()
        .route("/health", get(health))
        .route("/api/inbound", post(inbound))
        .route("/api/drafts", get(list_drafts))
        .route("/api/drafts/{id}/approve", post(approve_draft))
        .route("/api/drafts/{id}/reject", post(reject_draft))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "social-agent"
    }))
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Always 200 for a well-formed message: the result body tells the transport
/// what to do, and the platform only needs an acknowledgement. A body that
/// does not parse gets the rejection status with a JSON error result.
async fn inbound(
    State(state): State<AppState>,
    payload: Result<Json<InboundMessage>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(message)) => Json(state.processor.process(message).await).into_response(),
        Err(rejection) => {
            warn!(status = %rejection.status(), error = %rejection.body_text(), "Rejected inbound payload");
            (
                rejection.status(),
                Json(ProcessingResult::error(rejection.body_text())),
            )
                .into_response()
        }
    }
}

// ── Drafts ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_drafts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_DRAFT_LIMIT);
    match state.processor.store().list_pending_drafts(limit).await {
        Ok(drafts) => (StatusCode::OK, Json(serde_json::json!(drafts))),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct ApproveRequest {
    text: Option<String>,
}

/// Approve a draft. The body is optional: `{"text": "..."}` replaces the
/// draft content before it is marked sent.
async fn approve_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let edited_content = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<ApproveRequest>(&body) {
            Ok(req) => req.text.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": format!("Invalid body: {e}")})),
                );
            }
        }
    };

    resolve(&state, &id, DraftDecision::Approve { edited_content }).await
}

async fn reject_draft(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    resolve(&state, &id, DraftDecision::Reject).await
}

async fn resolve(
    state: &AppState,
    id: &str,
    decision: DraftDecision,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.processor.store().resolve_draft(id, decision).await {
        Ok(message) => {
            info!(id = %id, status = ?message.approval_status, "Draft resolved via API");
            (StatusCode::OK, Json(serde_json::json!(message)))
        }
        Err(e) => error_response(e),
    }
}

fn error_response(e: DatabaseError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &e {
        DatabaseError::NotFound { .. } => StatusCode::NOT_FOUND,
        DatabaseError::Constraint(_) => StatusCode::CONFLICT,
        _ => {
            warn!(error = %e, "Draft API storage error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({"error": e.to_string()})))
}
