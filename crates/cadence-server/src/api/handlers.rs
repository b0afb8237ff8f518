//! API endpoint handlers
//!
//! Core calls are synchronous and touch SQLite, so every handler runs its
//! work on the blocking pool.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::Value;

use cadence_core::{
    CardState, CardStats, CoreError, DueCount, ErrorKind, NextItem, ProgressSummary,
    ReviewService, SessionKind, StartOutcome, SubmitResult,
};

use super::state::AppState;

// ============================================================================
// ERRORS
// ============================================================================

/// Error returned by handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Core(e) => e.kind().as_str(),
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run a core call on the blocking pool
async fn blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&ReviewService) -> cadence_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let service = state.service.clone();
    let value = tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(value))
}

// ============================================================================
// SESSIONS
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub user_id: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub kind: SessionKind,
    pub limit: Option<usize>,
}

/// Start a session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> ApiResult<StartOutcome> {
    blocking(&state, move |service| {
        service.start_session(&req.user_id, &req.topics, req.kind, req.limit)
    })
    .await
}

/// Present the next item of a session
pub async fn next_item(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<NextItem> {
    blocking(&state, move |service| service.next_item(&session_id)).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub item_id: String,
    pub answer: Vec<i64>,
    #[serde(alias = "responseTime")]
    pub response_time_secs: f64,
}

/// Submit an answer for a presented item
pub async fn submit_answer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<SubmitResult> {
    blocking(&state, move |service| {
        service.submit_answer(&session_id, &req.item_id, req.answer, req.response_time_secs)
    })
    .await
}

// ============================================================================
// USERS
// ============================================================================

/// Due and due-in-Review counts
pub async fn due_count(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<DueCount> {
    blocking(&state, move |service| service.due_count(&user_id)).await
}

/// Answer counters, streaks, per-topic progress and card aggregates
pub async fn progress(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<ProgressSummary> {
    blocking(&state, move |service| service.progress_summary(&user_id)).await
}

/// Card aggregates
pub async fn stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<CardStats> {
    blocking(&state, move |service| service.user_stats(&user_id)).await
}

/// Reset one card's memory model
pub async fn reset_card(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> ApiResult<CardState> {
    blocking(&state, move |service| service.reset_card(&user_id, &item_id)).await
}

// ============================================================================
// CATALOG & HEALTH
// ============================================================================

/// Distinct catalog topics
pub async fn topics(State(state): State<AppState>) -> ApiResult<Value> {
    blocking(&state, |service| {
        let topics = service.topics()?;
        Ok(serde_json::json!({
            "total": topics.len(),
            "topics": topics,
        }))
    })
    .await
}

/// Health check
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    blocking(&state, |service| {
        let items = service.storage().count_items()?;
        Ok(serde_json::json!({
            "status": if items == 0 { "empty" } else { "healthy" },
            "totalItems": items,
            "version": cadence_core::VERSION,
        }))
    })
    .await
}
