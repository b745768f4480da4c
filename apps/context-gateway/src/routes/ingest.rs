//! Internal ingestion-report API.
//!
//! Ingestion workers push phase transitions and progress here; the gateway
//! fans them out to subscribed dashboards. Not a user-facing surface: the
//! deployment keeps it on a private network and, when `INGEST_TOKEN` is
//! set, requires it in the `x-ingest-token` header.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::gateway::events::PhaseInfo;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ingest/{project_id}/phase", post(report_phase))
        .route("/ingest/{project_id}/progress", post(report_progress))
        .route("/ingest/{project_id}/complete", post(report_complete))
        .route("/ingest/{project_id}/error", post(report_error))
}

fn require_ingest_token(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.config.ingest_token.as_deref() else {
        return Ok(());
    };
    let presented = headers.get("x-ingest-token").and_then(|v| v.to_str().ok());
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("Invalid ingest token"))
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/ingest/{project_id}/phase
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct PhaseRequest {
    pub phase: String,
    pub message: String,
    #[serde(default)]
    pub total_phases: Option<u32>,
    #[serde(default)]
    pub current_phase_index: Option<u32>,
}

#[utoipa::path(
    post,
    path = "/api/v1/ingest/{project_id}/phase",
    tag = "Ingest",
    request_body = PhaseRequest,
    responses(
        (status = 202, description = "Phase announced"),
        (status = 401, description = "Invalid ingest token", body = crate::error::ApiErrorBody),
    ),
)]
pub async fn report_phase(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PhaseRequest>,
) -> Result<StatusCode, ApiError> {
    require_ingest_token(&state, &headers)?;
    state.emitter.phase_started(
        &project_id,
        &body.phase,
        &body.message,
        PhaseInfo {
            total_phases: body.total_phases,
            current_phase_index: body.current_phase_index,
        },
    );
    Ok(StatusCode::ACCEPTED)
}

// ---------------------------------------------------------------------------
// POST /api/v1/ingest/{project_id}/progress
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProgressRequest {
    pub phase: String,
    pub progress_percent: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub metrics: Value,
}

#[utoipa::path(
    post,
    path = "/api/v1/ingest/{project_id}/progress",
    tag = "Ingest",
    request_body = ProgressRequest,
    responses(
        (status = 202, description = "Progress recorded"),
        (status = 401, description = "Invalid ingest token", body = crate::error::ApiErrorBody),
    ),
)]
pub async fn report_progress(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ProgressRequest>,
) -> Result<StatusCode, ApiError> {
    require_ingest_token(&state, &headers)?;
    state.emitter.progress(
        &project_id,
        &body.phase,
        body.progress_percent,
        body.metrics,
        body.message,
    );
    Ok(StatusCode::ACCEPTED)
}

// ---------------------------------------------------------------------------
// POST /api/v1/ingest/{project_id}/complete
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteRequest {
    #[serde(default)]
    pub result: Value,
}

#[utoipa::path(
    post,
    path = "/api/v1/ingest/{project_id}/complete",
    tag = "Ingest",
    request_body = CompleteRequest,
    responses(
        (status = 202, description = "Completion announced"),
        (status = 401, description = "Invalid ingest token", body = crate::error::ApiErrorBody),
    ),
)]
pub async fn report_complete(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CompleteRequest>,
) -> Result<StatusCode, ApiError> {
    require_ingest_token(&state, &headers)?;
    state.emitter.complete(&project_id, body.result);
    Ok(StatusCode::ACCEPTED)
}

// ---------------------------------------------------------------------------
// POST /api/v1/ingest/{project_id}/error
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct ErrorRequest {
    pub phase: String,
    pub error: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/ingest/{project_id}/error",
    tag = "Ingest",
    request_body = ErrorRequest,
    responses(
        (status = 202, description = "Error announced"),
        (status = 401, description = "Invalid ingest token", body = crate::error::ApiErrorBody),
    ),
)]
pub async fn report_error(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ErrorRequest>,
) -> Result<StatusCode, ApiError> {
    require_ingest_token(&state, &headers)?;
    state.emitter.error(&project_id, &body.phase, &body.error);
    Ok(StatusCode::ACCEPTED)
}
