//! Realtime channel introspection: connection stats and the denial audit.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::denial_log::DenialEntry;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/realtime/stats", get(stats))
        .route("/realtime/denials", get(denials))
}

// ---------------------------------------------------------------------------
// GET /api/v1/realtime/stats
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub active_connections: usize,
    pub denied_attempts: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/realtime/stats",
    tag = "Realtime",
    responses(
        (status = 200, description = "Current channel statistics", body = StatsResponse),
    ),
)]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        active_connections: state.rooms.active_connections(),
        denied_attempts: state.gate.denials().len(),
    })
}

// ---------------------------------------------------------------------------
// GET /api/v1/realtime/denials
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct DenialsQuery {
    /// Maximum entries to return, newest first.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DenialsResponse {
    pub denials: Vec<DenialEntry>,
}

#[utoipa::path(
    get,
    path = "/api/v1/realtime/denials",
    tag = "Realtime",
    params(DenialsQuery),
    responses(
        (status = 200, description = "Recent rejected connection attempts", body = DenialsResponse),
    ),
)]
pub async fn denials(
    State(state): State<AppState>,
    Query(query): Query<DenialsQuery>,
) -> Json<DenialsResponse> {
    Json(DenialsResponse {
        denials: state.gate.denials().recent(query.limit),
    })
}
