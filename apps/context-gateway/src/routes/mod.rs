pub mod health;
pub mod ingest;
pub mod realtime;

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", ingest::router().merge(realtime::router()))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // System
        health::health,
        // Ingest
        ingest::report_phase,
        ingest::report_progress,
        ingest::report_complete,
        ingest::report_error,
        // Realtime
        realtime::stats,
        realtime::denials,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::auth::denial_log::DenialEntry,
            health::HealthResponse,
            ingest::PhaseRequest,
            ingest::ProgressRequest,
            ingest::CompleteRequest,
            ingest::ErrorRequest,
            realtime::StatsResponse,
            realtime::DenialsResponse,
        )
    ),
    tags(
        (name = "System", description = "Health check"),
        (name = "Ingest", description = "Internal ingestion reporting"),
        (name = "Realtime", description = "Realtime channel introspection"),
    )
)]
pub struct ApiDoc;
