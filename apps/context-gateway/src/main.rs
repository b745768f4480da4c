use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use context_gateway::auth::access::{AccessPolicy, HttpMembershipPolicy, MockAccessPolicy};
use context_gateway::auth::gate::ConnectionGate;
use context_gateway::auth::jwks::JwksClient;
use context_gateway::auth::verifier::{JwtVerifier, MockVerifier, TokenVerifier};
use context_gateway::config::Config;
use context_gateway::gateway::emitter::IngestionEmitter;
use context_gateway::gateway::rooms::RoomRegistry;
use context_gateway::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present; env vars may also be set externally.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // Auth strategies are chosen here, at the composition root. Everything
    // downstream only sees the trait objects.
    let (verifier, access): (Arc<dyn TokenVerifier>, Arc<dyn AccessPolicy>) =
        if config.environment.is_production() {
            let issuer = config.auth_issuer.clone().expect("checked in Config::from_env");
            let api_url = config
                .platform_api_url
                .clone()
                .expect("checked in Config::from_env");
            let jwks = JwksClient::new(&issuer);
            (
                Arc::new(JwtVerifier::new(jwks, &issuer, &config.auth_audience)),
                Arc::new(HttpMembershipPolicy::new(&api_url)),
            )
        } else {
            tracing::warn!("development auth: any non-empty token is accepted");
            (Arc::new(MockVerifier), Arc::new(MockAccessPolicy))
        };

    let gate = Arc::new(
        ConnectionGate::new(verifier, access)
            .with_refresh_threshold(Duration::from_secs(config.token_refresh_threshold_secs)),
    );

    let rooms = Arc::new(RoomRegistry::new());
    let emitter = Arc::new(IngestionEmitter::new(Duration::from_millis(
        config.emit_interval_ms,
    )));
    emitter.attach_transport(rooms.clone());

    tracing::info!(environment = ?config.environment, "context-gateway configured");

    let state = AppState {
        config: Arc::new(config),
        rooms,
        emitter: emitter.clone(),
        gate,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(context_gateway::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "context-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    // Cancel outstanding batch timers before the process exits.
    emitter.cleanup();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("install ctrl-c handler");
    tracing::info!("shutdown signal received");
}
