pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use auth::gate::ConnectionGate;
use config::Config;
use gateway::emitter::IngestionEmitter;
use gateway::rooms::RoomRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRegistry>,
    pub emitter: Arc<IngestionEmitter>,
    pub gate: Arc<ConnectionGate>,
}
