//! Wire-format events for the ingestion channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names delivered to subscribers.
pub struct EventName;

impl EventName {
    pub const PHASE_STARTED: &'static str = "phase_started";
    pub const PROGRESS_UPDATE: &'static str = "progress_update";
    pub const INGESTION_COMPLETE: &'static str = "ingestion_complete";
    pub const ERROR: &'static str = "error";
    pub const TOKEN_REFRESH_REQUIRED: &'static str = "token_refresh_required";
    pub const PONG: &'static str = "pong";
    pub const ROOM_JOINED: &'static str = "room_joined";
    pub const ROOM_LEFT: &'static str = "room_left";
}

// ---------------------------------------------------------------------------
// Server → client payloads
// ---------------------------------------------------------------------------

/// `phase_started` payload. Emitted unconditionally at every phase boundary.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseStarted {
    pub project_id: String,
    pub phase: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_phases: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase_index: Option<u32>,
}

/// Optional phase-position metadata attached to `phase_started`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseInfo {
    pub total_phases: Option<u32>,
    pub current_phase_index: Option<u32>,
}

/// `progress_update` payload. Subject to per-project rate limiting; within a
/// batch window only the most recent update survives.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub project_id: String,
    pub phase: String,
    pub progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub metrics: Value,
}

/// `ingestion_complete` payload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionComplete {
    pub project_id: String,
    pub result: Value,
}

/// `error` payload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionError {
    pub project_id: String,
    pub phase: String,
    pub error: String,
}

/// `token_refresh_required` payload, sent to a single connection.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRefreshRequired {
    pub reason: String,
    pub expires_at: i64,
}

// ---------------------------------------------------------------------------
// Client → server messages
// ---------------------------------------------------------------------------

/// A message received from the client over the socket.
#[derive(Debug, Deserialize)]
pub struct ClientAction {
    pub action: String,
    #[serde(default)]
    pub room: Option<String>,
}
