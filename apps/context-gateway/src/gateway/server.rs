//! WebSocket endpoint: handshake authorization and per-connection loop.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time;

use crate::auth::gate::{DenialReason, Handshake, SessionContext};
use crate::gateway::emitter::ingestion_room;
use crate::gateway::events::{ClientAction, EventName, TokenRefreshRequired};
use crate::AppState;

/// Application-level close codes (4000-range).
const CLOSE_BAD_REQUEST: u16 = 4000;
const CLOSE_UNAUTHORIZED: u16 = 4001;
const CLOSE_FORBIDDEN: u16 = 4003;

/// How often a session re-checks whether its token needs refreshing.
const REFRESH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let source_addr = client_addr(&headers, peer);
    ws.on_upgrade(move |socket| handle_connection(socket, state, params, source_addr))
}

/// Client address for denial logging, honoring proxy headers.
fn client_addr(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return real_ip.to_string();
    }
    peer.ip().to_string()
}

async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    params: ConnectParams,
    source_addr: String,
) {
    let connection_id = context_common::id::prefixed_ulid(context_common::id::prefix::CONNECTION);

    let handshake = Handshake {
        connection_id,
        token: params.token,
        project_id: params.project_id,
        source_addr,
    };

    let session = match state.gate.authorize(&handshake).await {
        Ok(session) => session,
        Err(err) => {
            let code = match err.code {
                DenialReason::NoProjectId => CLOSE_BAD_REQUEST,
                DenialReason::NoToken | DenialReason::InvalidToken => CLOSE_UNAUTHORIZED,
                DenialReason::AccessDenied => CLOSE_FORBIDDEN,
            };
            close_with(socket, code, err.message()).await;
            return;
        }
    };

    run_session(socket, state, session).await;
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &str) {
    let frame = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    let _ = socket.send(frame).await;
}

/// Main session loop: forward fan-out events, answer client actions, and
/// nudge the client to refresh an expiring token.
async fn run_session(socket: WebSocket, state: AppState, session: SessionContext) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    state
        .rooms
        .register(&session.connection_id, &session.user_id, out_tx);
    state
        .rooms
        .join(&session.connection_id, &ingestion_room(&session.project_id));

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        project_id = %session.project_id,
        total = state.rooms.active_connections(),
        "ingestion channel subscribed"
    );

    let mut refresh_timer = time::interval(REFRESH_CHECK_INTERVAL);
    refresh_timer.tick().await; // First tick fires immediately; skip it.
    let mut refresh_sent = false;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, &session, &text).await;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            outbound = out_rx.recv() => {
                match outbound {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Registry dropped the sender (connection was pruned).
                    None => break,
                }
            }

            _ = refresh_timer.tick() => {
                if !refresh_sent && state.gate.needs_refresh(session.token_expiry) {
                    let payload = TokenRefreshRequired {
                        reason: "token_expiring".to_string(),
                        expires_at: session.token_expiry.timestamp(),
                    };
                    state.rooms.send_to_connection(
                        &session.connection_id,
                        EventName::TOKEN_REFRESH_REQUIRED,
                        serde_json::to_value(&payload).unwrap(),
                    );
                    refresh_sent = true;
                }
            }
        }
    }

    state.rooms.unregister(&session.connection_id);
    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        "ingestion channel closed"
    );
}

/// Handle one client-sent action. Bad input is answered with an error event,
/// never by dropping the connection.
async fn handle_client_message(state: &AppState, session: &SessionContext, text: &str) {
    let action: ClientAction = match serde_json::from_str(text) {
        Ok(action) => action,
        Err(_) => {
            send_error(state, session, "Invalid JSON");
            return;
        }
    };

    match action.action.as_str() {
        "ping" => {
            state.rooms.send_to_connection(
                &session.connection_id,
                EventName::PONG,
                serde_json::json!({}),
            );
        }
        "join" => {
            let room = action.room.unwrap_or_default();
            if let Some(granted) = joinable_project(state, session, &room).await {
                if granted {
                    state.rooms.join(&session.connection_id, &room);
                    state.rooms.send_to_connection(
                        &session.connection_id,
                        EventName::ROOM_JOINED,
                        serde_json::json!({ "room": room }),
                    );
                    return;
                }
            }
            send_error(state, session, &format!("Cannot join room: {room}"));
        }
        "leave" => {
            let room = action.room.unwrap_or_default();
            if !room.is_empty() {
                state.rooms.leave(&session.connection_id, &room);
                state.rooms.send_to_connection(
                    &session.connection_id,
                    EventName::ROOM_LEFT,
                    serde_json::json!({ "room": room }),
                );
            }
        }
        other => {
            send_error(state, session, &format!("Unknown action: {other}"));
        }
    }
}

/// Only `ingestion:{project_id}` rooms may be joined, and only when the
/// access policy grants the project. Returns `None` for a malformed room.
async fn joinable_project(state: &AppState, session: &SessionContext, room: &str) -> Option<bool> {
    let project_id = room.strip_prefix("ingestion:").filter(|p| !p.is_empty())?;
    Some(
        state
            .gate
            .check_project_access(&session.user_id, project_id)
            .await,
    )
}

fn send_error(state: &AppState, session: &SessionContext, message: &str) {
    state.rooms.send_to_connection(
        &session.connection_id,
        EventName::ERROR,
        serde_json::json!({ "message": message }),
    );
}
