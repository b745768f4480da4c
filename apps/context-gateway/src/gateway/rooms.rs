//! Connection and room registry implementing the fan-out transport.
//!
//! Rooms are created when the first connection joins and removed when the
//! last one leaves. A send to a closed connection prunes it from the
//! registry, mirroring how dead sockets are reaped on broadcast.

use std::collections::HashSet;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

/// Sender half of a connection's outbound queue. The session loop drains the
/// receiver and writes to the socket.
pub type Outbound = mpsc::UnboundedSender<String>;

/// Room-based fan-out as seen by the event emitter.
pub trait RoomTransport: Send + Sync {
    /// Deliver an event to every connection subscribed to `room`.
    fn send_to_room(&self, room: &str, event: &str, payload: Value);

    /// Number of connections currently subscribed to `room`.
    fn subscriber_count(&self, room: &str) -> usize;
}

struct ConnectionEntry {
    user_id: String,
    tx: Outbound,
    rooms: HashSet<String>,
}

/// Shared registry of connections and their room memberships.
pub struct RoomRegistry {
    connections: DashMap<String, ConnectionEntry>,
    rooms: DashMap<String, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Track a newly authorized connection.
    pub fn register(&self, connection_id: &str, user_id: &str, tx: Outbound) {
        self.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                user_id: user_id.to_string(),
                tx,
                rooms: HashSet::new(),
            },
        );
    }

    /// Remove a connection from every room it belongs to. Rooms left empty
    /// are deleted.
    pub fn unregister(&self, connection_id: &str) {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            return;
        };
        for room in &entry.rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(connection_id);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
        tracing::info!(
            connection_id,
            user_id = %entry.user_id,
            total = self.connections.len(),
            "connection removed"
        );
    }

    /// Add a connection to a room, creating the room if needed.
    pub fn join(&self, connection_id: &str, room: &str) {
        {
            let Some(mut entry) = self.connections.get_mut(connection_id) else {
                return;
            };
            entry.rooms.insert(room.to_string());
        }
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Remove a connection from a room, deleting the room if it empties.
    pub fn leave(&self, connection_id: &str, room: &str) {
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.rooms.remove(room);
        }
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(connection_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    /// Deliver an event to a single connection. Returns false if the
    /// connection is gone (it is pruned as a side effect).
    pub fn send_to_connection(&self, connection_id: &str, event: &str, payload: Value) -> bool {
        let delivered = self
            .connections
            .get(connection_id)
            .map(|entry| entry.tx.send(envelope(event, payload)).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.unregister(connection_id);
        }
        delivered
    }

    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn room_members(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }
}

impl RoomTransport for RoomRegistry {
    fn send_to_room(&self, room: &str, event: &str, payload: Value) {
        let members: Vec<String> = match self.rooms.get(room) {
            Some(members) => members.iter().cloned().collect(),
            None => return,
        };

        let text = envelope(event, payload);
        let mut dead = Vec::new();
        for id in members {
            let delivered = self
                .connections
                .get(&id)
                .map(|entry| entry.tx.send(text.clone()).is_ok())
                .unwrap_or(false);
            if !delivered {
                dead.push(id);
            }
        }

        for id in dead {
            tracing::debug!(connection_id = %id, room, "pruning dead connection");
            self.unregister(&id);
        }
    }

    fn subscriber_count(&self, room: &str) -> usize {
        self.room_members(room)
    }
}

/// Wrap a payload in the `{"type": <event>, ...}` envelope clients expect.
fn envelope(event: &str, payload: Value) -> String {
    let mut body = match payload {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    body.insert("type".to_string(), Value::String(event.to_string()));
    Value::Object(body).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (Outbound, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn join_creates_room_and_leave_cleans_it() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = channel();
        registry.register("c1", "u1", tx);

        registry.join("c1", "ingestion:p1");
        assert_eq!(registry.room_members("ingestion:p1"), 1);

        registry.leave("c1", "ingestion:p1");
        assert_eq!(registry.room_members("ingestion:p1"), 0);
        assert_eq!(registry.active_connections(), 1);
    }

    #[test]
    fn unregister_removes_from_all_rooms() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = channel();
        registry.register("c1", "u1", tx);
        registry.join("c1", "ingestion:p1");
        registry.join("c1", "ingestion:p2");

        registry.unregister("c1");

        assert_eq!(registry.active_connections(), 0);
        assert_eq!(registry.room_members("ingestion:p1"), 0);
        assert_eq!(registry.room_members("ingestion:p2"), 0);
    }

    #[test]
    fn unregister_unknown_connection_is_harmless() {
        let registry = RoomRegistry::new();
        registry.unregister("nope");
        assert_eq!(registry.active_connections(), 0);
    }

    #[test]
    fn send_to_room_reaches_all_members() {
        let registry = RoomRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        registry.register("c1", "u1", tx1);
        registry.register("c2", "u2", tx2);
        registry.join("c1", "ingestion:p1");
        registry.join("c2", "ingestion:p1");

        registry.send_to_room(
            "ingestion:p1",
            "progress_update",
            serde_json::json!({"progress_percent": 40.0}),
        );

        for rx in [&mut rx1, &mut rx2] {
            let text = rx.try_recv().expect("message delivered");
            let value: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "progress_update");
            assert_eq!(value["progress_percent"], 40.0);
        }
    }

    #[test]
    fn send_to_unknown_room_is_harmless() {
        let registry = RoomRegistry::new();
        registry.send_to_room("ingestion:ghost", "error", serde_json::json!({}));
    }

    #[test]
    fn dead_connections_are_pruned_on_broadcast() {
        let registry = RoomRegistry::new();
        let (tx_ok, mut rx_ok) = channel();
        let (tx_dead, rx_dead) = channel();
        registry.register("alive", "u1", tx_ok);
        registry.register("dead", "u2", tx_dead);
        registry.join("alive", "ingestion:p1");
        registry.join("dead", "ingestion:p1");
        drop(rx_dead);

        registry.send_to_room("ingestion:p1", "phase_started", serde_json::json!({}));

        assert!(rx_ok.try_recv().is_ok());
        assert_eq!(registry.active_connections(), 1);
        assert_eq!(registry.room_members("ingestion:p1"), 1);
    }

    #[test]
    fn send_to_connection_delivers_and_prunes() {
        let registry = RoomRegistry::new();
        let (tx, mut rx) = channel();
        registry.register("c1", "u1", tx);

        assert!(registry.send_to_connection("c1", "pong", serde_json::json!({})));
        let text = rx.try_recv().unwrap();
        assert!(text.contains("\"pong\""));

        drop(rx);
        assert!(!registry.send_to_connection("c1", "pong", serde_json::json!({})));
        assert_eq!(registry.active_connections(), 0);
    }

    #[test]
    fn non_object_payload_is_wrapped() {
        let text = envelope("error", Value::String("boom".to_string()));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"], "boom");
    }
}
