//! Room membership bookkeeping (§4.9): a named group of WebSocket
//! connections, the fan-out target for `hub.emit(room, …)`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

pub type ConnectionId = uuid::Uuid;

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, DashMap<ConnectionId, UnboundedSender<axum::extract::ws::Message>>>>,
    connections: Arc<DashMap<ConnectionId, Vec<String>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            connections: Arc::new(DashMap::new()),
        }
    }

    pub fn join(&self, conn: ConnectionId, room: &str, sender: UnboundedSender<axum::extract::ws::Message>) {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(DashMap::new)
            .insert(conn, sender);
        self.connections
            .entry(conn)
            .or_insert_with(Vec::new)
            .push(room.to_string());
    }

    /// Drop every membership for a closed connection.
    pub fn disconnect(&self, conn: ConnectionId) {
        if let Some((_, rooms)) = self.connections.remove(&conn) {
            for room in rooms {
                if let Some(members) = self.rooms.get(&room) {
                    members.remove(&conn);
                }
            }
        }
    }

    /// Send `message` to every connection currently joined to `room`, on
    /// this API instance only. Cross-instance delivery goes through the
    /// bridge (§4.8).
    pub fn emit_local(&self, room: &str, message: axum::extract::ws::Message) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        for entry in members.iter() {
            // A send error means the peer task has already torn down; the
            // read loop will notice the closed socket and call disconnect.
            let _ = entry.value().send(message.clone());
        }
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_then_disconnect_clears_membership() {
        let registry = RoomRegistry::new();
        let conn = ConnectionId::new_v4();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        registry.join(conn, "org:tenant-a", tx);
        assert_eq!(registry.member_count("org:tenant-a"), 1);
        registry.disconnect(conn);
        assert_eq!(registry.member_count("org:tenant-a"), 0);
    }
}
