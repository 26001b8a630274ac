//! The WebSocket hub (§4.9): authenticated connections, room auto-join, and
//! the ping/pong liveness timers. Auth/RBAC proper is out of scope (§1); the
//! hub only needs enough of it to attach `{userId, tenantId, role}` to a
//! connection and to refuse a cross-tenant room join.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use lexai_core::domain::events::SocketEvent;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::rooms::{ConnectionId, RoomRegistry};

const PING_INTERVAL: Duration = Duration::from_secs(25);
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub tenant_id: String,
    pub role: String,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Verifies the bearer token presented at handshake. The production
/// implementation lives outside this crate (full authn is out of scope,
/// §1); this trait is the thin seam the hub needs.
#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Option<AuthContext>;
}

#[derive(Clone)]
pub struct WsHub {
    rooms: RoomRegistry,
}

impl WsHub {
    pub fn new() -> Self {
        Self {
            rooms: RoomRegistry::new(),
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Deliver `event` with `payload` to every socket joined to `room`,
    /// regardless of which API instance holds the connection (the bridge
    /// calls this after reading its own publish back off the bus, and the
    /// local publisher calls it directly as a same-instance fast path).
    pub fn emit(&self, room: &str, event: &str, payload: serde_json::Value) {
        let body = SocketEvent::new(event, room, payload);
        let Ok(text) = serde_json::to_string(&body) else {
            warn!(event, room, "failed to serialize outbound socket event");
            return;
        };
        self.rooms.emit_local(room, Message::Text(text));
    }
}

impl Default for WsHub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct HubState {
    pub hub: WsHub,
    pub verifier: std::sync::Arc<dyn TokenVerifier>,
}

#[derive(Debug, Deserialize)]
struct HandshakeQuery {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum ClientFrame {
    /// Explicit request to join `org:{tenantId}`; refused unless it matches
    /// the connection's own tenant (§4.9).
    JoinOrg { tenant_id: String },
    Pong,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<HubState>,
    axum::extract::Query(query): axum::extract::Query<HandshakeQuery>,
) -> impl IntoResponse {
    match state.verifier.verify(&query.token).await {
        Some(auth) => ws.on_upgrade(move |socket| handle_socket(socket, state.hub, auth)),
        None => axum::http::StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, hub: WsHub, auth: AuthContext) {
    let conn_id: ConnectionId = uuid::Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    hub.rooms.join(conn_id, &SocketEvent::user_room(&auth.user_id), tx.clone());
    if auth.is_admin() {
        hub.rooms.join(conn_id, "admin", tx.clone());
    }
    info!(conn_id = %conn_id, user_id = %auth.user_id, "websocket connection established");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let last_pong = std::sync::Arc::new(tokio::sync::Mutex::new(tokio::time::Instant::now()));
    let ping_tx = tx.clone();
    let ping_last_pong = last_pong.clone();
    let pinger = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        loop {
            ticker.tick().await;
            let elapsed = ping_last_pong.lock().await.elapsed();
            if elapsed > PONG_TIMEOUT {
                warn!("pong timeout exceeded, closing connection");
                break;
            }
            if ping_tx.send(Message::Ping(Vec::new())).is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Pong(_) => {
                *last_pong.lock().await = tokio::time::Instant::now();
            }
            Message::Text(text) => {
                handle_client_frame(&hub, conn_id, &auth, &text, &tx);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    pinger.abort();
    writer.abort();
    hub.rooms.disconnect(conn_id);
    debug!(conn_id = %conn_id, "websocket connection closed");
}

fn handle_client_frame(
    hub: &WsHub,
    conn_id: ConnectionId,
    auth: &AuthContext,
    raw: &str,
    tx: &mpsc::UnboundedSender<Message>,
) {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(raw) else {
        return;
    };
    match frame {
        ClientFrame::JoinOrg { tenant_id } => {
            if tenant_id != auth.tenant_id {
                warn!(conn_id = %conn_id, requested = %tenant_id, own = %auth.tenant_id, "refused cross-tenant room join");
                let diagnostic = serde_json::json!({
                    "event": "error",
                    "payload": { "reason": "cross-tenant join refused" },
                });
                if let Ok(text) = serde_json::to_string(&diagnostic) {
                    let _ = tx.send(Message::Text(text));
                }
                return;
            }
            hub.rooms
                .join(conn_id, &SocketEvent::org_room(&auth.tenant_id), tx.clone());
        }
        ClientFrame::Pong => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(tenant_id: &str) -> AuthContext {
        AuthContext {
            user_id: "user-1".to_string(),
            tenant_id: tenant_id.to_string(),
            role: "member".to_string(),
        }
    }

    #[test]
    fn matching_tenant_join_registers_membership() {
        let hub = WsHub::new();
        let conn = ConnectionId::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();
        let auth = auth("tenant-1");

        handle_client_frame(&hub, conn, &auth, r#"{"action":"joinOrg","tenantId":"tenant-1"}"#, &tx);

        assert_eq!(hub.rooms().member_count(&SocketEvent::org_room("tenant-1")), 1);
    }

    #[test]
    fn cross_tenant_join_is_refused_with_a_diagnostic() {
        let hub = WsHub::new();
        let conn = ConnectionId::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let auth = auth("tenant-1");

        handle_client_frame(&hub, conn, &auth, r#"{"action":"joinOrg","tenantId":"tenant-2"}"#, &tx);

        assert_eq!(hub.rooms().member_count(&SocketEvent::org_room("tenant-2")), 0);
        let Message::Text(sent) = rx.try_recv().expect("a diagnostic frame should have been sent") else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(value["payload"]["reason"], "cross-tenant join refused");
    }

    #[test]
    fn malformed_frames_are_ignored() {
        let hub = WsHub::new();
        let conn = ConnectionId::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let auth = auth("tenant-1");

        handle_client_frame(&hub, conn, &auth, "not json", &tx);
        assert!(rx.try_recv().is_err());
    }
}
