//! The event bus bridge (§4.8): one dedicated subscriber connection per API
//! instance, turning inbound `{event, room, payload}` records into local
//! socket dispatch via the hub. Multi-instance fan-out relies entirely on
//! this loop; there is no direct inter-instance RPC.

use std::sync::Arc;

use lexai_core::domain::events::SOCKET_EVENTS_CHANNEL;
use lexai_core::domain::events::SocketEvent;
use lexai_core::ports::kv_store::KeyValueStore;
use tracing::{error, warn};

use crate::hub::WsHub;

/// Runs forever, re-subscribing with backoff if the subscribe connection
/// drops. Intended to be spawned once per API instance.
pub async fn run_bridge(kv: Arc<dyn KeyValueStore>, hub: WsHub) {
    let mut backoff = std::time::Duration::from_secs(1);
    loop {
        match kv.subscribe(&[SOCKET_EVENTS_CHANNEL]).await {
            Ok(mut subscriber) => {
                backoff = std::time::Duration::from_secs(1);
                loop {
                    match subscriber.next_message().await {
                        Ok(Some((_channel, payload))) => dispatch(&hub, &payload),
                        Ok(None) => {
                            warn!("socket events subscriber connection closed, resubscribing");
                            break;
                        }
                        Err(err) => {
                            error!(error = %err, "socket events subscriber error, resubscribing");
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                error!(error = %err, backoff_secs = backoff.as_secs(), "failed to open socket events subscription, retrying");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(std::time::Duration::from_secs(30));
    }
}

fn dispatch(hub: &WsHub, raw: &str) {
    let event = match serde_json::from_str::<SocketEvent>(raw) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "discarding malformed socket event");
            return;
        }
    };
    hub.emit(&event.room, &event.event, event.payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;

    #[test]
    fn dispatches_a_valid_record_to_its_room() {
        let hub = WsHub::new();
        let conn = uuid::Uuid::new_v4();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        hub.rooms().join(conn, "org:tenant-1", tx);

        let raw = serde_json::to_string(&SocketEvent::new(
            "analysis:complete",
            "org:tenant-1",
            serde_json::json!({"analysisId": "a1"}),
        ))
        .unwrap();
        dispatch(&hub, &raw);

        let Message::Text(received) = rx.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        assert!(received.contains("analysis:complete"));
    }

    #[test]
    fn malformed_record_is_dropped_without_panicking() {
        let hub = WsHub::new();
        dispatch(&hub, "not json");
        assert_eq!(hub.rooms().member_count("org:tenant-1"), 0);
    }
}
