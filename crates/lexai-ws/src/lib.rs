//! The WebSocket hub and the event-bus bridge that connects worker-side
//! publishes to API-side room dispatch (§4.8, §4.9).

pub mod bridge;
pub mod hub;
pub mod rooms;

pub use bridge::run_bridge;
pub use hub::{upgrade, AuthContext, HubState, TokenVerifier, WsHub};
pub use rooms::RoomRegistry;
