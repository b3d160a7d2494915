//! Inspector websocket support (C7).
//!
//! A connected inspector streams served requests live and can replay recent
//! history on demand. Per §6, the upgrade is accepted on any path under a
//! tenant's mock surface — there is no dedicated websocket route; the same
//! gateway handler that serves mock HTTP requests upgrades in place when the
//! client sends the handshake (see `gateway::dispatch`).

mod config;
mod connection;
mod hub;
mod upgrade;

pub use config::WebSocketConfig;
pub use connection::ConnectionId;
pub use hub::InspectorHub;
pub use upgrade::handle_socket;

// Re-export axum WebSocket types for convenience.
pub use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
