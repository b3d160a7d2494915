//! Inspector websocket configuration.

use serde::{Deserialize, Serialize};

/// Per-connection tuning for the inspector hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Outbound channel capacity per session before a slow socket's sends
    /// start backing up.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self { send_buffer: default_send_buffer() }
    }
}

const fn default_send_buffer() -> usize {
    64
}
