//! Inspector Hub (C7): accepts websocket upgrades, replays log history, and
//! fans out every newly served request to subscribed inspector sockets.
//!
//! A registry of connections plus broadcast-to-all fan-out, extended so
//! that each session can additionally carry an optional endpoint-id
//! subscription filter — a broadcast can then be scoped to "all of this
//! tenant's traffic" or to a single endpoint.

use std::collections::HashMap;

use axum::extract::ws::Message;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use super::connection::ConnectionId;
use crate::ids::EndpointId;
use crate::model::RequestLog;
use crate::store::Store;

const HISTORY_LIMIT: i64 = 100;

/// A live inspector session: a connection plus the subscription filter it
/// has (optionally) declared. `None` means "every request for this tenant".
struct Session {
    sender: mpsc::Sender<Message>,
    subscription: Option<EndpointId>,
}

/// Registry of inspector sessions for one tenant, plus broadcast fan-out.
///
/// Iteration during broadcast is safe against concurrent connect/disconnect:
/// the lock is only held long enough to clone the sender list, never across
/// the (potentially slow) per-socket sends themselves.
pub struct InspectorHub {
    sessions: RwLock<HashMap<ConnectionId, Session>>,
}

impl InspectorHub {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()) }
    }

    pub async fn register(&self, id: ConnectionId, sender: mpsc::Sender<Message>) {
        self.sessions.write().await.insert(id, Session { sender, subscription: None });
    }

    pub async fn unregister(&self, id: &ConnectionId) {
        self.sessions.write().await.remove(id);
    }

    /// Records (or clears) a session's endpoint-id subscription filter.
    pub async fn subscribe(&self, id: &ConnectionId, endpoint_id: Option<EndpointId>) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.subscription = endpoint_id;
        }
    }

    /// Sends one log entry to every session whose filter matches: no filter
    /// (all traffic), or a filter equal to the entry's endpoint.
    ///
    /// Never awaits a socket: a closed or backed-up channel is logged and
    /// skipped via `try_send`, so one slow or dead connection can never
    /// stall the broadcast, the request handler, or any other session.
    pub async fn broadcast(&self, log: &RequestLog) {
        let frame = serde_json::json!({ "type": "request", "data": log_to_json(log) });
        let Ok(text) = serde_json::to_string(&frame) else {
            tracing::warn!("failed to serialize log entry for broadcast");
            return;
        };

        let targets: Vec<mpsc::Sender<Message>> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|session| match &session.subscription {
                    None => true,
                    Some(endpoint_id) => *endpoint_id == log.endpoint_id,
                })
                .map(|session| session.sender.clone())
                .collect()
        };

        for sender in targets {
            if sender.try_send(Message::Text(text.clone().into())).is_err() {
                tracing::warn!("inspector socket closed or backed up, dropping broadcast frame");
            }
        }
    }

    /// Serves a `getHistory` request: up to 100 most-recent logs, optionally
    /// scoped to one endpoint, timestamp-descending.
    pub async fn history(&self, store: &Store, endpoint_id: Option<&EndpointId>) -> Value {
        let logs = store.list_logs(endpoint_id, HISTORY_LIMIT).await.unwrap_or_default();
        let data: Vec<Value> = logs.iter().map(log_to_json).collect();
        serde_json::json!({ "type": "history", "data": data })
    }

    pub async fn connection_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InspectorHub {
    fn default() -> Self {
        Self::new()
    }
}

fn log_to_json(log: &RequestLog) -> Value {
    serde_json::to_value(log).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RequestLogId;
    use chrono::Utc;

    fn log_for(endpoint_id: EndpointId) -> RequestLog {
        RequestLog {
            id: RequestLogId::new(),
            endpoint_id,
            method: "GET".into(),
            path: "/a".into(),
            headers: "{}".into(),
            body: None,
            timestamp: Utc::now(),
            matched_rule_id: None,
            path_params: None,
            response_status: 200,
            response_time_ms: 1,
        }
    }

    #[tokio::test]
    async fn unfiltered_session_receives_every_broadcast() {
        let hub = InspectorHub::new();
        let id = ConnectionId::new();
        let (tx, mut rx) = mpsc::channel(8);
        hub.register(id, tx).await;

        hub.broadcast(&log_for(EndpointId::new())).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn filtered_session_only_receives_its_endpoint() {
        let hub = InspectorHub::new();
        let id = ConnectionId::new();
        let (tx, mut rx) = mpsc::channel(8);
        hub.register(id, tx).await;

        let subscribed = EndpointId::new();
        hub.subscribe(&id, Some(subscribed.clone())).await;

        hub.broadcast(&log_for(EndpointId::new())).await;
        assert!(rx.try_recv().is_err());

        hub.broadcast(&log_for(subscribed)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregister_removes_the_session() {
        let hub = InspectorHub::new();
        let id = ConnectionId::new();
        let (tx, _rx) = mpsc::channel(8);
        hub.register(id, tx).await;
        assert_eq!(hub.connection_count().await, 1);

        hub.unregister(&id).await;
        assert_eq!(hub.connection_count().await, 0);
    }
}
