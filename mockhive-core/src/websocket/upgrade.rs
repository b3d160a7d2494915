//! Axum handler for the inspector websocket upgrade (§4.7, §6).
//!
//! Message frames are UTF-8 JSON objects discriminated by `type`. Unknown
//! message shapes (unparseable JSON, missing `type`, unrecognized `type`)
//! are ignored rather than closing the connection — the inspector protocol
//! has no error frame, so there is nothing useful to report back.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use serde::Deserialize;
use serde_json::Value;

use super::connection::ConnectionId;
use super::hub::InspectorHub;
use crate::ids::EndpointId;
use crate::store::Store;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum InboundMessage {
    Ping,
    GetHistory {
        #[serde(default)]
        endpoint_id: Option<String>,
    },
    Subscribe {
        #[serde(default)]
        endpoint_id: Option<String>,
    },
}

/// Drives one upgraded websocket until the client disconnects.
pub async fn handle_socket(mut socket: WebSocket, hub: Arc<InspectorHub>, store: Arc<Store>, send_buffer: usize) {
    let id = ConnectionId::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Message>(send_buffer);
    hub.register(id, tx).await;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if socket.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&text, &id, &hub, &store, &mut socket).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    hub.unregister(&id).await;
}

async fn handle_inbound(
    text: &str,
    id: &ConnectionId,
    hub: &Arc<InspectorHub>,
    store: &Arc<Store>,
    socket: &mut WebSocket,
) {
    let Ok(message) = serde_json::from_str::<InboundMessage>(text) else {
        return;
    };

    match message {
        InboundMessage::Ping => {
            let _ = socket.send(Message::Text(r#"{"type":"pong"}"#.into())).await;
        }
        InboundMessage::GetHistory { endpoint_id } => {
            let endpoint_id = parse_endpoint_id(endpoint_id);
            let reply: Value = hub.history(store, endpoint_id.as_ref()).await;
            if let Ok(text) = serde_json::to_string(&reply) {
                let _ = socket.send(Message::Text(text.into())).await;
            }
        }
        InboundMessage::Subscribe { endpoint_id } => {
            hub.subscribe(id, parse_endpoint_id(endpoint_id)).await;
        }
    }
}

fn parse_endpoint_id(raw: Option<String>) -> Option<EndpointId> {
    raw.and_then(|s| EndpointId::from_str(&s).ok())
}
