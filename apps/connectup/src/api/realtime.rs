//! `GET /api/user/ws/realtime`: one websocket per signed-in client.
//! `GET /api/user/ws/chat` is the same socket restricted to chat events.
//!
//! Server to client frames are serialized [`HubMessage`]s. The client may
//! send `{"type":"ping"}`, which refreshes its last-seen time and is answered
//! with `{"type":"pong"}`. Anything else is ignored.

use super::{AppState, AuthUser, now};
use crate::hub::{HubMessage, TOPIC_CHAT};
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use connectup_core::{UserId, users};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws/realtime", get(upgrade))
        .route("/ws/chat", get(upgrade_chat))
}

async fn upgrade(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run(state, ctx.id, socket, None))
}

async fn upgrade_chat(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run(state, ctx.id, socket, Some(TOPIC_CHAT)))
}

/// Whether a socket subscribed to `topic` (all topics when `None`) forwards `msg`.
fn forwards(topic: Option<&str>, msg: &HubMessage) -> bool {
    topic.is_none_or(|t| msg.topic == t)
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
}

async fn run(state: AppState, user: UserId, mut socket: WebSocket, topic: Option<&'static str>) {
    let mut inbox = state.hub.subscribe(user);
    info!(%user, ?topic, online = state.hub.connected_users(), "realtime connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(frame)) = incoming else { break };
                match frame {
                    Message::Text(text) => {
                        if let Some(reply) = handle_frame(&state, user, text.as_str()) {
                            if socket.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            outgoing = inbox.recv() => {
                match outgoing {
                    Ok(msg) if !forwards(topic, &msg) => {}
                    Ok(msg) => {
                        if !send_hub_message(&mut socket, &msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%user, skipped, "realtime client lagging");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    drop(inbox);
    info!(%user, "realtime disconnected");
}

fn handle_frame(state: &AppState, user: UserId, text: &str) -> Option<String> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(%user, error = %e, "ignoring realtime frame");
            return None;
        }
    };
    if frame.kind != "ping" {
        return None;
    }
    if let Err(e) = state.write(|tx| users::ping(tx, user, now())) {
        warn!(%user, error = %e.error, "ping failed");
    }
    Some(json!({ "type": "pong" }).to_string())
}

async fn send_hub_message(socket: &mut WebSocket, msg: &HubMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(text) => socket.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "unserializable hub message");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::TOPIC_NOTIFICATION;

    #[test]
    fn chat_socket_forwards_only_chat_events() {
        let chat = HubMessage::new(TOPIC_CHAT, json!({}));
        let notification = HubMessage::new(TOPIC_NOTIFICATION, json!({}));

        assert!(forwards(Some(TOPIC_CHAT), &chat));
        assert!(!forwards(Some(TOPIC_CHAT), &notification));
        assert!(forwards(None, &chat));
        assert!(forwards(None, &notification));
    }
}
