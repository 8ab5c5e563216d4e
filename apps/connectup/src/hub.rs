//! # Realtime hub
//!
//! In-process fan-out of events to connected clients. Every user gets one
//! broadcast channel shared by all of their open sockets; publishing to a
//! user with no open socket is a no-op.

use connectup_core::UserId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;
use tracing::debug;

/// Per-user channel capacity. Slow consumers lose the oldest messages.
pub const CHANNEL_CAPACITY: usize = 256;

pub const TOPIC_NOTIFICATION: &str = "notification";
pub const TOPIC_CHAT: &str = "chat";

/// One event published to a set of users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubMessage {
    pub topic: String,
    pub headers: BTreeMap<String, String>,
    pub payload: serde_json::Value,
    #[serde(skip)]
    pub recipients: Vec<UserId>,
}

impl HubMessage {
    pub fn new(topic: &str, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.to_string(),
            headers: BTreeMap::new(),
            payload,
            recipients: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn to(mut self, recipients: impl IntoIterator<Item = UserId>) -> Self {
        self.recipients.extend(recipients);
        self
    }
}

#[derive(Debug, Default)]
pub struct RealtimeHub {
    channels: Mutex<HashMap<UserId, broadcast::Sender<HubMessage>>>,
}

impl RealtimeHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a receiver for `user`.
    pub fn subscribe(&self, user: UserId) -> broadcast::Receiver<HubMessage> {
        self.channels
            .lock()
            .entry(user)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver `msg` to every open receiver of its recipients.
    ///
    /// Returns the number of receivers reached.
    pub fn publish(&self, msg: HubMessage) -> usize {
        let mut channels = self.channels.lock();
        let mut delivered = 0;
        for user in &msg.recipients {
            let Some(sender) = channels.get(user) else {
                continue;
            };
            match sender.send(msg.clone()) {
                Ok(n) => delivered += n,
                Err(_) => {
                    channels.remove(user);
                }
            }
        }
        channels.retain(|_, sender| sender.receiver_count() > 0);
        debug!(topic = %msg.topic, recipients = msg.recipients.len(), delivered, "hub publish");
        delivered
    }

    /// Users with at least one open receiver.
    #[must_use]
    pub fn connected_users(&self) -> usize {
        self.channels
            .lock()
            .values()
            .filter(|s| s.receiver_count() > 0)
            .count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delivers_to_every_receiver_of_each_recipient() {
        let hub = RealtimeHub::new();
        let mut a1 = hub.subscribe(UserId(1));
        let mut a2 = hub.subscribe(UserId(1));
        let mut b = hub.subscribe(UserId(2));

        let msg = HubMessage::new(TOPIC_CHAT, json!({"body": "hi"}))
            .header("chatGroupId", 9)
            .to([UserId(1), UserId(2), UserId(3)]);
        assert_eq!(hub.publish(msg), 3);

        let got = a1.recv().await.unwrap();
        assert_eq!(got.headers.get("chatGroupId").map(String::as_str), Some("9"));
        assert_eq!(a2.recv().await.unwrap().topic, TOPIC_CHAT);
        assert_eq!(b.recv().await.unwrap().payload, json!({"body": "hi"}));
    }

    #[test]
    fn no_subscribers_is_not_an_error() {
        let hub = RealtimeHub::new();
        let msg = HubMessage::new(TOPIC_NOTIFICATION, json!({})).to([UserId(5)]);
        assert_eq!(hub.publish(msg), 0);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let hub = RealtimeHub::new();
        let rx = hub.subscribe(UserId(1));
        assert_eq!(hub.connected_users(), 1);
        drop(rx);
        let msg = HubMessage::new(TOPIC_NOTIFICATION, json!({})).to([UserId(1)]);
        assert_eq!(hub.publish(msg), 0);
        assert_eq!(hub.connected_users(), 0);
        assert!(hub.channels.lock().is_empty());
    }
}
