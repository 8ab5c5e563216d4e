//! Device push notifications.

use super::ProviderResult;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::info;

/// A push to a set of device tokens. `silent` pushes carry data only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub silent: bool,
}

impl PushMessage {
    pub fn new(tokens: Vec<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            tokens,
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
            silent: false,
        }
    }

    /// Data-only push of a single event name.
    pub fn silent(tokens: Vec<String>, event: &str) -> Self {
        let mut msg = Self::new(tokens, "", "");
        msg.data.insert("type".to_string(), event.to_string());
        msg.silent = true;
        msg
    }
}

pub trait PushSender: Send + Sync {
    fn push(&self, message: PushMessage) -> ProviderResult<()>;
}

#[derive(Debug, Default)]
pub struct LogPush;

impl PushSender for LogPush {
    fn push(&self, message: PushMessage) -> ProviderResult<()> {
        info!(
            devices = message.tokens.len(),
            title = %message.title,
            silent = message.silent,
            "push sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryPush {
    sent: Mutex<Vec<PushMessage>>,
}

impl MemoryPush {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().clone()
    }
}

impl PushSender for MemoryPush {
    fn push(&self, message: PushMessage) -> ProviderResult<()> {
        self.sent.lock().push(message);
        Ok(())
    }
}
