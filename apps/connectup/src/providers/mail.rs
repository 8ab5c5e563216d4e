//! Email delivery.

use super::ProviderResult;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::info;

/// Template an email is rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Otp,
    VerifyUsingLink,
    PasswordReset,
}

impl EmailKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Otp => "otp",
            Self::VerifyUsingLink => "verify_using_link",
            Self::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub kind: EmailKind,
    pub to: Vec<String>,
    pub data: BTreeMap<String, String>,
}

impl OutgoingEmail {
    pub fn new(kind: EmailKind, to: impl Into<String>) -> Self {
        Self {
            kind,
            to: vec![to.into()],
            data: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn data(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: OutgoingEmail) -> ProviderResult<()>;
}

/// Writes every email as a tracing event.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: OutgoingEmail) -> ProviderResult<()> {
        info!(
            kind = email.kind.as_str(),
            to = ?email.to,
            data = ?email.data,
            "email sent"
        );
        Ok(())
    }
}

/// Keeps sent emails for inspection.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl MemoryMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }

    /// Most recent email to `address`.
    #[must_use]
    pub fn last_to(&self, address: &str) -> Option<OutgoingEmail> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|e| e.to.iter().any(|t| t == address))
            .cloned()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, email: OutgoingEmail) -> ProviderResult<()> {
        self.sent.lock().push(email);
        Ok(())
    }
}
