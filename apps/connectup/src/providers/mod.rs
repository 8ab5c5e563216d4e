//! # Providers
//!
//! Outbound integrations behind traits: email, device push and blob storage.
//! The server only ever talks to these traits; the implementations here log,
//! record in memory, or write to the local filesystem.

use thiserror::Error;

pub mod blob;
pub mod mail;
pub mod push;

pub use blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use mail::{EmailKind, LogMailer, Mailer, MemoryMailer, OutgoingEmail};
pub use push::{LogPush, MemoryPush, PushMessage, PushSender};

/// Failure of an outbound provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
