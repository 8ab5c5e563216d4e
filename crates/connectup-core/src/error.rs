//! # Errors
//!
//! One error type for every domain operation. The HTTP layer maps each
//! variant to a status code; the `String` payloads are safe to show to users.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by domain operations and storage.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A record that the operation needs does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The operation would create a duplicate or contradict current state.
    #[error("{0}")]
    Conflict(String),

    /// Input failed validation.
    #[error("{0}")]
    Invalid(String),

    /// The caller is authenticated but not allowed to do this.
    #[error("{0}")]
    Forbidden(String),

    /// The caller could not be authenticated.
    #[error("{0}")]
    Unauthorized(String),

    /// A token, code or link is past its expiry.
    #[error("{0}")]
    Expired(String),

    /// A rate limit or attempt limit was hit.
    #[error("too many attempts")]
    TooManyAttempts,

    /// The embedded database failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::Invalid`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Shorthand for [`CoreError::Forbidden`].
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Shorthand for [`CoreError::Conflict`].
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Shorthand for [`CoreError::Unauthorized`].
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// True for failures of the store itself rather than of the request.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Corrupt(_))
    }
}

macro_rules! storage_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CoreError {
                fn from(err: $ty) -> Self {
                    Self::Storage(err.to_string())
                }
            }
        )*
    };
}

storage_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<postcard::Error> for CoreError {
    fn from(err: postcard::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}
