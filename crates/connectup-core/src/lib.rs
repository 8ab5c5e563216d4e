//! # ConnectUp Core
//!
//! Domain engine for the ConnectUp backend: records, business rules and the
//! embedded store they live in.
//!
//! ## Layout
//!
//! - [`storage`] wraps a redb database; every record kind owns one table.
//! - [`formats`] frames records (postcard + format byte) and renders CSV exports.
//! - Feature modules ([`users`], [`sessions`], [`otp`], [`connections`],
//!   [`chat`], [`groups`], [`posts`], [`showcase`], [`catalog`],
//!   [`notifications`], [`uploads`]) hold the records and the operations on them.
//! - [`filters`] parses pagination and admin filter query strings.
//! - [`graph`] is the in-memory connection graph used for recommendations.
//! - [`dashboard`] computes admin statistics.
//!
//! Nothing in this crate is async or touches the network. Every operation
//! that depends on wall time takes `now` explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod cache;
pub mod catalog;
pub mod chat;
pub mod connections;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod filters;
pub mod formats;
pub mod graph;
pub mod groups;
pub mod notifications;
pub mod otp;
pub mod posts;
pub mod response;
pub mod sessions;
pub mod showcase;
pub mod storage;
pub mod uploads;
pub mod users;

pub use chrono::{DateTime, Utc};
pub use error::{CoreError, CoreResult};
pub use storage::{Reader, Store, WriteTx};

/// Timestamp type used by every record.
pub type Timestamp = DateTime<Utc>;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! define_ids {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(
                Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
                Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl $name {
                /// Raw numeric value.
                #[must_use]
                pub const fn get(self) -> u64 {
                    self.0
                }
            }

            impl From<u64> for $name {
                fn from(value: u64) -> Self {
                    Self(value)
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

define_ids! {
    /// A user account.
    UserId,
    /// A device/login session.
    SessionId,
    /// A messaging (chat) group.
    ChatGroupId,
    /// A chat message.
    MessageId,
    /// A community group.
    GroupId,
    /// A post inside a community group.
    PostId,
    /// A comment or a reply to a comment.
    CommentId,
    /// A showcase company profile.
    CompanyId,
    /// A question (or reply) on a company profile.
    QuestionId,
    /// An investment request on a company profile.
    InvestmentId,
    /// An uploaded file.
    UploadId,
    /// A notification.
    NotificationId,
    /// An industry in the catalog.
    IndustryId,
    /// A report type in the catalog.
    ReportTypeId,
    /// An admin broadcast.
    BroadcastId,
    /// A connection request between two users.
    RequestId,
}

/// Role of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Stable string form used in responses and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

/// Parse a comma separated list of ids (`"1,2,3"`).
///
/// Whitespace around items is ignored, empty items are skipped.
pub fn parse_id_list<T: From<u64>>(raw: &str) -> CoreResult<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map(T::from)
                .map_err(|_| CoreError::Invalid(format!("invalid id: {s}")))
        })
        .collect()
}
