//! # Notifications
//!
//! In-app notifications created by domain events. Operations that create
//! notifications hand them back in [`Notified`] so the caller can deliver
//! them (realtime hub, push) once the transaction commits.

use crate::filters::Pagination;
use crate::response::Page;
use crate::storage::{Record, RecordTable};
use crate::{CoreResult, NotificationId, Reader, Timestamp, UserId, WriteTx};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ConnectionRequest,
    RequestAccepted,
    GroupJoinRequest,
    GroupRequestAccepted,
    GroupInvite,
    PostLike,
    PostComment,
    CommentReply,
    CompanyLike,
    CompanyQuestion,
    QuestionReply,
    CompanyInvestment,
    InvestmentStatus,
    CompanyInvite,
    CompanyStatus,
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub read: bool,
    pub created_at: Timestamp,
}

impl Record for Notification {
    const TABLE: RecordTable = TableDefinition::new("notifications");
    const KIND: &'static str = "notification";
    fn key(&self) -> u64 {
        self.id.0
    }
}

/// A value plus the notifications its operation created.
#[derive(Debug, Clone, PartialEq)]
pub struct Notified<T> {
    pub value: T,
    pub notifications: Vec<Notification>,
}

impl<T> Notified<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            notifications: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, notification: Option<Notification>) -> Self {
        self.notifications.extend(notification);
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Notified<U> {
        Notified {
            value: f(self.value),
            notifications: self.notifications,
        }
    }
}

/// Content of a notification before it is addressed.
#[derive(Debug, Clone)]
pub struct Draft {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl Draft {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn data(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }
}

/// Store a notification for `recipient`. Nothing is created when the actor
/// notifies themselves.
pub fn notify(
    tx: &WriteTx,
    actor: Option<UserId>,
    recipient: UserId,
    draft: Draft,
    now: Timestamp,
) -> CoreResult<Option<Notification>> {
    if actor == Some(recipient) {
        return Ok(None);
    }
    let notification = Notification {
        id: NotificationId(tx.next_id::<Notification>()?),
        user_id: recipient,
        kind: draft.kind,
        title: draft.title,
        body: draft.body,
        data: draft.data,
        read: false,
        created_at: now,
    };
    tx.put(&notification)?;
    Ok(Some(notification))
}

/// Notify several recipients with the same content.
pub fn notify_all(
    tx: &WriteTx,
    actor: Option<UserId>,
    recipients: impl IntoIterator<Item = UserId>,
    draft: &Draft,
    now: Timestamp,
) -> CoreResult<Vec<Notification>> {
    let mut out = Vec::new();
    for recipient in recipients {
        out.extend(notify(tx, actor, recipient, draft.clone(), now)?);
    }
    Ok(out)
}

/// A user's notifications, newest first.
pub fn list(
    tx: &impl Reader,
    user: UserId,
    pagination: Pagination,
) -> CoreResult<Page<Notification>> {
    let mut all = tx.filter::<Notification>(|n| n.user_id == user)?;
    all.reverse();
    Ok(pagination.apply(all))
}

pub fn unread_count(tx: &impl Reader, user: UserId) -> CoreResult<usize> {
    Ok(tx
        .filter::<Notification>(|n| n.user_id == user && !n.read)?
        .len())
}

/// Which notifications to mark read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    #[serde(default)]
    pub notification_ids: Vec<NotificationId>,
    #[serde(default)]
    pub all: bool,
}

/// Mark notifications read; ids of other users are ignored. Returns the
/// number changed.
pub fn mark_read(tx: &WriteTx, user: UserId, request: &ReadRequest) -> CoreResult<usize> {
    let targets = tx.filter::<Notification>(|n| {
        n.user_id == user && !n.read && (request.all || request.notification_ids.contains(&n.id))
    })?;
    let changed = targets.len();
    for mut notification in targets {
        notification.read = true;
        tx.put(&notification)?;
    }
    Ok(changed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::users::tests::{new_user, now};

    fn draft() -> Draft {
        Draft::new(NotificationKind::PostLike, "Liked", "Someone liked your post").data("postId", 4)
    }

    #[test]
    fn self_notifications_are_skipped() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let n = store
            .write(|tx| notify(tx, Some(a.id), a.id, draft(), now()))
            .unwrap();
        assert!(n.is_none());
    }

    #[test]
    fn list_newest_first_and_mark_read() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let created = store
            .write(|tx| notify_all(tx, Some(b.id), [a.id, a.id, a.id], &draft(), now()))
            .unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(created[0].data.get("postId").map(String::as_str), Some("4"));

        let page = store
            .read(|tx| list(tx, a.id, Pagination::default()))
            .unwrap();
        assert_eq!(page.items[0].id, created[2].id);
        assert_eq!(store.read(|tx| unread_count(tx, a.id)).unwrap(), 3);

        let one = ReadRequest {
            notification_ids: vec![created[0].id],
            all: false,
        };
        assert_eq!(store.write(|tx| mark_read(tx, a.id, &one)).unwrap(), 1);
        // Other users cannot touch them.
        let all = ReadRequest {
            notification_ids: Vec::new(),
            all: true,
        };
        assert_eq!(store.write(|tx| mark_read(tx, b.id, &all)).unwrap(), 0);
        assert_eq!(store.write(|tx| mark_read(tx, a.id, &all)).unwrap(), 2);
        assert_eq!(store.read(|tx| unread_count(tx, a.id)).unwrap(), 0);
    }
}
