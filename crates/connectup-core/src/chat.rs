//! # Chat
//!
//! Messaging groups (direct and named), their members and messages.
//!
//! A group always keeps at least one admin: when the last admin goes, the
//! longest-standing remaining member is promoted. A group without members
//! is deleted together with its messages.

use crate::filters::Pagination;
use crate::response::Page;
use crate::storage::{Record, RecordTable};
use crate::uploads::Upload;
use crate::users::{self, User, UserSummary};
use crate::{
    ChatGroupId, CoreError, CoreResult, MessageId, Reader, Timestamp, UploadId, UserId, WriteTx,
};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGroup {
    pub id: ChatGroupId,
    pub name: Option<String>,
    pub image_id: Option<UploadId>,
    pub is_direct: bool,
    pub created_by: UserId,
    pub created_at: Timestamp,
}

impl Record for ChatGroup {
    const TABLE: RecordTable = TableDefinition::new("chat_groups");
    const KIND: &'static str = "chat group";
    fn key(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMember {
    pub id: u64,
    pub chat_group_id: ChatGroupId,
    pub user_id: UserId,
    pub is_admin: bool,
    pub muted: bool,
    pub joined_at: Timestamp,
    pub cleared_at: Option<Timestamp>,
    pub last_read_at: Option<Timestamp>,
}

impl Record for ChatMember {
    const TABLE: RecordTable = TableDefinition::new("chat_members");
    const KIND: &'static str = "chat member";
    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_group_id: ChatGroupId,
    pub sender: UserId,
    pub body: Option<String>,
    pub attachment_id: Option<UploadId>,
    pub created_at: Timestamp,
    pub deleted_for: BTreeSet<UserId>,
    pub deleted_for_all: bool,
}

impl Record for Message {
    const TABLE: RecordTable = TableDefinition::new("chat_messages");
    const KIND: &'static str = "message";
    fn key(&self) -> u64 {
        self.id.0
    }
}

impl Message {
    fn visible_to(&self, member: &ChatMember) -> bool {
        !self.deleted_for_all
            && !self.deleted_for.contains(&member.user_id)
            && member.cleared_at.is_none_or(|cleared| self.created_at > cleared)
    }
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

fn members_of(tx: &impl Reader, group: ChatGroupId) -> CoreResult<Vec<ChatMember>> {
    tx.filter::<ChatMember>(|m| m.chat_group_id == group)
}

fn member_of(tx: &impl Reader, group: ChatGroupId, user: UserId) -> CoreResult<Option<ChatMember>> {
    tx.find::<ChatMember>(|m| m.chat_group_id == group && m.user_id == user)
}

/// Fail with 403 unless `user` is in the group.
pub fn require_member(tx: &impl Reader, group: ChatGroupId, user: UserId) -> CoreResult<ChatMember> {
    let _: ChatGroup = tx.require(group.0)?;
    member_of(tx, group, user)?
        .ok_or_else(|| CoreError::forbidden("not a member of this chat group"))
}

/// Fail with 403 unless `user` is an admin of the group.
pub fn require_admin(tx: &impl Reader, group: ChatGroupId, user: UserId) -> CoreResult<ChatMember> {
    let member = require_member(tx, group, user)?;
    if !member.is_admin {
        return Err(CoreError::forbidden("only admins can do this"));
    }
    Ok(member)
}

fn add_member(
    tx: &WriteTx,
    group: ChatGroupId,
    user: UserId,
    is_admin: bool,
    now: Timestamp,
) -> CoreResult<()> {
    if member_of(tx, group, user)?.is_some() {
        return Ok(());
    }
    tx.put(&ChatMember {
        id: tx.next_id::<ChatMember>()?,
        chat_group_id: group,
        user_id: user,
        is_admin,
        muted: false,
        joined_at: now,
        cleared_at: None,
        last_read_at: None,
    })
}

fn delete_group_records(tx: &WriteTx, group: ChatGroupId) -> CoreResult<()> {
    for member in members_of(tx, group)? {
        tx.remove::<ChatMember>(member.id)?;
    }
    for message in tx.filter::<Message>(|m| m.chat_group_id == group)? {
        tx.remove::<Message>(message.id.0)?;
    }
    tx.remove::<ChatGroup>(group.0)
}

/// Remove a member, keeping the admin invariant.
fn remove_member(tx: &WriteTx, group: ChatGroupId, user: UserId) -> CoreResult<()> {
    let Some(member) = member_of(tx, group, user)? else {
        return Ok(());
    };
    tx.remove::<ChatMember>(member.id)?;
    ensure_admin(tx, group)
}

fn ensure_admin(tx: &WriteTx, group: ChatGroupId) -> CoreResult<()> {
    let remaining = members_of(tx, group)?;
    if remaining.is_empty() {
        return delete_group_records(tx, group);
    }
    if !remaining.iter().any(|m| m.is_admin) {
        if let Some(mut oldest) = remaining
            .into_iter()
            .min_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)))
        {
            oldest.is_admin = true;
            tx.put(&oldest)?;
        }
    }
    Ok(())
}

// =============================================================================
// GROUPS
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChatGroup {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_id: Option<UploadId>,
    pub participants: Vec<UserId>,
}

/// Create a chat group, or return the existing direct chat between two users.
pub fn create_chat_group(
    tx: &WriteTx,
    creator: UserId,
    input: NewChatGroup,
    now: Timestamp,
) -> CoreResult<ChatGroup> {
    let participants: BTreeSet<UserId> = input
        .participants
        .iter()
        .copied()
        .filter(|id| *id != creator)
        .collect();
    if participants.is_empty() {
        return Err(CoreError::invalid("participants cannot be empty"));
    }
    let name = input.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    for id in &participants {
        users::require_live(tx, *id)?;
    }
    let is_direct = participants.len() == 1 && name.is_none();

    if is_direct {
        let other = participants.iter().copied().next().unwrap_or_default();
        if users::is_blocked_between(tx, creator, other)? {
            return Err(CoreError::forbidden("user is blocked"));
        }
        if let Some(existing) = find_direct(tx, creator, other)? {
            return Ok(existing);
        }
    } else if name.is_none() {
        return Err(CoreError::invalid("group name is required"));
    }

    let group = ChatGroup {
        id: ChatGroupId(tx.next_id::<ChatGroup>()?),
        name,
        image_id: input.image_id,
        is_direct,
        created_by: creator,
        created_at: now,
    };
    tx.put(&group)?;
    add_member(tx, group.id, creator, true, now)?;
    for id in participants {
        add_member(tx, group.id, id, false, now)?;
    }
    Ok(group)
}

fn find_direct(tx: &impl Reader, a: UserId, b: UserId) -> CoreResult<Option<ChatGroup>> {
    for group in tx.filter::<ChatGroup>(|g| g.is_direct)? {
        let members: BTreeSet<UserId> = members_of(tx, group.id)?
            .iter()
            .map(|m| m.user_id)
            .collect();
        if members == BTreeSet::from([a, b]) {
            return Ok(Some(group));
        }
    }
    Ok(None)
}

/// Row of the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGroupSummary {
    #[serde(flatten)]
    pub group: ChatGroup,
    /// The other participant of a direct chat.
    pub peer: Option<UserSummary>,
    pub last_message: Option<Message>,
    pub unread_count: usize,
    pub is_muted: bool,
    pub is_admin: bool,
}

/// Chats of `user`, most recently active first.
pub fn chat_groups(tx: &impl Reader, user: UserId) -> CoreResult<Vec<ChatGroupSummary>> {
    let memberships = tx.filter::<ChatMember>(|m| m.user_id == user)?;
    let messages = tx.all::<Message>()?;
    let mut out = Vec::with_capacity(memberships.len());
    for member in memberships {
        let Some(group) = tx.get::<ChatGroup>(member.chat_group_id.0)? else {
            continue;
        };
        let visible: Vec<&Message> = messages
            .iter()
            .filter(|m| m.chat_group_id == group.id && m.visible_to(&member))
            .collect();
        let unread_count = visible
            .iter()
            .filter(|m| m.sender != user && member.last_read_at.is_none_or(|at| m.created_at > at))
            .count();
        let peer = if group.is_direct {
            members_of(tx, group.id)?
                .into_iter()
                .find(|m| m.user_id != user)
                .map(|m| tx.get::<User>(m.user_id.0))
                .transpose()?
                .flatten()
                .map(|u| UserSummary::from(&u))
        } else {
            None
        };
        out.push(ChatGroupSummary {
            last_message: visible.last().map(|m| (*m).clone()),
            unread_count,
            is_muted: member.muted,
            is_admin: member.is_admin,
            peer,
            group,
        });
    }
    out.sort_by(|a, b| {
        let at = |s: &ChatGroupSummary| s.last_message.as_ref().map_or(s.group.created_at, |m| m.created_at);
        at(b).cmp(&at(a)).then(b.group.id.cmp(&a.group.id))
    });
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMemberView {
    pub user: UserSummary,
    pub is_admin: bool,
    pub joined_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGroupDetails {
    #[serde(flatten)]
    pub group: ChatGroup,
    pub members: Vec<ChatMemberView>,
    pub is_muted: bool,
    pub is_admin: bool,
}

pub fn details(tx: &impl Reader, group: ChatGroupId, user: UserId) -> CoreResult<ChatGroupDetails> {
    let me = require_member(tx, group, user)?;
    let record: ChatGroup = tx.require(group.0)?;
    let mut members = Vec::new();
    for member in members_of(tx, group)? {
        if let Some(profile) = tx.get::<User>(member.user_id.0)? {
            members.push(ChatMemberView {
                user: UserSummary::from(&profile),
                is_admin: member.is_admin,
                joined_at: member.joined_at,
            });
        }
    }
    Ok(ChatGroupDetails {
        group: record,
        members,
        is_muted: me.muted,
        is_admin: me.is_admin,
    })
}

/// Flip mute for the caller. Returns the new state.
pub fn toggle_mute(tx: &WriteTx, group: ChatGroupId, user: UserId) -> CoreResult<bool> {
    let mut member = require_member(tx, group, user)?;
    member.muted = !member.muted;
    tx.put(&member)?;
    Ok(member.muted)
}

pub fn leave(tx: &WriteTx, group: ChatGroupId, user: UserId) -> CoreResult<()> {
    require_member(tx, group, user)?;
    remove_member(tx, group, user)
}

/// Admin-only delete of the whole group.
pub fn delete_chat_group(tx: &WriteTx, group: ChatGroupId, user: UserId) -> CoreResult<()> {
    require_admin(tx, group, user)?;
    delete_group_records(tx, group)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGroupEdit {
    pub name: Option<String>,
    pub image_id: Option<UploadId>,
}

pub fn edit(
    tx: &WriteTx,
    group: ChatGroupId,
    user: UserId,
    edit: ChatGroupEdit,
) -> CoreResult<ChatGroup> {
    require_admin(tx, group, user)?;
    let mut record: ChatGroup = tx.require(group.0)?;
    if record.is_direct {
        return Err(CoreError::invalid("direct chats cannot be edited"));
    }
    if let Some(name) = edit.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invalid("group name is required"));
        }
        record.name = Some(name.to_string());
    }
    if let Some(image) = edit.image_id {
        let _: Upload = tx.require(image.0)?;
        record.image_id = Some(image);
    }
    tx.put(&record)?;
    Ok(record)
}

/// Flip admin status of several members. At least one admin must remain.
pub fn toggle_admins(
    tx: &WriteTx,
    group: ChatGroupId,
    user: UserId,
    ids: &[UserId],
) -> CoreResult<()> {
    require_admin(tx, group, user)?;
    for id in ids {
        let mut member = member_of(tx, group, *id)?.ok_or(CoreError::NotFound(ChatMember::KIND))?;
        member.is_admin = !member.is_admin;
        tx.put(&member)?;
    }
    if !members_of(tx, group)?.iter().any(|m| m.is_admin) {
        return Err(CoreError::invalid("a chat group needs at least one admin"));
    }
    Ok(())
}

/// Make one member an admin.
pub fn set_admin(tx: &WriteTx, group: ChatGroupId, user: UserId, target: UserId) -> CoreResult<()> {
    require_admin(tx, group, user)?;
    let mut member = member_of(tx, group, target)?.ok_or(CoreError::NotFound(ChatMember::KIND))?;
    member.is_admin = true;
    tx.put(&member)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsEdit {
    #[serde(default)]
    pub add: Vec<UserId>,
    #[serde(default)]
    pub remove: Vec<UserId>,
}

pub fn edit_participants(
    tx: &WriteTx,
    group: ChatGroupId,
    user: UserId,
    change: ParticipantsEdit,
    now: Timestamp,
) -> CoreResult<()> {
    require_admin(tx, group, user)?;
    let record: ChatGroup = tx.require(group.0)?;
    if record.is_direct {
        return Err(CoreError::invalid("direct chats cannot change participants"));
    }
    for id in change.add {
        users::require_live(tx, id)?;
        if users::is_blocked_between(tx, user, id)? {
            return Err(CoreError::forbidden("user is blocked"));
        }
        add_member(tx, group, id, false, now)?;
    }
    for id in change.remove {
        remove_member(tx, group, id)?;
    }
    Ok(())
}

/// Drop a deleted account from every chat.
pub fn depart_everywhere(tx: &WriteTx, user: UserId) -> CoreResult<()> {
    for member in tx.filter::<ChatMember>(|m| m.user_id == user)? {
        remove_member(tx, member.chat_group_id, user)?;
    }
    Ok(())
}

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub attachment_id: Option<UploadId>,
}

/// A stored message and who should receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message: Message,
    /// Other members of the group.
    pub recipients: Vec<UserId>,
    /// Recipients that have not muted the group.
    pub push_recipients: Vec<UserId>,
}

pub fn send_message(
    tx: &WriteTx,
    group: ChatGroupId,
    sender: UserId,
    input: NewMessage,
    now: Timestamp,
) -> CoreResult<SentMessage> {
    require_member(tx, group, sender)?;
    let body = input.body.filter(|b| !b.trim().is_empty());
    if body.is_none() && input.attachment_id.is_none() {
        return Err(CoreError::invalid("message cannot be empty"));
    }
    if let Some(attachment) = input.attachment_id {
        let _: Upload = tx.require(attachment.0)?;
    }
    let others: Vec<ChatMember> = members_of(tx, group)?
        .into_iter()
        .filter(|m| m.user_id != sender)
        .collect();
    let record: ChatGroup = tx.require(group.0)?;
    if record.is_direct {
        if let Some(peer) = others.first() {
            if users::is_blocked_between(tx, sender, peer.user_id)? {
                return Err(CoreError::forbidden("user is blocked"));
            }
        }
    }

    let message = Message {
        id: MessageId(tx.next_id::<Message>()?),
        chat_group_id: group,
        sender,
        body,
        attachment_id: input.attachment_id,
        created_at: now,
        deleted_for: BTreeSet::new(),
        deleted_for_all: false,
    };
    tx.put(&message)?;
    Ok(SentMessage {
        message,
        recipients: others.iter().map(|m| m.user_id).collect(),
        push_recipients: others
            .iter()
            .filter(|m| !m.muted)
            .map(|m| m.user_id)
            .collect(),
    })
}

/// Messages visible to `viewer`, newest first.
pub fn messages(
    tx: &impl Reader,
    group: ChatGroupId,
    viewer: UserId,
    pagination: Pagination,
) -> CoreResult<Page<Message>> {
    let member = require_member(tx, group, viewer)?;
    let mut all = tx.filter::<Message>(|m| m.chat_group_id == group && m.visible_to(&member))?;
    all.reverse();
    Ok(pagination.apply(all))
}

/// Messages newer than `after`, oldest first.
pub fn messages_after(
    tx: &impl Reader,
    group: ChatGroupId,
    viewer: UserId,
    after: Timestamp,
) -> CoreResult<Vec<Message>> {
    let member = require_member(tx, group, viewer)?;
    tx.filter::<Message>(|m| {
        m.chat_group_id == group && m.created_at > after && m.visible_to(&member)
    })
}

/// Record that `viewer` has read the group up to `now`.
pub fn mark_read(tx: &WriteTx, group: ChatGroupId, viewer: UserId, now: Timestamp) -> CoreResult<()> {
    let mut member = require_member(tx, group, viewer)?;
    member.last_read_at = Some(now);
    tx.put(&member)
}

/// Delete messages for the viewer, or for everyone (sender only).
pub fn delete_messages(
    tx: &WriteTx,
    group: ChatGroupId,
    viewer: UserId,
    ids: &[MessageId],
    for_everyone: bool,
) -> CoreResult<usize> {
    require_member(tx, group, viewer)?;
    let mut changed = 0;
    for id in ids {
        let mut message: Message = tx.require(id.0)?;
        if message.chat_group_id != group {
            return Err(CoreError::NotFound(Message::KIND));
        }
        if for_everyone {
            if message.sender != viewer {
                return Err(CoreError::forbidden(
                    "only the sender can delete a message for everyone",
                ));
            }
            message.deleted_for_all = true;
        } else {
            message.deleted_for.insert(viewer);
        }
        tx.put(&message)?;
        changed += 1;
    }
    Ok(changed)
}

/// Hide every current message from the viewer.
pub fn clear_all(tx: &WriteTx, group: ChatGroupId, viewer: UserId, now: Timestamp) -> CoreResult<()> {
    let mut member = require_member(tx, group, viewer)?;
    member.cleared_at = Some(now);
    tx.put(&member)
}

/// An attachment of a message in the group.
pub fn message_attachment(
    tx: &impl Reader,
    group: ChatGroupId,
    viewer: UserId,
    attachment: UploadId,
) -> CoreResult<Upload> {
    let member = require_member(tx, group, viewer)?;
    let found = tx.find::<Message>(|m| {
        m.chat_group_id == group && m.attachment_id == Some(attachment) && m.visible_to(&member)
    })?;
    if found.is_none() {
        return Err(CoreError::NotFound(Upload::KIND));
    }
    tx.require(attachment.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::users::tests::{new_user, now};
    use chrono::Duration;

    fn text(body: &str) -> NewMessage {
        NewMessage {
            body: Some(body.into()),
            attachment_id: None,
        }
    }

    fn named(store: &Store, creator: UserId, others: &[UserId]) -> ChatGroup {
        store
            .write(|tx| {
                create_chat_group(
                    tx,
                    creator,
                    NewChatGroup {
                        name: Some("Team".into()),
                        image_id: None,
                        participants: others.to_vec(),
                    },
                    now(),
                )
            })
            .unwrap()
    }

    #[test]
    fn direct_chats_are_reused() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let direct = |to: UserId| NewChatGroup {
            name: None,
            image_id: None,
            participants: vec![to],
        };
        let first = store
            .write(|tx| create_chat_group(tx, a.id, direct(b.id), now()))
            .unwrap();
        let second = store
            .write(|tx| create_chat_group(tx, b.id, direct(a.id), now()))
            .unwrap();
        assert!(first.is_direct);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn non_members_are_forbidden() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let c = new_user(&store, "Cid");
        let group = named(&store, a.id, &[b.id]);
        let err = store
            .write(|tx| send_message(tx, group.id, c.id, text("hi"), now()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        let err = store
            .write(|tx| delete_chat_group(tx, group.id, b.id))
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[test]
    fn messages_respect_deletes_and_clears() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let group = named(&store, a.id, &[b.id]);

        let empty = store.write(|tx| send_message(tx, group.id, a.id, NewMessage::default(), now()));
        assert!(matches!(empty, Err(CoreError::Invalid(_))));

        let m1 = store
            .write(|tx| send_message(tx, group.id, a.id, text("one"), now()))
            .unwrap();
        assert_eq!(m1.recipients, vec![b.id]);
        let later = now() + Duration::seconds(5);
        let m2 = store
            .write(|tx| send_message(tx, group.id, b.id, text("two"), later))
            .unwrap();

        let page = store
            .read(|tx| messages(tx, group.id, a.id, Pagination::default()))
            .unwrap();
        assert_eq!(page.items[0].id, m2.message.id);

        // b cannot delete a's message for everyone.
        assert!(
            store
                .write(|tx| delete_messages(tx, group.id, b.id, &[m1.message.id], true))
                .is_err()
        );
        store
            .write(|tx| delete_messages(tx, group.id, b.id, &[m1.message.id], false))
            .unwrap();
        let for_b = store
            .read(|tx| messages(tx, group.id, b.id, Pagination::default()))
            .unwrap();
        assert_eq!(for_b.total, 1);
        let for_a = store
            .read(|tx| messages(tx, group.id, a.id, Pagination::default()))
            .unwrap();
        assert_eq!(for_a.total, 2);

        let after = store
            .read(|tx| messages_after(tx, group.id, a.id, now()))
            .unwrap();
        assert_eq!(after.len(), 1);

        store
            .write(|tx| clear_all(tx, group.id, a.id, later))
            .unwrap();
        let cleared = store
            .read(|tx| messages(tx, group.id, a.id, Pagination::default()))
            .unwrap();
        assert_eq!(cleared.total, 0);
    }

    #[test]
    fn muted_members_get_no_push() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let c = new_user(&store, "Cid");
        let group = named(&store, a.id, &[b.id, c.id]);
        assert!(store.write(|tx| toggle_mute(tx, group.id, c.id)).unwrap());
        let sent = store
            .write(|tx| send_message(tx, group.id, a.id, text("hi"), now()))
            .unwrap();
        assert_eq!(sent.recipients, vec![b.id, c.id]);
        assert_eq!(sent.push_recipients, vec![b.id]);
    }

    #[test]
    fn last_admin_leaving_promotes_oldest() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let c = new_user(&store, "Cid");
        let group = named(&store, a.id, &[b.id, c.id]);
        store.write(|tx| leave(tx, group.id, a.id)).unwrap();
        let d = store.read(|tx| details(tx, group.id, b.id)).unwrap();
        assert!(d.is_admin);
        assert_eq!(d.members.len(), 2);

        store.write(|tx| leave(tx, group.id, b.id)).unwrap();
        store.write(|tx| leave(tx, group.id, c.id)).unwrap();
        let gone: Option<ChatGroup> = store.read(|tx| tx.get(group.id.0)).unwrap();
        assert!(gone.is_none());
    }

    #[test]
    fn admin_toggles_keep_one_admin() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let group = named(&store, a.id, &[b.id]);
        let err = store
            .write(|tx| toggle_admins(tx, group.id, a.id, &[a.id]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Invalid(_)));
        store
            .write(|tx| toggle_admins(tx, group.id, a.id, &[a.id, b.id]))
            .unwrap();
        let d = store.read(|tx| details(tx, group.id, b.id)).unwrap();
        assert!(d.is_admin);
    }

    #[test]
    fn chat_list_counts_unread() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let group = named(&store, a.id, &[b.id]);
        store
            .write(|tx| send_message(tx, group.id, a.id, text("hi"), now()))
            .unwrap();
        let list = store.read(|tx| chat_groups(tx, b.id)).unwrap();
        assert_eq!(list[0].unread_count, 1);
        store
            .write(|tx| mark_read(tx, group.id, b.id, now() + Duration::seconds(1)))
            .unwrap();
        let list = store.read(|tx| chat_groups(tx, b.id)).unwrap();
        assert_eq!(list[0].unread_count, 0);
        assert!(list[0].last_message.is_some());
    }

    #[test]
    fn deleted_user_departs_chats() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let group = named(&store, a.id, &[b.id]);
        store
            .write(|tx| users::delete_user(tx, a.id, now()))
            .unwrap();
        let d = store.read(|tx| details(tx, group.id, b.id)).unwrap();
        assert!(d.is_admin);
        assert_eq!(d.members.len(), 1);
    }
}
