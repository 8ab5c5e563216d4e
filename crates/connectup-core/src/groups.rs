//! # Community groups
//!
//! Groups users join to share posts. Membership is a status machine:
//!
//! ```text
//! (none) --join public--> member
//! (none) --join private--> requested --accept--> member
//! (none) --invite--> invited --join--> member
//! any --block--> blocked --unblock--> (none)
//! ```

use crate::catalog::{self, ReportTarget};
use crate::filters::{Pagination, QueryMap, matches_search, search_text};
use crate::formats::CsvWriter;
use crate::notifications::{self, Draft, NotificationKind, Notified};
use crate::response::Page;
use crate::storage::{Record, RecordTable};
use crate::users::{self, User, UserSummary};
use crate::{
    CoreError, CoreResult, GroupId, IndustryId, Reader, ReportTypeId, Timestamp, UploadId,
    UserId, WriteTx, connections,
};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub image_id: Option<UploadId>,
    pub privacy: Privacy,
    pub industry_ids: Vec<IndustryId>,
    pub created_by: UserId,
    pub suspended: bool,
    pub deleted: bool,
    pub created_at: Timestamp,
}

impl Record for Group {
    const TABLE: RecordTable = TableDefinition::new("groups");
    const KIND: &'static str = "group";
    fn key(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Member,
    Requested,
    Invited,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: u64,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub status: MemberStatus,
    pub is_admin: bool,
    pub joined_at: Timestamp,
}

impl Record for GroupMember {
    const TABLE: RecordTable = TableDefinition::new("group_members");
    const KIND: &'static str = "group member";
    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReport {
    pub id: u64,
    pub group_id: GroupId,
    pub reported_by: UserId,
    pub report_type_id: ReportTypeId,
    pub reason: Option<String>,
    pub created_at: Timestamp,
}

impl Record for GroupReport {
    const TABLE: RecordTable = TableDefinition::new("group_reports");
    const KIND: &'static str = "group report";
    fn key(&self) -> u64 {
        self.id
    }
}

// =============================================================================
// GUARDS
// =============================================================================

/// A group that is neither deleted nor suspended.
pub fn require_group(tx: &impl Reader, id: GroupId) -> CoreResult<Group> {
    let group: Group = tx.require(id.0)?;
    if group.deleted {
        return Err(CoreError::NotFound(Group::KIND));
    }
    if group.suspended {
        return Err(CoreError::forbidden("group is suspended"));
    }
    Ok(group)
}

pub fn membership(tx: &impl Reader, group: GroupId, user: UserId) -> CoreResult<Option<GroupMember>> {
    tx.find::<GroupMember>(|m| m.group_id == group && m.user_id == user)
}

/// Fail with 403 unless `user` is a full member.
pub fn require_group_member(tx: &impl Reader, group: GroupId, user: UserId) -> CoreResult<GroupMember> {
    require_group(tx, group)?;
    membership(tx, group, user)?
        .filter(|m| m.status == MemberStatus::Member)
        .ok_or_else(|| CoreError::forbidden("not a member of this group"))
}

/// Fail with 403 unless `user` is a group admin.
pub fn require_group_admin(tx: &impl Reader, group: GroupId, user: UserId) -> CoreResult<GroupMember> {
    let member = require_group_member(tx, group, user)?;
    if !member.is_admin {
        return Err(CoreError::forbidden("only group admins can do this"));
    }
    Ok(member)
}

fn members_with(tx: &impl Reader, group: GroupId, status: MemberStatus) -> CoreResult<Vec<GroupMember>> {
    tx.filter::<GroupMember>(|m| m.group_id == group && m.status == status)
}

fn admins(tx: &impl Reader, group: GroupId) -> CoreResult<Vec<UserId>> {
    Ok(members_with(tx, group, MemberStatus::Member)?
        .into_iter()
        .filter(|m| m.is_admin)
        .map(|m| m.user_id)
        .collect())
}

fn put_member(
    tx: &WriteTx,
    existing: Option<GroupMember>,
    group: GroupId,
    user: UserId,
    status: MemberStatus,
    is_admin: bool,
    now: Timestamp,
) -> CoreResult<GroupMember> {
    let member = match existing {
        Some(mut m) => {
            m.status = status;
            m.is_admin = is_admin;
            m.joined_at = now;
            m
        }
        None => GroupMember {
            id: tx.next_id::<GroupMember>()?,
            group_id: group,
            user_id: user,
            status,
            is_admin,
            joined_at: now,
        },
    };
    tx.put(&member)?;
    Ok(member)
}

/// After an admin leaves: promote the oldest member if no admin remains,
/// soft-delete the group if nobody remains.
fn ensure_admin(tx: &WriteTx, group: GroupId) -> CoreResult<()> {
    let members = members_with(tx, group, MemberStatus::Member)?;
    if members.is_empty() {
        let mut record: Group = tx.require(group.0)?;
        record.deleted = true;
        return tx.put(&record);
    }
    if !members.iter().any(|m| m.is_admin) {
        if let Some(mut oldest) = members
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
// LIFECYCLE
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_id: Option<UploadId>,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub industry_ids: Vec<IndustryId>,
}

fn validated(tx: &impl Reader, input: &GroupInput) -> CoreResult<String> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(CoreError::invalid("group name is required"));
    }
    for id in &input.industry_ids {
        let _: catalog::Industry = tx.require(id.0)?;
    }
    Ok(name.to_string())
}

pub fn create_group(tx: &WriteTx, creator: UserId, input: GroupInput, now: Timestamp) -> CoreResult<Group> {
    let name = validated(tx, &input)?;
    let group = Group {
        id: GroupId(tx.next_id::<Group>()?),
        name,
        description: input.description.filter(|d| !d.trim().is_empty()),
        image_id: input.image_id,
        privacy: input.privacy,
        industry_ids: input.industry_ids,
        created_by: creator,
        suspended: false,
        deleted: false,
        created_at: now,
    };
    tx.put(&group)?;
    put_member(tx, None, group.id, creator, MemberStatus::Member, true, now)?;
    Ok(group)
}

pub fn update_group(tx: &WriteTx, group: GroupId, user: UserId, input: GroupInput) -> CoreResult<Group> {
    require_group_admin(tx, group, user)?;
    let name = validated(tx, &input)?;
    let mut record: Group = tx.require(group.0)?;
    record.name = name;
    record.description = input.description.filter(|d| !d.trim().is_empty());
    if input.image_id.is_some() {
        record.image_id = input.image_id;
    }
    record.privacy = input.privacy;
    record.industry_ids = input.industry_ids;
    tx.put(&record)?;
    Ok(record)
}

pub fn update_image(tx: &WriteTx, group: GroupId, user: UserId, image: UploadId) -> CoreResult<Group> {
    require_group_admin(tx, group, user)?;
    let _: crate::uploads::Upload = tx.require(image.0)?;
    let mut record: Group = tx.require(group.0)?;
    record.image_id = Some(image);
    tx.put(&record)?;
    Ok(record)
}

/// Soft-delete by a group admin.
pub fn delete_group(tx: &WriteTx, group: GroupId, user: UserId) -> CoreResult<()> {
    require_group_admin(tx, group, user)?;
    let mut record: Group = tx.require(group.0)?;
    record.deleted = true;
    tx.put(&record)
}

// =============================================================================
// MEMBERSHIP FLOWS
// =============================================================================

/// Join a public group, answer an invite, or request to join a private one.
pub fn join_request(
    tx: &WriteTx,
    group: GroupId,
    user: UserId,
    now: Timestamp,
) -> CoreResult<Notified<GroupMember>> {
    let record = require_group(tx, group)?;
    let existing = membership(tx, group, user)?;
    match existing.as_ref().map(|m| m.status) {
        Some(MemberStatus::Blocked) => return Err(CoreError::forbidden("you are blocked from this group")),
        Some(MemberStatus::Member) => return Err(CoreError::conflict("already a member")),
        Some(MemberStatus::Requested) => return Err(CoreError::conflict("request already sent")),
        Some(MemberStatus::Invited) | None => {}
    }
    let invited = existing.as_ref().is_some_and(|m| m.status == MemberStatus::Invited);
    if record.privacy == Privacy::Public || invited {
        let member = put_member(tx, existing, group, user, MemberStatus::Member, false, now)?;
        return Ok(Notified::new(member));
    }

    let member = put_member(tx, existing, group, user, MemberStatus::Requested, false, now)?;
    let requester = users::require_live(tx, user)?;
    let draft = Draft::new(
        NotificationKind::GroupJoinRequest,
        "New join request",
        format!("{} wants to join {}", requester.name, record.name),
    )
    .data("groupId", group)
    .data("userId", user);
    let created = notifications::notify_all(tx, Some(user), admins(tx, group)?, &draft, now)?;
    Ok(Notified {
        value: member,
        notifications: created,
    })
}

pub fn cancel_request(tx: &WriteTx, group: GroupId, user: UserId) -> CoreResult<()> {
    let member = membership(tx, group, user)?
        .filter(|m| m.status == MemberStatus::Requested)
        .ok_or(CoreError::NotFound("group request"))?;
    tx.remove::<GroupMember>(member.id)
}

pub fn leave(tx: &WriteTx, group: GroupId, user: UserId) -> CoreResult<()> {
    let member = require_group_member(tx, group, user)?;
    let members = members_with(tx, group, MemberStatus::Member)?;
    let other_admins = members.iter().filter(|m| m.is_admin && m.user_id != user).count();
    if member.is_admin && other_admins == 0 && members.len() > 1 {
        return Err(CoreError::invalid("assign another admin before leaving"));
    }
    tx.remove::<GroupMember>(member.id)?;
    ensure_admin(tx, group)
}

/// Flip admin status of a member. The last admin cannot be demoted.
pub fn toggle_admin(tx: &WriteTx, group: GroupId, admin: UserId, target: UserId) -> CoreResult<bool> {
    require_group_admin(tx, group, admin)?;
    let mut member = require_group_member(tx, group, target)?;
    if member.is_admin && admins(tx, group)?.len() == 1 {
        return Err(CoreError::invalid("a group needs at least one admin"));
    }
    member.is_admin = !member.is_admin;
    tx.put(&member)?;
    Ok(member.is_admin)
}

pub fn remove_user(tx: &WriteTx, group: GroupId, admin: UserId, target: UserId) -> CoreResult<()> {
    require_group_admin(tx, group, admin)?;
    if admin == target {
        return Err(CoreError::invalid("use leave to exit the group"));
    }
    let member = require_group_member(tx, group, target)?;
    tx.remove::<GroupMember>(member.id)?;
    ensure_admin(tx, group)
}

pub fn accept_request(
    tx: &WriteTx,
    group: GroupId,
    admin: UserId,
    target: UserId,
    now: Timestamp,
) -> CoreResult<Notified<GroupMember>> {
    let record = require_group(tx, group)?;
    require_group_admin(tx, group, admin)?;
    let existing = membership(tx, group, target)?
        .filter(|m| m.status == MemberStatus::Requested)
        .ok_or(CoreError::NotFound("group request"))?;
    let member = put_member(tx, Some(existing), group, target, MemberStatus::Member, false, now)?;
    let draft = Draft::new(
        NotificationKind::GroupRequestAccepted,
        "Request accepted",
        format!("You are now a member of {}", record.name),
    )
    .data("groupId", group);
    let notification = notifications::notify(tx, Some(admin), target, draft, now)?;
    Ok(Notified::new(member).with(notification))
}

pub fn decline_request(tx: &WriteTx, group: GroupId, admin: UserId, target: UserId) -> CoreResult<()> {
    require_group_admin(tx, group, admin)?;
    let existing = membership(tx, group, target)?
        .filter(|m| m.status == MemberStatus::Requested)
        .ok_or(CoreError::NotFound("group request"))?;
    tx.remove::<GroupMember>(existing.id)
}

/// Block or unblock a user. Returns true if now blocked.
pub fn toggle_block(
    tx: &WriteTx,
    group: GroupId,
    admin: UserId,
    target: UserId,
    now: Timestamp,
) -> CoreResult<bool> {
    require_group_admin(tx, group, admin)?;
    if admin == target {
        return Err(CoreError::invalid("cannot block yourself"));
    }
    users::require_live(tx, target)?;
    let existing = membership(tx, group, target)?;
    if let Some(member) = existing.as_ref().filter(|m| m.status == MemberStatus::Blocked) {
        tx.remove::<GroupMember>(member.id)?;
        return Ok(false);
    }
    put_member(tx, existing, group, target, MemberStatus::Blocked, false, now)?;
    ensure_admin(tx, group)?;
    Ok(true)
}

/// Invite users who are not yet in the group.
pub fn invite_users(
    tx: &WriteTx,
    group: GroupId,
    inviter: UserId,
    ids: &[UserId],
    now: Timestamp,
) -> CoreResult<Notified<usize>> {
    let record = require_group(tx, group)?;
    let me = require_group_member(tx, group, inviter)?;
    if record.privacy == Privacy::Private && !me.is_admin {
        return Err(CoreError::forbidden("only group admins can invite"));
    }
    let sender = users::require_live(tx, inviter)?;
    let draft = Draft::new(
        NotificationKind::GroupInvite,
        "Group invitation",
        format!("{} invited you to join {}", sender.name, record.name),
    )
    .data("groupId", group);

    let mut out = Notified::new(0usize);
    for id in ids.iter().copied().collect::<BTreeSet<_>>() {
        if id == inviter || tx.get::<User>(id.0)?.is_none_or(|u| u.is_deleted()) {
            continue;
        }
        if membership(tx, group, id)?.is_some() {
            continue;
        }
        put_member(tx, None, group, id, MemberStatus::Invited, false, now)?;
        out.value += 1;
        out = out.with(notifications::notify(tx, Some(inviter), id, draft.clone(), now)?);
    }
    Ok(out)
}

/// Detach a deleted account from every group.
pub fn remove_user_everywhere(tx: &WriteTx, user: UserId) -> CoreResult<()> {
    for member in tx.filter::<GroupMember>(|m| m.user_id == user)? {
        tx.remove::<GroupMember>(member.id)?;
        if member.status == MemberStatus::Member {
            ensure_admin(tx, member.group_id)?;
        }
    }
    Ok(())
}

pub fn report_group(
    tx: &WriteTx,
    group: GroupId,
    user: UserId,
    report_type: ReportTypeId,
    reason: Option<String>,
    now: Timestamp,
) -> CoreResult<GroupReport> {
    require_group(tx, group)?;
    catalog::require_report_type(tx, report_type, ReportTarget::Group)?;
    if tx
        .find::<GroupReport>(|r| r.group_id == group && r.reported_by == user)?
        .is_some()
    {
        return Err(CoreError::conflict("group already reported"));
    }
    let report = GroupReport {
        id: tx.next_id::<GroupReport>()?,
        group_id: group,
        reported_by: user,
        report_type_id: report_type,
        reason: reason.filter(|r| !r.trim().is_empty()),
        created_at: now,
    };
    tx.put(&report)?;
    Ok(report)
}

// =============================================================================
// LISTINGS
// =============================================================================

/// Group card shown in lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: Group,
    pub member_count: usize,
    pub my_status: Option<MemberStatus>,
    pub is_admin: bool,
}

fn summarize(tx: &impl Reader, groups: Vec<Group>, viewer: UserId) -> CoreResult<Vec<GroupSummary>> {
    let members = tx.all::<GroupMember>()?;
    let mut counts: BTreeMap<GroupId, usize> = BTreeMap::new();
    let mut mine: BTreeMap<GroupId, &GroupMember> = BTreeMap::new();
    for m in &members {
        if m.status == MemberStatus::Member {
            *counts.entry(m.group_id).or_default() += 1;
        }
        if m.user_id == viewer {
            mine.insert(m.group_id, m);
        }
    }
    Ok(groups
        .into_iter()
        .map(|group| GroupSummary {
            member_count: counts.get(&group.id).copied().unwrap_or(0),
            my_status: mine.get(&group.id).map(|m| m.status),
            is_admin: mine.get(&group.id).is_some_and(|m| m.is_admin && m.status == MemberStatus::Member),
            group,
        })
        .collect())
}

fn live_groups_where(
    tx: &impl Reader,
    user: UserId,
    keep: impl Fn(&GroupMember) -> bool,
) -> CoreResult<Vec<GroupSummary>> {
    let ids: BTreeSet<GroupId> = tx
        .filter::<GroupMember>(|m| m.user_id == user && keep(m))?
        .into_iter()
        .map(|m| m.group_id)
        .collect();
    let groups = tx.filter::<Group>(|g| ids.contains(&g.id) && !g.deleted && !g.suspended)?;
    summarize(tx, groups, user)
}

/// Every live group `user` is a full member of.
pub fn joined_groups(tx: &impl Reader, user: UserId) -> CoreResult<Vec<GroupSummary>> {
    live_groups_where(tx, user, |m| m.status == MemberStatus::Member)
}

pub fn joined(tx: &impl Reader, user: UserId, pagination: Pagination) -> CoreResult<Page<GroupSummary>> {
    Ok(pagination.apply(joined_groups(tx, user)?))
}

pub fn owned(tx: &impl Reader, user: UserId, pagination: Pagination) -> CoreResult<Page<GroupSummary>> {
    Ok(pagination.apply(live_groups_where(tx, user, |m| {
        m.status == MemberStatus::Member && m.is_admin
    })?))
}

pub fn requested(tx: &impl Reader, user: UserId, pagination: Pagination) -> CoreResult<Page<GroupSummary>> {
    Ok(pagination.apply(live_groups_where(tx, user, |m| m.status == MemberStatus::Requested)?))
}

/// Public groups the user has no relation to.
pub fn explore(
    tx: &impl Reader,
    user: UserId,
    pagination: Pagination,
    search: Option<&str>,
) -> CoreResult<Page<GroupSummary>> {
    let related: BTreeSet<GroupId> = tx
        .filter::<GroupMember>(|m| m.user_id == user && m.status != MemberStatus::Invited)?
        .into_iter()
        .map(|m| m.group_id)
        .collect();
    let mut groups = tx.filter::<Group>(|g| {
        !g.deleted
            && !g.suspended
            && g.privacy == Privacy::Public
            && !related.contains(&g.id)
            && matches_search(search, &[&g.name, g.description.as_deref().unwrap_or_default()])
    })?;
    groups.reverse();
    Ok(pagination.apply(summarize(tx, groups, user)?))
}

/// Single group as seen by `viewer`.
pub fn detail(tx: &impl Reader, group: GroupId, viewer: UserId) -> CoreResult<GroupSummary> {
    let record = require_group(tx, group)?;
    summarize(tx, vec![record], viewer)?
        .pop()
        .ok_or(CoreError::NotFound(Group::KIND))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberView {
    pub user: UserSummary,
    pub status: MemberStatus,
    pub is_admin: bool,
    pub joined_at: Timestamp,
}

fn member_views(
    tx: &impl Reader,
    group: GroupId,
    status: MemberStatus,
    search: Option<&str>,
) -> CoreResult<Vec<GroupMemberView>> {
    let mut out = Vec::new();
    for member in members_with(tx, group, status)? {
        let Some(user) = tx.get::<User>(member.user_id.0)? else {
            continue;
        };
        if user.is_deleted() || !matches_search(search, &[&user.name]) {
            continue;
        }
        out.push(GroupMemberView {
            user: UserSummary::from(&user),
            status: member.status,
            is_admin: member.is_admin,
            joined_at: member.joined_at,
        });
    }
    Ok(out)
}

/// Members, admins first.
pub fn members(
    tx: &impl Reader,
    group: GroupId,
    pagination: Pagination,
    search: Option<&str>,
) -> CoreResult<Page<GroupMemberView>> {
    require_group(tx, group)?;
    let mut all = member_views(tx, group, MemberStatus::Member, search)?;
    all.sort_by_key(|m| !m.is_admin);
    Ok(pagination.apply(all))
}

pub fn users_with_status(
    tx: &impl Reader,
    group: GroupId,
    admin: UserId,
    status: MemberStatus,
) -> CoreResult<Vec<GroupMemberView>> {
    require_group_admin(tx, group, admin)?;
    member_views(tx, group, status, None)
}

/// Connections of `user` that could be invited to the group.
pub fn invitable_connections(
    tx: &impl Reader,
    group: GroupId,
    user: UserId,
    pagination: Pagination,
    search: Option<&str>,
) -> CoreResult<Page<UserSummary>> {
    require_group_member(tx, group, user)?;
    let related: BTreeSet<UserId> = tx
        .filter::<GroupMember>(|m| m.group_id == group)?
        .into_iter()
        .map(|m| m.user_id)
        .collect();
    let all = connections::connections(tx, user, Pagination { page: 0, limit: usize::MAX }, search)?;
    Ok(pagination.apply(
        all.items
            .into_iter()
            .filter(|u| !related.contains(&u.id))
            .collect(),
    ))
}

// =============================================================================
// ADMIN MODERATION
// =============================================================================

/// Admin group row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGroupRow {
    #[serde(flatten)]
    pub group: Group,
    pub member_count: usize,
    pub report_count: usize,
}

fn admin_rows(tx: &impl Reader, query: &QueryMap) -> CoreResult<Vec<AdminGroupRow>> {
    let search = search_text(query);
    let status = query.get("status").map(String::as_str).unwrap_or_default();
    let members = tx.all::<GroupMember>()?;
    let reports = tx.all::<GroupReport>()?;
    let mut rows: Vec<AdminGroupRow> = tx
        .filter::<Group>(|g| {
            let status_ok = match status {
                "suspended" => g.suspended && !g.deleted,
                "deleted" => g.deleted,
                "active" => !g.suspended && !g.deleted,
                _ => true,
            };
            status_ok && matches_search(search.as_deref(), &[&g.name])
        })?
        .into_iter()
        .map(|group| AdminGroupRow {
            member_count: members
                .iter()
                .filter(|m| m.group_id == group.id && m.status == MemberStatus::Member)
                .count(),
            report_count: reports.iter().filter(|r| r.group_id == group.id).count(),
            group,
        })
        .collect();
    rows.reverse();
    Ok(rows)
}

/// Every group with member and report counts. `status` may be
/// `active|suspended|deleted`.
pub fn admin_groups(tx: &impl Reader, query: &QueryMap) -> CoreResult<Page<AdminGroupRow>> {
    Ok(Pagination::parse(query)?.apply(admin_rows(tx, query)?))
}

pub fn reported_groups(tx: &impl Reader, pagination: Pagination) -> CoreResult<Page<AdminGroupRow>> {
    let mut rows: Vec<_> = admin_rows(tx, &QueryMap::new())?
        .into_iter()
        .filter(|r| r.report_count > 0)
        .collect();
    rows.sort_by(|a, b| b.report_count.cmp(&a.report_count).then(a.group.id.cmp(&b.group.id)));
    Ok(pagination.apply(rows))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCounts {
    pub total: usize,
    pub active: usize,
    pub suspended: usize,
    pub deleted: usize,
}

pub fn group_counts(tx: &impl Reader) -> CoreResult<GroupCounts> {
    let all = tx.all::<Group>()?;
    let deleted = all.iter().filter(|g| g.deleted).count();
    let suspended = all.iter().filter(|g| g.suspended && !g.deleted).count();
    Ok(GroupCounts {
        total: all.len(),
        active: all.len() - deleted - suspended,
        suspended,
        deleted,
    })
}

pub fn toggle_suspend(tx: &WriteTx, ids: &[GroupId]) -> CoreResult<()> {
    for id in ids {
        let mut group: Group = tx.require(id.0)?;
        group.suspended = !group.suspended;
        tx.put(&group)?;
    }
    Ok(())
}

pub fn toggle_delete(tx: &WriteTx, ids: &[GroupId]) -> CoreResult<()> {
    for id in ids {
        let mut group: Group = tx.require(id.0)?;
        group.deleted = !group.deleted;
        tx.put(&group)?;
    }
    Ok(())
}

/// Users who reported a group.
pub fn reported_by(tx: &impl Reader, group: GroupId) -> CoreResult<Vec<(GroupReport, UserSummary)>> {
    let mut out = Vec::new();
    for report in tx.filter::<GroupReport>(|r| r.group_id == group)? {
        if let Some(user) = tx.get::<User>(report.reported_by.0)? {
            out.push((report, UserSummary::from(&user)));
        }
    }
    Ok(out)
}

/// CSV export of the admin group list.
pub fn export_csv(tx: &impl Reader, query: &QueryMap) -> CoreResult<String> {
    let mut csv = CsvWriter::with_header(&[
        "id", "name", "privacy", "members", "reports", "suspended", "deleted", "created_at",
    ]);
    for row in admin_rows(tx, query)? {
        csv.row([
            row.group.id.to_string(),
            row.group.name.clone(),
            match row.group.privacy {
                Privacy::Public => "public".to_string(),
                Privacy::Private => "private".to_string(),
            },
            row.member_count.to_string(),
            row.report_count.to_string(),
            row.group.suspended.to_string(),
            row.group.deleted.to_string(),
            row.group.created_at.to_rfc3339(),
        ]);
    }
    Ok(csv.finish())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::Store;
    use crate::users::tests::{new_user, now};

    pub(crate) fn new_group(store: &Store, creator: UserId, privacy: Privacy) -> Group {
        store
            .write(|tx| {
                create_group(
                    tx,
                    creator,
                    GroupInput {
                        name: "Makers".into(),
                        privacy,
                        ..GroupInput::default()
                    },
                    now(),
                )
            })
            .unwrap()
    }

    #[test]
    fn public_join_is_immediate() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let group = new_group(&store, a.id, Privacy::Public);
        let joined = store.write(|tx| join_request(tx, group.id, b.id, now())).unwrap();
        assert_eq!(joined.value.status, MemberStatus::Member);
        assert!(joined.notifications.is_empty());
        let again = store.write(|tx| join_request(tx, group.id, b.id, now()));
        assert!(matches!(again, Err(CoreError::Conflict(_))));
    }

    #[test]
    fn private_join_needs_acceptance() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let group = new_group(&store, a.id, Privacy::Private);
        let req = store.write(|tx| join_request(tx, group.id, b.id, now())).unwrap();
        assert_eq!(req.value.status, MemberStatus::Requested);
        assert_eq!(req.notifications[0].user_id, a.id);

        let pending = store
            .read(|tx| users_with_status(tx, group.id, a.id, MemberStatus::Requested))
            .unwrap();
        assert_eq!(pending.len(), 1);

        let accepted = store
            .write(|tx| accept_request(tx, group.id, a.id, b.id, now()))
            .unwrap();
        assert_eq!(accepted.value.status, MemberStatus::Member);
        assert_eq!(accepted.notifications[0].user_id, b.id);
    }

    #[test]
    fn blocked_users_cannot_join() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let group = new_group(&store, a.id, Privacy::Public);
        assert!(store.write(|tx| toggle_block(tx, group.id, a.id, b.id, now())).unwrap());
        let err = store.write(|tx| join_request(tx, group.id, b.id, now())).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        assert!(!store.write(|tx| toggle_block(tx, group.id, a.id, b.id, now())).unwrap());
        store.write(|tx| join_request(tx, group.id, b.id, now())).unwrap();
    }

    #[test]
    fn sole_admin_cannot_leave_with_members() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let group = new_group(&store, a.id, Privacy::Public);
        store.write(|tx| join_request(tx, group.id, b.id, now())).unwrap();
        let err = store.write(|tx| leave(tx, group.id, a.id)).unwrap_err();
        assert_eq!(err.to_string(), "assign another admin before leaving");

        store.write(|tx| toggle_admin(tx, group.id, a.id, b.id)).unwrap();
        store.write(|tx| leave(tx, group.id, a.id)).unwrap();
        let d = store.read(|tx| detail(tx, group.id, b.id)).unwrap();
        assert!(d.is_admin);
        assert_eq!(d.member_count, 1);
    }

    #[test]
    fn explore_hides_joined_and_private() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        new_group(&store, a.id, Privacy::Public);
        new_group(&store, a.id, Privacy::Private);
        let for_b = store
            .read(|tx| explore(tx, b.id, Pagination::default(), None))
            .unwrap();
        assert_eq!(for_b.total, 1);
        let for_a = store
            .read(|tx| explore(tx, a.id, Pagination::default(), None))
            .unwrap();
        assert_eq!(for_a.total, 0);
    }

    #[test]
    fn invites_turn_into_membership() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let group = new_group(&store, a.id, Privacy::Private);
        let sent = store
            .write(|tx| invite_users(tx, group.id, a.id, &[b.id, b.id, a.id], now()))
            .unwrap();
        assert_eq!(sent.value, 1);
        assert_eq!(sent.notifications.len(), 1);
        let joined = store.write(|tx| join_request(tx, group.id, b.id, now())).unwrap();
        assert_eq!(joined.value.status, MemberStatus::Member);
    }

    #[test]
    fn moderation_and_export() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let group = new_group(&store, a.id, Privacy::Public);
        let spam = store
            .write(|tx| catalog::create_report_type(tx, "Spam", ReportTarget::Group))
            .unwrap();
        store
            .write(|tx| report_group(tx, group.id, a.id, spam.id, None, now()))
            .unwrap();
        let reported = store
            .read(|tx| reported_groups(tx, Pagination::default()))
            .unwrap();
        assert_eq!(reported.items[0].report_count, 1);

        store.write(|tx| toggle_suspend(tx, &[group.id])).unwrap();
        let counts = store.read(|tx| group_counts(tx)).unwrap();
        assert_eq!((counts.suspended, counts.active), (1, 0));
        assert!(matches!(
            store.read(|tx| require_group(tx, group.id)),
            Err(CoreError::Forbidden(_))
        ));

        let csv = store.read(|tx| export_csv(tx, &QueryMap::new())).unwrap();
        assert!(csv.starts_with("id,name,privacy"));
        assert!(csv.contains("Makers,public,1,1,true,false"));
    }
}
