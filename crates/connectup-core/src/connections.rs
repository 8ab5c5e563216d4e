//! # Connections
//!
//! Connection requests between users, the accepted-connection listing and
//! recommendations built on [`ConnectionGraph`].

use crate::filters::{Pagination, matches_search};
use crate::graph::{ConnectionGraph, Recommendation};
use crate::notifications::{self, Draft, NotificationKind, Notified};
use crate::response::Page;
use crate::storage::{Record, RecordTable};
use crate::users::{self, User, UserSummary};
use crate::{CoreError, CoreResult, Reader, RequestId, Role, Timestamp, UserId, WriteTx};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub id: RequestId,
    pub from: UserId,
    pub to: UserId,
    pub status: RequestStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Record for ConnectionRequest {
    const TABLE: RecordTable = TableDefinition::new("connection_requests");
    const KIND: &'static str = "connection request";
    fn key(&self) -> u64 {
        self.id.0
    }
}

impl ConnectionRequest {
    fn involves(&self, a: UserId, b: UserId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// The other side of the request as seen by `user`.
    #[must_use]
    pub fn other(&self, user: UserId) -> UserId {
        if self.from == user { self.to } else { self.from }
    }
}

fn between(tx: &impl Reader, a: UserId, b: UserId) -> CoreResult<Vec<ConnectionRequest>> {
    tx.filter::<ConnectionRequest>(|r| r.involves(a, b) && r.status != RequestStatus::Declined)
}

pub fn are_connected(tx: &impl Reader, a: UserId, b: UserId) -> CoreResult<bool> {
    Ok(between(tx, a, b)?
        .iter()
        .any(|r| r.status == RequestStatus::Accepted))
}

/// Ask `to` to connect. A pending request in the other direction is
/// accepted instead.
pub fn send_request(
    tx: &WriteTx,
    from: UserId,
    to: UserId,
    now: Timestamp,
) -> CoreResult<Notified<ConnectionRequest>> {
    if from == to {
        return Err(CoreError::invalid("cannot connect with yourself"));
    }
    let sender = users::require_live(tx, from)?;
    users::require_live(tx, to)?;
    if users::is_blocked_between(tx, from, to)? {
        return Err(CoreError::forbidden("user is blocked"));
    }
    let existing = between(tx, from, to)?;
    if existing.iter().any(|r| r.status == RequestStatus::Accepted) {
        return Err(CoreError::conflict("already connected"));
    }
    if let Some(reverse) = existing.iter().find(|r| r.from == to) {
        return respond(tx, from, reverse.id, RequestStatus::Accepted, now);
    }
    if !existing.is_empty() {
        return Err(CoreError::conflict("request already sent"));
    }

    let request = ConnectionRequest {
        id: RequestId(tx.next_id::<ConnectionRequest>()?),
        from,
        to,
        status: RequestStatus::Pending,
        created_at: now,
        updated_at: now,
    };
    tx.put(&request)?;
    let draft = Draft::new(
        NotificationKind::ConnectionRequest,
        "New connection request",
        format!("{} wants to connect with you", sender.name),
    )
    .data("requestId", request.id)
    .data("userId", from);
    let notification = notifications::notify(tx, Some(from), to, draft, now)?;
    Ok(Notified::new(request).with(notification))
}

/// Accept or decline a pending request addressed to `user`.
pub fn respond(
    tx: &WriteTx,
    user: UserId,
    request_id: RequestId,
    status: RequestStatus,
    now: Timestamp,
) -> CoreResult<Notified<ConnectionRequest>> {
    let mut request: ConnectionRequest = tx.require(request_id.0)?;
    if request.to != user {
        return Err(CoreError::forbidden("only the recipient can answer a request"));
    }
    if request.status != RequestStatus::Pending {
        return Err(CoreError::conflict("request already answered"));
    }
    if status == RequestStatus::Pending {
        return Err(CoreError::invalid("invalid status"));
    }
    request.status = status;
    request.updated_at = now;
    tx.put(&request)?;

    let mut out = Notified::new(request.clone());
    if status == RequestStatus::Accepted {
        let accepter = users::require_live(tx, user)?;
        let draft = Draft::new(
            NotificationKind::RequestAccepted,
            "Connection accepted",
            format!("{} accepted your connection request", accepter.name),
        )
        .data("userId", user);
        out = out.with(notifications::notify(tx, Some(user), request.from, draft, now)?);
    }
    Ok(out)
}

/// Pending requests addressed to `user`, newest first.
pub fn inbound(tx: &impl Reader, user: UserId) -> CoreResult<Vec<ConnectionRequest>> {
    let mut out = tx.filter::<ConnectionRequest>(|r| {
        r.to == user && r.status == RequestStatus::Pending
    })?;
    out.reverse();
    Ok(out)
}

/// Pending requests sent by `user`, newest first.
pub fn outbound(tx: &impl Reader, user: UserId) -> CoreResult<Vec<ConnectionRequest>> {
    let mut out = tx.filter::<ConnectionRequest>(|r| {
        r.from == user && r.status == RequestStatus::Pending
    })?;
    out.reverse();
    Ok(out)
}

/// Request plus the profile on the other side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    #[serde(flatten)]
    pub request: ConnectionRequest,
    pub user: UserSummary,
}

pub fn with_profiles(
    tx: &impl Reader,
    viewer: UserId,
    requests: Vec<ConnectionRequest>,
) -> CoreResult<Vec<RequestView>> {
    let mut out = Vec::with_capacity(requests.len());
    for request in requests {
        if let Some(other) = tx.get::<User>(request.other(viewer).0)? {
            if other.is_deleted() {
                continue;
            }
            out.push(RequestView {
                user: UserSummary::from(&other),
                request,
            });
        }
    }
    Ok(out)
}

/// Drop an accepted connection.
pub fn remove_connection(tx: &WriteTx, user: UserId, other: UserId) -> CoreResult<()> {
    let accepted: Vec<_> = between(tx, user, other)?
        .into_iter()
        .filter(|r| r.status == RequestStatus::Accepted)
        .collect();
    if accepted.is_empty() {
        return Err(CoreError::NotFound("connection"));
    }
    for request in accepted {
        tx.remove::<ConnectionRequest>(request.id.0)?;
    }
    Ok(())
}

/// Remove every pending or accepted request between two users.
pub fn sever(tx: &WriteTx, a: UserId, b: UserId) -> CoreResult<()> {
    for request in between(tx, a, b)? {
        tx.remove::<ConnectionRequest>(request.id.0)?;
    }
    Ok(())
}

/// Ids of `user`'s connections, ascending.
pub fn connection_ids(tx: &impl Reader, user: UserId) -> CoreResult<Vec<UserId>> {
    let ids: BTreeSet<UserId> = tx
        .filter::<ConnectionRequest>(|r| {
            r.status == RequestStatus::Accepted && (r.from == user || r.to == user)
        })?
        .iter()
        .map(|r| r.other(user))
        .collect();
    Ok(ids.into_iter().collect())
}

/// Every live connection of `user` as a summary, filtered by name.
pub fn connection_list(
    tx: &impl Reader,
    user: UserId,
    search: Option<&str>,
) -> CoreResult<Vec<UserSummary>> {
    let mut out = Vec::new();
    for id in connection_ids(tx, user)? {
        if let Some(other) = tx.get::<User>(id.0)? {
            if !other.is_deleted() && matches_search(search, &[&other.name]) {
                out.push(UserSummary::from(&other));
            }
        }
    }
    Ok(out)
}

/// One page of [`connection_list`].
pub fn connections(
    tx: &impl Reader,
    user: UserId,
    pagination: Pagination,
    search: Option<&str>,
) -> CoreResult<Page<UserSummary>> {
    Ok(pagination.apply(connection_list(tx, user, search)?))
}

/// `{ blockedContacts, connections }` counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsCount {
    pub blocked_contacts: usize,
    pub connections: usize,
}

pub fn counts(tx: &impl Reader, user: UserId) -> CoreResult<ConnectionsCount> {
    let me = users::require_live(tx, user)?;
    Ok(ConnectionsCount {
        blocked_contacts: me.blocked.len(),
        connections: connection_ids(tx, user)?.len(),
    })
}

/// Graph of every accepted connection between live users.
pub fn load_graph(tx: &impl Reader) -> CoreResult<ConnectionGraph> {
    let live: BTreeSet<UserId> = tx
        .filter::<User>(|u| !u.is_deleted())?
        .iter()
        .map(|u| u.id)
        .collect();
    Ok(ConnectionGraph::from_edges(
        tx.filter::<ConnectionRequest>(|r| r.status == RequestStatus::Accepted)?
            .into_iter()
            .filter(|r| live.contains(&r.from) && live.contains(&r.to))
            .map(|r| (r.from, r.to)),
    ))
}

pub fn mutual_connections(
    tx: &impl Reader,
    a: UserId,
    b: UserId,
) -> CoreResult<Vec<UserSummary>> {
    let graph = load_graph(tx)?;
    let mut out = Vec::new();
    for id in graph.mutual(a, b) {
        if let Some(user) = tx.get::<User>(id.0)? {
            out.push(UserSummary::from(&user));
        }
    }
    Ok(out)
}

// =============================================================================
// RECOMMENDATIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedUser {
    #[serde(flatten)]
    pub rank: Recommendation,
    pub user: UserSummary,
}

fn ranked(tx: &impl Reader, user: UserId) -> CoreResult<Vec<RecommendedUser>> {
    let me = users::require_live(tx, user)?;
    let everyone = tx.filter::<User>(|u| u.is_active() && u.role == Role::User)?;

    let mut exclude: BTreeSet<UserId> = me.blocked.clone();
    exclude.extend(me.declined_recommendations.iter().copied());
    for other in &everyone {
        if other.blocked.contains(&user) {
            exclude.insert(other.id);
        }
    }
    for request in tx.filter::<ConnectionRequest>(|r| {
        r.status == RequestStatus::Pending && (r.from == user || r.to == user)
    })? {
        exclude.insert(request.other(user));
    }

    let profiles: BTreeMap<UserId, &User> = everyone.iter().map(|u| (u.id, u)).collect();
    let industries: BTreeMap<UserId, Vec<_>> = everyone
        .iter()
        .map(|u| (u.id, u.industry_ids.clone()))
        .chain(std::iter::once((me.id, me.industry_ids.clone())))
        .collect();

    let graph = load_graph(tx)?;
    Ok(graph
        .recommend(user, &industries, &exclude)
        .into_iter()
        .filter_map(|rank| {
            profiles.get(&rank.user_id).map(|u| RecommendedUser {
                rank,
                user: UserSummary::from(*u),
            })
        })
        .collect())
}

pub fn recommendations(
    tx: &impl Reader,
    user: UserId,
    pagination: Pagination,
) -> CoreResult<Page<RecommendedUser>> {
    Ok(pagination.apply(ranked(tx, user)?))
}

/// The full ranked list, unpaginated.
pub fn all_recommendations(tx: &impl Reader, user: UserId) -> CoreResult<Vec<RecommendedUser>> {
    ranked(tx, user)
}

pub fn total_recommendations(tx: &impl Reader, user: UserId) -> CoreResult<usize> {
    Ok(ranked(tx, user)?.len())
}

/// Hide `target` from future recommendations.
pub fn decline_recommendation(tx: &WriteTx, user: UserId, target: UserId) -> CoreResult<()> {
    if user == target {
        return Err(CoreError::invalid("cannot decline yourself"));
    }
    users::require_live(tx, target)?;
    let mut me = users::require_live(tx, user)?;
    me.declined_recommendations.insert(target);
    tx.put(&me)
}

/// Undo [`decline_recommendation`].
pub fn undo_recommendation(tx: &WriteTx, user: UserId, target: UserId) -> CoreResult<()> {
    let mut me = users::require_live(tx, user)?;
    if !me.declined_recommendations.remove(&target) {
        return Err(CoreError::NotFound("declined recommendation"));
    }
    tx.put(&me)
}
