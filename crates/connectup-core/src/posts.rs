//! # Posts
//!
//! Posts inside community groups, threaded comments, reactions and
//! reports. Every user-facing operation requires full group membership.

use crate::catalog::{self, ReportTarget};
use crate::filters::Pagination;
use crate::groups::{self, GroupMember, GroupSummary, MemberStatus};
use crate::notifications::{self, Draft, NotificationKind, Notified};
use crate::response::Page;
use crate::storage::{Record, RecordTable};
use crate::uploads::Upload;
use crate::users::{User, UserSummary};
use crate::{
    CommentId, CoreError, CoreResult, GroupId, PostId, Reader, ReportTypeId, Timestamp, UploadId,
    UserId, WriteTx,
};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub group_id: GroupId,
    pub author: UserId,
    pub body: Option<String>,
    pub media_ids: Vec<UploadId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted: bool,
}

impl Record for Post {
    const TABLE: RecordTable = TableDefinition::new("posts");
    const KIND: &'static str = "post";
    fn key(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    /// Comment this one replies to.
    pub parent: Option<CommentId>,
    pub author: UserId,
    pub body: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted: bool,
}

impl Record for Comment {
    const TABLE: RecordTable = TableDefinition::new("comments");
    const KIND: &'static str = "comment";
    fn key(&self) -> u64 {
        self.id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostLike {
    pub id: u64,
    pub post_id: PostId,
    pub user_id: UserId,
    pub created_at: Timestamp,
}

impl Record for PostLike {
    const TABLE: RecordTable = TableDefinition::new("post_likes");
    const KIND: &'static str = "post like";
    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Like,
    Dislike,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentReaction {
    pub id: u64,
    pub comment_id: CommentId,
    pub user_id: UserId,
    pub reaction: Reaction,
}

impl Record for CommentReaction {
    const TABLE: RecordTable = TableDefinition::new("comment_reactions");
    const KIND: &'static str = "comment reaction";
    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReport {
    pub id: u64,
    pub post_id: PostId,
    pub comment_id: Option<CommentId>,
    pub reported_by: UserId,
    pub report_type_id: ReportTypeId,
    pub reason: Option<String>,
    pub created_at: Timestamp,
}

impl Record for PostReport {
    const TABLE: RecordTable = TableDefinition::new("post_reports");
    const KIND: &'static str = "post report";
    fn key(&self) -> u64 {
        self.id
    }
}

// =============================================================================
// LOOKUPS
// =============================================================================

fn live_post(tx: &impl Reader, group: GroupId, post: PostId) -> CoreResult<Post> {
    let record: Post = tx.require(post.0)?;
    if record.deleted || record.group_id != group {
        return Err(CoreError::NotFound(Post::KIND));
    }
    Ok(record)
}

fn live_comment(tx: &impl Reader, post: PostId, comment: CommentId) -> CoreResult<Comment> {
    let record: Comment = tx.require(comment.0)?;
    if record.deleted || record.post_id != post {
        return Err(CoreError::NotFound(Comment::KIND));
    }
    Ok(record)
}

/// Membership check plus post lookup.
fn guarded(
    tx: &impl Reader,
    group: GroupId,
    post: PostId,
    user: UserId,
) -> CoreResult<(GroupMember, Post)> {
    let member = groups::require_group_member(tx, group, user)?;
    Ok((member, live_post(tx, group, post)?))
}

fn summary(tx: &impl Reader, user: UserId) -> CoreResult<Option<UserSummary>> {
    Ok(tx.get::<User>(user.0)?.map(|u| UserSummary::from(&u)))
}

// =============================================================================
// POSTS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostInput {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub media_ids: Vec<UploadId>,
}

fn check_post_input(tx: &impl Reader, input: &PostInput) -> CoreResult<Option<String>> {
    let body = input
        .body
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string);
    if body.is_none() && input.media_ids.is_empty() {
        return Err(CoreError::invalid("post cannot be empty"));
    }
    for id in &input.media_ids {
        let _: Upload = tx.require(id.0)?;
    }
    Ok(body)
}

pub fn create_post(
    tx: &WriteTx,
    group: GroupId,
    author: UserId,
    input: PostInput,
    now: Timestamp,
) -> CoreResult<Post> {
    groups::require_group_member(tx, group, author)?;
    let body = check_post_input(tx, &input)?;
    let post = Post {
        id: PostId(tx.next_id::<Post>()?),
        group_id: group,
        author,
        body,
        media_ids: input.media_ids,
        created_at: now,
        updated_at: now,
        deleted: false,
    };
    tx.put(&post)?;
    Ok(post)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author_profile: Option<UserSummary>,
    pub like_count: usize,
    pub comment_count: usize,
    pub liked_by_me: bool,
}

fn view_posts(tx: &impl Reader, posts: Vec<Post>, viewer: UserId) -> CoreResult<Vec<PostView>> {
    let likes = tx.all::<PostLike>()?;
    let comments = tx.filter::<Comment>(|c| !c.deleted)?;
    let mut out = Vec::with_capacity(posts.len());
    for post in posts {
        let post_likes: Vec<&PostLike> = likes.iter().filter(|l| l.post_id == post.id).collect();
        out.push(PostView {
            author_profile: summary(tx, post.author)?,
            like_count: post_likes.len(),
            comment_count: comments.iter().filter(|c| c.post_id == post.id).count(),
            liked_by_me: post_likes.iter().any(|l| l.user_id == viewer),
            post,
        });
    }
    Ok(out)
}

/// Posts of a group, newest first.
pub fn posts(
    tx: &impl Reader,
    group: GroupId,
    viewer: UserId,
    pagination: Pagination,
) -> CoreResult<Page<PostView>> {
    groups::require_group_member(tx, group, viewer)?;
    group_posts(tx, group, viewer, pagination)
}

/// Posts of a group without the membership check (platform admins).
pub fn group_posts(
    tx: &impl Reader,
    group: GroupId,
    viewer: UserId,
    pagination: Pagination,
) -> CoreResult<Page<PostView>> {
    let mut all = tx.filter::<Post>(|p| p.group_id == group && !p.deleted)?;
    all.reverse();
    let page = pagination.apply(all);
    let items = view_posts(tx, page.items, viewer)?;
    Ok(Page {
        items,
        total: page.total,
        page: page.page,
        limit: page.limit,
    })
}

pub fn post_detail(tx: &impl Reader, group: GroupId, post: PostId, viewer: UserId) -> CoreResult<PostView> {
    let (_, record) = guarded(tx, group, post, viewer)?;
    view_posts(tx, vec![record], viewer)?
        .pop()
        .ok_or(CoreError::NotFound(Post::KIND))
}

pub fn update_post(
    tx: &WriteTx,
    group: GroupId,
    post: PostId,
    user: UserId,
    input: PostInput,
    now: Timestamp,
) -> CoreResult<Post> {
    let (_, mut record) = guarded(tx, group, post, user)?;
    if record.author != user {
        return Err(CoreError::forbidden("only the author can edit this post"));
    }
    record.body = check_post_input(tx, &input)?;
    record.media_ids = input.media_ids;
    record.updated_at = now;
    tx.put(&record)?;
    Ok(record)
}

/// Delete by the author or a group admin.
pub fn delete_post(tx: &WriteTx, group: GroupId, post: PostId, user: UserId) -> CoreResult<()> {
    let (member, record) = guarded(tx, group, post, user)?;
    if record.author != user && !member.is_admin {
        return Err(CoreError::forbidden("only the author or a group admin can delete this post"));
    }
    soft_delete_post(tx, record)
}

/// Delete without membership checks (platform admins).
pub fn delete_post_by_admin(tx: &WriteTx, group: GroupId, post: PostId) -> CoreResult<()> {
    let record = live_post(tx, group, post)?;
    soft_delete_post(tx, record)
}

fn soft_delete_post(tx: &WriteTx, mut record: Post) -> CoreResult<()> {
    record.deleted = true;
    tx.put(&record)
}

/// Like or unlike. Returns true if now liked.
pub fn toggle_like(
    tx: &WriteTx,
    group: GroupId,
    post: PostId,
    user: UserId,
    now: Timestamp,
) -> CoreResult<Notified<bool>> {
    let (_, record) = guarded(tx, group, post, user)?;
    if let Some(like) = tx.find::<PostLike>(|l| l.post_id == post && l.user_id == user)? {
        tx.remove::<PostLike>(like.id)?;
        return Ok(Notified::new(false));
    }
    tx.put(&PostLike {
        id: tx.next_id::<PostLike>()?,
        post_id: post,
        user_id: user,
        created_at: now,
    })?;
    let liker = tx.require::<User>(user.0)?;
    let draft = Draft::new(
        NotificationKind::PostLike,
        "New like",
        format!("{} liked your post", liker.name),
    )
    .data("groupId", group)
    .data("postId", post);
    let notification = notifications::notify(tx, Some(user), record.author, draft, now)?;
    Ok(Notified::new(true).with(notification))
}

pub fn likes(tx: &impl Reader, group: GroupId, post: PostId, viewer: UserId) -> CoreResult<Vec<UserSummary>> {
    guarded(tx, group, post, viewer)?;
    post_likers(tx, post)
}

pub fn post_likers(tx: &impl Reader, post: PostId) -> CoreResult<Vec<UserSummary>> {
    let mut out = Vec::new();
    for like in tx.filter::<PostLike>(|l| l.post_id == post)? {
        out.extend(summary(tx, like.user_id)?);
    }
    Ok(out)
}

/// Like summary of one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpvoteDetail {
    pub like_count: usize,
    pub liked_by_me: bool,
    pub liked_by: Vec<UserSummary>,
}

pub fn upvote_detail(
    tx: &impl Reader,
    group: GroupId,
    post: PostId,
    viewer: UserId,
) -> CoreResult<UpvoteDetail> {
    guarded(tx, group, post, viewer)?;
    let liked_by = post_likers(tx, post)?;
    Ok(UpvoteDetail {
        like_count: liked_by.len(),
        liked_by_me: liked_by.iter().any(|u| u.id == viewer),
        liked_by,
    })
}

/// Joined groups ordered by their newest live post. Groups without posts
/// come last, in id order.
pub fn feed_groups(tx: &impl Reader, user: UserId) -> CoreResult<Vec<GroupSummary>> {
    let mut joined = groups::joined_groups(tx, user)?;
    let ids: BTreeSet<GroupId> = joined.iter().map(|g| g.group.id).collect();
    let mut latest: BTreeMap<GroupId, Timestamp> = BTreeMap::new();
    for post in tx.filter::<Post>(|p| ids.contains(&p.group_id) && !p.deleted)? {
        let slot = latest.entry(post.group_id).or_insert(post.created_at);
        *slot = (*slot).max(post.created_at);
    }
    joined.sort_by(|a, b| latest.get(&b.group.id).cmp(&latest.get(&a.group.id)));
    Ok(joined)
}

/// Newest posts across the user's joined groups.
pub fn feeds(tx: &impl Reader, user: UserId, pagination: Pagination) -> CoreResult<Page<PostView>> {
    let joined: BTreeSet<GroupId> = tx
        .filter::<GroupMember>(|m| m.user_id == user && m.status == MemberStatus::Member)?
        .into_iter()
        .map(|m| m.group_id)
        .collect();
    let live: BTreeSet<GroupId> = tx
        .filter::<groups::Group>(|g| joined.contains(&g.id) && !g.deleted && !g.suspended)?
        .into_iter()
        .map(|g| g.id)
        .collect();
    let mut all = tx.filter::<Post>(|p| live.contains(&p.group_id) && !p.deleted)?;
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    let page = pagination.apply(all);
    let items = view_posts(tx, page.items, user)?;
    Ok(Page {
        items,
        total: page.total,
        page: page.page,
        limit: page.limit,
    })
}

/// Media attached to the group's live posts, newest first.
pub fn group_media(tx: &impl Reader, group: GroupId) -> CoreResult<Vec<Upload>> {
    let mut out = Vec::new();
    for post in tx.filter::<Post>(|p| p.group_id == group && !p.deleted)?.into_iter().rev() {
        for id in post.media_ids {
            out.extend(tx.get::<Upload>(id.0)?);
        }
    }
    Ok(out)
}

// =============================================================================
// COMMENTS
// =============================================================================

/// Comment on a post, or reply to a comment when `parent` is set.
pub fn comment(
    tx: &WriteTx,
    group: GroupId,
    post: PostId,
    user: UserId,
    body: &str,
    parent: Option<CommentId>,
    now: Timestamp,
) -> CoreResult<Notified<Comment>> {
    let (_, record) = guarded(tx, group, post, user)?;
    let body = body.trim();
    if body.is_empty() {
        return Err(CoreError::invalid("comment cannot be empty"));
    }
    let parent_comment = parent.map(|id| live_comment(tx, post, id)).transpose()?;
    let comment = Comment {
        id: CommentId(tx.next_id::<Comment>()?),
        post_id: post,
        parent,
        author: user,
        body: body.to_string(),
        created_at: now,
        updated_at: now,
        deleted: false,
    };
    tx.put(&comment)?;

    let author = tx.require::<User>(user.0)?;
    let (recipient, draft) = match parent_comment {
        Some(parent) => (
            parent.author,
            Draft::new(
                NotificationKind::CommentReply,
                "New reply",
                format!("{} replied to your comment", author.name),
            ),
        ),
        None => (
            record.author,
            Draft::new(
                NotificationKind::PostComment,
                "New comment",
                format!("{} commented on your post", author.name),
            ),
        ),
    };
    let draft = draft
        .data("groupId", group)
        .data("postId", post)
        .data("commentId", comment.id);
    let notification = notifications::notify(tx, Some(user), recipient, draft, now)?;
    Ok(Notified::new(comment).with(notification))
}

pub fn update_comment(
    tx: &WriteTx,
    group: GroupId,
    post: PostId,
    comment: CommentId,
    user: UserId,
    body: &str,
    now: Timestamp,
) -> CoreResult<Comment> {
    guarded(tx, group, post, user)?;
    let mut record = live_comment(tx, post, comment)?;
    if record.author != user {
        return Err(CoreError::forbidden("only the author can edit this comment"));
    }
    let body = body.trim();
    if body.is_empty() {
        return Err(CoreError::invalid("comment cannot be empty"));
    }
    record.body = body.to_string();
    record.updated_at = now;
    tx.put(&record)?;
    Ok(record)
}

/// Delete by the author or a group admin; replies go with their parent.
pub fn delete_comment(
    tx: &WriteTx,
    group: GroupId,
    post: PostId,
    comment: CommentId,
    user: UserId,
) -> CoreResult<()> {
    let (member, _) = guarded(tx, group, post, user)?;
    let record = live_comment(tx, post, comment)?;
    if record.author != user && !member.is_admin {
        return Err(CoreError::forbidden("only the author or a group admin can delete this comment"));
    }
    soft_delete_comment(tx, record)
}

/// Delete without membership checks (platform admins).
pub fn delete_comment_by_admin(
    tx: &WriteTx,
    group: GroupId,
    post: PostId,
    comment: CommentId,
) -> CoreResult<()> {
    live_post(tx, group, post)?;
    let record = live_comment(tx, post, comment)?;
    soft_delete_comment(tx, record)
}

fn soft_delete_comment(tx: &WriteTx, mut record: Comment) -> CoreResult<()> {
    let id = record.id;
    record.deleted = true;
    tx.put(&record)?;
    for mut reply in tx.filter::<Comment>(|c| c.parent == Some(id) && !c.deleted)? {
        reply.deleted = true;
        tx.put(&reply)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_profile: Option<UserSummary>,
    pub likes: usize,
    pub dislikes: usize,
    pub my_reaction: Option<Reaction>,
    pub reply_count: usize,
}

fn view_comments(tx: &impl Reader, comments: Vec<Comment>, viewer: UserId) -> CoreResult<Vec<CommentView>> {
    let reactions = tx.all::<CommentReaction>()?;
    let all = tx.filter::<Comment>(|c| !c.deleted)?;
    let mut out = Vec::with_capacity(comments.len());
    for comment in comments {
        let mine: Vec<&CommentReaction> = reactions.iter().filter(|r| r.comment_id == comment.id).collect();
        out.push(CommentView {
            author_profile: summary(tx, comment.author)?,
            likes: mine.iter().filter(|r| r.reaction == Reaction::Like).count(),
            dislikes: mine.iter().filter(|r| r.reaction == Reaction::Dislike).count(),
            my_reaction: mine.iter().find(|r| r.user_id == viewer).map(|r| r.reaction),
            reply_count: all.iter().filter(|c| c.parent == Some(comment.id)).count(),
            comment,
        });
    }
    Ok(out)
}

/// Top-level comments, oldest first.
pub fn comments(
    tx: &impl Reader,
    group: GroupId,
    post: PostId,
    viewer: UserId,
    pagination: Pagination,
) -> CoreResult<Page<CommentView>> {
    guarded(tx, group, post, viewer)?;
    post_comments(tx, post, viewer, pagination)
}

/// Top-level comments without the membership check (platform admins).
pub fn post_comments(
    tx: &impl Reader,
    post: PostId,
    viewer: UserId,
    pagination: Pagination,
) -> CoreResult<Page<CommentView>> {
    let all = tx.filter::<Comment>(|c| c.post_id == post && c.parent.is_none() && !c.deleted)?;
    let page = pagination.apply(all);
    let items = view_comments(tx, page.items, viewer)?;
    Ok(Page {
        items,
        total: page.total,
        page: page.page,
        limit: page.limit,
    })
}

/// Replies to one comment, oldest first.
pub fn replies(
    tx: &impl Reader,
    group: GroupId,
    post: PostId,
    comment: CommentId,
    viewer: UserId,
) -> CoreResult<Vec<CommentView>> {
    guarded(tx, group, post, viewer)?;
    live_comment(tx, post, comment)?;
    let all = tx.filter::<Comment>(|c| c.parent == Some(comment) && !c.deleted)?;
    view_comments(tx, all, viewer)
}

/// Toggle a like or dislike. The two are mutually exclusive. Returns the
/// viewer's reaction afterwards.
pub fn react(
    tx: &WriteTx,
    group: GroupId,
    post: PostId,
    comment: CommentId,
    user: UserId,
    reaction: Reaction,
) -> CoreResult<Option<Reaction>> {
    guarded(tx, group, post, user)?;
    live_comment(tx, post, comment)?;
    match tx.find::<CommentReaction>(|r| r.comment_id == comment && r.user_id == user)? {
        Some(existing) if existing.reaction == reaction => {
            tx.remove::<CommentReaction>(existing.id)?;
            Ok(None)
        }
        Some(mut existing) => {
            existing.reaction = reaction;
            tx.put(&existing)?;
            Ok(Some(reaction))
        }
        None => {
            tx.put(&CommentReaction {
                id: tx.next_id::<CommentReaction>()?,
                comment_id: comment,
                user_id: user,
                reaction,
            })?;
            Ok(Some(reaction))
        }
    }
}

// =============================================================================
// REPORTS
// =============================================================================

pub fn report(
    tx: &WriteTx,
    group: GroupId,
    post: PostId,
    comment: Option<CommentId>,
    user: UserId,
    report_type: ReportTypeId,
    reason: Option<String>,
    now: Timestamp,
) -> CoreResult<PostReport> {
    guarded(tx, group, post, user)?;
    let target = match comment {
        Some(id) => {
            live_comment(tx, post, id)?;
            ReportTarget::Comment
        }
        None => ReportTarget::Post,
    };
    catalog::require_report_type(tx, report_type, target)?;
    if tx
        .find::<PostReport>(|r| r.post_id == post && r.comment_id == comment && r.reported_by == user)?
        .is_some()
    {
        return Err(CoreError::conflict("already reported"));
    }
    let report = PostReport {
        id: tx.next_id::<PostReport>()?,
        post_id: post,
        comment_id: comment,
        reported_by: user,
        report_type_id: report_type,
        reason: reason.filter(|r| !r.trim().is_empty()),
        created_at: now,
    };
    tx.put(&report)?;
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedPost {
    #[serde(flatten)]
    pub post: Post,
    pub report_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub report_count: usize,
}

/// Reported live posts of a group, most reported first.
pub fn reported_posts(tx: &impl Reader, group: GroupId) -> CoreResult<Vec<ReportedPost>> {
    let reports = tx.filter::<PostReport>(|r| r.comment_id.is_none())?;
    let mut out: Vec<ReportedPost> = tx
        .filter::<Post>(|p| p.group_id == group && !p.deleted)?
        .into_iter()
        .map(|post| ReportedPost {
            report_count: reports.iter().filter(|r| r.post_id == post.id).count(),
            post,
        })
        .filter(|r| r.report_count > 0)
        .collect();
    out.sort_by(|a, b| b.report_count.cmp(&a.report_count).then(a.post.id.cmp(&b.post.id)));
    Ok(out)
}

/// Reported live comments in a group, most reported first.
pub fn reported_comments(tx: &impl Reader, group: GroupId) -> CoreResult<Vec<ReportedComment>> {
    let posts: BTreeSet<PostId> = tx
        .filter::<Post>(|p| p.group_id == group && !p.deleted)?
        .into_iter()
        .map(|p| p.id)
        .collect();
    let reports = tx.filter::<PostReport>(|r| r.comment_id.is_some())?;
    let mut out: Vec<ReportedComment> = tx
        .filter::<Comment>(|c| posts.contains(&c.post_id) && !c.deleted)?
        .into_iter()
        .map(|comment| ReportedComment {
            report_count: reports
                .iter()
                .filter(|r| r.comment_id == Some(comment.id))
                .count(),
            comment,
        })
        .filter(|r| r.report_count > 0)
        .collect();
    out.sort_by(|a, b| {
        b.report_count
            .cmp(&a.report_count)
            .then(a.comment.id.cmp(&b.comment.id))
    });
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::groups::tests::new_group;
    use crate::groups::{Privacy, join_request};
    use crate::users::tests::{new_user, now};

    struct Fixture {
        store: Store,
        owner: UserId,
        member: UserId,
        outsider: UserId,
        group: GroupId,
    }

    fn fixture() -> Fixture {
        let store = Store::in_memory().unwrap();
        let owner = new_user(&store, "Ann").id;
        let member = new_user(&store, "Ben").id;
        let outsider = new_user(&store, "Cid").id;
        let group = new_group(&store, owner, Privacy::Public).id;
        store
            .write(|tx| join_request(tx, group, member, now()))
            .unwrap();
        Fixture {
            store,
            owner,
            member,
            outsider,
            group,
        }
    }

    fn text(body: &str) -> PostInput {
        PostInput {
            body: Some(body.into()),
            media_ids: Vec::new(),
        }
    }

    #[test]
    fn only_members_post() {
        let f = fixture();
        let err = f
            .store
            .write(|tx| create_post(tx, f.group, f.outsider, text("hi"), now()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        let empty = f
            .store
            .write(|tx| create_post(tx, f.group, f.member, PostInput::default(), now()));
        assert!(matches!(empty, Err(CoreError::Invalid(_))));
    }

    #[test]
    fn likes_toggle_and_notify_author() {
        let f = fixture();
        let post = f
            .store
            .write(|tx| create_post(tx, f.group, f.member, text("hello"), now()))
            .unwrap();
        let liked = f
            .store
            .write(|tx| toggle_like(tx, f.group, post.id, f.owner, now()))
            .unwrap();
        assert!(liked.value);
        assert_eq!(liked.notifications[0].user_id, f.member);

        let view = f
            .store
            .read(|tx| post_detail(tx, f.group, post.id, f.owner))
            .unwrap();
        assert_eq!(view.like_count, 1);
        assert!(view.liked_by_me);

        let unliked = f
            .store
            .write(|tx| toggle_like(tx, f.group, post.id, f.owner, now()))
            .unwrap();
        assert!(!unliked.value);
    }

    #[test]
    fn edit_and_delete_permissions() {
        let f = fixture();
        let post = f
            .store
            .write(|tx| create_post(tx, f.group, f.member, text("hello"), now()))
            .unwrap();
        let err = f
            .store
            .write(|tx| update_post(tx, f.group, post.id, f.owner, text("x"), now()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        // Group admin may delete.
        f.store
            .write(|tx| delete_post(tx, f.group, post.id, f.owner))
            .unwrap();
        let page = f
            .store
            .read(|tx| posts(tx, f.group, f.member, Pagination::default()))
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn comments_replies_and_reactions() {
        let f = fixture();
        let post = f
            .store
            .write(|tx| create_post(tx, f.group, f.member, text("hello"), now()))
            .unwrap();
        let top = f
            .store
            .write(|tx| comment(tx, f.group, post.id, f.owner, "nice", None, now()))
            .unwrap();
        assert_eq!(top.notifications[0].kind, NotificationKind::PostComment);
        let reply = f
            .store
            .write(|tx| comment(tx, f.group, post.id, f.member, "thanks", Some(top.value.id), now()))
            .unwrap();
        assert_eq!(reply.notifications[0].kind, NotificationKind::CommentReply);
        assert_eq!(reply.notifications[0].user_id, f.owner);

        let list = f
            .store
            .read(|tx| comments(tx, f.group, post.id, f.member, Pagination::default()))
            .unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.items[0].reply_count, 1);

        let r = f
            .store
            .write(|tx| react(tx, f.group, post.id, top.value.id, f.member, Reaction::Like))
            .unwrap();
        assert_eq!(r, Some(Reaction::Like));
        let r = f
            .store
            .write(|tx| react(tx, f.group, post.id, top.value.id, f.member, Reaction::Dislike))
            .unwrap();
        assert_eq!(r, Some(Reaction::Dislike));
        let view = f
            .store
            .read(|tx| comments(tx, f.group, post.id, f.member, Pagination::default()))
            .unwrap();
        assert_eq!((view.items[0].likes, view.items[0].dislikes), (0, 1));
        let r = f
            .store
            .write(|tx| react(tx, f.group, post.id, top.value.id, f.member, Reaction::Dislike))
            .unwrap();
        assert_eq!(r, None);

        f.store
            .write(|tx| delete_comment(tx, f.group, post.id, top.value.id, f.owner))
            .unwrap();
        let gone = f
            .store
            .read(|tx| replies(tx, f.group, post.id, top.value.id, f.member));
        assert!(gone.is_err());
    }

    #[test]
    fn feeds_and_reports() {
        let f = fixture();
        let post = f
            .store
            .write(|tx| create_post(tx, f.group, f.owner, text("hello"), now()))
            .unwrap();
        let feed = f
            .store
            .read(|tx| feeds(tx, f.member, Pagination::default()))
            .unwrap();
        assert_eq!(feed.items[0].post.id, post.id);
        assert_eq!(
            f.store
                .read(|tx| feeds(tx, f.outsider, Pagination::default()))
                .unwrap()
                .total,
            0
        );

        let spam = f
            .store
            .write(|tx| catalog::create_report_type(tx, "Spam", ReportTarget::Post))
            .unwrap();
        f.store
            .write(|tx| report(tx, f.group, post.id, None, f.member, spam.id, None, now()))
            .unwrap();
        let dup = f
            .store
            .write(|tx| report(tx, f.group, post.id, None, f.member, spam.id, None, now()));
        assert!(matches!(dup, Err(CoreError::Conflict(_))));
        let reported = f.store.read(|tx| reported_posts(tx, f.group)).unwrap();
        assert_eq!(reported[0].report_count, 1);
    }

    #[test]
    fn upvote_detail_lists_likers() {
        let f = fixture();
        let post = f
            .store
            .write(|tx| create_post(tx, f.group, f.member, text("hello"), now()))
            .unwrap();
        f.store
            .write(|tx| toggle_like(tx, f.group, post.id, f.owner, now()))
            .unwrap();

        let detail = f
            .store
            .read(|tx| upvote_detail(tx, f.group, post.id, f.owner))
            .unwrap();
        assert_eq!(detail.like_count, 1);
        assert!(detail.liked_by_me);
        assert_eq!(detail.liked_by[0].id, f.owner);

        let seen_by_member = f
            .store
            .read(|tx| upvote_detail(tx, f.group, post.id, f.member))
            .unwrap();
        assert!(!seen_by_member.liked_by_me);
        assert!(
            f.store
                .read(|tx| upvote_detail(tx, f.group, post.id, f.outsider))
                .is_err()
        );
    }

    #[test]
    fn feed_groups_order_by_latest_post() {
        let f = fixture();
        let quiet = new_group(&f.store, f.owner, Privacy::Public).id;
        let busy = new_group(&f.store, f.owner, Privacy::Public).id;
        f.store
            .write(|tx| create_post(tx, f.group, f.owner, text("old"), now()))
            .unwrap();
        f.store
            .write(|tx| create_post(tx, busy, f.owner, text("new"), now() + chrono::Duration::minutes(5)))
            .unwrap();

        let order: Vec<GroupId> = f
            .store
            .read(|tx| feed_groups(tx, f.owner))
            .unwrap()
            .iter()
            .map(|g| g.group.id)
            .collect();
        assert_eq!(order, vec![busy, f.group, quiet]);
        assert!(f.store.read(|tx| feed_groups(tx, f.outsider)).unwrap().is_empty());
    }
}
