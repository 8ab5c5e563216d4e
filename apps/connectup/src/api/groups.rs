//! Community groups: `/api/groups` listings and `/api/group` operations,
//! including posts, comments and replies.
//!
//! Member and admin checks live in the core operations. The few core helpers
//! that skip them (platform moderation) are guarded here with
//! [`groups::require_group_admin`]. Deleting a post as a group admin goes
//! through the regular post route, which accepts the author or an admin.

use super::{ApiJson, ApiPath, ApiQuery, ApiResult, AppState, AuthUser, now};
use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post, put},
};
use connectup_core::catalog::{self, ReportTarget, ReportType};
use connectup_core::filters::{Pagination, QueryMap, search_text};
use connectup_core::groups::{
    self, Group, GroupInput, GroupMemberView, GroupReport, GroupSummary, MemberStatus,
};
use connectup_core::posts::{
    self, Comment, CommentView, Post, PostInput, PostReport, PostView, Reaction, ReportedComment,
    ReportedPost, UpvoteDetail,
};
use connectup_core::response::{Count, Message, Page};
use connectup_core::uploads::Upload;
use connectup_core::users::UserSummary;
use connectup_core::{CommentId, GroupId, PostId, Reader, ReportTypeId, UploadId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/groups", listing_routes())
        .nest("/group", group_routes())
}

fn listing_routes() -> Router<AppState> {
    Router::new()
        .route("/list", get(joined))
        .route("/all", get(all_groups))
        .route("/requested", get(requested))
        .route("/owned", get(owned))
        .route("/explore", get(explore))
        .route("/joined", get(joined))
}

fn group_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/feeds", get(feeds))
        .route("/feed_group", get(feed_groups))
        .route("/detail/{group_id}", get(detail))
        .route("/report_type", post(create_report_type))
        .route("/report", post(report_group))
        .route("/{group_id}", put(update).delete(remove))
        .route("/{group_id}/leave", post(leave))
        .route("/{group_id}/join_request", post(join_request))
        .route("/{group_id}/cancel_request", post(cancel_request))
        .route("/{group_id}/media_detail", get(media))
        .route("/{group_id}/members", get(members))
        .route("/{group_id}/connections", get(connections))
        .route("/{group_id}/invite_users", post(invite_users))
        .route("/{group_id}/image", put(update_image))
        .route("/{group_id}/toggle_admin", put(toggle_admin))
        .route("/{group_id}/remove", post(remove_user))
        .route("/{group_id}/decline_request", post(decline_request))
        .route("/{group_id}/accept_request", post(accept_request))
        .route("/{group_id}/block", post(toggle_block))
        .route("/{group_id}/reported_posts", get(reported_posts))
        .route("/{group_id}/reported_comments", get(reported_comments))
        .route("/{group_id}/blocked_users", get(blocked_users))
        .route("/{group_id}/invites/list", get(invited_users))
        .route("/{group_id}/requested/list", get(requested_users))
        .route("/{group_id}/comment/{comment_id}", delete(admin_delete_comment))
        .nest("/{group_id}/post", post_routes())
}

fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_post).get(list_posts))
        .route("/{post_id}", get(post_detail).put(update_post).delete(delete_post))
        .route("/{post_id}/report", post(report_post))
        .route("/{post_id}/like", post(like_post))
        .route("/{post_id}/likes", get(post_likes))
        .route("/{post_id}/upvote_detail", get(upvote_detail))
        .route("/{post_id}/comment", post(comment))
        .route("/{post_id}/comment/report", post(report_comment))
        .route("/{post_id}/comment/{comment_id}", put(update_comment).delete(delete_comment))
        .route("/{post_id}/comments", get(comments))
        .route("/{post_id}/comments/{comment_id}/like", post(like_comment))
        .route("/{post_id}/comments/{comment_id}/dislike", post(dislike_comment))
        .route("/{post_id}/comments/{comment_id}/reply", post(reply).get(replies))
        .route(
            "/{post_id}/comments/{comment_id}/reply/{reply_id}",
            put(update_reply).delete(delete_reply),
        )
        .route("/{post_id}/comments/{comment_id}/reply/{reply_id}/like", post(like_reply))
        .route(
            "/{post_id}/comments/{comment_id}/reply/{reply_id}/dislike",
            post(dislike_reply),
        )
}

fn page_and_search(query: &QueryMap) -> ApiResult<(Pagination, Option<String>)> {
    Ok((Pagination::parse(query)?, search_text(query)))
}

// =============================================================================
// LISTINGS
// =============================================================================

async fn joined(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<GroupSummary>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| groups::joined(tx, ctx.id, pagination))?))
}

async fn owned(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<GroupSummary>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| groups::owned(tx, ctx.id, pagination))?))
}

async fn requested(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<GroupSummary>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| groups::requested(tx, ctx.id, pagination))?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllGroups {
    pub joined: Page<GroupSummary>,
    pub owned: Page<GroupSummary>,
    pub requested: Page<GroupSummary>,
}

async fn all_groups(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<AllGroups>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| {
        Ok(AllGroups {
            joined: groups::joined(tx, ctx.id, pagination)?,
            owned: groups::owned(tx, ctx.id, pagination)?,
            requested: groups::requested(tx, ctx.id, pagination)?,
        })
    })?))
}

async fn explore(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<GroupSummary>>> {
    let (pagination, search) = page_and_search(&query)?;
    Ok(Json(state.read(|tx| {
        groups::explore(tx, ctx.id, pagination, search.as_deref())
    })?))
}

async fn feeds(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<PostView>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| posts::feeds(tx, ctx.id, pagination))?))
}

async fn feed_groups(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Vec<GroupSummary>>> {
    Ok(Json(state.read(|tx| posts::feed_groups(tx, ctx.id))?))
}

async fn detail(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<GroupSummary>> {
    Ok(Json(state.read(|tx| groups::detail(tx, group, ctx.id))?))
}

// =============================================================================
// LIFECYCLE AND MEMBERSHIP
// =============================================================================

async fn create(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<GroupInput>,
) -> ApiResult<Json<Group>> {
    Ok(Json(state.write(|tx| groups::create_group(tx, ctx.id, body, now()))?))
}

async fn update(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiJson(body): ApiJson<GroupInput>,
) -> ApiResult<Json<Group>> {
    Ok(Json(state.write(|tx| groups::update_group(tx, group, ctx.id, body))?))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| groups::delete_group(tx, group, ctx.id))?;
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBody {
    pub image_id: UploadId,
}

async fn update_image(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiJson(body): ApiJson<ImageBody>,
) -> ApiResult<Json<Group>> {
    Ok(Json(state.write(|tx| groups::update_image(tx, group, ctx.id, body.image_id))?))
}

async fn leave(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| groups::leave(tx, group, ctx.id))?;
    Ok(Json(Message::success()))
}

async fn join_request(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Value>> {
    let joined = state.write(|tx| groups::join_request(tx, group, ctx.id, now()))?;
    state.deliver(joined.notifications);
    Ok(Json(json!({ "status": joined.value.status })))
}

async fn cancel_request(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| groups::cancel_request(tx, group, ctx.id))?;
    Ok(Json(Message::success()))
}

async fn media(
    State(state): State<AppState>,
    AuthUser(_ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<Upload>>> {
    Ok(Json(state.read(|tx| {
        groups::require_group(tx, group)?;
        posts::group_media(tx, group)
    })?))
}

async fn members(
    State(state): State<AppState>,
    AuthUser(_ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<GroupMemberView>>> {
    let (pagination, search) = page_and_search(&query)?;
    Ok(Json(state.read(|tx| {
        groups::members(tx, group, pagination, search.as_deref())
    })?))
}

async fn connections(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<UserSummary>>> {
    let (pagination, search) = page_and_search(&query)?;
    Ok(Json(state.read(|tx| {
        groups::invitable_connections(tx, group, ctx.id, pagination, search.as_deref())
    })?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdsBody {
    pub user_ids: Vec<UserId>,
}

async fn invite_users(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiJson(body): ApiJson<UserIdsBody>,
) -> ApiResult<Json<Count>> {
    let invited = state.write(|tx| groups::invite_users(tx, group, ctx.id, &body.user_ids, now()))?;
    state.deliver(invited.notifications);
    Ok(Json(Count { count: invited.value }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdBody {
    pub user_id: UserId,
}

async fn toggle_admin(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiJson(body): ApiJson<UserIdBody>,
) -> ApiResult<Json<Value>> {
    let is_admin = state.write(|tx| groups::toggle_admin(tx, group, ctx.id, body.user_id))?;
    Ok(Json(json!({ "isAdmin": is_admin })))
}

async fn remove_user(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiJson(body): ApiJson<UserIdBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| groups::remove_user(tx, group, ctx.id, body.user_id))?;
    Ok(Json(Message::success()))
}

async fn accept_request(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiJson(body): ApiJson<UserIdBody>,
) -> ApiResult<Json<Message>> {
    let accepted =
        state.write(|tx| groups::accept_request(tx, group, ctx.id, body.user_id, now()))?;
    state.deliver(accepted.notifications);
    Ok(Json(Message::success()))
}

async fn decline_request(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiJson(body): ApiJson<UserIdBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| groups::decline_request(tx, group, ctx.id, body.user_id))?;
    Ok(Json(Message::success()))
}

async fn toggle_block(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiJson(body): ApiJson<UserIdBody>,
) -> ApiResult<Json<Value>> {
    let blocked =
        state.write(|tx| groups::toggle_block(tx, group, ctx.id, body.user_id, now()))?;
    Ok(Json(json!({ "isBlocked": blocked })))
}

fn with_status(
    state: &AppState,
    group: GroupId,
    admin: UserId,
    status: MemberStatus,
) -> ApiResult<Json<Vec<GroupMemberView>>> {
    Ok(Json(state.read(|tx| groups::users_with_status(tx, group, admin, status))?))
}

async fn blocked_users(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<GroupMemberView>>> {
    with_status(&state, group, ctx.id, MemberStatus::Blocked)
}

async fn invited_users(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<GroupMemberView>>> {
    with_status(&state, group, ctx.id, MemberStatus::Invited)
}

async fn requested_users(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<GroupMemberView>>> {
    with_status(&state, group, ctx.id, MemberStatus::Requested)
}

async fn reported_posts(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<ReportedPost>>> {
    Ok(Json(state.read(|tx| {
        groups::require_group_admin(tx, group, ctx.id)?;
        posts::reported_posts(tx, group)
    })?))
}

async fn reported_comments(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<ReportedComment>>> {
    Ok(Json(state.read(|tx| {
        groups::require_group_admin(tx, group, ctx.id)?;
        posts::reported_comments(tx, group)
    })?))
}

async fn admin_delete_comment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, comment)): ApiPath<(GroupId, CommentId)>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| {
        groups::require_group_admin(tx, group, ctx.id)?;
        let found: Comment = tx.require(comment.0)?;
        posts::delete_comment_by_admin(tx, group, found.post_id, comment)
    })?;
    Ok(Json(Message::success()))
}

// =============================================================================
// REPORTS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ReportTypeBody {
    pub name: String,
    #[serde(default = "group_target")]
    pub target: ReportTarget,
}

fn group_target() -> ReportTarget {
    ReportTarget::Group
}

async fn create_report_type(
    State(state): State<AppState>,
    AuthUser(_ctx): AuthUser,
    ApiJson(body): ApiJson<ReportTypeBody>,
) -> ApiResult<Json<ReportType>> {
    Ok(Json(state.write(|tx| catalog::create_report_type(tx, &body.name, body.target))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReportBody {
    pub group_id: GroupId,
    pub report_type_id: ReportTypeId,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn report_group(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<GroupReportBody>,
) -> ApiResult<Json<GroupReport>> {
    Ok(Json(state.write(|tx| {
        groups::report_group(tx, body.group_id, ctx.id, body.report_type_id, body.reason, now())
    })?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBody {
    pub report_type_id: ReportTypeId,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub comment_id: Option<CommentId>,
}

async fn report_post(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
    ApiJson(body): ApiJson<ReportBody>,
) -> ApiResult<Json<PostReport>> {
    Ok(Json(state.write(|tx| {
        posts::report(tx, group, post, None, ctx.id, body.report_type_id, body.reason, now())
    })?))
}

async fn report_comment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
    ApiJson(body): ApiJson<ReportBody>,
) -> ApiResult<Json<PostReport>> {
    let comment = body
        .comment_id
        .ok_or_else(|| super::ApiError::bad_request("commentId is required"))?;
    Ok(Json(state.write(|tx| {
        posts::report(tx, group, post, Some(comment), ctx.id, body.report_type_id, body.reason, now())
    })?))
}

// =============================================================================
// POSTS
// =============================================================================

async fn create_post(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiJson(body): ApiJson<PostInput>,
) -> ApiResult<Json<Post>> {
    Ok(Json(state.write(|tx| posts::create_post(tx, group, ctx.id, body, now()))?))
}

async fn list_posts(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<PostView>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| posts::posts(tx, group, ctx.id, pagination))?))
}

async fn post_detail(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
) -> ApiResult<Json<PostView>> {
    Ok(Json(state.read(|tx| posts::post_detail(tx, group, post, ctx.id))?))
}

async fn update_post(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
    ApiJson(body): ApiJson<PostInput>,
) -> ApiResult<Json<Post>> {
    Ok(Json(state.write(|tx| posts::update_post(tx, group, post, ctx.id, body, now()))?))
}

async fn delete_post(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| posts::delete_post(tx, group, post, ctx.id))?;
    Ok(Json(Message::success()))
}

async fn like_post(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
) -> ApiResult<Json<Value>> {
    let liked = state.write(|tx| posts::toggle_like(tx, group, post, ctx.id, now()))?;
    state.deliver(liked.notifications);
    Ok(Json(json!({ "isLiked": liked.value })))
}

async fn post_likes(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(state.read(|tx| posts::likes(tx, group, post, ctx.id))?))
}

async fn upvote_detail(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
) -> ApiResult<Json<UpvoteDetail>> {
    Ok(Json(state.read(|tx| posts::upvote_detail(tx, group, post, ctx.id))?))
}

// =============================================================================
// COMMENTS AND REPLIES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub body: String,
}

async fn comment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
    ApiJson(body): ApiJson<CommentBody>,
) -> ApiResult<Json<Comment>> {
    let created =
        state.write(|tx| posts::comment(tx, group, post, ctx.id, &body.body, None, now()))?;
    state.deliver(created.notifications);
    Ok(Json(created.value))
}

async fn update_comment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post, comment)): ApiPath<(GroupId, PostId, CommentId)>,
    ApiJson(body): ApiJson<CommentBody>,
) -> ApiResult<Json<Comment>> {
    Ok(Json(state.write(|tx| {
        posts::update_comment(tx, group, post, comment, ctx.id, &body.body, now())
    })?))
}

async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post, comment)): ApiPath<(GroupId, PostId, CommentId)>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| posts::delete_comment(tx, group, post, comment, ctx.id))?;
    Ok(Json(Message::success()))
}

async fn comments(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<CommentView>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| posts::comments(tx, group, post, ctx.id, pagination))?))
}

fn react(
    state: &AppState,
    user: UserId,
    (group, post, comment): (GroupId, PostId, CommentId),
    reaction: Reaction,
) -> ApiResult<Json<Value>> {
    let current = state.write(|tx| posts::react(tx, group, post, comment, user, reaction))?;
    Ok(Json(json!({ "reaction": current })))
}

async fn like_comment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(ids): ApiPath<(GroupId, PostId, CommentId)>,
) -> ApiResult<Json<Value>> {
    react(&state, ctx.id, ids, Reaction::Like)
}

async fn dislike_comment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(ids): ApiPath<(GroupId, PostId, CommentId)>,
) -> ApiResult<Json<Value>> {
    react(&state, ctx.id, ids, Reaction::Dislike)
}

async fn reply(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post, parent)): ApiPath<(GroupId, PostId, CommentId)>,
    ApiJson(body): ApiJson<CommentBody>,
) -> ApiResult<Json<Comment>> {
    let created = state.write(|tx| {
        posts::comment(tx, group, post, ctx.id, &body.body, Some(parent), now())
    })?;
    state.deliver(created.notifications);
    Ok(Json(created.value))
}

async fn replies(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post, comment)): ApiPath<(GroupId, PostId, CommentId)>,
) -> ApiResult<Json<Vec<CommentView>>> {
    Ok(Json(state.read(|tx| posts::replies(tx, group, post, comment, ctx.id))?))
}

type ReplyPath = (GroupId, PostId, CommentId, CommentId);

async fn update_reply(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post, _parent, reply)): ApiPath<ReplyPath>,
    ApiJson(body): ApiJson<CommentBody>,
) -> ApiResult<Json<Comment>> {
    Ok(Json(state.write(|tx| {
        posts::update_comment(tx, group, post, reply, ctx.id, &body.body, now())
    })?))
}

async fn delete_reply(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post, _parent, reply)): ApiPath<ReplyPath>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| posts::delete_comment(tx, group, post, reply, ctx.id))?;
    Ok(Json(Message::success()))
}

async fn like_reply(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post, _parent, reply)): ApiPath<ReplyPath>,
) -> ApiResult<Json<Value>> {
    react(&state, ctx.id, (group, post, reply), Reaction::Like)
}

async fn dislike_reply(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath((group, post, _parent, reply)): ApiPath<ReplyPath>,
) -> ApiResult<Json<Value>> {
    react(&state, ctx.id, (group, post, reply), Reaction::Dislike)
}
