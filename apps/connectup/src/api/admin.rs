//! `/api/admin` routes. Everything except `POST /login` requires
//! [`AdminUser`].

use super::{AdminUser, ApiJson, ApiPath, ApiQuery, ApiResult, AppState, now};
use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use connectup_core::catalog::{
    self, Broadcast, BroadcastInput, Faq, Feedback, IndustriesCount, Industry, IndustryCategory,
    IndustryInput, ReportTarget, ReportType,
};
use connectup_core::dashboard::{self, ActiveHours, Bucket, DashboardDetails, UserFilterOptions};
use connectup_core::filters::{Pagination, UserFilterQueries};
use connectup_core::groups::{self, AdminGroupRow, GroupCounts, GroupMemberView, GroupReport, GroupSummary};
use connectup_core::posts::{self, CommentView, PostView, ReportedComment, ReportedPost};
use connectup_core::response::{Message, Page};
use connectup_core::showcase::{self, AdminCompanyRow, CompanyCounts, CompanyStatus};
use connectup_core::uploads::Upload;
use connectup_core::users::{self, AdminUserUpdate, LoginGrant, UserProfile, UserSummary};
use connectup_core::{
    BroadcastId, CommentId, CompanyId, GroupId, IndustryId, PostId, Reader, UserId,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/", delete(delete_self))
        .route("/report_type", get(report_types).post(create_report_type))
        .route("/category", get(categories))
        .route("/broadcast", post(broadcast))
        .route("/broadcasts", get(broadcasts))
        .route("/broadcast/{broadcast_id}", get(broadcast_detail))
        .route("/faqs", post(create_faq))
        .route("/faqs/{faq_id}", delete(delete_faq))
        .route("/feedback", get(feedback))
        .nest("/users", user_routes())
        .nest("/dashboard", dashboard_routes())
        .nest("/industries", industry_routes())
        .nest("/groups", group_routes())
        .nest("/showcase", showcase_routes())
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users_list))
        .route("/downloads", get(users_csv))
        .route("/filters", get(user_filters))
        .route("/{user_id}", get(user_detail).put(update_user).delete(delete_user))
        .route("/{user_id}/suspend_user", post(suspend_user))
}

fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/details", get(dashboard_details))
        .route("/charts", get(signups_chart))
        .route("/charts/industry_user_count", get(top_industries))
        .route("/charts/country_user_count", get(users_per_country))
        .route("/charts/country_active_user_count", get(active_users_per_country))
        .route("/charts/state_user_count", get(users_per_state))
        .route("/charts/state_active_user_count", get(active_users_per_state))
        .route("/charts/most_active_time_user", get(most_active_time))
}

fn industry_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(industries).post(create_industry))
        .route("/industries_count", get(industries_count))
        .route("/{industry_id}", put(update_industry).delete(delete_industry))
}

fn group_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(groups_list))
        .route("/toggle_suspend", post(toggle_suspend_groups))
        .route("/toggle_delete", post(toggle_delete_groups))
        .route("/export_groups", get(groups_csv))
        .route("/count", get(group_counts))
        .route("/reported_groups", get(reported_groups))
        .route("/{group_id}/details", get(group_detail))
        .route("/{group_id}/media", get(group_media))
        .route("/{group_id}/posts", get(group_posts))
        .route("/{group_id}/reported_posts", get(group_reported_posts))
        .route("/{group_id}/reported_comments", get(group_reported_comments))
        .route("/{group_id}/members", get(group_members))
        .route("/{group_id}/reported_by", post(group_reported_by))
        .route("/{group_id}/post/{post_id}", delete(delete_post))
        .route("/{group_id}/post/{post_id}/likes", get(post_likes))
        .route("/{group_id}/post/{post_id}/comments", get(post_comments))
        .route("/{group_id}/post/{post_id}/comment/{comment_id}", delete(delete_comment))
}

fn showcase_routes() -> Router<AppState> {
    Router::new()
        .route("/update_company_status", post(update_company_status))
        .route("/all", get(companies))
        .route("/profiles_count", get(company_counts))
        .route("/export", get(companies_csv))
        .route("/{company_id}", get(company_detail))
        .route("/{company_id}/archive", put(archive_company))
}

fn csv_response(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

// =============================================================================
// ACCOUNT
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Credentials>,
) -> ApiResult<Json<LoginGrant>> {
    let grant = state.write(|tx| users::login_admin(tx, &body.email, &body.password))?;
    info!(admin = %grant.user_id, "admin signed in");
    Ok(Json(grant))
}

async fn delete_self(
    State(state): State<AppState>,
    AdminUser(ctx): AdminUser,
) -> ApiResult<Json<Message>> {
    state.write(|tx| users::delete_user(tx, ctx.id, now()))?;
    state.forget_user(ctx.id);
    Ok(Json(Message::success()))
}

// =============================================================================
// USERS
// =============================================================================

async fn users_list(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<UserProfile>>> {
    let filters = UserFilterQueries::parse(&query)?;
    let page = state.read(|tx| filters.page(tx, now()))?;
    Ok(Json(page.map(|user| UserProfile::from(&user))))
}

async fn users_csv(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Response> {
    let filters = UserFilterQueries::parse(&query)?;
    let body = state.read(|tx| dashboard::export_users_csv(tx, &filters, now()))?;
    Ok(csv_response("users.csv", body))
}

async fn user_filters(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<UserFilterOptions>> {
    Ok(Json(state.read(|tx| dashboard::user_filter_options(tx))?))
}

async fn user_detail(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(user): ApiPath<UserId>,
) -> ApiResult<Json<UserProfile>> {
    let user = state.read(|tx| users::require_live(tx, user))?;
    Ok(Json(UserProfile::from(&user)))
}

async fn update_user(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(user): ApiPath<UserId>,
    ApiJson(body): ApiJson<AdminUserUpdate>,
) -> ApiResult<Json<UserProfile>> {
    let updated = state.write(|tx| users::admin_update(tx, user, body))?;
    state.forget_user(user);
    Ok(Json(UserProfile::from(&updated)))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminUser(ctx): AdminUser,
    ApiPath(user): ApiPath<UserId>,
) -> ApiResult<Json<Message>> {
    let revoked = state.write(|tx| users::delete_user(tx, user, now()))?;
    let evicted = state.forget_user(user);
    info!(
        admin = %ctx.id,
        %user,
        tokens = revoked.auth_tokens.len(),
        evicted,
        "user deleted by admin"
    );
    Ok(Json(Message::success()))
}

async fn suspend_user(
    State(state): State<AppState>,
    AdminUser(ctx): AdminUser,
    ApiPath(user): ApiPath<UserId>,
) -> ApiResult<Json<Value>> {
    let (suspended, _revoked) = state.write(|tx| users::toggle_suspend(tx, user, now()))?;
    state.forget_user(user);
    info!(admin = %ctx.id, %user, suspended, "suspension toggled");
    Ok(Json(json!({ "isSuspended": suspended })))
}

// =============================================================================
// DASHBOARD
// =============================================================================

async fn dashboard_details(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<DashboardDetails>> {
    Ok(Json(state.read(|tx| dashboard::details(tx, now()))?))
}

async fn signups_chart(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Vec<Bucket>>> {
    let days = match query.get("days").filter(|d| !d.is_empty()) {
        Some(raw) => Some(
            raw.parse::<u32>()
                .map_err(|_| super::ApiError::bad_request("days must be a positive integer"))?,
        ),
        None => None,
    };
    Ok(Json(state.read(|tx| dashboard::signups_per_day(tx, days, now()))?))
}

async fn top_industries(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<Vec<Bucket>>> {
    Ok(Json(state.read(|tx| dashboard::top_industries(tx))?))
}

async fn users_per_country(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<Vec<Bucket>>> {
    Ok(Json(state.read(|tx| dashboard::users_per_country(tx, now()))?))
}

async fn active_users_per_country(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<Vec<Bucket>>> {
    Ok(Json(state.read(|tx| dashboard::active_users_per_country(tx, now()))?))
}

async fn users_per_state(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<Vec<Bucket>>> {
    Ok(Json(state.read(|tx| dashboard::users_per_state(tx, now()))?))
}

async fn active_users_per_state(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<Vec<Bucket>>> {
    Ok(Json(state.read(|tx| dashboard::active_users_per_state(tx, now()))?))
}

async fn most_active_time(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<ActiveHours>> {
    Ok(Json(state.read(|tx| dashboard::most_active_time(tx))?))
}

// =============================================================================
// CATALOG
// =============================================================================

async fn industries(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<Industry>>> {
    Ok(Json(state.read(|tx| catalog::industries(tx, &query))?))
}

async fn create_industry(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiJson(body): ApiJson<IndustryInput>,
) -> ApiResult<Json<Industry>> {
    Ok(Json(state.write(|tx| catalog::create_industry(tx, body, now()))?))
}

async fn update_industry(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(id): ApiPath<IndustryId>,
    ApiJson(body): ApiJson<IndustryInput>,
) -> ApiResult<Json<Industry>> {
    Ok(Json(state.write(|tx| catalog::update_industry(tx, id, body))?))
}

async fn delete_industry(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(id): ApiPath<IndustryId>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| catalog::delete_industry(tx, id))?;
    Ok(Json(Message::success()))
}

async fn industries_count(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<IndustriesCount>> {
    Ok(Json(state.read(|tx| catalog::industries_count(tx))?))
}

async fn categories(AdminUser(_ctx): AdminUser) -> Json<Vec<IndustryCategory>> {
    Json(IndustryCategory::all().to_vec())
}

async fn report_types(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<Vec<ReportType>>> {
    Ok(Json(state.read(|tx| catalog::report_types(tx, None))?))
}

#[derive(Debug, Deserialize)]
pub struct ReportTypeBody {
    pub name: String,
    pub target: ReportTarget,
}

async fn create_report_type(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiJson(body): ApiJson<ReportTypeBody>,
) -> ApiResult<Json<ReportType>> {
    Ok(Json(state.write(|tx| catalog::create_report_type(tx, &body.name, body.target))?))
}

async fn broadcast(
    State(state): State<AppState>,
    AdminUser(ctx): AdminUser,
    ApiJson(body): ApiJson<BroadcastInput>,
) -> ApiResult<Json<Broadcast>> {
    let sent = state.write(|tx| catalog::broadcast(tx, ctx.id, body, now()))?;
    info!(admin = %ctx.id, recipients = sent.value.recipients, "broadcast sent");
    state.deliver(sent.notifications);
    Ok(Json(sent.value))
}

async fn broadcasts(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<Broadcast>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| catalog::broadcasts(tx, pagination))?))
}

async fn broadcast_detail(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(id): ApiPath<BroadcastId>,
) -> ApiResult<Json<Broadcast>> {
    Ok(Json(state.read(|tx| tx.require::<Broadcast>(id.0))?))
}

#[derive(Debug, Deserialize)]
pub struct FaqBody {
    pub question: String,
    pub answer: String,
}

async fn create_faq(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiJson(body): ApiJson<FaqBody>,
) -> ApiResult<Json<Faq>> {
    Ok(Json(state.write(|tx| catalog::create_faq(tx, &body.question, &body.answer))?))
}

async fn delete_faq(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(id): ApiPath<u64>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| catalog::delete_faq(tx, id))?;
    Ok(Json(Message::success()))
}

async fn feedback(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<Feedback>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| catalog::feedback(tx, pagination))?))
}

// =============================================================================
// GROUP MODERATION
// =============================================================================

async fn groups_list(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<AdminGroupRow>>> {
    Ok(Json(state.read(|tx| groups::admin_groups(tx, &query))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupIdsBody {
    pub group_ids: Vec<GroupId>,
}

async fn toggle_suspend_groups(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiJson(body): ApiJson<GroupIdsBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| groups::toggle_suspend(tx, &body.group_ids))?;
    Ok(Json(Message::success()))
}

async fn toggle_delete_groups(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiJson(body): ApiJson<GroupIdsBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| groups::toggle_delete(tx, &body.group_ids))?;
    Ok(Json(Message::success()))
}

async fn groups_csv(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Response> {
    let body = state.read(|tx| groups::export_csv(tx, &query))?;
    Ok(csv_response("groups.csv", body))
}

async fn group_counts(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<GroupCounts>> {
    Ok(Json(state.read(|tx| groups::group_counts(tx))?))
}

async fn reported_groups(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<AdminGroupRow>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| groups::reported_groups(tx, pagination))?))
}

async fn group_detail(
    State(state): State<AppState>,
    AdminUser(ctx): AdminUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<GroupSummary>> {
    Ok(Json(state.read(|tx| groups::detail(tx, group, ctx.id))?))
}

async fn group_media(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<Upload>>> {
    Ok(Json(state.read(|tx| {
        groups::require_group(tx, group)?;
        posts::group_media(tx, group)
    })?))
}

async fn group_posts(
    State(state): State<AppState>,
    AdminUser(ctx): AdminUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<PostView>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| posts::group_posts(tx, group, ctx.id, pagination))?))
}

async fn group_reported_posts(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<ReportedPost>>> {
    Ok(Json(state.read(|tx| posts::reported_posts(tx, group))?))
}

async fn group_reported_comments(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<ReportedComment>>> {
    Ok(Json(state.read(|tx| posts::reported_comments(tx, group))?))
}

async fn group_members(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(group): ApiPath<GroupId>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<GroupMemberView>>> {
    let pagination = Pagination::parse(&query)?;
    let search = connectup_core::filters::search_text(&query);
    Ok(Json(state.read(|tx| {
        groups::members(tx, group, pagination, search.as_deref())
    })?))
}

#[derive(Debug, serde::Serialize)]
pub struct ReportedBy {
    #[serde(flatten)]
    pub report: GroupReport,
    pub user: UserSummary,
}

async fn group_reported_by(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(group): ApiPath<GroupId>,
) -> ApiResult<Json<Vec<ReportedBy>>> {
    let rows = state.read(|tx| groups::reported_by(tx, group))?;
    Ok(Json(
        rows.into_iter()
            .map(|(report, user)| ReportedBy { report, user })
            .collect(),
    ))
}

async fn delete_post(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath((group, post)): ApiPath<(GroupId, PostId)>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| posts::delete_post_by_admin(tx, group, post))?;
    Ok(Json(Message::success()))
}

async fn post_likes(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath((_group, post)): ApiPath<(GroupId, PostId)>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(state.read(|tx| posts::post_likers(tx, post))?))
}

async fn post_comments(
    State(state): State<AppState>,
    AdminUser(ctx): AdminUser,
    ApiPath((_group, post)): ApiPath<(GroupId, PostId)>,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<CommentView>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| posts::post_comments(tx, post, ctx.id, pagination))?))
}

async fn delete_comment(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath((group, post, comment)): ApiPath<(GroupId, PostId, CommentId)>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| posts::delete_comment_by_admin(tx, group, post, comment))?;
    Ok(Json(Message::success()))
}

// =============================================================================
// SHOWCASE MODERATION
// =============================================================================

async fn companies(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<AdminCompanyRow>>> {
    Ok(Json(state.read(|tx| showcase::admin_companies(tx, &query))?))
}

async fn company_counts(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
) -> ApiResult<Json<CompanyCounts>> {
    Ok(Json(state.read(|tx| showcase::company_counts(tx))?))
}

async fn companies_csv(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Response> {
    let body = state.read(|tx| showcase::export_csv(tx, &query))?;
    Ok(csv_response("profiles.csv", body))
}

async fn company_detail(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<AdminCompanyRow>> {
    Ok(Json(state.read(|tx| showcase::admin_detail(tx, company))?))
}

async fn archive_company(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiPath(company): ApiPath<CompanyId>,
) -> ApiResult<Json<Value>> {
    let archived = state.write(|tx| showcase::admin_toggle_archive(tx, company))?;
    Ok(Json(json!({ "isArchived": archived })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyStatusBody {
    pub company_id: CompanyId,
    pub status: String,
}

async fn update_company_status(
    State(state): State<AppState>,
    AdminUser(_ctx): AdminUser,
    ApiJson(body): ApiJson<CompanyStatusBody>,
) -> ApiResult<Json<Value>> {
    let status = CompanyStatus::parse(&body.status)?;
    let updated =
        state.write(|tx| showcase::update_company_status(tx, body.company_id, status, now()))?;
    state.deliver(updated.notifications);
    Ok(Json(json!({ "id": updated.value.id, "status": updated.value.status })))
}
