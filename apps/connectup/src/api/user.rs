//! `/api/user` routes: the signed-in user's account, sessions, notifications
//! and connection graph.

use super::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResult, AppState, AuthUser, now};
use crate::providers::{EmailKind, OutgoingEmail};
use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post, put},
};
use connectup_core::catalog::{self, Industry, IndustryCategory, ReportTarget, ReportType};
use connectup_core::connections::{
    self, ConnectionRequest, ConnectionsCount, RecommendedUser, RequestStatus, RequestView,
};
use connectup_core::filters::{Pagination, search_text};
use connectup_core::notifications::{self, Notification, ReadRequest};
use connectup_core::otp::{self, OtpReason};
use connectup_core::response::{Count, Message, Page};
use connectup_core::sessions::{self, NewSession, Session};
use connectup_core::users::{
    self, OnlineStatus, ProfileEdit, User, UserInfo, UserProfile, UserSettings, UserSummary,
};
use connectup_core::{IndustryId, RequestId, UploadId, UserId};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", delete(delete_account))
        .route("/info", get(info))
        .route("/send_verification_email", post(send_verification_email))
        .route("/phone", put(change_phone))
        .route("/email", put(change_email))
        .route("/skip_phone", put(skip_phone))
        .route("/settings", get(settings).post(update_settings))
        .route("/change_password", post(change_password))
        .route("/blocked_contacts", get(blocked_contacts).post(edit_blocked_contacts))
        .route("/toggle_block", post(toggle_block))
        .route("/upload_image", post(super::uploads::upload))
        .route("/industries", get(industries).post(add_industries))
        .route("/ping", post(ping))
        .route("/online_status", post(online_status))
        .route("/user_rating", post(user_rating))
        .route("/location", post(location))
        .route("/verify_phone_otp", post(verify_phone_otp))
        .route("/verify_email_otp", post(verify_email_otp))
        .route("/notifications", get(notification_list))
        .route("/read_notification", put(read_notification))
        .route("/notifications_count", get(notifications_count))
        .route("/connections_count", get(connections_count))
        .route("/session", post(create_session).get(current_session))
        .route("/session/end", put(end_session))
        .route("/session/fcm", put(update_fcm))
        .route("/session/voip_token", put(update_voip))
        .route("/profile", get(own_profile).put(edit_profile))
        .route("/profile/image", put(profile_image))
        .route("/profile/{user_id}", get(other_profile))
        .route("/connections/all", get(all_connections))
        .route("/connections_list", get(connection_list))
        .route("/connections/mutual/{user_id}", get(mutual_connections))
        .route("/recommendations", get(recommendations))
        .route("/total_recommendations", get(total_recommendations))
        .route("/all_recommendations", post(all_recommendations))
        .route("/undo_recommendation", post(undo_recommendation))
        .route("/decline_recommendation", post(decline_recommendation))
        .route("/report_type", get(report_types))
        .route("/connection/request/all", get(all_requests))
        .route("/connection/request/send", post(send_request))
        .route("/connection/request/inbound", get(inbound))
        .route("/connection/request/outbound", get(outbound))
        .route("/connection/request/status", put(request_status))
        .route("/connection/request/remove", put(remove_connection))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetUser {
    pub user_id: UserId,
}

// =============================================================================
// ACCOUNT
// =============================================================================

async fn delete_account(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Message>> {
    let revoked = state.write(|tx| users::delete_user(tx, ctx.id, now()))?;
    state.forget_user(ctx.id);
    info!(user = %ctx.id, sessions = revoked.session_tokens.len(), "account deleted");
    Ok(Json(Message::success()))
}

async fn info(State(state): State<AppState>, AuthUser(ctx): AuthUser) -> ApiResult<Json<UserInfo>> {
    let user = state.read(|tx| users::require_live(tx, ctx.id))?;
    Ok(Json(users::user_info(&user, state.flags.verification_flags())))
}

async fn send_verification_email(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Message>> {
    let (user, link) = state.write(|tx| {
        let link = otp::issue_email_link(tx, ctx.id, now())?;
        Ok((users::require_live(tx, ctx.id)?, link))
    })?;
    let email = OutgoingEmail::new(EmailKind::VerifyUsingLink, user.email.clone())
        .data("name", &user.name)
        .data("verificationLink", state.config.email_verification_link(&link.token));
    state.check_send_limit()?;
    state.mailer.send(email)?;
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
pub struct PhoneBody {
    pub phone: String,
}

async fn change_phone(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<PhoneBody>,
) -> ApiResult<Json<UserProfile>> {
    let user = state.write(|tx| users::change_phone(tx, ctx.id, &body.phone))?;
    Ok(Json(UserProfile::from(&user)))
}

#[derive(Debug, Deserialize)]
pub struct EmailBody {
    pub email: String,
}

async fn change_email(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<EmailBody>,
) -> ApiResult<Json<UserProfile>> {
    let user = state.write(|tx| users::change_email(tx, ctx.id, &body.email))?;
    Ok(Json(UserProfile::from(&user)))
}

async fn skip_phone(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Message>> {
    state.write(|tx| users::skip_phone(tx, ctx.id))?;
    Ok(Json(Message::success()))
}

async fn settings(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<UserSettings>> {
    let user = state.read(|tx| users::require_live(tx, ctx.id))?;
    Ok(Json(user.settings))
}

async fn update_settings(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<UserSettings>,
) -> ApiResult<Json<UserSettings>> {
    Ok(Json(state.write(|tx| users::update_settings(tx, ctx.id, body))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<PasswordChange>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| users::change_password(tx, ctx.id, &body.old_password, &body.new_password))?;
    Ok(Json(Message::success()))
}

async fn blocked_contacts(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(state.read(|tx| users::blocked_profiles(tx, ctx.id))?))
}

#[derive(Debug, Default, Deserialize)]
pub struct BlockedEdit {
    #[serde(default)]
    pub block: Vec<UserId>,
    #[serde(default)]
    pub unblock: Vec<UserId>,
}

async fn edit_blocked_contacts(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<BlockedEdit>,
) -> ApiResult<Json<Vec<UserId>>> {
    Ok(Json(state.write(|tx| {
        users::edit_blocked(tx, ctx.id, &body.block, &body.unblock)
    })?))
}

async fn toggle_block(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<TargetUser>,
) -> ApiResult<Json<Value>> {
    let blocked = state.write(|tx| users::toggle_block(tx, ctx.id, body.user_id))?;
    Ok(Json(json!({ "isBlocked": blocked })))
}

async fn industries(
    State(state): State<AppState>,
    AuthUser(_ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Vec<Industry>>> {
    let category = match query.get("category").filter(|c| !c.is_empty()) {
        Some(raw) => IndustryCategory::parse(raw)?,
        None => IndustryCategory::ConnectionsAndGroups,
    };
    Ok(Json(state.read(|tx| catalog::industries_in(tx, category))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndustriesBody {
    pub industry_ids: Vec<IndustryId>,
}

async fn add_industries(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<IndustriesBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| users::set_industries(tx, ctx.id, &body.industry_ids))?;
    Ok(Json(Message::success()))
}

async fn ping(State(state): State<AppState>, AuthUser(ctx): AuthUser) -> ApiResult<Json<Message>> {
    state.write(|tx| users::ping(tx, ctx.id, now()))?;
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIds {
    pub user_ids: Vec<UserId>,
}

async fn online_status(
    State(state): State<AppState>,
    AuthUser(_ctx): AuthUser,
    ApiJson(body): ApiJson<UserIds>,
) -> ApiResult<Json<Vec<OnlineStatus>>> {
    Ok(Json(state.read(|tx| users::online_statuses(tx, &body.user_ids, now()))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingBody {
    pub user_id: UserId,
    pub rating: u8,
}

async fn user_rating(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<RatingBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| users::add_rating(tx, ctx.id, body.user_id, body.rating))?;
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
pub struct LocationBody {
    pub country: String,
    pub state: String,
}

async fn location(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<LocationBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| users::set_location(tx, ctx.id, &body.country, &body.state))?;
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
pub struct OtpBody {
    pub otp: String,
}

fn verify_own(state: &AppState, user: UserId, code: &str, reason: OtpReason) -> ApiResult<()> {
    let check = state.write(|tx| otp::verify_user_otp(tx, user, code, reason, now()))?;
    check.into_result()?;
    Ok(())
}

async fn verify_phone_otp(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<OtpBody>,
) -> ApiResult<Json<Message>> {
    verify_own(&state, ctx.id, &body.otp, OtpReason::VerifyPhone)?;
    Ok(Json(Message::success()))
}

async fn verify_email_otp(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<OtpBody>,
) -> ApiResult<Json<Message>> {
    verify_own(&state, ctx.id, &body.otp, OtpReason::VerifyEmail)?;
    Ok(Json(Message::success()))
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

async fn notification_list(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<Notification>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| notifications::list(tx, ctx.id, pagination))?))
}

async fn read_notification(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<ReadRequest>,
) -> ApiResult<Json<Count>> {
    let count = state.write(|tx| notifications::mark_read(tx, ctx.id, &body))?;
    Ok(Json(Count { count }))
}

async fn notifications_count(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Count>> {
    let count = state.read(|tx| notifications::unread_count(tx, ctx.id))?;
    Ok(Json(Count { count }))
}

async fn connections_count(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<ConnectionsCount>> {
    Ok(Json(state.read(|tx| connections::counts(tx, ctx.id))?))
}

// =============================================================================
// SESSIONS
// =============================================================================

async fn create_session(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<NewSession>,
) -> ApiResult<Json<Value>> {
    let started = state.write(|tx| sessions::create_session(tx, ctx.id, body, now()))?;
    for old in &started.replaced {
        state.forget_session(&old.token);
    }
    let session = started.session;
    info!(
        user = %ctx.id,
        platform = ?session.platform,
        replaced = started.replaced.len(),
        "session created"
    );
    Ok(Json(json!({ "token": session.token })))
}

fn require_session(ctx: &super::UserContext) -> ApiResult<&Session> {
    ctx.session
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("session not found"))
}

async fn current_session(AuthUser(ctx): AuthUser) -> ApiResult<Json<Session>> {
    Ok(Json(require_session(&ctx)?.clone()))
}

async fn end_session(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Message>> {
    let token = require_session(&ctx)?.token.clone();
    state.write(|tx| sessions::end_session(tx, Some(&token), now()))?;
    state.forget_context(&ctx.auth_token, Some(&token));
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmBody {
    pub fcm_token: String,
}

async fn update_fcm(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<FcmBody>,
) -> ApiResult<Json<Message>> {
    let token = require_session(&ctx)?.token.clone();
    state.write(|tx| sessions::update_fcm_token(tx, &token, &body.fcm_token))?;
    state.forget_context(&ctx.auth_token, Some(&token));
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoipBody {
    pub voip_token: String,
}

async fn update_voip(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<VoipBody>,
) -> ApiResult<Json<Message>> {
    let token = require_session(&ctx)?.token.clone();
    state.write(|tx| sessions::update_voip_token(tx, &token, &body.voip_token))?;
    state.forget_context(&ctx.auth_token, Some(&token));
    Ok(Json(Message::success()))
}

// =============================================================================
// PROFILE
// =============================================================================

async fn own_profile(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.read(|tx| users::profile_for_viewer(tx, ctx.id, ctx.id))?))
}

async fn other_profile(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.read(|tx| users::profile_for_viewer(tx, ctx.id, user_id))?))
}

async fn edit_profile(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<ProfileEdit>,
) -> ApiResult<Json<UserProfile>> {
    let today = now().date_naive();
    let user: User = state.write(|tx| users::edit_profile(tx, ctx.id, body, today))?;
    state.forget_user(ctx.id);
    Ok(Json(UserProfile::from(&user)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBody {
    pub image_id: UploadId,
}

async fn profile_image(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<ImageBody>,
) -> ApiResult<Json<UserProfile>> {
    let user = state.write(|tx| users::update_profile_image(tx, ctx.id, body.image_id))?;
    Ok(Json(UserProfile::from(&user)))
}

// =============================================================================
// CONNECTIONS
// =============================================================================

async fn all_connections(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<UserSummary>>> {
    let pagination = Pagination::parse(&query)?;
    let search = search_text(&query);
    Ok(Json(state.read(|tx| {
        connections::connections(tx, ctx.id, pagination, search.as_deref())
    })?))
}

async fn connection_list(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let search = search_text(&query);
    Ok(Json(state.read(|tx| {
        connections::connection_list(tx, ctx.id, search.as_deref())
    })?))
}

async fn mutual_connections(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(state.read(|tx| connections::mutual_connections(tx, ctx.id, user_id))?))
}

async fn recommendations(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Page<RecommendedUser>>> {
    let pagination = Pagination::parse(&query)?;
    Ok(Json(state.read(|tx| connections::recommendations(tx, ctx.id, pagination))?))
}

async fn all_recommendations(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Vec<RecommendedUser>>> {
    Ok(Json(state.read(|tx| connections::all_recommendations(tx, ctx.id))?))
}

async fn total_recommendations(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Count>> {
    let count = state.read(|tx| connections::total_recommendations(tx, ctx.id))?;
    Ok(Json(Count { count }))
}

async fn undo_recommendation(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<TargetUser>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| connections::undo_recommendation(tx, ctx.id, body.user_id))?;
    Ok(Json(Message::success()))
}

async fn decline_recommendation(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<TargetUser>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| connections::decline_recommendation(tx, ctx.id, body.user_id))?;
    Ok(Json(Message::success()))
}

async fn report_types(
    State(state): State<AppState>,
    AuthUser(_ctx): AuthUser,
    ApiQuery(query): ApiQuery,
) -> ApiResult<Json<Vec<ReportType>>> {
    let target = match query.get("target").filter(|t| !t.is_empty()) {
        Some(raw) => Some(
            serde_json::from_value::<ReportTarget>(Value::String(raw.clone()))
                .map_err(|_| ApiError::bad_request("invalid report target"))?,
        ),
        None => None,
    };
    Ok(Json(state.read(|tx| catalog::report_types(tx, target))?))
}

#[derive(Debug, serde::Serialize)]
pub struct AllRequests {
    pub inbound: Vec<RequestView>,
    pub outbound: Vec<RequestView>,
}

async fn all_requests(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<AllRequests>> {
    Ok(Json(state.read(|tx| {
        let inbound = connections::inbound(tx, ctx.id)?;
        let outbound = connections::outbound(tx, ctx.id)?;
        Ok(AllRequests {
            inbound: connections::with_profiles(tx, ctx.id, inbound)?,
            outbound: connections::with_profiles(tx, ctx.id, outbound)?,
        })
    })?))
}

async fn send_request(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<TargetUser>,
) -> ApiResult<Json<ConnectionRequest>> {
    let sent = state.write(|tx| connections::send_request(tx, ctx.id, body.user_id, now()))?;
    state.deliver(sent.notifications);
    Ok(Json(sent.value))
}

async fn inbound(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Vec<RequestView>>> {
    Ok(Json(state.read(|tx| {
        let requests = connections::inbound(tx, ctx.id)?;
        connections::with_profiles(tx, ctx.id, requests)
    })?))
}

async fn outbound(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<Vec<RequestView>>> {
    Ok(Json(state.read(|tx| {
        let requests = connections::outbound(tx, ctx.id)?;
        connections::with_profiles(tx, ctx.id, requests)
    })?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub request_id: RequestId,
    pub status: RequestStatus,
}

async fn request_status(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<StatusBody>,
) -> ApiResult<Json<ConnectionRequest>> {
    let updated = state.write(|tx| {
        connections::respond(tx, ctx.id, body.request_id, body.status, now())
    })?;
    state.deliver(updated.notifications);
    Ok(Json(updated.value))
}

async fn remove_connection(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ApiJson(body): ApiJson<TargetUser>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| connections::remove_connection(tx, ctx.id, body.user_id))?;
    Ok(Json(Message::success()))
}
