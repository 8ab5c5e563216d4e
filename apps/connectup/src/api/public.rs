//! Unauthenticated routes: registration, login, OTP, email links, FAQs and
//! feedback. Also the local-only developer routes.

use super::{ApiError, ApiJson, ApiPath, ApiResult, AppState, now};
use crate::providers::{EmailKind, OutgoingEmail, PushMessage};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use connectup_core::catalog::{self, Faq};
use connectup_core::otp::{self, OtpCheck, OtpReason};
use connectup_core::response::Message;
use connectup_core::uploads::Upload;
use connectup_core::users::{self, LoginGrant, NewUser, User};
use connectup_core::{Reader, Role, UploadId, UserId, sessions};
use serde::Deserialize;
use tracing::{info, warn};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/send_otp", post(send_otp))
        .route("/verify_otp", post(verify_otp))
        .route("/change_password_using_otp", post(change_password_using_otp))
        .route("/verify_email_link", post(verify_email_link))
        .route("/feedback", post(feedback))
        .route("/faqs", get(faqs))
        .route("/attachment/{id}", get(attachment))
}

/// Developer shortcuts, mounted only in the local environment.
pub fn local_routes() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(token_for_user))
        .route("/test/create", post(create_test_admin))
}

fn grant(tx: &connectup_core::WriteTx, mut user: User) -> connectup_core::CoreResult<LoginGrant> {
    let token = users::issue_auth_token(tx, &mut user)?;
    Ok(LoginGrant {
        token,
        user_id: user.id,
        role: user.role,
    })
}

async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewUser>,
) -> ApiResult<Json<LoginGrant>> {
    let grant = state.write(|tx| {
        let user = users::register(tx, input, now())?;
        grant(tx, user)
    })?;
    info!(user = %grant.user_id, "user registered");
    Ok(Json(grant))
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Credentials>,
) -> ApiResult<Json<LoginGrant>> {
    let grant = state.write(|tx| users::login(tx, &body.email, &body.password))?;
    Ok(Json(grant))
}

#[derive(Debug, Deserialize)]
pub struct SendOtp {
    pub target: String,
    pub reason: OtpReason,
}

async fn send_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SendOtp>,
) -> ApiResult<Json<Message>> {
    let (code, phone_tokens) = state.write(|tx| {
        let issued = otp::issue_otp(tx, &body.target, body.reason, now())?;
        let tokens = if issued.target.contains('@') {
            Vec::new()
        } else {
            match users::find_by_phone(tx, &issued.target)? {
                Some(user) => sessions::push_tokens(tx, user.id)?,
                None => Vec::new(),
            }
        };
        Ok((issued, tokens))
    })?;

    state.check_send_limit()?;
    if code.target.contains('@') {
        let email = OutgoingEmail::new(EmailKind::Otp, code.target.clone())
            .data("otp", &code.code)
            .data("reason", format!("{:?}", code.reason));
        state.mailer.send(email)?;
    } else if !phone_tokens.is_empty() {
        let mut push = PushMessage::new(phone_tokens, "Verification code", "Your ConnectUp code");
        push.data.insert("otp".to_string(), code.code.clone());
        state.push.push(push)?;
    } else {
        info!(target = %code.target, "otp issued for phone without devices");
    }
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtp {
    pub target: String,
    pub otp: String,
    pub reason: OtpReason,
}

async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<VerifyOtp>,
) -> ApiResult<Json<Message>> {
    let check = state.write(|tx| {
        let now = now();
        let check = otp::verify_otp(tx, &body.target, &body.otp, body.reason, now)?;
        if let OtpCheck::Accepted(accepted) = &check {
            let user = match body.reason {
                OtpReason::VerifyEmail => users::find_by_email(tx, &accepted.target)?,
                OtpReason::VerifyPhone => users::find_by_phone(tx, &accepted.target)?,
                OtpReason::ResetPassword => None,
            };
            if let Some(user) = user {
                let mut used = accepted.clone();
                used.used = true;
                tx.put(&used)?;
                match body.reason {
                    OtpReason::VerifyPhone => users::mark_phone_verified(tx, user.id, now)?,
                    _ => users::mark_email_verified(tx, user.id, now)?,
                }
            }
        }
        Ok(check)
    })?;
    check.into_result()?;
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
pub struct PasswordReset {
    pub email: String,
    pub otp: String,
    pub password: String,
}

async fn change_password_using_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PasswordReset>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| {
        otp::change_password_using_otp(tx, &body.email, &body.otp, &body.password, now())
    })?;
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
pub struct EmailToken {
    pub token: String,
}

async fn verify_email_link(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EmailToken>,
) -> ApiResult<Json<Message>> {
    let (user, tokens) = state.write(|tx| {
        let user = otp::verify_email_link(tx, &body.token, now())?;
        Ok((user, sessions::push_tokens(tx, user)?))
    })?;
    if !tokens.is_empty() {
        if let Err(e) = state.push.push(PushMessage::silent(tokens, "email_verified")) {
            warn!(%user, error = %e, "email verified push failed");
            return Err(ApiError::internal(format!(
                "Failed to send silent notification for email verification: {e}"
            )));
        }
    }
    info!(%user, "email verified");
    Ok(Json(Message::success()))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    #[serde(default)]
    pub email: Option<String>,
    pub message: String,
}

async fn feedback(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<FeedbackBody>,
) -> ApiResult<Json<Message>> {
    state.write(|tx| catalog::submit_feedback(tx, None, body.email, &body.message, now()))?;
    Ok(Json(Message::success()))
}

async fn faqs(State(state): State<AppState>) -> ApiResult<Json<Vec<Faq>>> {
    Ok(Json(state.read(|tx| catalog::faqs(tx))?))
}

async fn attachment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UploadId>,
) -> ApiResult<Json<Upload>> {
    Ok(Json(state.read(|tx| tx.require::<Upload>(id.0))?))
}

async fn token_for_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<LoginGrant>> {
    let id: u64 = id
        .parse()
        .map_err(|_| ApiError::bad_request("invalid user id"))?;
    let grant = state.write(|tx| {
        let user = users::require_live(tx, UserId(id))?;
        grant(tx, user)
    })?;
    Ok(Json(grant))
}

async fn create_test_admin(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewUser>,
) -> ApiResult<Json<LoginGrant>> {
    let grant = state.write(|tx| {
        let user = users::create_account(tx, input, Role::Admin, now())?;
        grant(tx, user)
    })?;
    info!(user = %grant.user_id, "test admin created");
    Ok(Json(grant))
}
