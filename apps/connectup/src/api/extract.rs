//! # Request context
//!
//! [`AuthUser`] resolves the caller from `Authorization` (a bearer or raw auth
//! token) plus an optional `session` header. Resolved contexts are cached per
//! token pair; suspending or deleting a user evicts them.
//! [`AdminUser`] additionally requires the admin role.

use super::AppState;
use super::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header::AUTHORIZATION, request::Parts};
use connectup_core::cache::context_key;
use connectup_core::sessions::{self, Session};
use connectup_core::{Role, UserId, users};
use tracing::debug;

pub const SESSION_HEADER: &str = "session";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub id: UserId,
    pub auth_token: String,
    pub role: Role,
    pub name: String,
    pub session: Option<Session>,
}

impl UserContext {
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }
}

fn auth_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match raw.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => raw.get(6..).unwrap_or_default().trim(),
        _ => raw,
    };
    (!token.is_empty()).then(|| token.to_string())
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl AppState {
    /// Resolve (and cache) the context for a token pair.
    pub fn resolve_context(&self, auth: &str, session: Option<&str>) -> Result<UserContext, ApiError> {
        let key = context_key(auth, session);
        let now = super::now();
        if let Some(ctx) = self.contexts.lock().get_at(&key, now) {
            return Ok(ctx.clone());
        }

        let ctx = self.read(|tx| {
            let user = users::user_for_token(tx, auth)?
                .ok_or_else(|| connectup_core::CoreError::unauthorized("invalid auth token"))?;
            if user.is_deleted() {
                return Err(connectup_core::CoreError::unauthorized("user deleted"));
            }
            if user.suspended {
                return Err(connectup_core::CoreError::forbidden("user suspended"));
            }
            let session = match session {
                Some(token) => {
                    let session = sessions::validate_session(tx, token)?;
                    if session.user_id != user.id {
                        return Err(connectup_core::CoreError::unauthorized(
                            "session does not belong to user",
                        ));
                    }
                    Some(session)
                }
                None => None,
            };
            Ok(UserContext {
                id: user.id,
                auth_token: auth.to_string(),
                role: user.role,
                name: user.name,
                session,
            })
        })?;

        debug!(user = %ctx.id, "user context cached");
        self.contexts.lock().insert_at(key, ctx.clone(), now);
        Ok(ctx)
    }

    /// Drop the cached context of one token pair.
    pub fn forget_context(&self, auth: &str, session: Option<&str>) {
        self.contexts.lock().remove(&context_key(auth, session));
    }

    /// Drop every cached context bound to a session token, whichever auth
    /// token it was resolved with.
    pub fn forget_session(&self, session: &str) -> usize {
        self.contexts
            .lock()
            .remove_where(|_, ctx| ctx.session.as_ref().is_some_and(|s| s.token == session))
    }

    /// Drop every cached context of `user`.
    pub fn forget_user(&self, user: UserId) -> usize {
        self.contexts.lock().remove_where(|_, ctx| ctx.id == user)
    }
}

/// Extractor for any signed-in user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserContext);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = auth_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("missing auth token"))?;
        let session = session_token(&parts.headers);
        state.resolve_context(&token, session.as_deref()).map(Self)
    }
}

/// Extractor for admins.
#[derive(Debug, Clone)]
pub struct AdminUser(pub UserContext);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(ctx) = AuthUser::from_request_parts(parts, state).await?;
        if ctx.role != Role::Admin {
            return Err(ApiError::forbidden("admin access required"));
        }
        Ok(Self(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_bearer_and_raw_tokens() {
        let mut headers = HeaderMap::new();
        assert_eq!(auth_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(auth_token(&headers).as_deref(), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(auth_token(&headers).as_deref(), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("rawtoken"));
        assert_eq!(auth_token(&headers).as_deref(), Some("rawtoken"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(auth_token(&headers), None);
    }

    #[test]
    fn session_header_is_optional() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(SESSION_HEADER, HeaderValue::from_static(" s1 "));
        assert_eq!(session_token(&headers).as_deref(), Some("s1"));
    }
}
