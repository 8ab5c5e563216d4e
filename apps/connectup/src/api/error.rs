//! # API errors
//!
//! Every handler returns `Result<_, ApiError>`. Client errors carry two
//! messages: `error` for developers and `messageToUser` for display. Server
//! errors hide their detail behind a generic message and log it instead.

use crate::providers::ProviderError;
use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use connectup_core::CoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::error;

pub const GENERIC_MESSAGE: &str = "something went wrong";
pub const PARSE_MESSAGE: &str = "error parsing request";
pub const TOO_LARGE_MESSAGE: &str = "request body too large";

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
#[error("{status}: {error}")]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub message_to_user: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'a str,
    message_to_user: &'a str,
    status_code: u16,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, message_to_user: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message_to_user: message_to_user.into(),
        }
    }

    /// 400 with the same text for both messages.
    pub fn bad_request(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(StatusCode::BAD_REQUEST, message.clone(), message)
    }

    pub fn parse(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail, PARSE_MESSAGE)
    }

    /// Extractor rejection. Oversized bodies keep their 413, the rest are 400.
    pub fn rejection(status: StatusCode, detail: impl Into<String>) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(status, detail, TOO_LARGE_MESSAGE);
        }
        Self::parse(detail)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(StatusCode::UNAUTHORIZED, message.clone(), message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(StatusCode::FORBIDDEN, message.clone(), message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(StatusCode::NOT_FOUND, message.clone(), message)
    }

    pub fn too_many_requests() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "too many attempts", "too many attempts")
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail, GENERIC_MESSAGE)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Invalid(_) | CoreError::Expired(_) => StatusCode::BAD_REQUEST,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoreError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Storage(_) | CoreError::Corrupt(_) => {
                return Self::internal(err.to_string());
            }
        };
        let message = err.to_string();
        Self::new(status, message.clone(), message)
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(path) => Self::not_found(format!("{path} not found")),
            ProviderError::InvalidPath(path) => Self::bad_request(format!("invalid path: {path}")),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.error, "request failed");
        }
        let body = ErrorBody {
            error: &self.error,
            message_to_user: &self.message_to_user,
            status_code: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejection is an [`ApiError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::rejection(rejection.status(), rejection.body_text())),
        }
    }
}

/// `Path` extractor whose rejection is an [`ApiError`].
#[derive(Debug, Clone, Copy)]
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// Raw query string as a [`QueryMap`](connectup_core::filters::QueryMap).
#[derive(Debug, Clone, Default)]
pub struct ApiQuery(pub connectup_core::filters::QueryMap);

impl<S> FromRequestParts<S> for ApiQuery
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<connectup_core::filters::QueryMap>::from_request_parts(parts, state).await {
            Ok(Query(map)) => Ok(Self(map)),
            Err(rejection) => Err(ApiError::parse(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_statuses() {
        let cases = [
            (CoreError::NotFound("user"), StatusCode::NOT_FOUND),
            (CoreError::conflict("dup"), StatusCode::CONFLICT),
            (CoreError::invalid("bad"), StatusCode::BAD_REQUEST),
            (CoreError::Expired("otp expired".into()), StatusCode::BAD_REQUEST),
            (CoreError::forbidden("no"), StatusCode::FORBIDDEN),
            (CoreError::unauthorized("who"), StatusCode::UNAUTHORIZED),
            (CoreError::TooManyAttempts, StatusCode::TOO_MANY_REQUESTS),
            (CoreError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn rejections_keep_payload_too_large() {
        let err = ApiError::rejection(StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded");
        assert_eq!(err.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.message_to_user, TOO_LARGE_MESSAGE);

        let err = ApiError::rejection(StatusCode::UNPROCESSABLE_ENTITY, "missing field");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message_to_user, PARSE_MESSAGE);
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = ApiError::from(CoreError::Corrupt("bad frame".into()));
        assert_eq!(err.message_to_user, GENERIC_MESSAGE);
        assert!(err.error.contains("bad frame"));

        let err = ApiError::from(CoreError::NotFound("group"));
        assert_eq!(err.message_to_user, "group not found");
    }
}
