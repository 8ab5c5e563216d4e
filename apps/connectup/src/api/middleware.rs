//! Request middleware: timing logs and the global rate limit.

use super::AppState;
use super::error::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Token bucket shared by every request.
pub fn rate_limiter(per_second: u32, burst: u32) -> DefaultDirectRateLimiter {
    let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))
}

/// Log method, path, status and elapsed time of every API request.
pub async fn timing(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    let elapsed_ms = started.elapsed().as_millis();
    if path.starts_with("/api") {
        info!(%method, %path, status = response.status().as_u16(), elapsed_ms, "request time");
    } else {
        debug!(%method, %path, status = response.status().as_u16(), elapsed_ms, "request time");
    }
    response
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match state.limiter.check() {
        Ok(()) => next.run(req).await,
        Err(_) => {
            warn!(path = %req.uri().path(), "rate limit exceeded");
            ApiError::too_many_requests().into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_allows_burst_then_rejects() {
        let limiter = rate_limiter(1, 3);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn zero_settings_still_allow_traffic() {
        let limiter = rate_limiter(0, 0);
        assert!(limiter.check().is_ok());
    }
}
