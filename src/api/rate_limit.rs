//! Rate limiting middleware for webhook registration.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use super::error::ApiError;
use super::AppState;

/// Bucket key for requests that carry no peer address
pub const UNKNOWN_CLIENT: &str = "unknown";

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Reject registrations from clients that exhausted their bucket
///
/// The client is identified by the peer IP from `ConnectInfo`. Requests
/// without connection info share one bucket. Allowed requests carry
/// `X-RateLimit-Limit` and `X-RateLimit-Remaining` while limiting is on.
pub async fn limit_registrations(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    let result = state.limiter.check(&client);
    if !result.allowed {
        tracing::warn!(client = %client, retry_after_secs = result.retry_after_secs, "Registration rate limited");
        return ApiError::RateLimited {
            retry_after_secs: result.retry_after_secs,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    if state.limiter.is_enabled() {
        add_rate_limit_headers(
            response.headers_mut(),
            state.limiter.capacity(),
            result.remaining,
        );
    }
    response
}

fn add_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
}
