//! Rate limiting middleware for the webhook endpoint.
//!
//! Every delivery is checked against three scopes in order:
//! 1. Global (infrastructure protection)
//! 2. Per client IP
//! 3. Per provider path
//!
//! Rate limit status is returned in standard HTTP headers:
//! - `X-RateLimit-Limit`: Maximum requests allowed in the window
//! - `X-RateLimit-Remaining`: Requests remaining in the current window
//! - `X-RateLimit-Reset`: Unix timestamp when the window resets
//! - `Retry-After`: Seconds to wait (only on 429 response)
//!
//! # Example
//!
//! ```ignore
//! let limiter: Arc<dyn RateLimiter> = Arc::new(InMemoryRateLimiter::new(config));
//!
//! let app = Router::new()
//!     .route("/webhooks/:provider", post(receive_webhook))
//!     .route_layer(middleware::from_fn_with_state(limiter, webhook_rate_limit));
//! ```

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::billing::dto::ErrorResponse;
use crate::domain::billing::BillingProvider;
use crate::ports::{RateLimitDenied, RateLimitKey, RateLimitResult, RateLimitStatus, RateLimiter};

/// Rate limiter middleware state.
pub type RateLimiterState = Arc<dyn RateLimiter>;

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
}

/// Checks global, IP and provider limits before the webhook handler runs.
///
/// Fails open when the limiter backend is unavailable.
pub async fn webhook_rate_limit(
    State(limiter): State<RateLimiterState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(&request, connect_info.as_ref());
    let provider = provider_from_path(request.uri().path());

    let mut keys = vec![RateLimitKey::global()];
    if let Some(ip) = &client_ip {
        keys.push(RateLimitKey::ip(ip));
    }
    if let Some(provider) = provider {
        keys.push(RateLimitKey::provider(provider));
    }

    let mut tightest: Option<RateLimitStatus> = None;
    for key in keys {
        match limiter.check(key.clone()).await {
            Ok(RateLimitResult::Denied(denied)) => {
                tracing::warn!(
                    scope = %denied.scope,
                    identifier = %key.identifier,
                    retry_after_secs = denied.retry_after_secs,
                    "Webhook rate limit exceeded"
                );
                return rate_limit_response(&denied);
            }
            Ok(RateLimitResult::Allowed(status)) => {
                if tightest.as_ref().map_or(true, |t| status.remaining < t.remaining) {
                    tightest = Some(status);
                }
            }
            Err(e) => {
                tracing::warn!(scope = %key.scope, error = %e, "Rate limiter unavailable");
            }
        }
    }

    let mut response = next.run(request).await;
    if let Some(status) = tightest {
        add_rate_limit_headers(&mut response, &status);
    }
    response
}

/// Extract client IP from request, checking forwarded headers first.
///
/// Order of precedence:
/// 1. X-Forwarded-For header (first IP in list)
/// 2. X-Real-IP header
/// 3. ConnectInfo socket address
fn extract_client_ip<B>(
    request: &axum::http::Request<B>,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first_ip) = forwarded.split(',').next() {
            let first_ip = first_ip.trim();
            if !first_ip.is_empty() {
                return Some(first_ip.to_string());
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
    {
        return Some(real_ip.trim().to_string());
    }

    connect_info.map(|ci| ci.0.ip().to_string())
}

/// Reads the provider from the last segment of `/webhooks/{provider}`.
fn provider_from_path(path: &str) -> Option<BillingProvider> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| BillingProvider::from_str(segment).ok())
}

fn rate_limit_response(denied: &RateLimitDenied) -> Response {
    let body = ErrorResponse::with_details(
        "RATE_LIMITED",
        denied.message.clone(),
        serde_json::json!({
            "scope": denied.scope,
            "retry_after_secs": denied.retry_after_secs,
        }),
    );
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();

    let headers = response.headers_mut();
    headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(denied.limit));
    headers.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(0u32));
    headers.insert(header::RETRY_AFTER, HeaderValue::from(denied.retry_after_secs));

    response
}

fn add_rate_limit_headers(response: &mut Response, status: &RateLimitStatus) {
    let headers = response.headers_mut();
    headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(status.limit));
    headers.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(status.remaining));
    headers.insert(
        headers::X_RATELIMIT_RESET.clone(),
        HeaderValue::from(status.reset_at.as_unix_secs()),
    );
}
