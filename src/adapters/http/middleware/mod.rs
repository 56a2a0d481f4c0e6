//! HTTP middleware for axum.
//!
//! This module contains middleware layers for cross-cutting concerns:
//!
//! - `admin_auth` - Bearer-token guard for the operator API
//! - `rate_limit` - Webhook endpoint rate limiting

pub mod admin_auth;
pub mod rate_limit;

pub use admin_auth::{require_admin_token, AdminToken};
pub use rate_limit::{webhook_rate_limit, RateLimiterState};
