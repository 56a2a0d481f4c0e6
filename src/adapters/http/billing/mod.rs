//! Billing HTTP adapter.
//!
//! Exposes provider webhook ingress and the operator API.

pub mod dto;
mod handlers;
mod routes;

pub use handlers::{BillingApiError, BillingAppState, WebhookApiError};
pub use routes::{admin_routes, billing_router, webhook_routes, HttpSettings};
