//! HTTP adapters - REST API implementations.
//!
//! - `billing` - Webhook ingress, operator API and the application router
//! - `middleware` - Admin authentication and webhook rate limiting

pub mod billing;
pub mod middleware;

pub use billing::{billing_router, BillingAppState, HttpSettings};
