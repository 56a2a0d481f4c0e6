//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing pipeline to external systems:
//! - `postgres` - Durable queues, catalog and mirrored billing state
//! - `memory` - In-memory repositories for tests and local runs
//! - `providers` - Stripe, Paddle and LemonSqueezy clients
//! - `entitlements` - Entitlements change notification (Redis, logging)
//! - `rate_limiter` - Webhook rate limiting (Redis, in-memory)
//! - `http` - Axum routes for webhook ingress and the operator API
//! - `workers` - Queue pollers and periodic jobs

pub mod entitlements;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod providers;
pub mod rate_limiter;
pub mod workers;

pub use workers::{spawn_workers, WorkerDeps};
