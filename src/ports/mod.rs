//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing pipeline and the outside world. Adapters implement these ports.
//!
//! ## Queue Ports
//!
//! - `WebhookEventRepository` - Durable, idempotent webhook inbox
//! - `DeletionOutboxRepository` - Deferred remote archive operations
//!
//! ## Billing State Ports
//!
//! - `CatalogRepository` - Local products and prices
//! - `ProviderMappingRepository` - Local ids to provider ids
//! - `SubscriptionRepository` / `InvoiceRepository` - Mirrored provider state
//!
//! ## External Service Ports
//!
//! - `ProviderAdapter` - Provider webhooks and catalog API
//! - `EntitlementsNotifier` - Billing state change notifications
//! - `RateLimiter` - Webhook endpoint protection

mod catalog_repository;
mod deletion_outbox_repository;
mod entitlements_notifier;
mod invoice_repository;
mod provider_adapter;
mod provider_mapping_repository;
mod rate_limiter;
mod subscription_repository;
mod webhook_event_repository;

pub use catalog_repository::CatalogRepository;
pub use deletion_outbox_repository::DeletionOutboxRepository;
pub use entitlements_notifier::EntitlementsNotifier;
pub use invoice_repository::InvoiceRepository;
pub use provider_adapter::{ProviderAdapter, ProviderError, ProviderErrorCode, ProviderRegistry};
pub use provider_mapping_repository::ProviderMappingRepository;
pub use rate_limiter::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitScope,
    RateLimitStatus, RateLimiter,
};
pub use subscription_repository::SubscriptionRepository;
pub use webhook_event_repository::{SaveResult, WebhookEventRepository};
