//! Billing domain - provider sync, webhook lifecycle and deletion outbox.
//!
//! # Module Organization
//!
//! - `provider` - Supported payment providers
//! - `webhook_event` - Stored webhook record and its status machine
//! - `signature` - HMAC signature verification per provider
//! - `billing_event` - Provider-independent events produced by adapters
//! - `subscription` / `invoice` - Local mirrors of provider state
//! - `catalog` / `mapping` - Products, prices and their provider ids
//! - `deletion_outbox` - Deferred remote archive operations
//! - `retry_policy` - Bounded backoff shared by both queues

mod billing_event;
mod catalog;
mod deletion_outbox;
mod invoice;
mod mapping;
mod provider;
mod retry_policy;
mod signature;
mod subscription;
mod webhook_errors;
mod webhook_event;

pub use billing_event::{BillingEvent, InvoiceSnapshot, SubscriptionSnapshot};
pub use catalog::{BillingInterval, Price, Product};
pub use deletion_outbox::{DeletionOutboxEntry, OutboxStatus};
pub use invoice::{Invoice, InvoiceStatus};
pub use mapping::{EntityType, ProviderMapping};
pub use provider::BillingProvider;
pub use retry_policy::{RetryDecision, RetryPolicy};
pub use signature::{
    constant_time_compare, hmac_sha256, LemonSqueezySignatureVerifier, PaddleSignatureVerifier,
    SignatureHeader, StripeSignatureVerifier,
};
pub use subscription::{ApplyOutcome, Subscription, SubscriptionStatus};
pub use webhook_errors::WebhookError;
pub use webhook_event::{FailureOutcome, WebhookEnvelope, WebhookEvent, WebhookEventStatus};

#[cfg(test)]
pub use signature::{lemonsqueezy_test_header, paddle_test_header, stripe_test_header};
