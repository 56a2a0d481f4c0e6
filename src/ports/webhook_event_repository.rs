//! WebhookEventRepository port - durable queue of inbound provider webhooks.
//!
//! Providers deliver webhooks at least once and may deliver the same event
//! concurrently. Implementations enforce uniqueness of
//! `(provider, external_event_id)` with a database constraint so that
//! `insert_if_absent` is race-free, and claim rows atomically so that a row
//! is processed by at most one worker at a time.

use async_trait::async_trait;

use crate::domain::billing::{BillingProvider, WebhookEvent, WebhookEventStatus};
use crate::domain::foundation::{DomainError, Timestamp, WebhookEventId};

/// Result of attempting to insert a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted (first time seeing this event).
    Inserted,
    /// Record already exists (duplicate delivery).
    AlreadyExists,
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Inserts a new pending event.
    ///
    /// Uses `ON CONFLICT DO NOTHING` semantics on the idempotency key.
    async fn insert_if_absent(&self, event: &WebhookEvent) -> Result<SaveResult, DomainError>;

    async fn find_by_id(&self, id: WebhookEventId) -> Result<Option<WebhookEvent>, DomainError>;

    async fn find_by_external_id(
        &self,
        provider: BillingProvider,
        external_event_id: &str,
    ) -> Result<Option<WebhookEvent>, DomainError>;

    /// Atomically claims up to `limit` due pending events.
    ///
    /// Claimed rows are returned in `processing` status with `attempts`
    /// already incremented. Rows locked by another worker are skipped.
    async fn claim_due(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError>;

    /// Persists the mutable processing fields of an event.
    async fn update(&self, event: &WebhookEvent) -> Result<(), DomainError>;

    /// Returns `processing` rows claimed before `claimed_before` to `pending`.
    ///
    /// Recovers events held by a worker that died mid-batch. A row whose lost
    /// claim was attempt `max_attempts` goes to `failed` instead.
    async fn reclaim_stale(
        &self,
        claimed_before: Timestamp,
        max_attempts: u32,
    ) -> Result<u64, DomainError>;

    /// Lists events in a status, oldest first.
    async fn list_by_status(
        &self,
        status: WebhookEventStatus,
        limit: u32,
    ) -> Result<Vec<WebhookEvent>, DomainError>;

    /// Deletes `processed` and `ignored` events received before the timestamp.
    ///
    /// Failed events are kept until an operator deals with them.
    async fn delete_before(&self, received_before: Timestamp) -> Result<u64, DomainError>;
}
