//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresWebhookEventRepository` - Idempotent webhook inbox with row claims
//! - `PostgresCatalogRepository` - Products and prices, transactional deletes
//! - `PostgresDeletionOutboxRepository` - Remote archive queue
//! - `PostgresProviderMappingRepository` - Local to provider id mapping
//! - `PostgresSubscriptionRepository` / `PostgresInvoiceRepository` - Mirrored state
//!
//! Queries use the runtime-checked `sqlx::query` API; the schema lives in
//! `migrations/` and is applied at startup.

mod catalog_repository;
mod deletion_outbox_repository;
mod invoice_repository;
mod provider_mapping_repository;
mod subscription_repository;
mod webhook_event_repository;

pub use catalog_repository::PostgresCatalogRepository;
pub use deletion_outbox_repository::PostgresDeletionOutboxRepository;
pub use invoice_repository::PostgresInvoiceRepository;
pub use provider_mapping_repository::PostgresProviderMappingRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Decodes a text column into a domain enum.
fn parse_column<T>(
    column: &str,
    value: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, DomainError> {
    parse(value).ok_or_else(|| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid {} value: {}", column, value),
        )
    })
}

/// Converts a caller-supplied limit to the `BIGINT` Postgres expects.
fn to_count(limit: u32) -> i64 {
    i64::from(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::WebhookEventStatus;

    #[test]
    fn parse_column_decodes_known_values() {
        let status = parse_column("status", "pending", WebhookEventStatus::parse).unwrap();
        assert_eq!(status, WebhookEventStatus::Pending);
    }

    #[test]
    fn parse_column_rejects_unknown_values() {
        let err = parse_column("status", "bogus", WebhookEventStatus::parse).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(err.message.contains("bogus"));
    }
}
