//! HTTP DTOs for the webhook and operator endpoints.
//!
//! These types decouple the HTTP API from domain types and control what the
//! operator API exposes. Webhook payloads are never echoed back.

use serde::{Deserialize, Serialize};

use crate::application::{DeleteCatalogEntityResult, SyncOutcome, SyncReport, SyncStatus};
use crate::domain::billing::{
    BillingProvider, DeletionOutboxEntry, EntityType, OutboxStatus, WebhookEvent,
    WebhookEventStatus,
};
use crate::domain::foundation::Timestamp;

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 500;

// ════════════════════════════════════════════════════════════════════════════════
// Webhook ingress
// ════════════════════════════════════════════════════════════════════════════════

/// Body returned to the provider after a delivery is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookAck {
    /// `accepted` or `duplicate`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl WebhookAck {
    pub fn accepted(event_id: impl ToString) -> Self {
        Self {
            status: "accepted".to_string(),
            event_id: Some(event_id.to_string()),
        }
    }

    pub fn duplicate() -> Self {
        Self {
            status: "duplicate".to_string(),
            event_id: None,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Operator queries
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

impl ListQuery {
    /// Requested page size, clamped to `1..=MAX_LIST_LIMIT`.
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

/// A stored webhook event without its payload.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEventView {
    pub id: String,
    pub provider: BillingProvider,
    pub external_event_id: String,
    pub event_type: String,
    pub status: WebhookEventStatus,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub received_at: Timestamp,
    pub next_attempt_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

impl From<WebhookEvent> for WebhookEventView {
    fn from(event: WebhookEvent) -> Self {
        Self {
            id: event.id.to_string(),
            provider: event.provider,
            external_event_id: event.external_event_id,
            event_type: event.event_type,
            status: event.status,
            attempts: event.attempts,
            error_message: event.error_message,
            received_at: event.received_at,
            next_attempt_at: event.next_attempt_at,
            processed_at: event.processed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboxEntryView {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub provider: BillingProvider,
    pub external_id: String,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<DeletionOutboxEntry> for OutboxEntryView {
    fn from(entry: DeletionOutboxEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            entity_type: entry.entity_type,
            entity_id: entry.entity_id.to_string(),
            provider: entry.provider,
            external_id: entry.external_id,
            status: entry.status,
            attempts: entry.attempts,
            max_attempts: entry.max_attempts,
            last_error: entry.last_error,
            next_attempt_at: entry.next_attempt_at,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Catalog commands
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncCounts {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub unsupported: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReportResponse {
    pub summary: SyncCounts,
    pub outcomes: Vec<SyncOutcome>,
}

impl From<SyncReport> for SyncReportResponse {
    fn from(report: SyncReport) -> Self {
        let summary = SyncCounts {
            created: report.count(SyncStatus::Created),
            updated: report.count(SyncStatus::Updated),
            unchanged: report.count(SyncStatus::Unchanged),
            unsupported: report.count(SyncStatus::Unsupported),
            skipped: report.count(SyncStatus::Skipped),
            failed: report.count(SyncStatus::Failed),
        };
        Self {
            summary,
            outcomes: report.outcomes,
        }
    }
}

/// Result of a local delete: the remote archives that were queued.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub remote_archives: Vec<OutboxEntryView>,
}

impl From<DeleteCatalogEntityResult> for DeleteResponse {
    fn from(result: DeleteCatalogEntityResult) -> Self {
        Self {
            deleted: true,
            remote_archives: result.enqueued.into_iter().map(OutboxEntryView::from).collect(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
