//! Webhook error types for provider webhook handling.
//!
//! Defines all error conditions that can occur during webhook ingress and
//! processing, with HTTP status code mapping and retryability semantics.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

use super::BillingProvider;

/// Errors that occur during webhook ingress or processing.
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    /// Path segment does not name a supported provider.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider is supported but has no credentials configured.
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(BillingProvider),

    /// Signature header is absent.
    #[error("Missing signature header: {0}")]
    MissingSignature(&'static str),

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is outside the acceptable window (5 minutes).
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required metadata field missing from webhook event.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Required field missing from webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Test-mode event delivered to a live-mode endpoint.
    #[error("Test mode event rejected")]
    TestModeRejected,

    /// Event references a local record that does not exist yet.
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    /// Event was intentionally ignored (not an error condition).
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Storage operation failed (Redis/cache).
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl WebhookError {
    /// Returns true if processing this event again may succeed.
    ///
    /// Retryable errors indicate temporary failures: infrastructure outages
    /// or events that arrived before the record they reference.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Database(_)
                | WebhookError::StorageError(_)
                | WebhookError::UnresolvedReference(_)
        )
    }

    /// Maps the error to an appropriate HTTP status code.
    ///
    /// Providers retry deliveries on 5xx and stop on 2xx/4xx.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::UnknownProvider(_) | WebhookError::ProviderNotConfigured(_) => {
                StatusCode::NOT_FOUND
            }

            WebhookError::MissingSignature(_)
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange => StatusCode::UNAUTHORIZED,

            WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::MissingMetadata(_)
            | WebhookError::MissingField(_)
            | WebhookError::TestModeRejected => StatusCode::BAD_REQUEST,

            WebhookError::Ignored(_) => StatusCode::OK,

            WebhookError::UnresolvedReference(_)
            | WebhookError::Database(_)
            | WebhookError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            WebhookError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            WebhookError::ProviderNotConfigured(_) => "PROVIDER_NOT_CONFIGURED",
            WebhookError::MissingSignature(_) => "MISSING_SIGNATURE",
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::TimestampOutOfRange => "TIMESTAMP_OUT_OF_RANGE",
            WebhookError::InvalidTimestamp => "INVALID_TIMESTAMP",
            WebhookError::ParseError(_) => "PARSE_ERROR",
            WebhookError::MissingMetadata(_) => "MISSING_METADATA",
            WebhookError::MissingField(_) => "MISSING_FIELD",
            WebhookError::TestModeRejected => "TEST_MODE_REJECTED",
            WebhookError::UnresolvedReference(_) => "UNRESOLVED_REFERENCE",
            WebhookError::Ignored(_) => "IGNORED",
            WebhookError::Database(_) => "DATABASE_ERROR",
            WebhookError::StorageError(_) => "STORAGE_ERROR",
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::CacheError => WebhookError::StorageError(err.to_string()),
            _ => WebhookError::Database(err.to_string()),
        }
    }
}
