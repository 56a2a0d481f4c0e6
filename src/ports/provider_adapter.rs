//! ProviderAdapter port - one implementation per payment provider.
//!
//! An adapter owns everything provider-specific: webhook signature format,
//! payload shapes, and the catalog API. The rest of the pipeline only sees
//! `WebhookEnvelope`, `BillingEvent` and external id strings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    BillingEvent, BillingProvider, Price, Product, WebhookEnvelope, WebhookError, WebhookEvent,
};
use crate::domain::foundation::{DomainError, ErrorCode};

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> BillingProvider;

    /// Name of the HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Verifies the signature of a raw webhook body.
    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<(), WebhookError>;

    /// Extracts the idempotency key and event type from a verified payload.
    fn parse_envelope(&self, payload: &serde_json::Value) -> Result<WebhookEnvelope, WebhookError>;

    /// Translates a stored event into a provider-independent billing event.
    fn translate(&self, event: &WebhookEvent) -> Result<BillingEvent, WebhookError>;

    /// False for providers whose catalog cannot be managed through the API.
    fn supports_catalog_writes(&self) -> bool {
        true
    }

    /// Creates the product remotely and returns its external id.
    async fn create_product(&self, product: &Product) -> Result<String, ProviderError>;

    async fn update_product(&self, external_id: &str, product: &Product) -> Result<(), ProviderError>;

    /// Creates a price under an already-synced product and returns its external id.
    async fn create_price(&self, price: &Price, external_product_id: &str) -> Result<String, ProviderError>;

    async fn archive_product(&self, external_id: &str) -> Result<(), ProviderError>;

    async fn archive_price(&self, external_id: &str) -> Result<(), ProviderError>;
}

/// Errors from provider API calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
    /// HTTP status returned by the provider, if a response was received.
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
        }
    }

    /// Classifies a non-success HTTP response.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let code = match status {
            401 | 403 => ProviderErrorCode::AuthenticationError,
            404 => ProviderErrorCode::NotFound,
            429 => ProviderErrorCode::RateLimitExceeded,
            400..=499 => ProviderErrorCode::InvalidRequest,
            500..=599 => ProviderErrorCode::ServerError,
            _ => ProviderErrorCode::Unknown,
        };
        Self {
            code,
            message: body.into(),
            status: Some(status),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(ProviderErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Unsupported, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.code, status, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for DomainError {
    fn from(err: ProviderError) -> Self {
        let code = match err.code {
            ProviderErrorCode::NotFound => ErrorCode::NotFound,
            ProviderErrorCode::RateLimitExceeded => ErrorCode::RateLimited,
            _ => ErrorCode::ExternalServiceError,
        };
        DomainError::new(code, err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    NetworkError,
    AuthenticationError,
    NotFound,
    RateLimitExceeded,
    InvalidRequest,
    ServerError,
    /// The provider does not offer this operation.
    Unsupported,
    Unknown,
}

impl ProviderErrorCode {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorCode::NetworkError
                | ProviderErrorCode::RateLimitExceeded
                | ProviderErrorCode::ServerError
        )
    }
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorCode::NetworkError => "network_error",
            ProviderErrorCode::AuthenticationError => "authentication_error",
            ProviderErrorCode::NotFound => "not_found",
            ProviderErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            ProviderErrorCode::InvalidRequest => "invalid_request",
            ProviderErrorCode::ServerError => "server_error",
            ProviderErrorCode::Unsupported => "unsupported",
            ProviderErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// The configured provider adapters, keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<BillingProvider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an adapter, replacing any previous one for the same provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider: BillingProvider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// Configured providers in a stable order.
    pub fn providers(&self) -> Vec<BillingProvider> {
        BillingProvider::ALL
            .into_iter()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }

    pub fn adapters(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.providers()
            .into_iter()
            .filter_map(|p| self.get(p))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_adapter_is_object_safe() {
        fn _accepts_dyn(_adapter: &dyn ProviderAdapter) {}
    }

    #[test]
    fn from_status_classifies_responses() {
        assert_eq!(ProviderError::from_status(401, "").code, ProviderErrorCode::AuthenticationError);
        assert_eq!(ProviderError::from_status(404, "").code, ProviderErrorCode::NotFound);
        assert_eq!(ProviderError::from_status(429, "").code, ProviderErrorCode::RateLimitExceeded);
        assert_eq!(ProviderError::from_status(422, "").code, ProviderErrorCode::InvalidRequest);
        assert_eq!(ProviderError::from_status(503, "").code, ProviderErrorCode::ServerError);
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ProviderError::network("reset").is_retryable());
        assert!(ProviderError::from_status(429, "").is_retryable());
        assert!(ProviderError::from_status(502, "").is_retryable());
        assert!(!ProviderError::from_status(400, "").is_retryable());
        assert!(!ProviderError::not_found("price").is_retryable());
        assert!(!ProviderError::unsupported("catalog").is_retryable());
    }

    #[test]
    fn display_includes_status_when_present() {
        let err = ProviderError::from_status(500, "boom");
        assert_eq!(err.to_string(), "server_error (500): boom");
    }

    #[test]
    fn converts_to_domain_error() {
        let err: DomainError = ProviderError::from_status(429, "slow down").into();
        assert_eq!(err.code, ErrorCode::RateLimited);
    }
}
