//! Mock provider adapter for testing.
//!
//! Supports:
//! - Scripted translations per event id
//! - Error injection per catalog method (once or always)
//! - Call tracking
//!
//! Webhook signatures are accepted when the header equals `MOCK_SIGNATURE`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::billing::{
    BillingEvent, BillingProvider, Price, Product, WebhookEnvelope, WebhookError, WebhookEvent,
};
use crate::ports::{ProviderAdapter, ProviderError};

/// Signature header value the mock accepts.
pub const MOCK_SIGNATURE: &str = "mock-valid-signature";

/// Recorded catalog call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: &'static str,
    pub args: Vec<String>,
}

#[derive(Default)]
struct MockState {
    translations: HashMap<String, Result<BillingEvent, WebhookError>>,
    queued_errors: HashMap<&'static str, VecDeque<ProviderError>>,
    permanent_errors: HashMap<&'static str, ProviderError>,
    call_log: Vec<MethodCall>,
    next_id: u32,
}

/// Configurable stand-in for a real provider adapter.
#[derive(Clone)]
pub struct MockProviderAdapter {
    provider: BillingProvider,
    supports_catalog: bool,
    inner: Arc<Mutex<MockState>>,
}

impl MockProviderAdapter {
    pub fn new(provider: BillingProvider) -> Self {
        Self {
            provider,
            supports_catalog: true,
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A mock whose catalog API is unavailable, like LemonSqueezy.
    pub fn without_catalog(provider: BillingProvider) -> Self {
        Self {
            supports_catalog: false,
            ..Self::new(provider)
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Sets what `translate` returns for an event id. Unscripted events are ignored.
    pub fn set_translation(&self, external_event_id: &str, result: Result<BillingEvent, WebhookError>) {
        self.state()
            .translations
            .insert(external_event_id.to_string(), result);
    }

    /// Fails the next call of `method` with `error`.
    pub fn fail_next(&self, method: &'static str, error: ProviderError) {
        self.state()
            .queued_errors
            .entry(method)
            .or_default()
            .push_back(error);
    }

    /// Fails every call of `method` with `error`.
    pub fn fail_always(&self, method: &'static str, error: ProviderError) {
        self.state().permanent_errors.insert(method, error);
    }

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.state().call_log.iter().filter(|c| c.method == method).count()
    }

    fn record(&self, method: &'static str, args: Vec<String>) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.call_log.push(MethodCall { method, args });
        if let Some(err) = state.queued_errors.get_mut(method).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        if let Some(err) = state.permanent_errors.get(method) {
            return Err(err.clone());
        }
        Ok(())
    }

    fn next_external_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        format!("{}_{}_{}", self.provider.as_str(), prefix, state.next_id)
    }

    fn catalog_guard(&self) -> Result<(), ProviderError> {
        if self.supports_catalog {
            Ok(())
        } else {
            Err(ProviderError::unsupported(format!(
                "{} catalog is managed in the provider dashboard",
                self.provider
            )))
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn provider(&self) -> BillingProvider {
        self.provider
    }

    fn signature_header(&self) -> &'static str {
        "x-mock-signature"
    }

    fn verify_webhook(&self, _payload: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        match signature {
            None => Err(WebhookError::MissingSignature("x-mock-signature")),
            Some(MOCK_SIGNATURE) => Ok(()),
            Some(_) => Err(WebhookError::InvalidSignature),
        }
    }

    fn parse_envelope(&self, payload: &serde_json::Value) -> Result<WebhookEnvelope, WebhookError> {
        let external_event_id = payload
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or(WebhookError::MissingField("id"))?;
        let event_type = payload
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(WebhookError::MissingField("type"))?;
        Ok(WebhookEnvelope {
            external_event_id: external_event_id.to_string(),
            event_type: event_type.to_string(),
            livemode: payload.get("livemode").and_then(|v| v.as_bool()).unwrap_or(true),
        })
    }

    fn translate(&self, event: &WebhookEvent) -> Result<BillingEvent, WebhookError> {
        self.state()
            .translations
            .get(&event.external_event_id)
            .cloned()
            .unwrap_or_else(|| Ok(BillingEvent::Ignored(event.event_type.clone())))
    }

    fn supports_catalog_writes(&self) -> bool {
        self.supports_catalog
    }

    async fn create_product(&self, product: &Product) -> Result<String, ProviderError> {
        self.catalog_guard()?;
        self.record("create_product", vec![product.id.to_string()])?;
        Ok(self.next_external_id("prod"))
    }

    async fn update_product(&self, external_id: &str, product: &Product) -> Result<(), ProviderError> {
        self.catalog_guard()?;
        self.record("update_product", vec![external_id.to_string(), product.id.to_string()])
    }

    async fn create_price(&self, price: &Price, external_product_id: &str) -> Result<String, ProviderError> {
        self.catalog_guard()?;
        self.record(
            "create_price",
            vec![price.id.to_string(), external_product_id.to_string()],
        )?;
        Ok(self.next_external_id("price"))
    }

    async fn archive_product(&self, external_id: &str) -> Result<(), ProviderError> {
        self.catalog_guard()?;
        self.record("archive_product", vec![external_id.to_string()])
    }

    async fn archive_price(&self, external_id: &str) -> Result<(), ProviderError> {
        self.catalog_guard()?;
        self.record("archive_price", vec![external_id.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fail_next_fails_once() {
        let mock = MockProviderAdapter::new(BillingProvider::Stripe);
        mock.fail_next("archive_price", ProviderError::network("reset"));

        assert!(mock.archive_price("price_1").await.is_err());
        assert!(mock.archive_price("price_1").await.is_ok());
        assert_eq!(mock.calls_to("archive_price"), 2);
    }

    #[tokio::test]
    async fn without_catalog_returns_unsupported() {
        let mock = MockProviderAdapter::without_catalog(BillingProvider::LemonSqueezy);
        let product = Product::new("Pro", None).unwrap();
        let err = mock.create_product(&product).await.unwrap_err();
        assert_eq!(err.code, crate::ports::ProviderErrorCode::Unsupported);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn verify_accepts_only_mock_signature() {
        let mock = MockProviderAdapter::new(BillingProvider::Paddle);
        assert!(mock.verify_webhook(b"{}", Some(MOCK_SIGNATURE)).is_ok());
        assert!(matches!(
            mock.verify_webhook(b"{}", Some("nope")),
            Err(WebhookError::InvalidSignature)
        ));
        assert!(matches!(
            mock.verify_webhook(b"{}", None),
            Err(WebhookError::MissingSignature(_))
        ));
    }
}
