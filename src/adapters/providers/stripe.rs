//! Stripe provider adapter.
//!
//! Webhooks are verified with the `Stripe-Signature` scheme and translated
//! from `customer.subscription.*` and `invoice.*` events. Catalog writes use
//! the form-encoded REST API with basic auth and an `Idempotency-Key` so a
//! retried create never produces a duplicate remote object.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key, webhook_secret).with_require_livemode(true);
//! let adapter = StripeProviderAdapter::new(config);
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::billing::{
    BillingEvent, BillingProvider, InvoiceSnapshot, InvoiceStatus, Price, Product,
    StripeSignatureVerifier, SubscriptionSnapshot, SubscriptionStatus, WebhookEnvelope,
    WebhookError, WebhookEvent,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{ProviderAdapter, ProviderError};

use super::support::{decode, error_from_response, network_error, team_id_from, unix_timestamp};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for the Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Reject test-mode events.
    require_livemode: bool,
}

impl StripeConfig {
    pub fn new(api_key: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            api_key,
            webhook_secret,
            api_base_url: "https://api.stripe.com".to_string(),
            require_livemode: false,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

pub struct StripeProviderAdapter {
    config: StripeConfig,
    verifier: StripeSignatureVerifier,
    http_client: reqwest::Client,
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook shapes
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct StripeEventHeader {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default = "default_livemode")]
    livemode: bool,
}

fn default_livemode() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    customer: Option<String>,
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    items: Option<StripeList<StripeSubscriptionItem>>,
    #[serde(default)]
    metadata: Value,
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    price: StripePriceRef,
}

#[derive(Debug, Deserialize)]
struct StripePriceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeInvoice {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    amount_paid: i64,
    #[serde(default)]
    amount_due: i64,
    currency: String,
    #[serde(default)]
    metadata: Value,
    subscription_details: Option<StripeSubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionDetails {
    #[serde(default)]
    metadata: Value,
}

#[derive(Debug, Deserialize)]
struct StripeObjectId {
    id: String,
}

impl StripeProviderAdapter {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            verifier: StripeSignatureVerifier::new(config.webhook_secret.clone()),
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn map_subscription_status(status: &str) -> SubscriptionStatus {
        match status {
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "paused" => SubscriptionStatus::Paused,
            "canceled" => SubscriptionStatus::Canceled,
            "incomplete_expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    fn translate_subscription(
        &self,
        event_type: &str,
        object: &Value,
        occurred_at: Timestamp,
    ) -> Result<BillingEvent, WebhookError> {
        let sub: StripeSubscription = decode(object, "subscription")?;

        // A deleted subscription may still report its last live status.
        let status = if event_type == "customer.subscription.deleted" {
            SubscriptionStatus::Canceled
        } else {
            Self::map_subscription_status(&sub.status)
        };

        Ok(BillingEvent::SubscriptionChanged(SubscriptionSnapshot {
            external_price_id: sub
                .items
                .and_then(|items| items.data.into_iter().next())
                .map(|item| item.price.id),
            external_id: sub.id,
            external_customer_id: sub.customer,
            status,
            current_period_end: unix_timestamp(sub.current_period_end),
            cancel_at_period_end: sub.cancel_at_period_end,
            team_id: team_id_from(Some(&sub.metadata)),
            occurred_at,
        }))
    }

    fn translate_invoice(
        &self,
        event_type: &str,
        object: &Value,
        occurred_at: Timestamp,
    ) -> Result<BillingEvent, WebhookError> {
        let status = match event_type {
            "invoice.paid" | "invoice.payment_succeeded" => InvoiceStatus::Paid,
            "invoice.payment_failed" => InvoiceStatus::PaymentFailed,
            "invoice.voided" => InvoiceStatus::Void,
            "invoice.finalized" => InvoiceStatus::Open,
            other => return Ok(BillingEvent::Ignored(other.to_string())),
        };
        let invoice: StripeInvoice = decode(object, "invoice")?;

        let team_id = team_id_from(Some(&invoice.metadata)).or_else(|| {
            invoice
                .subscription_details
                .as_ref()
                .and_then(|d| team_id_from(Some(&d.metadata)))
        });
        let amount_minor = match status {
            InvoiceStatus::Paid => invoice.amount_paid,
            _ => invoice.amount_due,
        };

        Ok(BillingEvent::InvoiceRecorded(InvoiceSnapshot {
            external_id: invoice.id,
            external_subscription_id: invoice.subscription,
            external_customer_id: invoice.customer,
            amount_minor,
            currency: invoice.currency.to_ascii_lowercase(),
            status,
            team_id,
            occurred_at,
        }))
    }

    /// Sends a form-encoded POST and returns the created/updated object id.
    async fn post_form(
        &self,
        operation: &'static str,
        path: &str,
        params: &[(&str, String)],
        idempotency_key: Option<String>,
    ) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.config.api_base_url, path);

        let mut request = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await.map_err(network_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(BillingProvider::Stripe, operation, response).await);
        }

        let object: StripeObjectId = response.json().await.map_err(|e| {
            ProviderError::network(format!("Failed to parse Stripe response: {}", e))
        })?;
        Ok(object.id)
    }

    fn product_params(product: &Product) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("name", product.name.clone()),
            ("active", product.active.to_string()),
            ("metadata[local_id]", product.id.to_string()),
        ];
        if let Some(description) = &product.description {
            params.push(("description", description.clone()));
        }
        params
    }
}

#[async_trait]
impl ProviderAdapter for StripeProviderAdapter {
    fn provider(&self) -> BillingProvider {
        BillingProvider::Stripe
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        let header = signature.ok_or(WebhookError::MissingSignature(SIGNATURE_HEADER))?;
        self.verifier.verify(payload, header).map_err(|e| {
            tracing::warn!(provider = "stripe", error = %e, "Webhook signature rejected");
            e
        })
    }

    fn parse_envelope(&self, payload: &Value) -> Result<WebhookEnvelope, WebhookError> {
        let header: StripeEventHeader = decode(payload, "event")?;

        if self.config.require_livemode && !header.livemode {
            tracing::warn!(event_id = %header.id, "Rejected test mode event in production");
            return Err(WebhookError::TestModeRejected);
        }

        Ok(WebhookEnvelope {
            external_event_id: header.id,
            event_type: header.event_type,
            livemode: header.livemode,
        })
    }

    fn translate(&self, event: &WebhookEvent) -> Result<BillingEvent, WebhookError> {
        let occurred_at = unix_timestamp(event.payload.get("created").and_then(Value::as_i64))
            .unwrap_or(event.received_at);
        let object = event
            .payload
            .get("data")
            .and_then(|d| d.get("object"))
            .ok_or(WebhookError::MissingField("data.object"))?;

        match event.event_type.as_str() {
            t if t.starts_with("customer.subscription.") && t != "customer.subscription.trial_will_end" => {
                self.translate_subscription(t, object, occurred_at)
            }
            t if t.starts_with("invoice.") => self.translate_invoice(t, object, occurred_at),
            other => Ok(BillingEvent::Ignored(other.to_string())),
        }
    }

    async fn create_product(&self, product: &Product) -> Result<String, ProviderError> {
        let key = format!("product-{}-{}", product.id, product.fingerprint());
        self.post_form("create_product", "/v1/products", &Self::product_params(product), Some(key))
            .await
    }

    async fn update_product(&self, external_id: &str, product: &Product) -> Result<(), ProviderError> {
        let path = format!("/v1/products/{}", external_id);
        self.post_form("update_product", &path, &Self::product_params(product), None)
            .await
            .map(|_| ())
    }

    async fn create_price(&self, price: &Price, external_product_id: &str) -> Result<String, ProviderError> {
        let mut params = vec![
            ("product", external_product_id.to_string()),
            ("unit_amount", price.unit_amount.to_string()),
            ("currency", price.currency.clone()),
            ("metadata[local_id]", price.id.to_string()),
        ];
        if price.interval.is_recurring() {
            params.push(("recurring[interval]", price.interval.as_str().to_string()));
        }

        let key = format!("price-{}-{}", price.id, price.fingerprint());
        self.post_form("create_price", "/v1/prices", &params, Some(key)).await
    }

    async fn archive_product(&self, external_id: &str) -> Result<(), ProviderError> {
        let path = format!("/v1/products/{}", external_id);
        self.post_form("archive_product", &path, &[("active", "false".to_string())], None)
            .await
            .map(|_| ())
    }

    async fn archive_price(&self, external_id: &str) -> Result<(), ProviderError> {
        let path = format!("/v1/prices/{}", external_id);
        self.post_form("archive_price", &path, &[("active", "false".to_string())], None)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::stripe_test_header;
    use crate::domain::foundation::TeamId;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    fn adapter(require_livemode: bool) -> StripeProviderAdapter {
        StripeProviderAdapter::new(
            StripeConfig::new(SecretString::new("sk_test".into()), SecretString::new(SECRET.into()))
                .with_require_livemode(require_livemode),
        )
    }

    fn stored(payload: Value) -> WebhookEvent {
        let envelope = adapter(false).parse_envelope(&payload).unwrap();
        WebhookEvent::received(BillingProvider::Stripe, envelope, payload)
    }

    #[test]
    fn verifies_current_signature() {
        let body = r#"{"id":"evt_1","type":"invoice.paid"}"#;
        let header = stripe_test_header(SECRET, chrono::Utc::now().timestamp(), body);
        assert!(adapter(false).verify_webhook(body.as_bytes(), Some(&header)).is_ok());
    }

    #[test]
    fn missing_signature_is_rejected() {
        assert!(matches!(
            adapter(false).verify_webhook(b"{}", None),
            Err(WebhookError::MissingSignature("stripe-signature"))
        ));
    }

    #[test]
    fn livemode_required_rejects_test_events() {
        let payload = json!({ "id": "evt_1", "type": "invoice.paid", "livemode": false });
        assert!(matches!(
            adapter(true).parse_envelope(&payload),
            Err(WebhookError::TestModeRejected)
        ));
        assert!(adapter(false).parse_envelope(&payload).is_ok());
    }

    #[test]
    fn translates_subscription_update() {
        let team = TeamId::new();
        let event = stored(json!({
            "id": "evt_1",
            "type": "customer.subscription.updated",
            "created": 1_700_000_000,
            "data": { "object": {
                "id": "sub_1",
                "customer": "cus_1",
                "status": "unpaid",
                "current_period_end": 1_702_000_000,
                "cancel_at_period_end": true,
                "items": { "data": [ { "price": { "id": "price_9" } } ] },
                "metadata": { "team_id": team.to_string() }
            }}
        }));

        let BillingEvent::SubscriptionChanged(snapshot) = adapter(false).translate(&event).unwrap() else {
            panic!("expected subscription event");
        };
        assert_eq!(snapshot.external_id, "sub_1");
        assert_eq!(snapshot.status, SubscriptionStatus::PastDue);
        assert_eq!(snapshot.external_price_id.as_deref(), Some("price_9"));
        assert_eq!(snapshot.team_id, Some(team));
        assert!(snapshot.cancel_at_period_end);
        assert_eq!(snapshot.occurred_at.as_unix_secs(), 1_700_000_000);
    }

    #[test]
    fn deleted_subscription_is_canceled() {
        let event = stored(json!({
            "id": "evt_2",
            "type": "customer.subscription.deleted",
            "created": 1_700_000_000,
            "data": { "object": { "id": "sub_1", "status": "active" } }
        }));
        let BillingEvent::SubscriptionChanged(snapshot) = adapter(false).translate(&event).unwrap() else {
            panic!("expected subscription event");
        };
        assert_eq!(snapshot.status, SubscriptionStatus::Canceled);
    }

    #[test]
    fn translates_failed_invoice_with_amount_due() {
        let event = stored(json!({
            "id": "evt_3",
            "type": "invoice.payment_failed",
            "created": 1_700_000_000,
            "data": { "object": {
                "id": "in_1",
                "subscription": "sub_1",
                "amount_paid": 0,
                "amount_due": 1999,
                "currency": "USD"
            }}
        }));
        let BillingEvent::InvoiceRecorded(snapshot) = adapter(false).translate(&event).unwrap() else {
            panic!("expected invoice event");
        };
        assert_eq!(snapshot.status, InvoiceStatus::PaymentFailed);
        assert_eq!(snapshot.amount_minor, 1999);
        assert_eq!(snapshot.currency, "usd");
        assert_eq!(snapshot.external_subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn unhandled_types_are_ignored() {
        let event = stored(json!({
            "id": "evt_4",
            "type": "customer.created",
            "data": { "object": {} }
        }));
        assert_eq!(
            adapter(false).translate(&event).unwrap(),
            BillingEvent::Ignored("customer.created".to_string())
        );
    }

    #[test]
    fn malformed_object_is_parse_error() {
        let event = stored(json!({
            "id": "evt_5",
            "type": "customer.subscription.created",
            "data": { "object": { "status": "active" } }
        }));
        assert!(matches!(
            adapter(false).translate(&event),
            Err(WebhookError::ParseError(_))
        ));
    }
}
