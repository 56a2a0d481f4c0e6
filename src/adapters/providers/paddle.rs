//! Paddle Billing provider adapter.
//!
//! Webhooks carry a `Paddle-Signature: ts=...;h1=...` header. Subscription
//! events map to `SubscriptionChanged`; transaction events map to
//! `InvoiceRecorded`. Catalog writes use the JSON API with bearer auth, and
//! archiving is a `PATCH` to `status = archived`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::billing::{
    BillingEvent, BillingInterval, BillingProvider, InvoiceSnapshot, InvoiceStatus,
    PaddleSignatureVerifier, Price, Product, SubscriptionSnapshot, SubscriptionStatus,
    WebhookEnvelope, WebhookError, WebhookEvent,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{ProviderAdapter, ProviderError};

use super::support::{decode, error_from_response, network_error, rfc3339_timestamp, team_id_from};

const SIGNATURE_HEADER: &str = "paddle-signature";

/// Paddle API configuration.
#[derive(Clone)]
pub struct PaddleConfig {
    api_key: SecretString,
    webhook_secret: SecretString,
    /// `https://api.paddle.com`, or `https://sandbox-api.paddle.com` for sandbox accounts.
    api_base_url: String,
}

impl PaddleConfig {
    pub fn new(api_key: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            api_key,
            webhook_secret,
            api_base_url: "https://api.paddle.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

pub struct PaddleProviderAdapter {
    config: PaddleConfig,
    verifier: PaddleSignatureVerifier,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PaddleEventHeader {
    event_id: String,
    event_type: String,
}

#[derive(Debug, Deserialize)]
struct PaddleSubscription {
    id: String,
    status: String,
    customer_id: Option<String>,
    #[serde(default)]
    items: Vec<PaddleItem>,
    current_billing_period: Option<PaddlePeriod>,
    scheduled_change: Option<PaddleScheduledChange>,
    #[serde(default)]
    custom_data: Value,
}

#[derive(Debug, Deserialize)]
struct PaddleItem {
    price: PaddlePriceRef,
}

#[derive(Debug, Deserialize)]
struct PaddlePriceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PaddlePeriod {
    ends_at: String,
}

#[derive(Debug, Deserialize)]
struct PaddleScheduledChange {
    action: String,
}

#[derive(Debug, Deserialize)]
struct PaddleTransaction {
    id: String,
    subscription_id: Option<String>,
    customer_id: Option<String>,
    currency_code: String,
    details: PaddleTransactionDetails,
    #[serde(default)]
    custom_data: Value,
}

#[derive(Debug, Deserialize)]
struct PaddleTransactionDetails {
    totals: PaddleTotals,
}

#[derive(Debug, Deserialize)]
struct PaddleTotals {
    /// Paddle sends amounts as decimal strings in minor units.
    grand_total: String,
}

#[derive(Debug, Deserialize)]
struct PaddleEntity {
    data: PaddleEntityId,
}

#[derive(Debug, Deserialize)]
struct PaddleEntityId {
    id: String,
}

impl PaddleProviderAdapter {
    pub fn new(config: PaddleConfig) -> Self {
        Self {
            verifier: PaddleSignatureVerifier::new(config.webhook_secret.clone()),
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn map_subscription_status(status: &str) -> SubscriptionStatus {
        match status {
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "paused" => SubscriptionStatus::Paused,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    fn translate_subscription(&self, data: &Value, occurred_at: Timestamp) -> Result<BillingEvent, WebhookError> {
        let sub: PaddleSubscription = decode(data, "subscription")?;

        Ok(BillingEvent::SubscriptionChanged(SubscriptionSnapshot {
            external_price_id: sub.items.into_iter().next().map(|item| item.price.id),
            status: Self::map_subscription_status(&sub.status),
            current_period_end: sub
                .current_billing_period
                .as_ref()
                .and_then(|p| rfc3339_timestamp(Some(&p.ends_at))),
            cancel_at_period_end: sub
                .scheduled_change
                .as_ref()
                .is_some_and(|c| c.action == "cancel"),
            team_id: team_id_from(Some(&sub.custom_data)),
            external_id: sub.id,
            external_customer_id: sub.customer_id,
            occurred_at,
        }))
    }

    fn translate_transaction(
        &self,
        event_type: &str,
        data: &Value,
        occurred_at: Timestamp,
    ) -> Result<BillingEvent, WebhookError> {
        let status = match event_type {
            "transaction.completed" | "transaction.paid" => InvoiceStatus::Paid,
            "transaction.payment_failed" => InvoiceStatus::PaymentFailed,
            other => return Ok(BillingEvent::Ignored(other.to_string())),
        };
        let txn: PaddleTransaction = decode(data, "transaction")?;
        let amount_minor = txn
            .details
            .totals
            .grand_total
            .parse::<i64>()
            .map_err(|_| WebhookError::ParseError(format!("invalid grand_total '{}'", txn.details.totals.grand_total)))?;

        Ok(BillingEvent::InvoiceRecorded(InvoiceSnapshot {
            team_id: team_id_from(Some(&txn.custom_data)),
            external_id: txn.id,
            external_subscription_id: txn.subscription_id,
            external_customer_id: txn.customer_id,
            amount_minor,
            currency: txn.currency_code.to_ascii_lowercase(),
            status,
            occurred_at,
        }))
    }

    async fn send(
        &self,
        operation: &'static str,
        method: reqwest::Method,
        path: &str,
        body: Value,
    ) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.config.api_base_url, path);

        let response = self
            .http_client
            .request(method, &url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(BillingProvider::Paddle, operation, response).await);
        }

        let entity: PaddleEntity = response.json().await.map_err(|e| {
            ProviderError::network(format!("Failed to parse Paddle response: {}", e))
        })?;
        Ok(entity.data.id)
    }

    fn product_body(product: &Product) -> Value {
        json!({
            "name": product.name,
            "description": product.description,
            "tax_category": "standard",
            "status": if product.active { "active" } else { "archived" },
            "custom_data": { "local_id": product.id.to_string() },
        })
    }

    fn billing_cycle(interval: BillingInterval) -> Value {
        match interval {
            BillingInterval::Month => json!({ "interval": "month", "frequency": 1 }),
            BillingInterval::Year => json!({ "interval": "year", "frequency": 1 }),
            BillingInterval::OneTime => Value::Null,
        }
    }
}

#[async_trait]
impl ProviderAdapter for PaddleProviderAdapter {
    fn provider(&self) -> BillingProvider {
        BillingProvider::Paddle
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        let header = signature.ok_or(WebhookError::MissingSignature(SIGNATURE_HEADER))?;
        self.verifier.verify(payload, header).map_err(|e| {
            tracing::warn!(provider = "paddle", error = %e, "Webhook signature rejected");
            e
        })
    }

    fn parse_envelope(&self, payload: &Value) -> Result<WebhookEnvelope, WebhookError> {
        let header: PaddleEventHeader = decode(payload, "event")?;
        // Sandbox and live are separate Paddle accounts with separate secrets.
        Ok(WebhookEnvelope {
            external_event_id: header.event_id,
            event_type: header.event_type,
            livemode: true,
        })
    }

    fn translate(&self, event: &WebhookEvent) -> Result<BillingEvent, WebhookError> {
        let occurred_at = rfc3339_timestamp(event.payload.get("occurred_at").and_then(Value::as_str))
            .unwrap_or(event.received_at);
        let data = event
            .payload
            .get("data")
            .ok_or(WebhookError::MissingField("data"))?;

        match event.event_type.as_str() {
            t if t.starts_with("subscription.") => self.translate_subscription(data, occurred_at),
            t if t.starts_with("transaction.") => self.translate_transaction(t, data, occurred_at),
            other => Ok(BillingEvent::Ignored(other.to_string())),
        }
    }

    async fn create_product(&self, product: &Product) -> Result<String, ProviderError> {
        self.send("create_product", reqwest::Method::POST, "/products", Self::product_body(product))
            .await
    }

    async fn update_product(&self, external_id: &str, product: &Product) -> Result<(), ProviderError> {
        let path = format!("/products/{}", external_id);
        self.send("update_product", reqwest::Method::PATCH, &path, Self::product_body(product))
            .await
            .map(|_| ())
    }

    async fn create_price(&self, price: &Price, external_product_id: &str) -> Result<String, ProviderError> {
        let body = json!({
            "product_id": external_product_id,
            "description": format!("{} {} {}", price.unit_amount, price.currency, price.interval.as_str()),
            "unit_price": {
                "amount": price.unit_amount.to_string(),
                "currency_code": price.currency.to_ascii_uppercase(),
            },
            "billing_cycle": Self::billing_cycle(price.interval),
            "custom_data": { "local_id": price.id.to_string() },
        });
        self.send("create_price", reqwest::Method::POST, "/prices", body).await
    }

    async fn archive_product(&self, external_id: &str) -> Result<(), ProviderError> {
        let path = format!("/products/{}", external_id);
        self.send("archive_product", reqwest::Method::PATCH, &path, json!({ "status": "archived" }))
            .await
            .map(|_| ())
    }

    async fn archive_price(&self, external_id: &str) -> Result<(), ProviderError> {
        let path = format!("/prices/{}", external_id);
        self.send("archive_price", reqwest::Method::PATCH, &path, json!({ "status": "archived" }))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::paddle_test_header;
    use crate::domain::foundation::TeamId;

    const SECRET: &str = "pdl_ntfset_secret";

    fn adapter() -> PaddleProviderAdapter {
        PaddleProviderAdapter::new(PaddleConfig::new(
            SecretString::new("pdl_key".into()),
            SecretString::new(SECRET.into()),
        ))
    }

    fn stored(payload: Value) -> WebhookEvent {
        let envelope = adapter().parse_envelope(&payload).unwrap();
        WebhookEvent::received(BillingProvider::Paddle, envelope, payload)
    }

    #[test]
    fn verifies_signature_and_rejects_stripe_header() {
        let body = r#"{"event_id":"evt_1","event_type":"subscription.created"}"#;
        let now = chrono::Utc::now().timestamp();
        let header = paddle_test_header(SECRET, now, body);
        assert!(adapter().verify_webhook(body.as_bytes(), Some(&header)).is_ok());

        let malformed = format!("t={},v1=00", now);
        assert!(adapter().verify_webhook(body.as_bytes(), Some(&malformed)).is_err());
    }

    #[test]
    fn envelope_uses_event_id() {
        let envelope = adapter()
            .parse_envelope(&json!({ "event_id": "evt_01h", "event_type": "transaction.paid" }))
            .unwrap();
        assert_eq!(envelope.external_event_id, "evt_01h");
        assert_eq!(envelope.event_type, "transaction.paid");
    }

    #[test]
    fn translates_subscription_with_scheduled_cancel() {
        let team = TeamId::new();
        let event = stored(json!({
            "event_id": "evt_1",
            "event_type": "subscription.updated",
            "occurred_at": "2024-01-01T00:00:00Z",
            "data": {
                "id": "sub_01",
                "status": "active",
                "customer_id": "ctm_01",
                "items": [ { "price": { "id": "pri_01" } } ],
                "current_billing_period": { "starts_at": "2024-01-01T00:00:00Z", "ends_at": "2024-02-01T00:00:00Z" },
                "scheduled_change": { "action": "cancel", "effective_at": "2024-02-01T00:00:00Z" },
                "custom_data": { "team_id": team.to_string() }
            }
        }));

        let BillingEvent::SubscriptionChanged(snapshot) = adapter().translate(&event).unwrap() else {
            panic!("expected subscription event");
        };
        assert_eq!(snapshot.status, SubscriptionStatus::Active);
        assert!(snapshot.cancel_at_period_end);
        assert_eq!(snapshot.external_price_id.as_deref(), Some("pri_01"));
        assert_eq!(snapshot.team_id, Some(team));
        assert_eq!(
            snapshot.current_period_end,
            Timestamp::parse_rfc3339("2024-02-01T00:00:00Z")
        );
    }

    #[test]
    fn translates_completed_transaction() {
        let event = stored(json!({
            "event_id": "evt_2",
            "event_type": "transaction.completed",
            "occurred_at": "2024-01-01T00:00:00Z",
            "data": {
                "id": "txn_01",
                "subscription_id": "sub_01",
                "customer_id": "ctm_01",
                "currency_code": "EUR",
                "details": { "totals": { "grand_total": "2499" } }
            }
        }));

        let BillingEvent::InvoiceRecorded(snapshot) = adapter().translate(&event).unwrap() else {
            panic!("expected invoice event");
        };
        assert_eq!(snapshot.status, InvoiceStatus::Paid);
        assert_eq!(snapshot.amount_minor, 2499);
        assert_eq!(snapshot.currency, "eur");
    }

    #[test]
    fn non_numeric_total_is_parse_error() {
        let event = stored(json!({
            "event_id": "evt_3",
            "event_type": "transaction.payment_failed",
            "data": {
                "id": "txn_02",
                "currency_code": "USD",
                "details": { "totals": { "grand_total": "12.50" } }
            }
        }));
        assert!(matches!(adapter().translate(&event), Err(WebhookError::ParseError(_))));
    }

    #[test]
    fn transaction_created_is_ignored() {
        let event = stored(json!({
            "event_id": "evt_4",
            "event_type": "transaction.created",
            "data": {}
        }));
        assert!(matches!(adapter().translate(&event), Ok(BillingEvent::Ignored(_))));
    }

    #[test]
    fn one_time_prices_have_no_billing_cycle() {
        assert!(PaddleProviderAdapter::billing_cycle(BillingInterval::OneTime).is_null());
        assert_eq!(
            PaddleProviderAdapter::billing_cycle(BillingInterval::Year)["interval"],
            "year"
        );
    }
}
