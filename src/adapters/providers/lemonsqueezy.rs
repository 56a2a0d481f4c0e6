//! LemonSqueezy provider adapter.
//!
//! LemonSqueezy deliveries have no event id. The idempotency key is derived
//! from the event name and the resource's type, id and `updated_at`, so a
//! redelivery of the same change collapses onto one stored event while a
//! later change to the same resource does not.
//!
//! Products and variants cannot be created or archived through the
//! LemonSqueezy API; catalog operations report `Unsupported`.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::billing::{
    BillingEvent, BillingProvider, InvoiceSnapshot, InvoiceStatus, LemonSqueezySignatureVerifier,
    Price, Product, SubscriptionSnapshot, SubscriptionStatus, WebhookEnvelope, WebhookError,
    WebhookEvent,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{ProviderAdapter, ProviderError};

use super::support::{decode, rfc3339_timestamp, team_id_from};

const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Clone)]
pub struct LemonSqueezyConfig {
    webhook_secret: SecretString,
    require_livemode: bool,
}

impl LemonSqueezyConfig {
    pub fn new(webhook_secret: SecretString) -> Self {
        Self {
            webhook_secret,
            require_livemode: false,
        }
    }

    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

pub struct LemonSqueezyProviderAdapter {
    config: LemonSqueezyConfig,
    verifier: LemonSqueezySignatureVerifier,
}

#[derive(Debug, Deserialize)]
struct LsMeta {
    event_name: String,
    #[serde(default)]
    test_mode: bool,
    #[serde(default)]
    custom_data: Value,
}

#[derive(Debug, Deserialize)]
struct LsResource {
    #[serde(rename = "type")]
    resource_type: String,
    id: Value,
    #[serde(default)]
    attributes: Value,
}

#[derive(Debug, Deserialize)]
struct LsSubscription {
    status: String,
    customer_id: Option<Value>,
    variant_id: Option<Value>,
    renews_at: Option<String>,
    ends_at: Option<String>,
    #[serde(default)]
    cancelled: bool,
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LsPayment {
    subscription_id: Option<Value>,
    customer_id: Option<Value>,
    #[serde(default)]
    total: i64,
    currency: String,
    updated_at: Option<String>,
}

/// Renders a JSON id (LemonSqueezy mixes numbers and strings) as text.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl LemonSqueezyProviderAdapter {
    pub fn new(config: LemonSqueezyConfig) -> Self {
        Self {
            verifier: LemonSqueezySignatureVerifier::new(config.webhook_secret.clone()),
            config,
        }
    }

    /// Derives a stable idempotency key for a delivery.
    fn derive_event_id(event_name: &str, resource: &LsResource) -> String {
        let updated_at = resource
            .attributes
            .get("updated_at")
            .and_then(Value::as_str)
            .unwrap_or("");
        let resource_id = id_string(&resource.id).unwrap_or_default();

        let mut hasher = Sha256::new();
        for part in [event_name, resource.resource_type.as_str(), resource_id.as_str(), updated_at] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        format!("ls_{}", hex::encode(hasher.finalize()))
    }

    fn map_subscription_status(status: &str) -> SubscriptionStatus {
        match status {
            "on_trial" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" | "unpaid" => SubscriptionStatus::PastDue,
            "paused" => SubscriptionStatus::Paused,
            "cancelled" => SubscriptionStatus::Canceled,
            "expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    fn translate_subscription(
        &self,
        meta: &LsMeta,
        resource: &LsResource,
        fallback: Timestamp,
    ) -> Result<BillingEvent, WebhookError> {
        let sub: LsSubscription = decode(&resource.attributes, "subscription")?;
        let external_id = id_string(&resource.id).ok_or(WebhookError::MissingField("data.id"))?;
        let status = Self::map_subscription_status(&sub.status);

        // A cancelled subscription stays usable until `ends_at`.
        let (current_period_end, cancel_at_period_end) = if sub.cancelled || status == SubscriptionStatus::Canceled {
            (rfc3339_timestamp(sub.ends_at.as_deref()), status != SubscriptionStatus::Expired)
        } else {
            (rfc3339_timestamp(sub.renews_at.as_deref()), false)
        };

        Ok(BillingEvent::SubscriptionChanged(SubscriptionSnapshot {
            external_id,
            external_customer_id: sub.customer_id.as_ref().and_then(id_string),
            external_price_id: sub.variant_id.as_ref().and_then(id_string),
            status,
            current_period_end,
            cancel_at_period_end,
            team_id: team_id_from(Some(&meta.custom_data)),
            occurred_at: rfc3339_timestamp(sub.updated_at.as_deref()).unwrap_or(fallback),
        }))
    }

    fn translate_payment(
        &self,
        meta: &LsMeta,
        resource: &LsResource,
        status: InvoiceStatus,
        fallback: Timestamp,
    ) -> Result<BillingEvent, WebhookError> {
        let payment: LsPayment = decode(&resource.attributes, "payment")?;
        let external_id = id_string(&resource.id).ok_or(WebhookError::MissingField("data.id"))?;

        Ok(BillingEvent::InvoiceRecorded(InvoiceSnapshot {
            // Orders and subscription invoices share an id space per type.
            external_id: format!("{}:{}", resource.resource_type, external_id),
            external_subscription_id: payment.subscription_id.as_ref().and_then(id_string),
            external_customer_id: payment.customer_id.as_ref().and_then(id_string),
            amount_minor: payment.total,
            currency: payment.currency.to_ascii_lowercase(),
            status,
            team_id: team_id_from(Some(&meta.custom_data)),
            occurred_at: rfc3339_timestamp(payment.updated_at.as_deref()).unwrap_or(fallback),
        }))
    }
}

#[async_trait]
impl ProviderAdapter for LemonSqueezyProviderAdapter {
    fn provider(&self) -> BillingProvider {
        BillingProvider::LemonSqueezy
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn verify_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        let header = signature.ok_or(WebhookError::MissingSignature(SIGNATURE_HEADER))?;
        self.verifier.verify(payload, header).map_err(|e| {
            tracing::warn!(provider = "lemonsqueezy", error = %e, "Webhook signature rejected");
            e
        })
    }

    fn parse_envelope(&self, payload: &Value) -> Result<WebhookEnvelope, WebhookError> {
        let meta: LsMeta = decode(
            payload.get("meta").ok_or(WebhookError::MissingField("meta"))?,
            "meta",
        )?;
        let resource: LsResource = decode(
            payload.get("data").ok_or(WebhookError::MissingField("data"))?,
            "data",
        )?;

        if self.config.require_livemode && meta.test_mode {
            tracing::warn!(event_name = %meta.event_name, "Rejected test mode event in production");
            return Err(WebhookError::TestModeRejected);
        }

        Ok(WebhookEnvelope {
            external_event_id: Self::derive_event_id(&meta.event_name, &resource),
            event_type: meta.event_name,
            livemode: !meta.test_mode,
        })
    }

    fn translate(&self, event: &WebhookEvent) -> Result<BillingEvent, WebhookError> {
        let meta: LsMeta = decode(
            event.payload.get("meta").ok_or(WebhookError::MissingField("meta"))?,
            "meta",
        )?;
        let resource: LsResource = decode(
            event.payload.get("data").ok_or(WebhookError::MissingField("data"))?,
            "data",
        )?;
        let fallback = event.received_at;

        match event.event_type.as_str() {
            "subscription_created" | "subscription_updated" | "subscription_cancelled"
            | "subscription_resumed" | "subscription_expired" | "subscription_paused"
            | "subscription_unpaused" => self.translate_subscription(&meta, &resource, fallback),
            "subscription_payment_success" | "order_created" => {
                self.translate_payment(&meta, &resource, InvoiceStatus::Paid, fallback)
            }
            "subscription_payment_failed" => {
                self.translate_payment(&meta, &resource, InvoiceStatus::PaymentFailed, fallback)
            }
            "subscription_payment_refunded" | "order_refunded" => {
                self.translate_payment(&meta, &resource, InvoiceStatus::Refunded, fallback)
            }
            other => Ok(BillingEvent::Ignored(other.to_string())),
        }
    }

    fn supports_catalog_writes(&self) -> bool {
        false
    }

    async fn create_product(&self, _product: &Product) -> Result<String, ProviderError> {
        Err(ProviderError::unsupported("LemonSqueezy products are managed in the dashboard"))
    }

    async fn update_product(&self, _external_id: &str, _product: &Product) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("LemonSqueezy products are managed in the dashboard"))
    }

    async fn create_price(&self, _price: &Price, _external_product_id: &str) -> Result<String, ProviderError> {
        Err(ProviderError::unsupported("LemonSqueezy variants are managed in the dashboard"))
    }

    async fn archive_product(&self, _external_id: &str) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("LemonSqueezy products cannot be archived through the API"))
    }

    async fn archive_price(&self, _external_id: &str) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported("LemonSqueezy variants cannot be archived through the API"))
    }
}
