//! ReceiveWebhookHandler - Verifies and durably records an inbound webhook.
//!
//! Ingress does no business work. A delivery is acknowledged as soon as it
//! is verified and stored; the processor workers apply it later.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::domain::billing::{BillingProvider, WebhookError, WebhookEvent};
use crate::domain::foundation::WebhookEventId;
use crate::ports::{ProviderRegistry, SaveResult, WebhookEventRepository};

/// Command carrying a raw webhook delivery.
#[derive(Debug, Clone)]
pub struct ReceiveWebhookCommand {
    /// Provider name from the request path.
    pub provider: String,
    /// Raw request body, exactly as signed by the provider.
    pub payload: Vec<u8>,
    /// Value of the provider's signature header, if present.
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveWebhookResult {
    /// First delivery; queued for processing.
    Accepted(WebhookEventId),
    /// Already recorded; nothing was written.
    Duplicate,
}

pub struct ReceiveWebhookHandler {
    registry: ProviderRegistry,
    events: Arc<dyn WebhookEventRepository>,
    wake: Arc<Notify>,
}

impl ReceiveWebhookHandler {
    pub fn new(
        registry: ProviderRegistry,
        events: Arc<dyn WebhookEventRepository>,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            registry,
            events,
            wake,
        }
    }

    /// Looks up the configured adapter for a raw provider path segment.
    pub fn resolve_provider(&self, raw: &str) -> Result<BillingProvider, WebhookError> {
        let provider = BillingProvider::from_str(raw)
            .map_err(|_| WebhookError::UnknownProvider(raw.to_string()))?;
        if self.registry.get(provider).is_none() {
            return Err(WebhookError::ProviderNotConfigured(provider));
        }
        Ok(provider)
    }

    /// Header the provider signs its deliveries with.
    pub fn signature_header(&self, provider: BillingProvider) -> Option<&'static str> {
        self.registry.get(provider).map(|a| a.signature_header())
    }

    pub async fn handle(&self, cmd: ReceiveWebhookCommand) -> Result<ReceiveWebhookResult, WebhookError> {
        let provider = self.resolve_provider(&cmd.provider)?;
        let adapter = self
            .registry
            .get(provider)
            .ok_or(WebhookError::ProviderNotConfigured(provider))?;

        // 1. Authenticate before looking at the body
        adapter.verify_webhook(&cmd.payload, cmd.signature.as_deref())?;

        // 2. Extract the idempotency key
        let payload: serde_json::Value = serde_json::from_slice(&cmd.payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let envelope = adapter.parse_envelope(&payload)?;

        // 3. Record once
        let event = WebhookEvent::received(provider, envelope, payload);
        match self.events.insert_if_absent(&event).await? {
            SaveResult::Inserted => {
                tracing::info!(
                    provider = %provider,
                    event_id = %event.id,
                    external_event_id = %event.external_event_id,
                    event_type = %event.event_type,
                    "Webhook accepted"
                );
                self.wake.notify_one();
                Ok(ReceiveWebhookResult::Accepted(event.id))
            }
            SaveResult::AlreadyExists => {
                tracing::info!(
                    provider = %provider,
                    external_event_id = %event.external_event_id,
                    "Duplicate webhook delivery"
                );
                Ok(ReceiveWebhookResult::Duplicate)
            }
        }
    }
}
