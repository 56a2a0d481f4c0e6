//! BillingEventApplier - Applies a translated billing event to local state.
//!
//! Application is idempotent: replaying an event, or receiving an older one
//! after a newer one, leaves the stored subscription untouched.

use std::sync::Arc;

use crate::domain::billing::{
    ApplyOutcome, BillingEvent, BillingProvider, EntityType, Invoice, InvoiceSnapshot,
    InvoiceStatus, ProviderMapping, Subscription, SubscriptionSnapshot, WebhookError,
};
use crate::domain::foundation::{PriceId, TeamId};
use crate::ports::{
    EntitlementsNotifier, InvoiceRepository, ProviderMappingRepository, SubscriptionRepository,
};

/// What applying one billing event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    SubscriptionCreated,
    SubscriptionUpdated,
    InvoiceRecorded,
    /// The event matched current state.
    Unchanged,
    /// A newer event was already applied.
    Stale,
    Ignored(String),
}

pub struct BillingEventApplier {
    subscriptions: Arc<dyn SubscriptionRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    mappings: Arc<dyn ProviderMappingRepository>,
    notifier: Arc<dyn EntitlementsNotifier>,
}

impl BillingEventApplier {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        mappings: Arc<dyn ProviderMappingRepository>,
        notifier: Arc<dyn EntitlementsNotifier>,
    ) -> Self {
        Self {
            subscriptions,
            invoices,
            mappings,
            notifier,
        }
    }

    pub async fn apply(
        &self,
        provider: BillingProvider,
        event: &BillingEvent,
    ) -> Result<ApplyResult, WebhookError> {
        match event {
            BillingEvent::SubscriptionChanged(snapshot) => self.apply_subscription(provider, snapshot).await,
            BillingEvent::InvoiceRecorded(snapshot) => self.apply_invoice(provider, snapshot).await,
            BillingEvent::Ignored(reason) => Ok(ApplyResult::Ignored(reason.clone())),
        }
    }

    async fn apply_subscription(
        &self,
        provider: BillingProvider,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<ApplyResult, WebhookError> {
        let price_id = self.resolve_price(provider, snapshot.external_price_id.as_deref()).await?;

        let existing = self
            .subscriptions
            .find_by_external_id(provider, &snapshot.external_id)
            .await?;

        match existing {
            Some(mut subscription) => match subscription.apply(snapshot, price_id) {
                ApplyOutcome::Stale => {
                    tracing::debug!(
                        provider = %provider,
                        subscription = %snapshot.external_id,
                        "Ignoring stale subscription event"
                    );
                    Ok(ApplyResult::Stale)
                }
                ApplyOutcome::Unchanged => {
                    let stored = self.subscriptions.save(&subscription).await?;
                    // A missing mapping means an earlier attempt stopped after
                    // the save, so its side effects still have to happen.
                    if self.has_mapping(&stored).await? {
                        return Ok(ApplyResult::Unchanged);
                    }
                    tracing::info!(
                        provider = %provider,
                        team_id = %stored.team_id,
                        subscription = %stored.external_id,
                        "Completing interrupted subscription creation"
                    );
                    self.notify_subscription(&stored).await;
                    self.upsert_mapping(&stored).await?;
                    Ok(ApplyResult::SubscriptionCreated)
                }
                ApplyOutcome::Applied => {
                    let stored = self.subscriptions.save(&subscription).await?;
                    if stored.last_event_at != subscription.last_event_at {
                        return Ok(ApplyResult::Stale);
                    }
                    tracing::info!(
                        provider = %provider,
                        team_id = %stored.team_id,
                        subscription = %stored.external_id,
                        status = stored.status.as_str(),
                        "Subscription updated"
                    );
                    self.notify_subscription(&stored).await;
                    self.upsert_mapping(&stored).await?;
                    Ok(ApplyResult::SubscriptionUpdated)
                }
            },
            None => {
                let team_id = snapshot.team_id.ok_or(WebhookError::MissingMetadata("team_id"))?;
                let subscription = Subscription::from_snapshot(team_id, provider, snapshot, price_id);
                let stored = self.subscriptions.save(&subscription).await?;

                tracing::info!(
                    provider = %provider,
                    team_id = %stored.team_id,
                    subscription = %stored.external_id,
                    status = stored.status.as_str(),
                    "Subscription created"
                );
                // Notify before mapping: the mapping marks the creation complete.
                self.notify_subscription(&stored).await;
                self.upsert_mapping(&stored).await?;
                Ok(ApplyResult::SubscriptionCreated)
            }
        }
    }

    async fn has_mapping(&self, subscription: &Subscription) -> Result<bool, WebhookError> {
        Ok(self
            .mappings
            .find(
                EntityType::Subscription,
                *subscription.id.as_uuid(),
                subscription.provider,
            )
            .await?
            .is_some())
    }

    async fn upsert_mapping(&self, subscription: &Subscription) -> Result<(), WebhookError> {
        self.mappings
            .upsert(&ProviderMapping::new(
                EntityType::Subscription,
                *subscription.id.as_uuid(),
                subscription.provider,
                subscription.external_id.clone(),
                None,
            ))
            .await?;
        Ok(())
    }

    async fn apply_invoice(
        &self,
        provider: BillingProvider,
        snapshot: &InvoiceSnapshot,
    ) -> Result<ApplyResult, WebhookError> {
        let existing = self
            .invoices
            .find_by_external_id(provider, &snapshot.external_id)
            .await?;

        let invoice = match existing {
            Some(mut invoice) => {
                if !invoice.apply(snapshot) {
                    return Ok(ApplyResult::Unchanged);
                }
                invoice
            }
            None => {
                let team_id = self.resolve_invoice_team(provider, snapshot).await?;
                Invoice::from_snapshot(team_id, provider, snapshot)
            }
        };

        self.invoices.save(&invoice).await?;
        tracing::info!(
            provider = %provider,
            team_id = %invoice.team_id,
            invoice = %invoice.external_id,
            status = invoice.status.as_str(),
            amount_minor = invoice.amount_minor,
            "Invoice recorded"
        );

        if invoice.status == InvoiceStatus::PaymentFailed {
            if let Err(e) = self.notifier.payment_failed(&invoice).await {
                tracing::warn!(team_id = %invoice.team_id, error = %e, "Payment failure notification failed");
            }
        }
        Ok(ApplyResult::InvoiceRecorded)
    }

    /// Maps a provider price id to the local price, when catalog sync created it.
    async fn resolve_price(
        &self,
        provider: BillingProvider,
        external_price_id: Option<&str>,
    ) -> Result<Option<PriceId>, WebhookError> {
        let Some(external_id) = external_price_id else {
            return Ok(None);
        };
        let mapping = self
            .mappings
            .find_by_external_id(EntityType::Price, provider, external_id)
            .await?;
        if mapping.is_none() {
            tracing::debug!(provider = %provider, price = external_id, "Price has no local mapping");
        }
        Ok(mapping.map(|m| PriceId::from_uuid(m.entity_id)))
    }

    /// Tenant from invoice metadata, or from the subscription it belongs to.
    async fn resolve_invoice_team(
        &self,
        provider: BillingProvider,
        snapshot: &InvoiceSnapshot,
    ) -> Result<TeamId, WebhookError> {
        if let Some(team_id) = snapshot.team_id {
            return Ok(team_id);
        }
        match &snapshot.external_subscription_id {
            Some(subscription_id) => self
                .subscriptions
                .find_by_external_id(provider, subscription_id)
                .await?
                .map(|s| s.team_id)
                // The subscription event may still be in flight.
                .ok_or_else(|| WebhookError::UnresolvedReference(format!("subscription {}", subscription_id))),
            None => Err(WebhookError::MissingMetadata("team_id")),
        }
    }

    async fn notify_subscription(&self, subscription: &Subscription) {
        if let Err(e) = self.notifier.subscription_changed(subscription).await {
            tracing::warn!(
                team_id = %subscription.team_id,
                error = %e,
                "Entitlements notification failed"
            );
        }
    }
}
