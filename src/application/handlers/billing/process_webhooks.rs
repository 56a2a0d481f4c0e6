//! ProcessWebhooksHandler - Drains the webhook inbox.
//!
//! Each call claims a batch of due events, translates and applies them, and
//! records the outcome on the event row. One bad event never stops a batch.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{FailureOutcome, RetryPolicy, WebhookError, WebhookEvent};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{ProviderRegistry, WebhookEventRepository};

use super::apply_billing_event::{ApplyResult, BillingEventApplier};

/// Counts for one processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub claimed: usize,
    pub processed: usize,
    pub ignored: usize,
    pub retried: usize,
    pub failed: usize,
}

pub struct ProcessWebhooksHandler {
    events: Arc<dyn WebhookEventRepository>,
    registry: ProviderRegistry,
    applier: Arc<BillingEventApplier>,
    policy: RetryPolicy,
}

impl ProcessWebhooksHandler {
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        registry: ProviderRegistry,
        applier: Arc<BillingEventApplier>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            events,
            registry,
            applier,
            policy,
        }
    }

    /// Claims and processes up to `batch_size` due events.
    pub async fn process_due(&self, batch_size: u32) -> Result<ProcessReport, DomainError> {
        let claimed = self.events.claim_due(batch_size).await?;
        let mut report = ProcessReport {
            claimed: claimed.len(),
            ..Default::default()
        };

        for event in claimed {
            match self.process_claimed(event).await {
                Ok(outcome) => match outcome {
                    EventOutcome::Processed => report.processed += 1,
                    EventOutcome::Ignored => report.ignored += 1,
                    EventOutcome::Retried => report.retried += 1,
                    EventOutcome::Failed => report.failed += 1,
                },
                Err(e) => {
                    // The row stays `processing` until the lease reclaim picks it up.
                    tracing::error!(error = %e, "Failed to record webhook outcome");
                }
            }
        }

        if report.claimed > 0 {
            tracing::debug!(?report, "Webhook batch processed");
        }
        Ok(report)
    }

    async fn process_claimed(&self, mut event: WebhookEvent) -> Result<EventOutcome, DomainError> {
        let outcome = match self.apply(&event).await {
            Ok(ApplyResult::Ignored(reason)) | Err(WebhookError::Ignored(reason)) => {
                tracing::debug!(
                    provider = %event.provider,
                    event_type = %event.event_type,
                    reason = %reason,
                    "Webhook ignored"
                );
                event.mark_ignored(reason)?;
                EventOutcome::Ignored
            }
            Ok(result) => {
                tracing::info!(
                    provider = %event.provider,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    result = ?result,
                    "Webhook processed"
                );
                event.mark_processed()?;
                EventOutcome::Processed
            }
            Err(err) => {
                match event.record_failure(err.to_string(), err.is_retryable(), &self.policy)? {
                    FailureOutcome::RetryScheduled(at) => {
                        tracing::warn!(
                            provider = %event.provider,
                            event_id = %event.id,
                            attempts = event.attempts,
                            retry_at = %at,
                            error = %err,
                            "Webhook processing failed, will retry"
                        );
                        EventOutcome::Retried
                    }
                    FailureOutcome::Failed => {
                        tracing::error!(
                            provider = %event.provider,
                            event_id = %event.id,
                            attempts = event.attempts,
                            error_code = err.error_code(),
                            error = %err,
                            "Webhook processing failed permanently"
                        );
                        EventOutcome::Failed
                    }
                }
            }
        };

        self.events.update(&event).await?;
        Ok(outcome)
    }

    async fn apply(&self, event: &WebhookEvent) -> Result<ApplyResult, WebhookError> {
        let adapter = self
            .registry
            .get(event.provider)
            .ok_or(WebhookError::ProviderNotConfigured(event.provider))?;
        let billing_event = adapter.translate(event)?;
        self.applier.apply(event.provider, &billing_event).await
    }

    /// Returns events whose claim is older than `lease` to the queue. Events
    /// that lost their final attempt are failed.
    pub async fn reclaim_stale(&self, lease: Duration) -> Result<u64, DomainError> {
        let reclaimed = self
            .events
            .reclaim_stale(
                Timestamp::now().minus_secs(lease.as_secs()),
                self.policy.max_attempts,
            )
            .await?;
        if reclaimed > 0 {
            tracing::warn!(count = reclaimed, "Reclaimed stale webhook claims");
        }
        Ok(reclaimed)
    }

    /// Deletes processed and ignored events older than the retention window.
    pub async fn purge(&self, retention_days: u32) -> Result<u64, DomainError> {
        let purged = self
            .events
            .delete_before(Timestamp::now().minus_days(i64::from(retention_days)))
            .await?;
        if purged > 0 {
            tracing::info!(count = purged, retention_days, "Purged old webhook events");
        }
        Ok(purged)
    }
}

enum EventOutcome {
    Processed,
    Ignored,
    Retried,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::entitlements::LoggingEntitlementsNotifier;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::providers::MockProviderAdapter;
    use crate::domain::billing::{
        BillingEvent, BillingProvider, SubscriptionSnapshot, SubscriptionStatus, WebhookEnvelope,
        WebhookEventStatus,
    };
    use crate::domain::foundation::TeamId;

    struct Fixture {
        handler: ProcessWebhooksHandler,
        store: InMemoryBillingStore,
        stripe: MockProviderAdapter,
    }

    fn fixture(policy: RetryPolicy) -> Fixture {
        let store = InMemoryBillingStore::new();
        let stripe = MockProviderAdapter::new(BillingProvider::Stripe);
        let registry = ProviderRegistry::new().with(Arc::new(stripe.clone()));
        let repo = Arc::new(store.clone());
        let applier = Arc::new(BillingEventApplier::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            Arc::new(LoggingEntitlementsNotifier),
        ));
        Fixture {
            handler: ProcessWebhooksHandler::new(repo, registry, applier, policy),
            store,
            stripe,
        }
    }

    async fn enqueue(store: &InMemoryBillingStore, provider: BillingProvider, id: &str) {
        let event = WebhookEvent::received(
            provider,
            WebhookEnvelope {
                external_event_id: id.to_string(),
                event_type: "customer.subscription.updated".to_string(),
                livemode: true,
            },
            serde_json::json!({}),
        );
        store.insert_if_absent(&event).await.unwrap();
    }

    fn active_subscription(team: Option<TeamId>) -> BillingEvent {
        BillingEvent::SubscriptionChanged(SubscriptionSnapshot {
            external_id: "sub_1".to_string(),
            external_customer_id: None,
            external_price_id: None,
            status: SubscriptionStatus::Active,
            current_period_end: None,
            cancel_at_period_end: false,
            team_id: team,
            occurred_at: Timestamp::now(),
        })
    }

    #[tokio::test]
    async fn applied_event_is_marked_processed() {
        let f = fixture(RetryPolicy::default());
        f.stripe.set_translation("evt_1", Ok(active_subscription(Some(TeamId::new()))));
        enqueue(&f.store, BillingProvider::Stripe, "evt_1").await;

        let report = f.handler.process_due(10).await.unwrap();

        assert_eq!(report.processed, 1);
        let event = &f.store.webhook_events().await[0];
        assert_eq!(event.status, WebhookEventStatus::Processed);
        assert!(event.processed_at.is_some());
        assert_eq!(f.store.subscriptions().await.len(), 1);
    }

    #[tokio::test]
    async fn unscripted_event_is_ignored() {
        let f = fixture(RetryPolicy::default());
        enqueue(&f.store, BillingProvider::Stripe, "evt_1").await;

        let report = f.handler.process_due(10).await.unwrap();

        assert_eq!(report.ignored, 1);
        assert_eq!(f.store.webhook_events().await[0].status, WebhookEventStatus::Ignored);
    }

    #[tokio::test]
    async fn retryable_error_schedules_retry() {
        let f = fixture(RetryPolicy::fixed(3, vec![60]));
        f.stripe
            .set_translation("evt_1", Err(WebhookError::UnresolvedReference("subscription sub_9".into())));
        enqueue(&f.store, BillingProvider::Stripe, "evt_1").await;

        let report = f.handler.process_due(10).await.unwrap();

        assert_eq!(report.retried, 1);
        let event = &f.store.webhook_events().await[0];
        assert_eq!(event.status, WebhookEventStatus::Pending);
        assert!(event.next_attempt_at.is_after(&Timestamp::now()));
        assert!(event.error_message.is_some());
    }

    #[tokio::test]
    async fn permanent_error_fails_immediately() {
        let f = fixture(RetryPolicy::fixed(5, vec![0]));
        f.stripe.set_translation("evt_1", Ok(active_subscription(None)));
        enqueue(&f.store, BillingProvider::Stripe, "evt_1").await;

        let report = f.handler.process_due(10).await.unwrap();

        assert_eq!(report.failed, 1);
        let event = &f.store.webhook_events().await[0];
        assert_eq!(event.status, WebhookEventStatus::Failed);
        assert_eq!(event.attempts, 1);
    }

    #[tokio::test]
    async fn retryable_error_fails_after_max_attempts() {
        let f = fixture(RetryPolicy::fixed(2, vec![0]));
        f.stripe.set_translation("evt_1", Err(WebhookError::Database("timeout".into())));
        enqueue(&f.store, BillingProvider::Stripe, "evt_1").await;

        f.handler.process_due(10).await.unwrap();
        let report = f.handler.process_due(10).await.unwrap();
        let after = f.handler.process_due(10).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(after.claimed, 0);
        assert_eq!(f.store.webhook_events().await[0].attempts, 2);
    }

    #[tokio::test]
    async fn abandoned_final_attempt_is_failed_not_requeued() {
        let f = fixture(RetryPolicy::fixed(2, vec![0]));
        enqueue(&f.store, BillingProvider::Stripe, "evt_1").await;

        // A worker that dies mid-event leaves the claim behind each time.
        for _ in 0..2 {
            WebhookEventRepository::claim_due(&f.store, 10).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert_eq!(f.handler.reclaim_stale(Duration::ZERO).await.unwrap(), 1);
        }

        let event = &f.store.webhook_events().await[0];
        assert_eq!(event.status, WebhookEventStatus::Failed);
        assert_eq!(event.attempts, 2);
        assert_eq!(f.handler.process_due(10).await.unwrap().claimed, 0);
    }

    #[tokio::test]
    async fn one_bad_event_does_not_block_the_batch() {
        let f = fixture(RetryPolicy::default());
        f.stripe.set_translation("evt_bad", Ok(active_subscription(None)));
        f.stripe.set_translation("evt_good", Ok(active_subscription(Some(TeamId::new()))));
        enqueue(&f.store, BillingProvider::Stripe, "evt_bad").await;
        enqueue(&f.store, BillingProvider::Stripe, "evt_good").await;

        let report = f.handler.process_due(10).await.unwrap();

        assert_eq!(report.claimed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed, 1);
    }

    #[tokio::test]
    async fn event_for_unconfigured_provider_fails() {
        let f = fixture(RetryPolicy::default());
        enqueue(&f.store, BillingProvider::Paddle, "evt_1").await;

        let report = f.handler.process_due(10).await.unwrap();

        assert_eq!(report.failed, 1);
    }
}
