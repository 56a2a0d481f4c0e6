//! ProcessDeletionOutboxHandler - Archives deleted catalog entities remotely.
//!
//! Every claimed entry ends its attempt in exactly one of three states:
//! `completed`, `pending` (retry scheduled, budget left) or `failed`
//! (terminal). An object that is already gone on the provider counts as
//! archived.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{DeletionOutboxEntry, EntityType, FailureOutcome, RetryPolicy};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{DeletionOutboxRepository, ProviderError, ProviderErrorCode, ProviderRegistry};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboxReport {
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

pub struct ProcessDeletionOutboxHandler {
    outbox: Arc<dyn DeletionOutboxRepository>,
    registry: ProviderRegistry,
    policy: RetryPolicy,
}

enum Attempt {
    Archived(Option<String>),
    Failed { error: String, retryable: bool },
}

/// Where an attempt left the entry.
enum Settled {
    Completed,
    Retried,
    Failed,
}

impl ProcessDeletionOutboxHandler {
    pub fn new(outbox: Arc<dyn DeletionOutboxRepository>, registry: ProviderRegistry, policy: RetryPolicy) -> Self {
        Self {
            outbox,
            registry,
            policy,
        }
    }

    pub async fn process_due(&self, batch_size: u32) -> Result<OutboxReport, DomainError> {
        let claimed = self.outbox.claim_due(batch_size).await?;
        let mut report = OutboxReport {
            claimed: claimed.len(),
            ..Default::default()
        };

        for mut entry in claimed {
            let attempt = self.attempt(&entry).await;
            let recorded = match attempt {
                Attempt::Archived(note) => entry.complete(note.clone()).map(|()| {
                    tracing::info!(
                        outbox_id = %entry.id,
                        provider = %entry.provider,
                        entity_type = entry.entity_type.as_str(),
                        external_id = %entry.external_id,
                        note = note.as_deref().unwrap_or(""),
                        "Remote catalog entity archived"
                    );
                    Settled::Completed
                }),
                Attempt::Failed { error, retryable } => entry
                    .record_failure(error.clone(), retryable, &self.policy)
                    .map(|outcome| match outcome {
                        FailureOutcome::RetryScheduled(at) => {
                            tracing::warn!(
                                outbox_id = %entry.id,
                                provider = %entry.provider,
                                attempts = entry.attempts,
                                max_attempts = entry.max_attempts,
                                retry_at = %at,
                                error = %error,
                                "Remote archive failed, will retry"
                            );
                            Settled::Retried
                        }
                        FailureOutcome::Failed => {
                            tracing::error!(
                                outbox_id = %entry.id,
                                provider = %entry.provider,
                                external_id = %entry.external_id,
                                attempts = entry.attempts,
                                error = %error,
                                "Remote archive failed permanently"
                            );
                            Settled::Failed
                        }
                    }),
            };

            let saved = match recorded {
                Ok(settled) => self.outbox.update(&entry).await.map(|()| settled),
                Err(e) => Err(e),
            };
            // Only persisted outcomes are counted; an unsaved claim is reclaimed later.
            match saved {
                Ok(Settled::Completed) => report.completed += 1,
                Ok(Settled::Retried) => report.retried += 1,
                Ok(Settled::Failed) => report.failed += 1,
                Err(e) => {
                    tracing::error!(outbox_id = %entry.id, error = %e, "Failed to record outbox outcome")
                }
            }
        }

        Ok(report)
    }

    async fn attempt(&self, entry: &DeletionOutboxEntry) -> Attempt {
        let Some(adapter) = self.registry.get(entry.provider) else {
            return Attempt::Failed {
                error: format!("provider {} is not configured", entry.provider),
                retryable: false,
            };
        };

        let result = match entry.entity_type {
            EntityType::Product => adapter.archive_product(&entry.external_id).await,
            EntityType::Price => adapter.archive_price(&entry.external_id).await,
            EntityType::Subscription => {
                return Attempt::Failed {
                    error: "subscriptions are not archived through the catalog outbox".to_string(),
                    retryable: false,
                }
            }
        };

        classify(result)
    }

    /// Returns entries whose claim is older than `lease` to the queue.
    pub async fn reclaim_stale(&self, lease: Duration) -> Result<u64, DomainError> {
        let reclaimed = self
            .outbox
            .reclaim_stale(Timestamp::now().minus_secs(lease.as_secs()))
            .await?;
        if reclaimed > 0 {
            tracing::warn!(count = reclaimed, "Reclaimed stale outbox claims");
        }
        Ok(reclaimed)
    }

    pub async fn purge(&self, retention_days: u32) -> Result<u64, DomainError> {
        self.outbox
            .purge_completed_before(Timestamp::now().minus_days(i64::from(retention_days)))
            .await
    }
}

fn classify(result: Result<(), ProviderError>) -> Attempt {
    match result {
        Ok(()) => Attempt::Archived(None),
        Err(e) if e.code == ProviderErrorCode::NotFound => {
            Attempt::Archived(Some("already absent on provider".to_string()))
        }
        Err(e) if e.code == ProviderErrorCode::Unsupported => Attempt::Archived(Some(e.message)),
        Err(e) => Attempt::Failed {
            retryable: e.is_retryable(),
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::providers::MockProviderAdapter;
    use crate::domain::billing::{BillingProvider, OutboxStatus};
    use uuid::Uuid;

    fn setup(policy: RetryPolicy) -> (ProcessDeletionOutboxHandler, InMemoryBillingStore, MockProviderAdapter) {
        let store = InMemoryBillingStore::new();
        let stripe = MockProviderAdapter::new(BillingProvider::Stripe);
        let registry = ProviderRegistry::new().with(Arc::new(stripe.clone()));
        let handler = ProcessDeletionOutboxHandler::new(Arc::new(store.clone()), registry, policy);
        (handler, store, stripe)
    }

    async fn enqueue(store: &InMemoryBillingStore, provider: BillingProvider, max_attempts: u32) {
        let entry = DeletionOutboxEntry::new(EntityType::Price, Uuid::new_v4(), provider, "price_1", max_attempts);
        store.enqueue(&[entry]).await.unwrap();
    }

    #[tokio::test]
    async fn successful_archive_completes() {
        let (handler, store, stripe) = setup(RetryPolicy::default());
        enqueue(&store, BillingProvider::Stripe, 3).await;

        let report = handler.process_due(10).await.unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(stripe.calls_to("archive_price"), 1);
        assert_eq!(store.outbox_entries().await[0].status, OutboxStatus::Completed);
    }

    #[tokio::test]
    async fn already_absent_counts_as_completed() {
        let (handler, store, stripe) = setup(RetryPolicy::default());
        stripe.fail_next("archive_price", ProviderError::not_found("price"));
        enqueue(&store, BillingProvider::Stripe, 3).await;

        handler.process_due(10).await.unwrap();

        let entry = &store.outbox_entries().await[0];
        assert_eq!(entry.status, OutboxStatus::Completed);
        assert!(entry.last_error.is_some());
    }

    #[tokio::test]
    async fn transient_failure_retries_until_budget_then_fails() {
        let (handler, store, stripe) = setup(RetryPolicy::fixed(10, vec![0]));
        stripe.fail_always("archive_price", ProviderError::from_status(503, "down"));
        enqueue(&store, BillingProvider::Stripe, 3).await;

        for _ in 0..5 {
            handler.process_due(10).await.unwrap();
        }

        let entry = &store.outbox_entries().await[0];
        assert_eq!(entry.status, OutboxStatus::Failed);
        assert_eq!(entry.attempts, 3);
        assert_eq!(stripe.calls_to("archive_price"), 3);
    }

    #[tokio::test]
    async fn permanent_failure_fails_immediately() {
        let (handler, store, stripe) = setup(RetryPolicy::fixed(10, vec![0]));
        stripe.fail_next("archive_price", ProviderError::from_status(401, "bad key"));
        enqueue(&store, BillingProvider::Stripe, 5).await;

        let report = handler.process_due(10).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(store.outbox_entries().await[0].attempts, 1);
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_entry() {
        let (handler, store, _) = setup(RetryPolicy::default());
        enqueue(&store, BillingProvider::Paddle, 5).await;

        let report = handler.process_due(10).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(store.outbox_entries().await[0].status, OutboxStatus::Failed);
    }

    /// Outbox that claims normally but cannot persist outcomes.
    struct ReadOnlyOutbox(InMemoryBillingStore);

    #[async_trait::async_trait]
    impl DeletionOutboxRepository for ReadOnlyOutbox {
        async fn enqueue(&self, entries: &[DeletionOutboxEntry]) -> Result<(), DomainError> {
            DeletionOutboxRepository::enqueue(&self.0, entries).await
        }

        async fn retire_mapping(
            &self,
            archive: &DeletionOutboxEntry,
            replacement: Option<&crate::domain::billing::ProviderMapping>,
        ) -> Result<(), DomainError> {
            DeletionOutboxRepository::retire_mapping(&self.0, archive, replacement).await
        }

        async fn claim_due(&self, limit: u32) -> Result<Vec<DeletionOutboxEntry>, DomainError> {
            DeletionOutboxRepository::claim_due(&self.0, limit).await
        }

        async fn update(&self, _entry: &DeletionOutboxEntry) -> Result<(), DomainError> {
            Err(DomainError::new(
                crate::domain::foundation::ErrorCode::DatabaseError,
                "read-only transaction",
            ))
        }

        async fn find_by_id(
            &self,
            id: crate::domain::foundation::OutboxEntryId,
        ) -> Result<Option<DeletionOutboxEntry>, DomainError> {
            DeletionOutboxRepository::find_by_id(&self.0, id).await
        }

        async fn list_by_status(
            &self,
            status: OutboxStatus,
            limit: u32,
        ) -> Result<Vec<DeletionOutboxEntry>, DomainError> {
            DeletionOutboxRepository::list_by_status(&self.0, status, limit).await
        }

        async fn reclaim_stale(&self, updated_before: Timestamp) -> Result<u64, DomainError> {
            DeletionOutboxRepository::reclaim_stale(&self.0, updated_before).await
        }

        async fn purge_completed_before(&self, updated_before: Timestamp) -> Result<u64, DomainError> {
            DeletionOutboxRepository::purge_completed_before(&self.0, updated_before).await
        }
    }

    #[tokio::test]
    async fn unsaved_outcome_is_not_counted() {
        let store = InMemoryBillingStore::new();
        let stripe = MockProviderAdapter::new(BillingProvider::Stripe);
        let handler = ProcessDeletionOutboxHandler::new(
            Arc::new(ReadOnlyOutbox(store.clone())),
            ProviderRegistry::new().with(Arc::new(stripe.clone())),
            RetryPolicy::default(),
        );
        enqueue(&store, BillingProvider::Stripe, 3).await;

        let report = handler.process_due(10).await.unwrap();

        assert_eq!(report.claimed, 1);
        assert_eq!(report.completed, 0);
        assert_eq!(stripe.calls_to("archive_price"), 1);
        assert_eq!(store.outbox_entries().await[0].status, OutboxStatus::Processing);
    }

    #[test]
    fn unsupported_counts_as_archived() {
        assert!(matches!(
            classify(Err(ProviderError::unsupported("no catalog API"))),
            Attempt::Archived(Some(_))
        ));
    }
}
