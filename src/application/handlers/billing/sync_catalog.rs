//! CatalogSyncHandler - Pushes local products and prices to every provider.
//!
//! Providers are synced concurrently and independently. A failure on one
//! provider is recorded in the report and never prevents the others from
//! syncing. Transient provider errors are retried in-call with exponential
//! backoff before being reported.
//!
//! Prices are immutable on providers. A price whose fingerprint changed gets
//! a new remote price; the superseded one is archived through the deletion
//! outbox. Deactivating a synced price archives its remote copy the same way.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use uuid::Uuid;

use crate::domain::billing::{
    BillingProvider, DeletionOutboxEntry, EntityType, Price, Product, ProviderMapping,
};
use crate::domain::foundation::{DomainError, ErrorCode, ProductId};
use crate::ports::{
    CatalogRepository, DeletionOutboxRepository, ProviderAdapter, ProviderError,
    ProviderErrorCode, ProviderMappingRepository, ProviderRegistry,
};

/// Tuning for provider calls made during sync.
#[derive(Debug, Clone)]
pub struct CatalogSyncSettings {
    /// Total tries per provider call, including the first.
    pub call_attempts: usize,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Budget for outbox entries created when a price is superseded.
    pub outbox_max_attempts: u32,
}

impl Default for CatalogSyncSettings {
    fn default() -> Self {
        Self {
            call_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            outbox_max_attempts: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Created,
    Updated,
    Unchanged,
    /// Provider has no catalog API.
    Unsupported,
    /// Not attempted: inactive, or its product did not sync.
    Skipped,
    Failed,
}

/// Result of syncing one entity to one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub provider: BillingProvider,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub status: SyncStatus,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl SyncOutcome {
    fn new(provider: BillingProvider, entity_type: EntityType, entity_id: Uuid, status: SyncStatus) -> Self {
        Self {
            provider,
            entity_type,
            entity_id,
            status,
            external_id: None,
            error: None,
        }
    }

    fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncReport {
    pub fn count(&self, status: SyncStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(SyncStatus::Failed) > 0
    }

    pub fn for_provider(&self, provider: BillingProvider) -> impl Iterator<Item = &SyncOutcome> {
        self.outcomes.iter().filter(move |o| o.provider == provider)
    }
}

pub struct CatalogSyncHandler {
    catalog: Arc<dyn CatalogRepository>,
    mappings: Arc<dyn ProviderMappingRepository>,
    outbox: Arc<dyn DeletionOutboxRepository>,
    registry: ProviderRegistry,
    settings: CatalogSyncSettings,
}

impl CatalogSyncHandler {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        mappings: Arc<dyn ProviderMappingRepository>,
        outbox: Arc<dyn DeletionOutboxRepository>,
        registry: ProviderRegistry,
        settings: CatalogSyncSettings,
    ) -> Self {
        Self {
            catalog,
            mappings,
            outbox,
            registry,
            settings,
        }
    }

    /// Syncs the whole catalog to every configured provider.
    pub async fn sync_all(&self) -> Result<SyncReport, DomainError> {
        let mut catalog = Vec::new();
        for product in self.catalog.list_products().await? {
            let prices = self.catalog.list_prices_for_product(product.id).await?;
            catalog.push((product, prices));
        }
        Ok(self.sync_entries(&catalog).await)
    }

    /// Syncs one product and its prices to every configured provider.
    pub async fn sync_product(&self, id: ProductId) -> Result<SyncReport, DomainError> {
        let product = self.catalog.find_product(id).await?.ok_or_else(|| {
            DomainError::new(ErrorCode::ProductNotFound, format!("Product {} not found", id))
        })?;
        let prices = self.catalog.list_prices_for_product(id).await?;
        Ok(self.sync_entries(&[(product, prices)]).await)
    }

    async fn sync_entries(&self, catalog: &[(Product, Vec<Price>)]) -> SyncReport {
        let per_provider = self
            .registry
            .adapters()
            .into_iter()
            .map(|adapter| self.sync_provider(adapter, catalog));
        let outcomes: Vec<SyncOutcome> = join_all(per_provider).await.into_iter().flatten().collect();

        for outcome in &outcomes {
            match outcome.status {
                SyncStatus::Failed => tracing::warn!(
                    provider = %outcome.provider,
                    entity_type = outcome.entity_type.as_str(),
                    entity_id = %outcome.entity_id,
                    error = outcome.error.as_deref().unwrap_or(""),
                    "Catalog sync failed"
                ),
                status => tracing::debug!(
                    provider = %outcome.provider,
                    entity_type = outcome.entity_type.as_str(),
                    entity_id = %outcome.entity_id,
                    status = ?status,
                    "Catalog sync outcome"
                ),
            }
        }

        let report = SyncReport { outcomes };
        tracing::info!(
            created = report.count(SyncStatus::Created),
            updated = report.count(SyncStatus::Updated),
            unchanged = report.count(SyncStatus::Unchanged),
            failed = report.count(SyncStatus::Failed),
            "Catalog sync finished"
        );
        report
    }

    async fn sync_provider(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        catalog: &[(Product, Vec<Price>)],
    ) -> Vec<SyncOutcome> {
        let provider = adapter.provider();
        let mut outcomes = Vec::new();

        for (product, prices) in catalog {
            if !adapter.supports_catalog_writes() {
                outcomes.push(SyncOutcome::new(
                    provider,
                    EntityType::Product,
                    *product.id.as_uuid(),
                    SyncStatus::Unsupported,
                ));
                outcomes.extend(prices.iter().map(|p| {
                    SyncOutcome::new(provider, EntityType::Price, *p.id.as_uuid(), SyncStatus::Unsupported)
                }));
                continue;
            }

            let product_outcome = self.sync_one_product(adapter.as_ref(), product).await;
            let product_external_id = product_outcome.external_id.clone();
            let product_failed = product_outcome.status == SyncStatus::Failed;
            outcomes.push(product_outcome);

            for price in prices {
                let outcome = match (&product_external_id, product_failed) {
                    (Some(external_product_id), false) => {
                        self.sync_one_price(adapter.as_ref(), price, external_product_id).await
                    }
                    _ => SyncOutcome::new(provider, EntityType::Price, *price.id.as_uuid(), SyncStatus::Skipped)
                        .with_error("product is not synced to this provider"),
                };
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    async fn sync_one_product(&self, adapter: &dyn ProviderAdapter, product: &Product) -> SyncOutcome {
        let provider = adapter.provider();
        let entity_id = *product.id.as_uuid();
        let outcome = SyncOutcome::new(provider, EntityType::Product, entity_id, SyncStatus::Unchanged);
        let fingerprint = product.fingerprint();

        let mapping = match self.mappings.find(EntityType::Product, entity_id, provider).await {
            Ok(mapping) => mapping,
            Err(e) => return SyncOutcome { status: SyncStatus::Failed, ..outcome }.with_error(e),
        };

        match mapping {
            Some(mapping) if mapping.is_current(&fingerprint) => outcome.with_external_id(mapping.external_id),
            Some(mapping) => {
                let external_id = mapping.external_id;
                let updated = self
                    .call_with_retry(|| adapter.update_product(&external_id, product))
                    .await;
                if let Err(e) = updated {
                    return self.failed_or_unsupported(outcome, e).with_external_id(external_id);
                }
                let refreshed = ProviderMapping::new(
                    EntityType::Product,
                    entity_id,
                    provider,
                    external_id.clone(),
                    Some(fingerprint),
                );
                match self.mappings.upsert(&refreshed).await {
                    Ok(()) => SyncOutcome { status: SyncStatus::Updated, ..outcome }.with_external_id(external_id),
                    Err(e) => SyncOutcome { status: SyncStatus::Failed, ..outcome }
                        .with_external_id(external_id)
                        .with_error(e),
                }
            }
            None if !product.active => SyncOutcome { status: SyncStatus::Skipped, ..outcome },
            None => {
                let external_id = match self.call_with_retry(|| adapter.create_product(product)).await {
                    Ok(id) => id,
                    Err(e) => return self.failed_or_unsupported(outcome, e),
                };
                let mapping = ProviderMapping::new(
                    EntityType::Product,
                    entity_id,
                    provider,
                    external_id.clone(),
                    Some(fingerprint),
                );
                match self.mappings.upsert(&mapping).await {
                    Ok(()) => SyncOutcome { status: SyncStatus::Created, ..outcome }.with_external_id(external_id),
                    // The remote product exists but is unmapped; the next run creates another.
                    Err(e) => SyncOutcome { status: SyncStatus::Failed, ..outcome }.with_error(e),
                }
            }
        }
    }

    async fn sync_one_price(
        &self,
        adapter: &dyn ProviderAdapter,
        price: &Price,
        external_product_id: &str,
    ) -> SyncOutcome {
        let provider = adapter.provider();
        let entity_id = *price.id.as_uuid();
        let outcome = SyncOutcome::new(provider, EntityType::Price, entity_id, SyncStatus::Unchanged);
        let fingerprint = price.fingerprint();

        let mapping = match self.mappings.find(EntityType::Price, entity_id, provider).await {
            Ok(mapping) => mapping,
            Err(e) => return SyncOutcome { status: SyncStatus::Failed, ..outcome }.with_error(e),
        };

        if !price.active {
            // A deactivated price must stop being purchasable remotely.
            let Some(existing) = mapping else {
                return SyncOutcome { status: SyncStatus::Skipped, ..outcome };
            };
            return match self.retire_remote_price(&existing, None).await {
                Ok(()) => SyncOutcome { status: SyncStatus::Updated, ..outcome },
                Err(e) => SyncOutcome { status: SyncStatus::Failed, ..outcome }
                    .with_external_id(existing.external_id)
                    .with_error(e),
            };
        }
        if let Some(existing) = &mapping {
            if existing.is_current(&fingerprint) {
                return outcome.with_external_id(existing.external_id.clone());
            }
        }

        let external_id = match self
            .call_with_retry(|| adapter.create_price(price, external_product_id))
            .await
        {
            Ok(id) => id,
            Err(e) => return self.failed_or_unsupported(outcome, e),
        };

        let new_mapping = ProviderMapping::new(
            EntityType::Price,
            entity_id,
            provider,
            external_id.clone(),
            Some(fingerprint),
        );

        let Some(superseded) = mapping else {
            return match self.mappings.upsert(&new_mapping).await {
                Ok(()) => SyncOutcome { status: SyncStatus::Created, ..outcome }.with_external_id(external_id),
                Err(e) => SyncOutcome { status: SyncStatus::Failed, ..outcome }.with_error(e),
            };
        };

        // The old mapping stays in place unless its archive is queued with it,
        // so the next run retries the replacement.
        match self.retire_remote_price(&superseded, Some(&new_mapping)).await {
            Ok(()) => SyncOutcome { status: SyncStatus::Updated, ..outcome }.with_external_id(external_id),
            Err(e) => SyncOutcome { status: SyncStatus::Failed, ..outcome }
                .with_external_id(superseded.external_id)
                .with_error(e),
        }
    }

    /// Queues the archive of a mapped remote price and swaps or drops its mapping.
    async fn retire_remote_price(
        &self,
        existing: &ProviderMapping,
        replacement: Option<&ProviderMapping>,
    ) -> Result<(), DomainError> {
        let archive = DeletionOutboxEntry::new(
            EntityType::Price,
            existing.entity_id,
            existing.provider,
            existing.external_id.clone(),
            self.settings.outbox_max_attempts,
        );
        if let Err(e) = self.outbox.retire_mapping(&archive, replacement).await {
            tracing::error!(
                provider = %existing.provider,
                price = %existing.external_id,
                error = %e,
                "Failed to queue archive of retired price"
            );
            return Err(e);
        }
        tracing::info!(
            provider = %existing.provider,
            price = %existing.external_id,
            replaced = replacement.is_some(),
            "Queued archive of retired price"
        );
        Ok(())
    }

    fn failed_or_unsupported(&self, outcome: SyncOutcome, err: ProviderError) -> SyncOutcome {
        let status = if err.code == ProviderErrorCode::Unsupported {
            SyncStatus::Unsupported
        } else {
            SyncStatus::Failed
        };
        SyncOutcome { status, ..outcome }.with_error(err)
    }

    /// Runs a provider call, retrying transient failures with jittered backoff.
    async fn call_with_retry<T, F, Fut>(&self, action: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let factor = (self.settings.base_delay.as_millis() / 2).max(1) as u64;
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.settings.max_delay)
            .map(jitter)
            .take(self.settings.call_attempts.saturating_sub(1));

        RetryIf::start(strategy, action, |e: &ProviderError| e.is_retryable()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::providers::MockProviderAdapter;
    use crate::domain::billing::{BillingInterval, OutboxStatus};

    struct Fixture {
        handler: CatalogSyncHandler,
        store: InMemoryBillingStore,
        stripe: MockProviderAdapter,
        paddle: MockProviderAdapter,
    }

    fn fixture() -> Fixture {
        let store = InMemoryBillingStore::new();
        let stripe = MockProviderAdapter::new(BillingProvider::Stripe);
        let paddle = MockProviderAdapter::new(BillingProvider::Paddle);
        let lemon = MockProviderAdapter::without_catalog(BillingProvider::LemonSqueezy);
        let registry = ProviderRegistry::new()
            .with(Arc::new(stripe.clone()))
            .with(Arc::new(paddle.clone()))
            .with(Arc::new(lemon));
        let repo = Arc::new(store.clone());
        let settings = CatalogSyncSettings {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..Default::default()
        };
        Fixture {
            handler: CatalogSyncHandler::new(repo.clone(), repo.clone(), repo, registry, settings),
            store,
            stripe,
            paddle,
        }
    }

    async fn seed(store: &InMemoryBillingStore) -> (Product, Price) {
        let product = Product::new("Pro", Some("Pro plan".into())).unwrap();
        let price = Price::new(product.id, 1500, "usd", BillingInterval::Month).unwrap();
        store.save_product(&product).await.unwrap();
        store.save_price(&price).await.unwrap();
        (product, price)
    }

    #[tokio::test]
    async fn first_sync_creates_everywhere_supported() {
        let f = fixture();
        seed(&f.store).await;

        let report = f.handler.sync_all().await.unwrap();

        assert_eq!(report.count(SyncStatus::Created), 4);
        assert_eq!(report.count(SyncStatus::Unsupported), 2);
        assert!(!report.has_failures());
        assert_eq!(f.store.mappings().await.len(), 4);
    }

    #[tokio::test]
    async fn second_sync_is_unchanged() {
        let f = fixture();
        seed(&f.store).await;
        f.handler.sync_all().await.unwrap();

        let report = f.handler.sync_all().await.unwrap();

        assert_eq!(report.count(SyncStatus::Unchanged), 4);
        assert_eq!(f.stripe.calls_to("create_product"), 1);
    }

    #[tokio::test]
    async fn failing_provider_does_not_affect_others() {
        let f = fixture();
        seed(&f.store).await;
        f.paddle
            .fail_always("create_product", ProviderError::from_status(401, "bad key"));

        let report = f.handler.sync_all().await.unwrap();

        let stripe: Vec<_> = report.for_provider(BillingProvider::Stripe).collect();
        assert!(stripe.iter().all(|o| o.status == SyncStatus::Created));
        let paddle: Vec<_> = report.for_provider(BillingProvider::Paddle).map(|o| o.status).collect();
        assert_eq!(paddle, vec![SyncStatus::Failed, SyncStatus::Skipped]);
        // Permanent errors are not retried.
        assert_eq!(f.paddle.calls_to("create_product"), 1);
    }

    #[tokio::test]
    async fn transient_error_is_retried_in_call() {
        let f = fixture();
        seed(&f.store).await;
        f.stripe
            .fail_next("create_product", ProviderError::from_status(503, "unavailable"));

        let report = f.handler.sync_all().await.unwrap();

        assert!(!report.has_failures());
        assert_eq!(f.stripe.calls_to("create_product"), 2);
    }

    #[tokio::test]
    async fn transient_error_fails_after_call_attempts() {
        let f = fixture();
        seed(&f.store).await;
        f.stripe.fail_always("create_product", ProviderError::network("reset"));

        let report = f.handler.sync_all().await.unwrap();

        assert!(report.has_failures());
        assert_eq!(f.stripe.calls_to("create_product"), 3);
    }

    #[tokio::test]
    async fn changed_product_is_updated() {
        let f = fixture();
        let (mut product, _) = seed(&f.store).await;
        f.handler.sync_all().await.unwrap();

        product.name = "Pro Plus".to_string();
        f.store.save_product(&product).await.unwrap();
        let report = f.handler.sync_product(product.id).await.unwrap();

        let stripe_product = report
            .for_provider(BillingProvider::Stripe)
            .find(|o| o.entity_type == EntityType::Product)
            .unwrap();
        assert_eq!(stripe_product.status, SyncStatus::Updated);
        assert_eq!(f.stripe.calls_to("update_product"), 1);
    }

    #[tokio::test]
    async fn changed_price_replaces_remote_price_and_archives_old() {
        let f = fixture();
        let (_, mut price) = seed(&f.store).await;
        f.handler.sync_all().await.unwrap();
        let old = f
            .store
            .find(EntityType::Price, *price.id.as_uuid(), BillingProvider::Stripe)
            .await
            .unwrap()
            .unwrap();

        price.unit_amount = 2500;
        f.store.save_price(&price).await.unwrap();
        f.handler.sync_all().await.unwrap();

        let new = f
            .store
            .find(EntityType::Price, *price.id.as_uuid(), BillingProvider::Stripe)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(new.external_id, old.external_id);
        let outbox = f.store.outbox_entries().await;
        assert!(outbox
            .iter()
            .any(|e| e.external_id == old.external_id && e.status == OutboxStatus::Pending));
    }

    #[tokio::test]
    async fn deactivated_price_is_archived_on_providers() {
        let f = fixture();
        let (_, mut price) = seed(&f.store).await;
        f.handler.sync_all().await.unwrap();
        let remote = f
            .store
            .find(EntityType::Price, *price.id.as_uuid(), BillingProvider::Stripe)
            .await
            .unwrap()
            .unwrap();

        price.active = false;
        f.store.save_price(&price).await.unwrap();
        let report = f.handler.sync_all().await.unwrap();

        let statuses: Vec<_> = report
            .for_provider(BillingProvider::Stripe)
            .map(|o| (o.entity_type, o.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (EntityType::Product, SyncStatus::Unchanged),
                (EntityType::Price, SyncStatus::Updated)
            ]
        );
        let outbox = f.store.outbox_entries().await;
        assert_eq!(outbox.len(), 2);
        assert!(outbox.iter().any(|e| e.external_id == remote.external_id));
        assert!(f
            .store
            .list_for_entity(EntityType::Price, *price.id.as_uuid())
            .await
            .unwrap()
            .is_empty());

        // Once retired, the inactive price is left alone.
        let again = f.handler.sync_all().await.unwrap();
        assert_eq!(again.count(SyncStatus::Skipped), 2);
        assert_eq!(f.store.outbox_entries().await.len(), 2);
    }

    /// Outbox whose mapping retirement always fails.
    struct BrokenOutbox(InMemoryBillingStore);

    #[async_trait::async_trait]
    impl DeletionOutboxRepository for BrokenOutbox {
        async fn enqueue(&self, entries: &[DeletionOutboxEntry]) -> Result<(), DomainError> {
            DeletionOutboxRepository::enqueue(&self.0, entries).await
        }

        async fn retire_mapping(
            &self,
            _archive: &DeletionOutboxEntry,
            _replacement: Option<&ProviderMapping>,
        ) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::DatabaseError, "connection reset"))
        }

        async fn claim_due(&self, limit: u32) -> Result<Vec<DeletionOutboxEntry>, DomainError> {
            DeletionOutboxRepository::claim_due(&self.0, limit).await
        }

        async fn update(&self, entry: &DeletionOutboxEntry) -> Result<(), DomainError> {
            DeletionOutboxRepository::update(&self.0, entry).await
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

        async fn reclaim_stale(
            &self,
            updated_before: crate::domain::foundation::Timestamp,
        ) -> Result<u64, DomainError> {
            DeletionOutboxRepository::reclaim_stale(&self.0, updated_before).await
        }

        async fn purge_completed_before(
            &self,
            updated_before: crate::domain::foundation::Timestamp,
        ) -> Result<u64, DomainError> {
            DeletionOutboxRepository::purge_completed_before(&self.0, updated_before).await
        }
    }

    #[tokio::test]
    async fn failed_archive_enqueue_keeps_superseded_mapping() {
        let store = InMemoryBillingStore::new();
        let stripe = MockProviderAdapter::new(BillingProvider::Stripe);
        let repo = Arc::new(store.clone());
        let handler = CatalogSyncHandler::new(
            repo.clone(),
            repo,
            Arc::new(BrokenOutbox(store.clone())),
            ProviderRegistry::new().with(Arc::new(stripe.clone())),
            CatalogSyncSettings::default(),
        );
        let (_, mut price) = seed(&store).await;
        handler.sync_all().await.unwrap();
        let old = store
            .find(EntityType::Price, *price.id.as_uuid(), BillingProvider::Stripe)
            .await
            .unwrap()
            .unwrap();

        price.unit_amount = 2500;
        store.save_price(&price).await.unwrap();
        let report = handler.sync_all().await.unwrap();

        let outcome = report
            .for_provider(BillingProvider::Stripe)
            .find(|o| o.entity_type == EntityType::Price)
            .unwrap();
        assert_eq!(outcome.status, SyncStatus::Failed);
        assert_eq!(outcome.external_id.as_deref(), Some(old.external_id.as_str()));
        let kept = store
            .find(EntityType::Price, *price.id.as_uuid(), BillingProvider::Stripe)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.external_id, old.external_id);
        assert!(store.outbox_entries().await.is_empty());
    }

    #[tokio::test]
    async fn inactive_unsynced_product_is_skipped() {
        let f = fixture();
        let mut product = Product::new("Legacy", None).unwrap();
        product.active = false;
        f.store.save_product(&product).await.unwrap();

        let report = f.handler.sync_all().await.unwrap();

        assert_eq!(report.count(SyncStatus::Skipped), 2);
        assert_eq!(f.stripe.calls_to("create_product"), 0);
    }

    #[tokio::test]
    async fn sync_unknown_product_is_not_found() {
        let f = fixture();
        let err = f.handler.sync_product(ProductId::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ProductNotFound);
    }
}
