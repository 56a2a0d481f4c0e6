//! In-memory implementation of the billing repositories.
//!
//! One store backs every billing port so that multi-table operations such as
//! `delete_product_with_outbox` stay atomic under a single lock, the way the
//! Postgres adapter uses a transaction. Intended for tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::billing::{
    BillingProvider, DeletionOutboxEntry, EntityType, Invoice, OutboxStatus, Price, Product,
    ProviderMapping, Subscription, WebhookEvent, WebhookEventStatus,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, OutboxEntryId, PriceId, ProductId, Timestamp, WebhookEventId,
};
use crate::ports::{
    CatalogRepository, DeletionOutboxRepository, InvoiceRepository, ProviderMappingRepository,
    SaveResult, SubscriptionRepository, WebhookEventRepository,
};

#[derive(Default)]
struct State {
    events: HashMap<WebhookEventId, WebhookEvent>,
    products: HashMap<ProductId, Product>,
    prices: HashMap<PriceId, Price>,
    mappings: Vec<ProviderMapping>,
    outbox: HashMap<OutboxEntryId, DeletionOutboxEntry>,
    subscriptions: HashMap<(BillingProvider, String), Subscription>,
    invoices: HashMap<(BillingProvider, String), Invoice>,
}

impl State {
    /// Removes every mapping of the entity and turns each into an outbox entry.
    fn take_mappings_as_outbox(
        &mut self,
        entity_type: EntityType,
        entity_id: Uuid,
        max_attempts: u32,
    ) -> Vec<DeletionOutboxEntry> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.mappings)
            .into_iter()
            .partition(|m| m.entity_type == entity_type && m.entity_id == entity_id);
        self.mappings = kept;

        removed
            .into_iter()
            .map(|m| {
                let entry = DeletionOutboxEntry::new(
                    entity_type,
                    entity_id,
                    m.provider,
                    m.external_id,
                    max_attempts,
                );
                self.outbox.insert(entry.id, entry.clone());
                entry
            })
            .collect()
    }
}

/// In-memory billing store implementing all billing repository ports.
#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    pub async fn webhook_events(&self) -> Vec<WebhookEvent> {
        let mut events: Vec<_> = self.state.read().await.events.values().cloned().collect();
        events.sort_by_key(|e| e.received_at);
        events
    }

    pub async fn outbox_entries(&self) -> Vec<DeletionOutboxEntry> {
        let mut entries: Vec<_> = self.state.read().await.outbox.values().cloned().collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.state.read().await.subscriptions.values().cloned().collect()
    }

    pub async fn invoices(&self) -> Vec<Invoice> {
        self.state.read().await.invoices.values().cloned().collect()
    }

    pub async fn mappings(&self) -> Vec<ProviderMapping> {
        self.state.read().await.mappings.clone()
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryBillingStore {
    async fn insert_if_absent(&self, event: &WebhookEvent) -> Result<SaveResult, DomainError> {
        let mut state = self.state.write().await;
        let exists = state.events.values().any(|e| {
            e.provider == event.provider && e.external_event_id == event.external_event_id
        });
        if exists {
            return Ok(SaveResult::AlreadyExists);
        }
        state.events.insert(event.id, event.clone());
        Ok(SaveResult::Inserted)
    }

    async fn find_by_id(&self, id: WebhookEventId) -> Result<Option<WebhookEvent>, DomainError> {
        Ok(self.state.read().await.events.get(&id).cloned())
    }

    async fn find_by_external_id(
        &self,
        provider: BillingProvider,
        external_event_id: &str,
    ) -> Result<Option<WebhookEvent>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .events
            .values()
            .find(|e| e.provider == provider && e.external_event_id == external_event_id)
            .cloned())
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError> {
        let now = Timestamp::now();
        let mut state = self.state.write().await;

        let mut due: Vec<(Timestamp, Timestamp, WebhookEventId)> = state
            .events
            .values()
            .filter(|e| e.is_due(now))
            .map(|e| (e.next_attempt_at, e.received_at, e.id))
            .collect();
        due.sort();

        let mut claimed = Vec::new();
        for (_, _, id) in due.into_iter().take(limit as usize) {
            if let Some(event) = state.events.get_mut(&id) {
                event.begin_attempt()?;
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    async fn update(&self, event: &WebhookEvent) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        match state.events.get_mut(&event.id) {
            Some(existing) => {
                *existing = event.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::WebhookEventNotFound,
                format!("Webhook event {} not found", event.id),
            )),
        }
    }

    async fn reclaim_stale(
        &self,
        claimed_before: Timestamp,
        max_attempts: u32,
    ) -> Result<u64, DomainError> {
        let mut state = self.state.write().await;
        let mut count = 0;
        for event in state.events.values_mut() {
            let stale = event.status == WebhookEventStatus::Processing
                && event.claimed_at.map_or(true, |at| at.is_before(&claimed_before));
            if stale {
                event.reclaim(max_attempts)?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_by_status(
        &self,
        status: WebhookEventStatus,
        limit: u32,
    ) -> Result<Vec<WebhookEvent>, DomainError> {
        let mut events: Vec<_> = self
            .state
            .read()
            .await
            .events
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.received_at);
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn delete_before(&self, received_before: Timestamp) -> Result<u64, DomainError> {
        let mut state = self.state.write().await;
        let before = state.events.len();
        state.events.retain(|_, e| {
            let purgeable = matches!(
                e.status,
                WebhookEventStatus::Processed | WebhookEventStatus::Ignored
            );
            !(purgeable && e.received_at.is_before(&received_before))
        });
        Ok((before - state.events.len()) as u64)
    }
}

#[async_trait]
impl ProviderMappingRepository for InMemoryBillingStore {
    async fn find(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        provider: BillingProvider,
    ) -> Result<Option<ProviderMapping>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .mappings
            .iter()
            .find(|m| m.entity_type == entity_type && m.entity_id == entity_id && m.provider == provider)
            .cloned())
    }

    async fn find_by_external_id(
        &self,
        entity_type: EntityType,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<ProviderMapping>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .mappings
            .iter()
            .find(|m| {
                m.entity_type == entity_type && m.provider == provider && m.external_id == external_id
            })
            .cloned())
    }

    async fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<ProviderMapping>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .mappings
            .iter()
            .filter(|m| m.entity_type == entity_type && m.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, mapping: &ProviderMapping) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        let taken = state.mappings.iter().any(|m| {
            m.entity_type == mapping.entity_type
                && m.provider == mapping.provider
                && m.external_id == mapping.external_id
                && m.entity_id != mapping.entity_id
        });
        if taken {
            return Err(DomainError::database(
                "Failed to upsert provider mapping",
                format!("external id {} already mapped", mapping.external_id),
            ));
        }
        state.mappings.retain(|m| {
            !(m.entity_type == mapping.entity_type
                && m.entity_id == mapping.entity_id
                && m.provider == mapping.provider)
        });
        state.mappings.push(mapping.clone());
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryBillingStore {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, DomainError> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, DomainError> {
        let mut products: Vec<_> = self.state.read().await.products.values().cloned().collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn find_price(&self, id: PriceId) -> Result<Option<Price>, DomainError> {
        Ok(self.state.read().await.prices.get(&id).cloned())
    }

    async fn list_prices_for_product(&self, product_id: ProductId) -> Result<Vec<Price>, DomainError> {
        let mut prices: Vec<_> = self
            .state
            .read()
            .await
            .prices
            .values()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect();
        prices.sort_by_key(|p| p.id);
        Ok(prices)
    }

    async fn save_product(&self, product: &Product) -> Result<(), DomainError> {
        self.state.write().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn save_price(&self, price: &Price) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(&price.product_id) {
            return Err(DomainError::new(
                ErrorCode::ProductNotFound,
                format!("Product {} not found", price.product_id),
            ));
        }
        state.prices.insert(price.id, price.clone());
        Ok(())
    }

    async fn delete_product_with_outbox(
        &self,
        id: ProductId,
        max_attempts: u32,
    ) -> Result<Option<Vec<DeletionOutboxEntry>>, DomainError> {
        let mut state = self.state.write().await;
        if state.products.remove(&id).is_none() {
            return Ok(None);
        }

        let price_ids: Vec<PriceId> = state
            .prices
            .values()
            .filter(|p| p.product_id == id)
            .map(|p| p.id)
            .collect();

        let mut entries = Vec::new();
        for price_id in price_ids {
            state.prices.remove(&price_id);
            entries.extend(state.take_mappings_as_outbox(
                EntityType::Price,
                *price_id.as_uuid(),
                max_attempts,
            ));
        }
        entries.extend(state.take_mappings_as_outbox(EntityType::Product, *id.as_uuid(), max_attempts));
        Ok(Some(entries))
    }

    async fn delete_price_with_outbox(
        &self,
        id: PriceId,
        max_attempts: u32,
    ) -> Result<Option<Vec<DeletionOutboxEntry>>, DomainError> {
        let mut state = self.state.write().await;
        if state.prices.remove(&id).is_none() {
            return Ok(None);
        }
        Ok(Some(state.take_mappings_as_outbox(EntityType::Price, *id.as_uuid(), max_attempts)))
    }
}

#[async_trait]
impl DeletionOutboxRepository for InMemoryBillingStore {
    async fn enqueue(&self, entries: &[DeletionOutboxEntry]) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        for entry in entries {
            state.outbox.insert(entry.id, entry.clone());
        }
        Ok(())
    }

    async fn retire_mapping(
        &self,
        archive: &DeletionOutboxEntry,
        replacement: Option<&ProviderMapping>,
    ) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        state.mappings.retain(|m| {
            !(m.entity_type == archive.entity_type
                && m.entity_id == archive.entity_id
                && m.provider == archive.provider)
        });
        if let Some(mapping) = replacement {
            state.mappings.push(mapping.clone());
        }
        state.outbox.insert(archive.id, archive.clone());
        Ok(())
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<DeletionOutboxEntry>, DomainError> {
        let now = Timestamp::now();
        let mut state = self.state.write().await;

        let mut due: Vec<(Timestamp, Timestamp, OutboxEntryId)> = state
            .outbox
            .values()
            .filter(|e| e.is_due(now))
            .map(|e| (e.next_attempt_at, e.created_at, e.id))
            .collect();
        due.sort();

        let mut claimed = Vec::new();
        for (_, _, id) in due.into_iter().take(limit as usize) {
            if let Some(entry) = state.outbox.get_mut(&id) {
                entry.begin_attempt()?;
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn update(&self, entry: &DeletionOutboxEntry) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        match state.outbox.get_mut(&entry.id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::OutboxEntryNotFound,
                format!("Outbox entry {} not found", entry.id),
            )),
        }
    }

    async fn find_by_id(&self, id: OutboxEntryId) -> Result<Option<DeletionOutboxEntry>, DomainError> {
        Ok(self.state.read().await.outbox.get(&id).cloned())
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: u32,
    ) -> Result<Vec<DeletionOutboxEntry>, DomainError> {
        let mut entries: Vec<_> = self
            .state
            .read()
            .await
            .outbox
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn reclaim_stale(&self, updated_before: Timestamp) -> Result<u64, DomainError> {
        let mut state = self.state.write().await;
        let mut count = 0;
        for entry in state.outbox.values_mut() {
            if entry.status == OutboxStatus::Processing && entry.updated_at.is_before(&updated_before) {
                entry.reclaim()?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_completed_before(&self, updated_before: Timestamp) -> Result<u64, DomainError> {
        let mut state = self.state.write().await;
        let before = state.outbox.len();
        state.outbox.retain(|_, e| {
            !(e.status == OutboxStatus::Completed && e.updated_at.is_before(&updated_before))
        });
        Ok((before - state.outbox.len()) as u64)
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryBillingStore {
    async fn find_by_external_id(
        &self,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .get(&(provider, external_id.to_string()))
            .cloned())
    }

    async fn save(&self, subscription: &Subscription) -> Result<Subscription, DomainError> {
        let mut state = self.state.write().await;
        let key = (subscription.provider, subscription.external_id.clone());

        if let Some(existing) = state.subscriptions.get(&key) {
            if existing.last_event_at.is_after(&subscription.last_event_at) {
                return Ok(existing.clone());
            }
            let mut updated = subscription.clone();
            updated.id = existing.id;
            state.subscriptions.insert(key, updated.clone());
            return Ok(updated);
        }

        state.subscriptions.insert(key, subscription.clone());
        Ok(subscription.clone())
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryBillingStore {
    async fn find_by_external_id(
        &self,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<Invoice>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .invoices
            .get(&(provider, external_id.to_string()))
            .cloned())
    }

    async fn save(&self, invoice: &Invoice) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        let key = (invoice.provider, invoice.external_id.clone());
        let mut stored = invoice.clone();
        if let Some(existing) = state.invoices.get(&key) {
            stored.id = existing.id;
        }
        state.invoices.insert(key, stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{BillingInterval, WebhookEnvelope};

    fn event(external_id: &str) -> WebhookEvent {
        WebhookEvent::received(
            BillingProvider::Stripe,
            WebhookEnvelope {
                external_event_id: external_id.to_string(),
                event_type: "invoice.paid".to_string(),
                livemode: true,
            },
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn insert_if_absent_rejects_same_idempotency_key() {
        let store = InMemoryBillingStore::new();
        assert_eq!(store.insert_if_absent(&event("evt_1")).await.unwrap(), SaveResult::Inserted);
        assert_eq!(
            store.insert_if_absent(&event("evt_1")).await.unwrap(),
            SaveResult::AlreadyExists
        );
        assert_eq!(store.webhook_events().await.len(), 1);
    }

    #[tokio::test]
    async fn same_event_id_on_different_providers_is_distinct() {
        let store = InMemoryBillingStore::new();
        let mut paddle = event("evt_1");
        paddle.provider = BillingProvider::Paddle;
        store.insert_if_absent(&event("evt_1")).await.unwrap();
        assert_eq!(store.insert_if_absent(&paddle).await.unwrap(), SaveResult::Inserted);
    }

    #[tokio::test]
    async fn claim_due_claims_each_event_once() {
        let store = InMemoryBillingStore::new();
        for i in 0..3 {
            store.insert_if_absent(&event(&format!("evt_{}", i))).await.unwrap();
        }

        let first = WebhookEventRepository::claim_due(&store, 2).await.unwrap();
        let second = WebhookEventRepository::claim_due(&store, 10).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(first.iter().all(|e| e.status == WebhookEventStatus::Processing && e.attempts == 1));
    }

    #[tokio::test]
    async fn reclaim_stale_returns_abandoned_claims() {
        let store = InMemoryBillingStore::new();
        store.insert_if_absent(&event("evt_1")).await.unwrap();
        WebhookEventRepository::claim_due(&store, 1).await.unwrap();

        let reclaimed = WebhookEventRepository::reclaim_stale(&store, Timestamp::now().plus_secs(1), 5)
            .await
            .unwrap();

        assert_eq!(reclaimed, 1);
        assert_eq!(store.webhook_events().await[0].status, WebhookEventStatus::Pending);
    }

    #[tokio::test]
    async fn delete_product_moves_mappings_to_outbox() {
        let store = InMemoryBillingStore::new();
        let product = Product::new("Pro", None).unwrap();
        let price = Price::new(product.id, 1000, "usd", BillingInterval::Month).unwrap();
        store.save_product(&product).await.unwrap();
        store.save_price(&price).await.unwrap();
        store
            .upsert(&ProviderMapping::new(
                EntityType::Product,
                *product.id.as_uuid(),
                BillingProvider::Stripe,
                "prod_1",
                None,
            ))
            .await
            .unwrap();
        store
            .upsert(&ProviderMapping::new(
                EntityType::Price,
                *price.id.as_uuid(),
                BillingProvider::Stripe,
                "price_1",
                None,
            ))
            .await
            .unwrap();

        let entries = store.delete_product_with_outbox(product.id, 5).await.unwrap().unwrap();

        assert_eq!(entries.len(), 2);
        assert!(store.mappings().await.is_empty());
        assert!(store.find_price(price.id).await.unwrap().is_none());
        assert_eq!(store.outbox_entries().await.len(), 2);
    }

    #[tokio::test]
    async fn delete_missing_product_returns_none() {
        let store = InMemoryBillingStore::new();
        assert!(store.delete_product_with_outbox(ProductId::new(), 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mapping_external_id_is_unique_per_provider() {
        let store = InMemoryBillingStore::new();
        let a = ProviderMapping::new(EntityType::Price, Uuid::new_v4(), BillingProvider::Stripe, "price_1", None);
        let b = ProviderMapping::new(EntityType::Price, Uuid::new_v4(), BillingProvider::Stripe, "price_1", None);
        store.upsert(&a).await.unwrap();
        assert!(store.upsert(&b).await.is_err());
    }
}
