//! DeleteCatalogEntityHandler - Deletes products and prices locally and
//! defers the remote archive to the deletion outbox.

use std::sync::Arc;

use tokio::sync::Notify;

use crate::domain::billing::DeletionOutboxEntry;
use crate::domain::foundation::{DomainError, ErrorCode, PriceId, ProductId};
use crate::ports::CatalogRepository;

/// Result of a local delete.
#[derive(Debug, Clone)]
pub struct DeleteCatalogEntityResult {
    /// One entry per provider the entity was synced to.
    pub enqueued: Vec<DeletionOutboxEntry>,
}

pub struct DeleteCatalogEntityHandler {
    catalog: Arc<dyn CatalogRepository>,
    outbox_max_attempts: u32,
    outbox_wake: Arc<Notify>,
}

impl DeleteCatalogEntityHandler {
    pub fn new(catalog: Arc<dyn CatalogRepository>, outbox_max_attempts: u32, outbox_wake: Arc<Notify>) -> Self {
        Self {
            catalog,
            outbox_max_attempts,
            outbox_wake,
        }
    }

    /// Deletes a product with all of its prices.
    pub async fn delete_product(&self, id: ProductId) -> Result<DeleteCatalogEntityResult, DomainError> {
        let enqueued = self
            .catalog
            .delete_product_with_outbox(id, self.outbox_max_attempts)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::ProductNotFound, format!("Product {} not found", id)))?;

        tracing::info!(product_id = %id, remote_archives = enqueued.len(), "Product deleted");
        self.wake_if_any(&enqueued);
        Ok(DeleteCatalogEntityResult { enqueued })
    }

    pub async fn delete_price(&self, id: PriceId) -> Result<DeleteCatalogEntityResult, DomainError> {
        let enqueued = self
            .catalog
            .delete_price_with_outbox(id, self.outbox_max_attempts)
            .await?
            .ok_or_else(|| DomainError::new(ErrorCode::PriceNotFound, format!("Price {} not found", id)))?;

        tracing::info!(price_id = %id, remote_archives = enqueued.len(), "Price deleted");
        self.wake_if_any(&enqueued);
        Ok(DeleteCatalogEntityResult { enqueued })
    }

    fn wake_if_any(&self, enqueued: &[DeletionOutboxEntry]) {
        if !enqueued.is_empty() {
            self.outbox_wake.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::{BillingInterval, BillingProvider, EntityType, Price, Product, ProviderMapping};
    use crate::ports::ProviderMappingRepository;

    fn handler(store: &InMemoryBillingStore) -> DeleteCatalogEntityHandler {
        DeleteCatalogEntityHandler::new(Arc::new(store.clone()), 4, Arc::new(Notify::new()))
    }

    #[tokio::test]
    async fn deleting_synced_price_enqueues_one_entry_per_provider() {
        let store = InMemoryBillingStore::new();
        let product = Product::new("Pro", None).unwrap();
        let price = Price::new(product.id, 900, "eur", BillingInterval::Year).unwrap();
        store.save_product(&product).await.unwrap();
        store.save_price(&price).await.unwrap();
        for (provider, ext) in [(BillingProvider::Stripe, "price_1"), (BillingProvider::Paddle, "pri_1")] {
            store
                .upsert(&ProviderMapping::new(EntityType::Price, *price.id.as_uuid(), provider, ext, None))
                .await
                .unwrap();
        }

        let result = handler(&store).delete_price(price.id).await.unwrap();

        assert_eq!(result.enqueued.len(), 2);
        assert!(result.enqueued.iter().all(|e| e.max_attempts == 4));
        assert!(store.find_price(price.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_unsynced_product_enqueues_nothing() {
        let store = InMemoryBillingStore::new();
        let product = Product::new("Local only", None).unwrap();
        store.save_product(&product).await.unwrap();

        let result = handler(&store).delete_product(product.id).await.unwrap();

        assert!(result.enqueued.is_empty());
        assert!(store.find_product(product.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_missing_entities_is_not_found() {
        let store = InMemoryBillingStore::new();
        let h = handler(&store);

        assert_eq!(h.delete_product(ProductId::new()).await.unwrap_err().code, ErrorCode::ProductNotFound);
        assert_eq!(h.delete_price(PriceId::new()).await.unwrap_err().code, ErrorCode::PriceNotFound);
    }
}
