//! CatalogRepository port - local products and prices.
//!
//! Catalog editing happens elsewhere; the billing pipeline reads the catalog
//! for sync and owns deletion, which must enqueue remote archive work in the
//! same transaction as the local delete.

use async_trait::async_trait;

use crate::domain::billing::{DeletionOutboxEntry, Price, Product};
use crate::domain::foundation::{DomainError, PriceId, ProductId};

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, DomainError>;

    async fn list_products(&self) -> Result<Vec<Product>, DomainError>;

    async fn find_price(&self, id: PriceId) -> Result<Option<Price>, DomainError>;

    async fn list_prices_for_product(&self, product_id: ProductId) -> Result<Vec<Price>, DomainError>;

    async fn save_product(&self, product: &Product) -> Result<(), DomainError>;

    async fn save_price(&self, price: &Price) -> Result<(), DomainError>;

    /// Deletes a product, its prices and their provider mappings, and enqueues
    /// one outbox entry per deleted mapping, all in one transaction.
    ///
    /// Returns `None` if the product does not exist.
    async fn delete_product_with_outbox(
        &self,
        id: ProductId,
        max_attempts: u32,
    ) -> Result<Option<Vec<DeletionOutboxEntry>>, DomainError>;

    /// Deletes a price and its provider mappings, enqueueing outbox entries.
    ///
    /// Returns `None` if the price does not exist.
    async fn delete_price_with_outbox(
        &self,
        id: PriceId,
        max_attempts: u32,
    ) -> Result<Option<Vec<DeletionOutboxEntry>>, DomainError>;
}
