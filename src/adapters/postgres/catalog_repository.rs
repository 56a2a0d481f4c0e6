//! PostgreSQL implementation of CatalogRepository.
//!
//! Deleting a product or price removes its provider mappings and writes one
//! outbox row per mapping in the same transaction, so a local delete can
//! never lose track of the remote objects it leaves behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::deletion_outbox_repository::insert_entry;
use super::parse_column;
use crate::domain::billing::{
    BillingInterval, BillingProvider, DeletionOutboxEntry, EntityType, Price, Product,
};
use crate::domain::foundation::{DomainError, ErrorCode, PriceId, ProductId, Timestamp};
use crate::ports::CatalogRepository;

pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, DomainError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    active: bool,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            active: row.active,
            updated_at: Timestamp::from_datetime(row.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PriceRow {
    id: Uuid,
    product_id: Uuid,
    unit_amount: i64,
    currency: String,
    billing_interval: String,
    active: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PriceRow> for Price {
    type Error = DomainError;

    fn try_from(row: PriceRow) -> Result<Self, Self::Error> {
        Ok(Price {
            id: PriceId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            unit_amount: row.unit_amount,
            currency: row.currency,
            interval: parse_column("billing_interval", &row.billing_interval, BillingInterval::parse)?,
            active: row.active,
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RemovedMappingRow {
    provider: String,
    external_id: String,
}

/// Deletes every mapping of an entity and queues a remote archive for each.
async fn take_mappings_as_outbox(
    tx: &mut Transaction<'_, Postgres>,
    entity_type: EntityType,
    entity_id: Uuid,
    max_attempts: u32,
) -> Result<Vec<DeletionOutboxEntry>, DomainError> {
    let removed: Vec<RemovedMappingRow> = sqlx::query_as(
        r#"
        DELETE FROM provider_mappings
        WHERE entity_type = $1 AND entity_id = $2
        RETURNING provider, external_id
        "#,
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| DomainError::database("Failed to delete provider mappings", e))?;

    let mut entries = Vec::with_capacity(removed.len());
    for row in removed {
        let provider = parse_column("provider", &row.provider, |s| s.parse::<BillingProvider>().ok())?;
        let entry = DeletionOutboxEntry::new(entity_type, entity_id, provider, row.external_id, max_attempts);
        insert_entry(tx, &entry).await?;
        entries.push(entry);
    }
    Ok(entries)
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), DomainError> {
    tx.commit()
        .await
        .map_err(|e| DomainError::database("Failed to commit transaction", e))
}

const PRICE_COLUMNS: &str =
    "id, product_id, unit_amount, currency, billing_interval, active, updated_at";

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, DomainError> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, name, description, active, updated_at FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch product", e))?;

        Ok(row.map(Product::from))
    }

    async fn list_products(&self) -> Result<Vec<Product>, DomainError> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, name, description, active, updated_at FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list products", e))?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn find_price(&self, id: PriceId) -> Result<Option<Price>, DomainError> {
        let row: Option<PriceRow> =
            sqlx::query_as(&format!("SELECT {} FROM prices WHERE id = $1", PRICE_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database("Failed to fetch price", e))?;

        row.map(Price::try_from).transpose()
    }

    async fn list_prices_for_product(&self, product_id: ProductId) -> Result<Vec<Price>, DomainError> {
        let rows: Vec<PriceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM prices WHERE product_id = $1 ORDER BY id",
            PRICE_COLUMNS
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list prices", e))?;

        rows.into_iter().map(Price::try_from).collect()
    }

    async fn save_product(&self, product: &Product) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, active, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.active)
        .bind(product.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to save product", e))?;

        Ok(())
    }

    async fn save_price(&self, price: &Price) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO prices (id, product_id, unit_amount, currency, billing_interval, active, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                unit_amount = EXCLUDED.unit_amount,
                currency = EXCLUDED.currency,
                billing_interval = EXCLUDED.billing_interval,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(price.id.as_uuid())
        .bind(price.product_id.as_uuid())
        .bind(price.unit_amount)
        .bind(&price.currency)
        .bind(price.interval.as_str())
        .bind(price.active)
        .bind(price.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => DomainError::new(
                ErrorCode::ProductNotFound,
                format!("Product {} not found", price.product_id),
            ),
            other => DomainError::database("Failed to save price", other),
        })?;

        Ok(())
    }

    async fn delete_product_with_outbox(
        &self,
        id: ProductId,
        max_attempts: u32,
    ) -> Result<Option<Vec<DeletionOutboxEntry>>, DomainError> {
        let mut tx = self.begin().await?;

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DomainError::database("Failed to lock product", e))?;
        if exists.is_none() {
            return Ok(None);
        }

        let price_ids: Vec<(Uuid,)> =
            sqlx::query_as("DELETE FROM prices WHERE product_id = $1 RETURNING id")
                .bind(id.as_uuid())
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| DomainError::database("Failed to delete prices", e))?;

        let mut entries = Vec::new();
        for (price_id,) in price_ids {
            entries.extend(take_mappings_as_outbox(&mut tx, EntityType::Price, price_id, max_attempts).await?);
        }
        entries.extend(take_mappings_as_outbox(&mut tx, EntityType::Product, *id.as_uuid(), max_attempts).await?);

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::database("Failed to delete product", e))?;

        commit(tx).await?;
        Ok(Some(entries))
    }

    async fn delete_price_with_outbox(
        &self,
        id: PriceId,
        max_attempts: u32,
    ) -> Result<Option<Vec<DeletionOutboxEntry>>, DomainError> {
        let mut tx = self.begin().await?;

        let deleted = sqlx::query("DELETE FROM prices WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::database("Failed to delete price", e))?;
        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        let entries = take_mappings_as_outbox(&mut tx, EntityType::Price, *id.as_uuid(), max_attempts).await?;

        commit(tx).await?;
        Ok(Some(entries))
    }
}
