//! PostgreSQL implementation of ProviderMappingRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_column;
use crate::domain::billing::{BillingProvider, EntityType, ProviderMapping};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::ProviderMappingRepository;

pub struct PostgresProviderMappingRepository {
    pool: PgPool,
}

impl PostgresProviderMappingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MappingRow {
    entity_type: String,
    entity_id: Uuid,
    provider: String,
    external_id: String,
    fingerprint: Option<String>,
    synced_at: DateTime<Utc>,
}

impl TryFrom<MappingRow> for ProviderMapping {
    type Error = DomainError;

    fn try_from(row: MappingRow) -> Result<Self, Self::Error> {
        Ok(ProviderMapping {
            entity_type: parse_column("entity_type", &row.entity_type, EntityType::parse)?,
            entity_id: row.entity_id,
            provider: parse_column("provider", &row.provider, |s| s.parse::<BillingProvider>().ok())?,
            external_id: row.external_id,
            fingerprint: row.fingerprint,
            synced_at: Timestamp::from_datetime(row.synced_at),
        })
    }
}

const COLUMNS: &str = "entity_type, entity_id, provider, external_id, fingerprint, synced_at";

#[async_trait]
impl ProviderMappingRepository for PostgresProviderMappingRepository {
    async fn find(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        provider: BillingProvider,
    ) -> Result<Option<ProviderMapping>, DomainError> {
        let row: Option<MappingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM provider_mappings WHERE entity_type = $1 AND entity_id = $2 AND provider = $3",
            COLUMNS
        ))
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch provider mapping", e))?;

        row.map(ProviderMapping::try_from).transpose()
    }

    async fn find_by_external_id(
        &self,
        entity_type: EntityType,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<ProviderMapping>, DomainError> {
        let row: Option<MappingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM provider_mappings WHERE entity_type = $1 AND provider = $2 AND external_id = $3",
            COLUMNS
        ))
        .bind(entity_type.as_str())
        .bind(provider.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch provider mapping", e))?;

        row.map(ProviderMapping::try_from).transpose()
    }

    async fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<ProviderMapping>, DomainError> {
        let rows: Vec<MappingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM provider_mappings WHERE entity_type = $1 AND entity_id = $2 ORDER BY provider",
            COLUMNS
        ))
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list provider mappings", e))?;

        rows.into_iter().map(ProviderMapping::try_from).collect()
    }

    async fn upsert(&self, mapping: &ProviderMapping) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO provider_mappings (
                entity_type, entity_id, provider, external_id, fingerprint, synced_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (entity_type, entity_id, provider) DO UPDATE SET
                external_id = EXCLUDED.external_id,
                fingerprint = EXCLUDED.fingerprint,
                synced_at = EXCLUDED.synced_at
            "#,
        )
        .bind(mapping.entity_type.as_str())
        .bind(mapping.entity_id)
        .bind(mapping.provider.as_str())
        .bind(&mapping.external_id)
        .bind(&mapping.fingerprint)
        .bind(mapping.synced_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to upsert provider mapping", e))?;

        Ok(())
    }
}
