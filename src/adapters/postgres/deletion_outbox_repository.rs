//! PostgreSQL implementation of DeletionOutboxRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{parse_column, to_count};
use crate::domain::billing::{
    BillingProvider, DeletionOutboxEntry, EntityType, OutboxStatus, ProviderMapping,
};
use crate::domain::foundation::{DomainError, ErrorCode, OutboxEntryId, Timestamp};
use crate::ports::DeletionOutboxRepository;

pub struct PostgresDeletionOutboxRepository {
    pool: PgPool,
}

impl PostgresDeletionOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    entity_type: String,
    entity_id: Uuid,
    provider: String,
    external_id: String,
    status: String,
    attempts: i32,
    max_attempts: i32,
    last_error: Option<String>,
    next_attempt_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for DeletionOutboxEntry {
    type Error = DomainError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(DeletionOutboxEntry {
            id: OutboxEntryId::from_uuid(row.id),
            entity_type: parse_column("entity_type", &row.entity_type, EntityType::parse)?,
            entity_id: row.entity_id,
            provider: parse_column("provider", &row.provider, |s| s.parse::<BillingProvider>().ok())?,
            external_id: row.external_id,
            status: parse_column("status", &row.status, OutboxStatus::parse)?,
            attempts: row.attempts.max(0) as u32,
            max_attempts: row.max_attempts.max(1) as u32,
            last_error: row.last_error,
            next_attempt_at: Timestamp::from_datetime(row.next_attempt_at),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const COLUMNS: &str = "id, entity_type, entity_id, provider, external_id, status, attempts, \
                       max_attempts, last_error, next_attempt_at, created_at, updated_at";

/// Inserts an outbox row inside the caller's transaction.
pub(super) async fn insert_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &DeletionOutboxEntry,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO provider_deletion_outbox (
            id, entity_type, entity_id, provider, external_id, status,
            attempts, max_attempts, last_error, next_attempt_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.entity_type.as_str())
    .bind(entry.entity_id)
    .bind(entry.provider.as_str())
    .bind(&entry.external_id)
    .bind(entry.status.as_str())
    .bind(entry.attempts as i32)
    .bind(entry.max_attempts as i32)
    .bind(&entry.last_error)
    .bind(entry.next_attempt_at.as_datetime())
    .bind(entry.created_at.as_datetime())
    .bind(entry.updated_at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(|e| DomainError::database("Failed to insert outbox entry", e))?;

    Ok(())
}

#[async_trait]
impl DeletionOutboxRepository for PostgresDeletionOutboxRepository {
    async fn enqueue(&self, entries: &[DeletionOutboxEntry]) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;

        for entry in entries {
            insert_entry(&mut tx, entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::database("Failed to commit transaction", e))
    }

    async fn retire_mapping(
        &self,
        archive: &DeletionOutboxEntry,
        replacement: Option<&ProviderMapping>,
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;

        match replacement {
            Some(mapping) => {
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
                .execute(&mut *tx)
                .await
                .map_err(|e| DomainError::database("Failed to replace provider mapping", e))?;
            }
            None => {
                sqlx::query(
                    r#"
                    DELETE FROM provider_mappings
                    WHERE entity_type = $1 AND entity_id = $2 AND provider = $3
                    "#,
                )
                .bind(archive.entity_type.as_str())
                .bind(archive.entity_id)
                .bind(archive.provider.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| DomainError::database("Failed to delete provider mapping", e))?;
            }
        }

        insert_entry(&mut tx, archive).await?;

        tx.commit()
            .await
            .map_err(|e| DomainError::database("Failed to commit transaction", e))
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<DeletionOutboxEntry>, DomainError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            r#"
            UPDATE provider_deletion_outbox
            SET status = 'processing', attempts = attempts + 1, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM provider_deletion_outbox
                WHERE status = 'pending'
                  AND attempts < max_attempts
                  AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at, created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(to_count(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to claim outbox entries", e))?;

        rows.into_iter().map(DeletionOutboxEntry::try_from).collect()
    }

    async fn update(&self, entry: &DeletionOutboxEntry) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE provider_deletion_outbox SET
                status = $2,
                attempts = $3,
                last_error = $4,
                next_attempt_at = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.status.as_str())
        .bind(entry.attempts as i32)
        .bind(&entry.last_error)
        .bind(entry.next_attempt_at.as_datetime())
        .bind(entry.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to update outbox entry", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::OutboxEntryNotFound,
                format!("Outbox entry {} not found", entry.id),
            ));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: OutboxEntryId) -> Result<Option<DeletionOutboxEntry>, DomainError> {
        let row: Option<OutboxRow> = sqlx::query_as(&format!(
            "SELECT {} FROM provider_deletion_outbox WHERE id = $1",
            COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch outbox entry", e))?;

        row.map(DeletionOutboxEntry::try_from).transpose()
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: u32,
    ) -> Result<Vec<DeletionOutboxEntry>, DomainError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            "SELECT {} FROM provider_deletion_outbox WHERE status = $1 ORDER BY created_at LIMIT $2",
            COLUMNS
        ))
        .bind(status.as_str())
        .bind(to_count(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list outbox entries", e))?;

        rows.into_iter().map(DeletionOutboxEntry::try_from).collect()
    }

    async fn reclaim_stale(&self, updated_before: Timestamp) -> Result<u64, DomainError> {
        // A lease that held the final attempt cannot be retried.
        let result = sqlx::query(
            r#"
            UPDATE provider_deletion_outbox SET
                status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
                last_error = CASE WHEN attempts >= max_attempts
                                  THEN 'worker lease expired on final attempt'
                                  ELSE last_error END,
                next_attempt_at = NOW(),
                updated_at = NOW()
            WHERE status = 'processing' AND updated_at < $1
            "#,
        )
        .bind(updated_before.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to reclaim outbox entries", e))?;

        Ok(result.rows_affected())
    }

    async fn purge_completed_before(&self, updated_before: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM provider_deletion_outbox WHERE status = 'completed' AND updated_at < $1",
        )
        .bind(updated_before.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to purge outbox entries", e))?;

        Ok(result.rows_affected())
    }
}
