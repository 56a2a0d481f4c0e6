//! PostgreSQL implementation of WebhookEventRepository.
//!
//! The unique constraint on `(provider, external_event_id)` makes
//! `insert_if_absent` race-free across replicas, and `claim_due` locks rows
//! with `FOR UPDATE SKIP LOCKED` so concurrent workers never share an event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{parse_column, to_count};
use crate::domain::billing::{BillingProvider, WebhookEvent, WebhookEventStatus};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, WebhookEventId};
use crate::ports::{SaveResult, WebhookEventRepository};

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    id: Uuid,
    provider: String,
    external_event_id: String,
    event_type: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    error_message: Option<String>,
    received_at: DateTime<Utc>,
    next_attempt_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WebhookEventRow> for WebhookEvent {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEvent {
            id: WebhookEventId::from_uuid(row.id),
            provider: parse_column("provider", &row.provider, |s| s.parse::<BillingProvider>().ok())?,
            external_event_id: row.external_event_id,
            event_type: row.event_type,
            payload: row.payload,
            status: parse_column("status", &row.status, WebhookEventStatus::parse)?,
            attempts: row.attempts.max(0) as u32,
            error_message: row.error_message,
            received_at: Timestamp::from_datetime(row.received_at),
            next_attempt_at: Timestamp::from_datetime(row.next_attempt_at),
            claimed_at: row.claimed_at.map(Timestamp::from_datetime),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
        })
    }
}

const COLUMNS: &str = "id, provider, external_event_id, event_type, payload, status, attempts, \
                       error_message, received_at, next_attempt_at, claimed_at, processed_at";

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn insert_if_absent(&self, event: &WebhookEvent) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id, provider, external_event_id, event_type, payload, status,
                attempts, error_message, received_at, next_attempt_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (provider, external_event_id) DO NOTHING
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.provider.as_str())
        .bind(&event.external_event_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(event.attempts as i32)
        .bind(&event.error_message)
        .bind(event.received_at.as_datetime())
        .bind(event.next_attempt_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to insert webhook event", e))?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn find_by_id(&self, id: WebhookEventId) -> Result<Option<WebhookEvent>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM webhook_events WHERE id = $1",
            COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch webhook event", e))?;

        row.map(WebhookEvent::try_from).transpose()
    }

    async fn find_by_external_id(
        &self,
        provider: BillingProvider,
        external_event_id: &str,
    ) -> Result<Option<WebhookEvent>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM webhook_events WHERE provider = $1 AND external_event_id = $2",
            COLUMNS
        ))
        .bind(provider.as_str())
        .bind(external_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch webhook event", e))?;

        row.map(WebhookEvent::try_from).transpose()
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError> {
        let rows: Vec<WebhookEventRow> = sqlx::query_as(&format!(
            r#"
            UPDATE webhook_events
            SET status = 'processing', attempts = attempts + 1, claimed_at = NOW()
            WHERE id IN (
                SELECT id FROM webhook_events
                WHERE status = 'pending' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at, received_at
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
        .map_err(|e| DomainError::database("Failed to claim webhook events", e))?;

        rows.into_iter().map(WebhookEvent::try_from).collect()
    }

    async fn update(&self, event: &WebhookEvent) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET
                status = $2,
                attempts = $3,
                error_message = $4,
                next_attempt_at = $5,
                claimed_at = $6,
                processed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.status.as_str())
        .bind(event.attempts as i32)
        .bind(&event.error_message)
        .bind(event.next_attempt_at.as_datetime())
        .bind(event.claimed_at.map(|t| *t.as_datetime()))
        .bind(event.processed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to update webhook event", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::WebhookEventNotFound,
                format!("Webhook event {} not found", event.id),
            ));
        }
        Ok(())
    }

    async fn reclaim_stale(
        &self,
        claimed_before: Timestamp,
        max_attempts: u32,
    ) -> Result<u64, DomainError> {
        // A claim that held the final attempt cannot be retried.
        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET
                status = CASE WHEN attempts >= $2 THEN 'failed' ELSE 'pending' END,
                error_message = CASE WHEN attempts >= $2
                                     THEN 'worker lease expired on final attempt'
                                     ELSE error_message END,
                processed_at = CASE WHEN attempts >= $2 THEN NOW() ELSE processed_at END,
                next_attempt_at = NOW(),
                claimed_at = NULL
            WHERE status = 'processing'
              AND (claimed_at IS NULL OR claimed_at < $1)
            "#,
        )
        .bind(claimed_before.as_datetime())
        .bind(max_attempts as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to reclaim webhook events", e))?;

        Ok(result.rows_affected())
    }

    async fn list_by_status(
        &self,
        status: WebhookEventStatus,
        limit: u32,
    ) -> Result<Vec<WebhookEvent>, DomainError> {
        let rows: Vec<WebhookEventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM webhook_events WHERE status = $1 ORDER BY received_at LIMIT $2",
            COLUMNS
        ))
        .bind(status.as_str())
        .bind(to_count(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list webhook events", e))?;

        rows.into_iter().map(WebhookEvent::try_from).collect()
    }

    async fn delete_before(&self, received_before: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            DELETE FROM webhook_events
            WHERE status IN ('processed', 'ignored') AND received_at < $1
            "#,
        )
        .bind(received_before.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to delete webhook events", e))?;

        Ok(result.rows_affected())
    }
}
