//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Saves are last-writer-wins on the provider's event time: an upsert whose
//! `last_event_at` is older than the stored row leaves the row untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_column;
use crate::domain::billing::{BillingProvider, Subscription, SubscriptionStatus};
use crate::domain::foundation::{
    DomainError, ErrorCode, PriceId, SubscriptionId, TeamId, Timestamp,
};
use crate::ports::SubscriptionRepository;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    team_id: Uuid,
    provider: String,
    external_id: String,
    external_customer_id: Option<String>,
    price_id: Option<Uuid>,
    status: String,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    last_event_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            team_id: TeamId::from_uuid(row.team_id),
            provider: parse_column("provider", &row.provider, |s| s.parse::<BillingProvider>().ok())?,
            external_id: row.external_id,
            external_customer_id: row.external_customer_id,
            price_id: row.price_id.map(PriceId::from_uuid),
            status: parse_column("status", &row.status, SubscriptionStatus::parse)?,
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end,
            last_event_at: Timestamp::from_datetime(row.last_event_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const COLUMNS: &str = "id, team_id, provider, external_id, external_customer_id, price_id, status, \
                       current_period_end, cancel_at_period_end, last_event_at, updated_at";

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn find_by_external_id(
        &self,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE provider = $1 AND external_id = $2",
            COLUMNS
        ))
        .bind(provider.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn save(&self, subscription: &Subscription) -> Result<Subscription, DomainError> {
        let written: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO subscriptions (
                id, team_id, provider, external_id, external_customer_id, price_id, status,
                current_period_end, cancel_at_period_end, last_event_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (provider, external_id) DO UPDATE SET
                team_id = EXCLUDED.team_id,
                external_customer_id = COALESCE(EXCLUDED.external_customer_id, subscriptions.external_customer_id),
                price_id = EXCLUDED.price_id,
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                last_event_at = EXCLUDED.last_event_at,
                updated_at = EXCLUDED.updated_at
            WHERE subscriptions.last_event_at <= EXCLUDED.last_event_at
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(subscription.id.as_uuid())
        .bind(subscription.team_id.as_uuid())
        .bind(subscription.provider.as_str())
        .bind(&subscription.external_id)
        .bind(&subscription.external_customer_id)
        .bind(subscription.price_id.map(|id| *id.as_uuid()))
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_end.map(|t| *t.as_datetime()))
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.last_event_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to save subscription", e))?;

        if let Some(row) = written {
            return Subscription::try_from(row);
        }

        // A newer event already landed; report the stored state.
        self.find_by_external_id(subscription.provider, &subscription.external_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Subscription {} vanished during save", subscription.external_id),
                )
            })
    }
}
