//! PostgreSQL implementation of InvoiceRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_column;
use crate::domain::billing::{BillingProvider, Invoice, InvoiceStatus};
use crate::domain::foundation::{DomainError, InvoiceId, TeamId, Timestamp};
use crate::ports::InvoiceRepository;

pub struct PostgresInvoiceRepository {
    pool: PgPool,
}

impl PostgresInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    team_id: Uuid,
    provider: String,
    external_id: String,
    external_subscription_id: Option<String>,
    amount_minor: i64,
    currency: String,
    status: String,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            team_id: TeamId::from_uuid(row.team_id),
            provider: parse_column("provider", &row.provider, |s| s.parse::<BillingProvider>().ok())?,
            external_id: row.external_id,
            external_subscription_id: row.external_subscription_id,
            amount_minor: row.amount_minor,
            currency: row.currency,
            status: parse_column("status", &row.status, InvoiceStatus::parse)?,
            occurred_at: Timestamp::from_datetime(row.occurred_at),
        })
    }
}

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    async fn find_by_external_id(
        &self,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<Invoice>, DomainError> {
        let row: Option<InvoiceRow> = sqlx::query_as(
            r#"
            SELECT id, team_id, provider, external_id, external_subscription_id,
                   amount_minor, currency, status, occurred_at
            FROM invoices
            WHERE provider = $1 AND external_id = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch invoice", e))?;

        row.map(Invoice::try_from).transpose()
    }

    async fn save(&self, invoice: &Invoice) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, team_id, provider, external_id, external_subscription_id,
                amount_minor, currency, status, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (provider, external_id) DO UPDATE SET
                external_subscription_id = EXCLUDED.external_subscription_id,
                amount_minor = EXCLUDED.amount_minor,
                currency = EXCLUDED.currency,
                status = EXCLUDED.status,
                occurred_at = EXCLUDED.occurred_at
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.team_id.as_uuid())
        .bind(invoice.provider.as_str())
        .bind(&invoice.external_id)
        .bind(&invoice.external_subscription_id)
        .bind(invoice.amount_minor)
        .bind(&invoice.currency)
        .bind(invoice.status.as_str())
        .bind(invoice.occurred_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to save invoice", e))?;

        Ok(())
    }
}
