//! Redis-backed entitlements notifier.
//!
//! On every change the team's cached entitlements key is deleted so the
//! next read recomputes it from the stored subscription, and a JSON message
//! is published for listeners such as the notification service.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Serialize;

use crate::domain::billing::{Invoice, Subscription};
use crate::domain::foundation::{DomainError, ErrorCode, TeamId};
use crate::ports::EntitlementsNotifier;

#[derive(Clone)]
pub struct RedisEntitlementsNotifier {
    conn: MultiplexedConnection,
    channel: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EntitlementsMessage<'a> {
    SubscriptionChanged {
        team_id: String,
        provider: &'a str,
        status: &'a str,
        has_access: bool,
    },
    PaymentFailed {
        team_id: String,
        provider: &'a str,
        invoice: &'a str,
        amount_minor: i64,
        currency: &'a str,
    },
}

impl RedisEntitlementsNotifier {
    pub fn new(conn: MultiplexedConnection, channel: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
        }
    }

    /// Cache key holding a team's computed entitlements.
    pub fn cache_key(team_id: &TeamId) -> String {
        format!("entitlements:{}", team_id)
    }

    async fn invalidate_and_publish(
        &self,
        team_id: &TeamId,
        message: &EntitlementsMessage<'_>,
    ) -> Result<(), DomainError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        let mut conn = self.conn.clone();

        conn.del::<_, ()>(Self::cache_key(team_id))
            .await
            .map_err(|e: redis::RedisError| DomainError::new(ErrorCode::CacheError, e.to_string()))?;
        conn.publish::<_, _, ()>(&self.channel, payload)
            .await
            .map_err(|e: redis::RedisError| DomainError::new(ErrorCode::CacheError, e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl EntitlementsNotifier for RedisEntitlementsNotifier {
    async fn subscription_changed(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let message = EntitlementsMessage::SubscriptionChanged {
            team_id: subscription.team_id.to_string(),
            provider: subscription.provider.as_str(),
            status: subscription.status.as_str(),
            has_access: subscription.status.has_access(),
        };
        self.invalidate_and_publish(&subscription.team_id, &message).await?;
        tracing::debug!(team_id = %subscription.team_id, "Entitlements cache invalidated");
        Ok(())
    }

    async fn payment_failed(&self, invoice: &Invoice) -> Result<(), DomainError> {
        let message = EntitlementsMessage::PaymentFailed {
            team_id: invoice.team_id.to_string(),
            provider: invoice.provider.as_str(),
            invoice: &invoice.external_id,
            amount_minor: invoice.amount_minor,
            currency: &invoice.currency,
        };
        self.invalidate_and_publish(&invoice.team_id, &message).await
    }
}

impl std::fmt::Debug for RedisEntitlementsNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisEntitlementsNotifier")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
