//! SubscriptionRepository port.

use async_trait::async_trait;

use crate::domain::billing::{BillingProvider, Subscription};
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_external_id(
        &self,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Upserts on `(provider, external_id)` and returns the stored row.
    ///
    /// When a concurrent writer already stored a newer `last_event_at`, the
    /// stored row wins and is returned unchanged.
    async fn save(&self, subscription: &Subscription) -> Result<Subscription, DomainError>;
}
