//! ProviderMappingRepository port - local entity ids to provider ids.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::billing::{BillingProvider, EntityType, ProviderMapping};
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait ProviderMappingRepository: Send + Sync {
    async fn find(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        provider: BillingProvider,
    ) -> Result<Option<ProviderMapping>, DomainError>;

    /// Reverse lookup used when translating webhooks (e.g. price id → local price).
    async fn find_by_external_id(
        &self,
        entity_type: EntityType,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<ProviderMapping>, DomainError>;

    /// All provider mappings of one local entity.
    async fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<ProviderMapping>, DomainError>;

    /// Inserts or replaces the mapping for `(entity_type, entity_id, provider)`.
    async fn upsert(&self, mapping: &ProviderMapping) -> Result<(), DomainError>;
}
