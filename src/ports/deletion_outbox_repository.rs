//! DeletionOutboxRepository port - durable queue of remote archive operations.

use async_trait::async_trait;

use crate::domain::billing::{DeletionOutboxEntry, OutboxStatus, ProviderMapping};
use crate::domain::foundation::{DomainError, OutboxEntryId, Timestamp};

#[async_trait]
pub trait DeletionOutboxRepository: Send + Sync {
    /// Adds entries outside a catalog delete.
    async fn enqueue(&self, entries: &[DeletionOutboxEntry]) -> Result<(), DomainError>;

    /// Enqueues the archive of a remote price and, in the same transaction,
    /// removes the mapping it came from or replaces it with `replacement`.
    ///
    /// Either both changes are stored or neither is, so a retired remote id
    /// is always reachable from the mapping table or the outbox.
    async fn retire_mapping(
        &self,
        archive: &DeletionOutboxEntry,
        replacement: Option<&ProviderMapping>,
    ) -> Result<(), DomainError>;

    /// Atomically claims up to `limit` due pending entries with budget left.
    ///
    /// Claimed entries come back `processing` with `attempts` incremented.
    async fn claim_due(&self, limit: u32) -> Result<Vec<DeletionOutboxEntry>, DomainError>;

    async fn update(&self, entry: &DeletionOutboxEntry) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: OutboxEntryId) -> Result<Option<DeletionOutboxEntry>, DomainError>;

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: u32,
    ) -> Result<Vec<DeletionOutboxEntry>, DomainError>;

    /// Returns `processing` entries last touched before the timestamp to `pending`.
    async fn reclaim_stale(&self, updated_before: Timestamp) -> Result<u64, DomainError>;

    /// Deletes `completed` entries last touched before the timestamp.
    async fn purge_completed_before(&self, updated_before: Timestamp) -> Result<u64, DomainError>;
}
