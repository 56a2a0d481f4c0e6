//! InvoiceRepository port.

use async_trait::async_trait;

use crate::domain::billing::{BillingProvider, Invoice};
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn find_by_external_id(
        &self,
        provider: BillingProvider,
        external_id: &str,
    ) -> Result<Option<Invoice>, DomainError>;

    /// Upserts on `(provider, external_id)`.
    async fn save(&self, invoice: &Invoice) -> Result<(), DomainError>;
}
