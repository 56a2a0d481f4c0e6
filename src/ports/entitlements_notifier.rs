//! EntitlementsNotifier port - tells the rest of the platform that a team's
//! billing state moved.
//!
//! Notification is best effort. The stored subscription is the source of
//! truth; consumers re-read it on notification.

use async_trait::async_trait;

use crate::domain::billing::{Invoice, Subscription};
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait EntitlementsNotifier: Send + Sync {
    /// A subscription was created or its state changed.
    async fn subscription_changed(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// A payment failed for one of the team's invoices.
    async fn payment_failed(&self, invoice: &Invoice) -> Result<(), DomainError>;
}
