use async_trait::async_trait;

use crate::domain::billing::{Invoice, Subscription};
use crate::domain::foundation::DomainError;
use crate::ports::EntitlementsNotifier;

/// Notifier that only records changes in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEntitlementsNotifier;

#[async_trait]
impl EntitlementsNotifier for LoggingEntitlementsNotifier {
    async fn subscription_changed(&self, subscription: &Subscription) -> Result<(), DomainError> {
        tracing::info!(
            team_id = %subscription.team_id,
            provider = %subscription.provider,
            subscription_id = %subscription.id,
            status = subscription.status.as_str(),
            has_access = subscription.status.has_access(),
            "Entitlements changed"
        );
        Ok(())
    }

    async fn payment_failed(&self, invoice: &Invoice) -> Result<(), DomainError> {
        tracing::warn!(
            team_id = %invoice.team_id,
            provider = %invoice.provider,
            invoice = %invoice.external_id,
            amount_minor = invoice.amount_minor,
            currency = %invoice.currency,
            "Payment failed"
        );
        Ok(())
    }
}
