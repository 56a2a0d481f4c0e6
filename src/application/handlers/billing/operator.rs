//! Operator commands for terminally failed queue rows.
//!
//! Failed webhooks and outbox entries are never retried automatically once
//! their budget is spent. An operator inspects them and requeues them with a
//! fresh budget after fixing the cause.

use std::sync::Arc;

use tokio::sync::Notify;

use crate::domain::billing::{DeletionOutboxEntry, OutboxStatus, WebhookEvent, WebhookEventStatus};
use crate::domain::foundation::{DomainError, ErrorCode, OutboxEntryId, WebhookEventId};
use crate::ports::{DeletionOutboxRepository, WebhookEventRepository};

pub struct BillingOperatorHandler {
    events: Arc<dyn WebhookEventRepository>,
    outbox: Arc<dyn DeletionOutboxRepository>,
    webhook_wake: Arc<Notify>,
    outbox_wake: Arc<Notify>,
}

impl BillingOperatorHandler {
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        outbox: Arc<dyn DeletionOutboxRepository>,
        webhook_wake: Arc<Notify>,
        outbox_wake: Arc<Notify>,
    ) -> Self {
        Self {
            events,
            outbox,
            webhook_wake,
            outbox_wake,
        }
    }

    pub async fn failed_webhooks(&self, limit: u32) -> Result<Vec<WebhookEvent>, DomainError> {
        self.events.list_by_status(WebhookEventStatus::Failed, limit).await
    }

    pub async fn requeue_webhook(&self, id: WebhookEventId) -> Result<WebhookEvent, DomainError> {
        let mut event = self.events.find_by_id(id).await?.ok_or_else(|| {
            DomainError::new(ErrorCode::WebhookEventNotFound, format!("Webhook event {} not found", id))
        })?;

        event.requeue()?;
        self.events.update(&event).await?;
        self.webhook_wake.notify_one();

        tracing::info!(event_id = %id, provider = %event.provider, "Webhook event requeued by operator");
        Ok(event)
    }

    pub async fn failed_outbox_entries(&self, limit: u32) -> Result<Vec<DeletionOutboxEntry>, DomainError> {
        self.outbox.list_by_status(OutboxStatus::Failed, limit).await
    }

    pub async fn requeue_outbox_entry(&self, id: OutboxEntryId) -> Result<DeletionOutboxEntry, DomainError> {
        let mut entry = self.outbox.find_by_id(id).await?.ok_or_else(|| {
            DomainError::new(ErrorCode::OutboxEntryNotFound, format!("Outbox entry {} not found", id))
        })?;

        entry.requeue()?;
        self.outbox.update(&entry).await?;
        self.outbox_wake.notify_one();

        tracing::info!(outbox_id = %id, provider = %entry.provider, "Outbox entry requeued by operator");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::{BillingProvider, EntityType, RetryPolicy, WebhookEnvelope};
    use crate::domain::foundation::Timestamp;
    use uuid::Uuid;

    fn handler(store: &InMemoryBillingStore) -> BillingOperatorHandler {
        let repo = Arc::new(store.clone());
        BillingOperatorHandler::new(repo.clone(), repo, Arc::new(Notify::new()), Arc::new(Notify::new()))
    }

    async fn failed_event(store: &InMemoryBillingStore) -> WebhookEventId {
        let event = WebhookEvent::received(
            BillingProvider::Stripe,
            WebhookEnvelope {
                external_event_id: "evt_1".into(),
                event_type: "invoice.paid".into(),
                livemode: true,
            },
            serde_json::json!({}),
        );
        store.insert_if_absent(&event).await.unwrap();
        let mut claimed = WebhookEventRepository::claim_due(store, 1).await.unwrap().remove(0);
        claimed.record_failure("bad", false, &RetryPolicy::default()).unwrap();
        WebhookEventRepository::update(store, &claimed).await.unwrap();
        claimed.id
    }

    #[tokio::test]
    async fn requeue_webhook_resets_budget() {
        let store = InMemoryBillingStore::new();
        let id = failed_event(&store).await;
        let handler = handler(&store);

        assert_eq!(handler.failed_webhooks(10).await.unwrap().len(), 1);
        let event = handler.requeue_webhook(id).await.unwrap();

        assert_eq!(event.status, WebhookEventStatus::Pending);
        assert_eq!(event.attempts, 0);
        assert!(event.is_due(Timestamp::now()));
        assert!(handler.failed_webhooks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requeue_rejects_non_failed_rows() {
        let store = InMemoryBillingStore::new();
        let id = failed_event(&store).await;
        let handler = handler(&store);
        handler.requeue_webhook(id).await.unwrap();

        let err = handler.requeue_webhook(id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
    }

    #[tokio::test]
    async fn requeue_outbox_entry_resets_budget() {
        let store = InMemoryBillingStore::new();
        let entry = DeletionOutboxEntry::new(EntityType::Product, Uuid::new_v4(), BillingProvider::Paddle, "pro_1", 1);
        store.enqueue(&[entry]).await.unwrap();
        let mut claimed = DeletionOutboxRepository::claim_due(&store, 1).await.unwrap().remove(0);
        claimed.record_failure("401", false, &RetryPolicy::default()).unwrap();
        DeletionOutboxRepository::update(&store, &claimed).await.unwrap();
        let handler = handler(&store);

        let requeued = handler.requeue_outbox_entry(claimed.id).await.unwrap();

        assert_eq!(requeued.status, OutboxStatus::Pending);
        assert_eq!(requeued.attempts, 0);
    }

    #[tokio::test]
    async fn requeue_unknown_ids_is_not_found() {
        let store = InMemoryBillingStore::new();
        let handler = handler(&store);
        assert_eq!(
            handler.requeue_webhook(WebhookEventId::new()).await.unwrap_err().code,
            ErrorCode::WebhookEventNotFound
        );
        assert_eq!(
            handler.requeue_outbox_entry(OutboxEntryId::new()).await.unwrap_err().code,
            ErrorCode::OutboxEntryNotFound
        );
    }
}
