//! Billing handlers.
//!
//! ## Webhook pipeline
//! - Receiving (verify, dedupe, persist)
//! - Processing due events and applying them to local state
//!
//! ## Catalog
//! - Syncing products and prices to providers
//! - Deleting locally and archiving remotely through the outbox
//!
//! ## Operations
//! - Inspecting and requeueing failed rows

mod apply_billing_event;
mod delete_catalog_entity;
mod operator;
mod process_deletion_outbox;
mod process_webhooks;
mod receive_webhook;
mod sync_catalog;

pub use apply_billing_event::{ApplyResult, BillingEventApplier};
pub use delete_catalog_entity::{DeleteCatalogEntityHandler, DeleteCatalogEntityResult};
pub use operator::BillingOperatorHandler;
pub use process_deletion_outbox::{OutboxReport, ProcessDeletionOutboxHandler};
pub use process_webhooks::{ProcessReport, ProcessWebhooksHandler};
pub use receive_webhook::{ReceiveWebhookCommand, ReceiveWebhookHandler, ReceiveWebhookResult};
pub use sync_catalog::{CatalogSyncHandler, CatalogSyncSettings, SyncOutcome, SyncReport, SyncStatus};
