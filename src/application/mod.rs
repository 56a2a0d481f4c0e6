//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;

pub use handlers::billing::{
    ApplyResult, BillingEventApplier, BillingOperatorHandler, CatalogSyncHandler,
    CatalogSyncSettings, DeleteCatalogEntityHandler, DeleteCatalogEntityResult, OutboxReport,
    ProcessDeletionOutboxHandler, ProcessReport, ProcessWebhooksHandler, ReceiveWebhookCommand,
    ReceiveWebhookHandler, ReceiveWebhookResult, SyncOutcome, SyncReport, SyncStatus,
};
