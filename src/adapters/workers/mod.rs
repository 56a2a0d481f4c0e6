//! Background workers.
//!
//! - `QueuePoller` - Drains the webhook inbox and the deletion outbox
//! - `CatalogSyncTicker` - Periodic catalog push to every provider
//! - `MaintenanceTicker` - Stale claim recovery and retention purge
//!
//! Every worker stops when the shared shutdown channel flips to `true`.

mod catalog_sync;
mod maintenance;
mod poller;

pub use catalog_sync::CatalogSyncTicker;
pub use maintenance::{MaintenanceConfig, MaintenanceReport, MaintenanceTicker};
pub use poller::{PollerConfig, QueueJob, QueuePoller};

use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::application::{CatalogSyncHandler, ProcessDeletionOutboxHandler, ProcessWebhooksHandler};
use crate::config::WorkerConfig;

/// Handlers and wake-up signals the workers drive.
pub struct WorkerDeps {
    pub webhooks: Arc<ProcessWebhooksHandler>,
    pub outbox: Arc<ProcessDeletionOutboxHandler>,
    pub catalog_sync: Arc<CatalogSyncHandler>,
    pub webhook_wake: Arc<Notify>,
    pub outbox_wake: Arc<Notify>,
}

/// Spawns every background worker and returns their handles.
pub fn spawn_workers(
    deps: WorkerDeps,
    config: &WorkerConfig,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let poller_config = PollerConfig {
        poll_interval: config.poll_interval(),
        batch_size: config.batch_size,
    };
    let mut handles = Vec::new();

    for _ in 0..config.webhook_workers {
        let poller = QueuePoller::new(deps.webhooks.clone(), poller_config.clone())
            .with_wake(deps.webhook_wake.clone());
        let rx = shutdown.clone();
        handles.push(tokio::spawn(async move { poller.run(rx).await }));
    }

    let outbox = QueuePoller::new(deps.outbox.clone(), poller_config).with_wake(deps.outbox_wake);
    let rx = shutdown.clone();
    handles.push(tokio::spawn(async move { outbox.run(rx).await }));

    match config.sync_interval() {
        Some(interval) => {
            let ticker = CatalogSyncTicker::new(deps.catalog_sync, interval);
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move { ticker.run(rx).await }));
        }
        None => tracing::info!("Periodic catalog sync disabled"),
    }

    let maintenance = MaintenanceTicker::new(
        deps.webhooks,
        deps.outbox,
        MaintenanceConfig {
            interval: config.maintenance_interval(),
            stale_lease: config.stale_lease(),
            retention_days: config.retention_days,
        },
    );
    let rx = shutdown.clone();
    handles.push(tokio::spawn(async move { maintenance.run(rx).await }));

    handles
}
