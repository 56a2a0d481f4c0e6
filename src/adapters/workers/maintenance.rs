//! Queue maintenance: stale claim recovery and retention purge.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::application::{ProcessDeletionOutboxHandler, ProcessWebhooksHandler};

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub interval: Duration,
    /// Claims older than this are returned to their queue.
    pub stale_lease: Duration,
    pub retention_days: u32,
}

/// Row counts touched by one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub webhooks_reclaimed: u64,
    pub outbox_reclaimed: u64,
    pub webhooks_purged: u64,
    pub outbox_purged: u64,
}

pub struct MaintenanceTicker {
    webhooks: Arc<ProcessWebhooksHandler>,
    outbox: Arc<ProcessDeletionOutboxHandler>,
    config: MaintenanceConfig,
}

impl MaintenanceTicker {
    pub fn new(
        webhooks: Arc<ProcessWebhooksHandler>,
        outbox: Arc<ProcessDeletionOutboxHandler>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            webhooks,
            outbox,
            config,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.run_once().await;
                }
            }
        }

        tracing::info!("Maintenance stopped");
    }

    /// Runs every maintenance step once. A failing step is logged and skipped.
    pub async fn run_once(&self) -> MaintenanceReport {
        let lease = self.config.stale_lease;
        let days = self.config.retention_days;

        MaintenanceReport {
            webhooks_reclaimed: logged("reclaim webhooks", self.webhooks.reclaim_stale(lease).await),
            outbox_reclaimed: logged("reclaim outbox", self.outbox.reclaim_stale(lease).await),
            webhooks_purged: logged("purge webhooks", self.webhooks.purge(days).await),
            outbox_purged: logged("purge outbox", self.outbox.purge(days).await),
        }
    }
}

fn logged<E: std::fmt::Display>(step: &'static str, result: Result<u64, E>) -> u64 {
    result.unwrap_or_else(|e| {
        tracing::error!(step, error = %e, "Maintenance step failed");
        0
    })
}
