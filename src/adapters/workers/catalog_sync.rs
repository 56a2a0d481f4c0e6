//! Periodic catalog sync.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::application::CatalogSyncHandler;

/// Pushes the whole catalog to every provider on a fixed period.
pub struct CatalogSyncTicker {
    handler: Arc<CatalogSyncHandler>,
    interval: Duration,
}

impl CatalogSyncTicker {
    pub fn new(handler: Arc<CatalogSyncHandler>, interval: Duration) -> Self {
        Self { handler, interval }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_secs = self.interval.as_secs(), "Catalog sync started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => self.sync_once().await,
            }
        }

        tracing::info!("Catalog sync stopped");
    }

    async fn sync_once(&self) {
        match self.handler.sync_all().await {
            Ok(report) if report.has_failures() => {
                tracing::warn!(outcomes = report.outcomes.len(), "Catalog sync finished with failures")
            }
            Ok(report) => tracing::debug!(outcomes = report.outcomes.len(), "Catalog sync finished"),
            Err(e) => tracing::error!(error = %e, "Catalog sync failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::providers::MockProviderAdapter;
    use crate::application::CatalogSyncSettings;
    use crate::domain::billing::{BillingProvider, Product};
    use crate::ports::{CatalogRepository, ProviderRegistry};

    #[tokio::test]
    async fn syncs_on_first_tick_and_stops_on_shutdown() {
        let store = InMemoryBillingStore::new();
        let stripe = MockProviderAdapter::new(BillingProvider::Stripe);
        let registry = ProviderRegistry::new().with(Arc::new(stripe.clone()));
        let repo = Arc::new(store.clone());
        let handler = Arc::new(CatalogSyncHandler::new(
            repo.clone(),
            repo.clone(),
            repo,
            registry,
            CatalogSyncSettings::default(),
        ));
        store
            .save_product(&Product::new("Team", None).unwrap())
            .await
            .unwrap();

        let ticker = CatalogSyncTicker::new(handler, Duration::from_secs(3600));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { ticker.run(rx).await });

        for _ in 0..50 {
            if stripe.calls_to("create_product") > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stripe.calls_to("create_product"), 1);
        assert_eq!(store.mappings().await.len(), 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("ticker did not stop")
            .unwrap();
    }
}
