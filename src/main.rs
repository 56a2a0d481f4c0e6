//! Billing Sync server
//!
//! Serves webhook ingress and the operator API, and runs the queue workers,
//! periodic catalog sync and queue maintenance in the same process.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{watch, Notify};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_sync::adapters::entitlements::{LoggingEntitlementsNotifier, RedisEntitlementsNotifier};
use billing_sync::adapters::http::{billing_router, BillingAppState, HttpSettings};
use billing_sync::adapters::postgres::{
    PostgresCatalogRepository, PostgresDeletionOutboxRepository, PostgresInvoiceRepository,
    PostgresProviderMappingRepository, PostgresSubscriptionRepository,
    PostgresWebhookEventRepository,
};
use billing_sync::adapters::providers::build_registry;
use billing_sync::adapters::rate_limiter::{InMemoryRateLimiter, RedisRateLimiter};
use billing_sync::adapters::{spawn_workers, WorkerDeps};
use billing_sync::application::{
    BillingEventApplier, BillingOperatorHandler, CatalogSyncHandler, CatalogSyncSettings,
    DeleteCatalogEntityHandler, ProcessDeletionOutboxHandler, ProcessWebhooksHandler,
    ReceiveWebhookHandler,
};
use billing_sync::config::{AppConfig, WorkerConfig};
use billing_sync::ports::{EntitlementsNotifier, RateLimiter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    init_tracing(&config);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting billing sync"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection established");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Database migrations applied");
    }

    let (rate_limiter, notifier) = connect_redis(&config).await?;

    let registry = build_registry(&config.providers);
    if registry.is_empty() {
        tracing::warn!("No billing providers configured; every webhook will be rejected");
    }

    let events = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    let catalog = Arc::new(PostgresCatalogRepository::new(pool.clone()));
    let outbox = Arc::new(PostgresDeletionOutboxRepository::new(pool.clone()));
    let mappings = Arc::new(PostgresProviderMappingRepository::new(pool.clone()));
    let subscriptions = Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let invoices = Arc::new(PostgresInvoiceRepository::new(pool.clone()));

    let webhook_wake = Arc::new(Notify::new());
    let outbox_wake = Arc::new(Notify::new());
    let worker = &config.worker;

    let applier = Arc::new(BillingEventApplier::new(
        subscriptions,
        invoices,
        mappings.clone(),
        notifier,
    ));
    let process_webhooks = Arc::new(ProcessWebhooksHandler::new(
        events.clone(),
        registry.clone(),
        applier,
        worker.webhook_retry_policy(),
    ));
    let process_outbox = Arc::new(ProcessDeletionOutboxHandler::new(
        outbox.clone(),
        registry.clone(),
        worker.outbox_retry_policy(),
    ));
    let catalog_sync = Arc::new(CatalogSyncHandler::new(
        catalog.clone(),
        mappings,
        outbox.clone(),
        registry.clone(),
        sync_settings(worker),
    ));

    let state = BillingAppState {
        receive_webhook: Arc::new(ReceiveWebhookHandler::new(
            registry,
            events.clone(),
            webhook_wake.clone(),
        )),
        operator: Arc::new(BillingOperatorHandler::new(
            events,
            outbox,
            webhook_wake.clone(),
            outbox_wake.clone(),
        )),
        catalog_sync: catalog_sync.clone(),
        delete_catalog: Arc::new(DeleteCatalogEntityHandler::new(
            catalog,
            worker.outbox_max_attempts,
            outbox_wake.clone(),
        )),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = spawn_workers(
        WorkerDeps {
            webhooks: process_webhooks,
            outbox: process_outbox,
            catalog_sync,
            webhook_wake,
            outbox_wake,
        },
        worker,
        &shutdown_rx,
    );

    let settings = HttpSettings {
        body_limit_bytes: config.server.body_limit_bytes,
        request_timeout: config.server.request_timeout(),
        rate_limiter: config.rate_limit.enabled.then_some(rate_limiter),
        admin_token: config.admin.token.clone(),
    };
    let app = billing_router(state, &settings);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx))
    .await
    .context("Server error")?;

    for handle in workers {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// JSON logs in production, human-readable otherwise. `RUST_LOG` overrides
/// the configured level.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},billing_sync=debug", config.server.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn connect_redis(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn RateLimiter>, Arc<dyn EntitlementsNotifier>)> {
    let Some(redis_config) = &config.redis else {
        tracing::warn!("Redis not configured; using in-process rate limiter and logging notifier");
        return Ok((
            Arc::new(InMemoryRateLimiter::new(config.rate_limit.clone())),
            Arc::new(LoggingEntitlementsNotifier),
        ));
    };

    let client = redis::Client::open(redis_config.url.as_str()).context("Invalid Redis URL")?;
    let conn = tokio::time::timeout(
        redis_config.timeout(),
        client.get_multiplexed_tokio_connection(),
    )
    .await
    .context("Timed out connecting to Redis")?
    .context("Failed to connect to Redis")?;
    tracing::info!("Redis connection established");

    Ok((
        Arc::new(RedisRateLimiter::new(conn.clone(), config.rate_limit.clone())),
        Arc::new(RedisEntitlementsNotifier::new(
            conn,
            redis_config.entitlements_channel.clone(),
        )),
    ))
}

fn sync_settings(worker: &WorkerConfig) -> CatalogSyncSettings {
    CatalogSyncSettings {
        call_attempts: worker.sync_call_attempts,
        outbox_max_attempts: worker.outbox_max_attempts,
        ..Default::default()
    }
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    let _ = shutdown.send(true);
}
