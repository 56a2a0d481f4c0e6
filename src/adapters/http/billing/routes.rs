//! Axum router configuration for billing endpoints.

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use secrecy::SecretString;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::handlers::{
    delete_price, delete_product, health, list_failed_outbox, list_failed_webhooks,
    receive_webhook, requeue_outbox_entry, requeue_webhook, sync_catalog, sync_product,
    BillingAppState,
};
use crate::adapters::http::middleware::{
    require_admin_token, webhook_rate_limit, AdminToken, RateLimiterState,
};

/// Router-level settings taken from configuration.
#[derive(Clone)]
pub struct HttpSettings {
    pub body_limit_bytes: usize,
    pub request_timeout: Duration,
    /// `None` disables webhook rate limiting.
    pub rate_limiter: Option<RateLimiterState>,
    /// `None` leaves the operator API unmounted.
    pub admin_token: Option<SecretString>,
}

/// Create the webhook ingress router.
///
/// # Routes
/// - `POST /webhooks/:provider` - Provider webhook deliveries (signature verified)
pub fn webhook_routes(settings: &HttpSettings) -> Router<BillingAppState> {
    let router = Router::new()
        .route("/:provider", post(receive_webhook))
        .layer(DefaultBodyLimit::max(settings.body_limit_bytes));

    match &settings.rate_limiter {
        Some(limiter) => router.route_layer(middleware::from_fn_with_state(
            limiter.clone(),
            webhook_rate_limit,
        )),
        None => router,
    }
}

/// Create the operator router. Every route requires the admin bearer token.
///
/// # Routes
/// - `GET /webhooks/failed` - Terminally failed webhook events
/// - `POST /webhooks/:id/requeue` - Retry a failed event
/// - `GET /outbox/failed` - Terminally failed outbox entries
/// - `POST /outbox/:id/requeue` - Retry a failed entry
/// - `POST /catalog/sync` - Sync the whole catalog
/// - `POST /catalog/products/:id/sync` - Sync one product
/// - `DELETE /catalog/products/:id` - Delete a product and its prices
/// - `DELETE /catalog/prices/:id` - Delete a price
pub fn admin_routes(token: AdminToken) -> Router<BillingAppState> {
    Router::new()
        .route("/webhooks/failed", get(list_failed_webhooks))
        .route("/webhooks/:id/requeue", post(requeue_webhook))
        .route("/outbox/failed", get(list_failed_outbox))
        .route("/outbox/:id/requeue", post(requeue_outbox_entry))
        .route("/catalog/sync", post(sync_catalog))
        .route("/catalog/products/:id/sync", post(sync_product))
        .route("/catalog/products/:id", delete(delete_product))
        .route("/catalog/prices/:id", delete(delete_price))
        .route_layer(middleware::from_fn_with_state(token, require_admin_token))
}

/// Create the complete application router.
///
/// Mounts `/health`, `/webhooks` and, when an admin token is configured,
/// `/admin/billing`, then applies tracing, request ids and the request
/// timeout to everything.
pub fn billing_router(state: BillingAppState, settings: &HttpSettings) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .nest("/webhooks", webhook_routes(settings));

    match &settings.admin_token {
        Some(token) => {
            router = router.nest("/admin/billing", admin_routes(AdminToken::new(token.clone())));
        }
        None => tracing::info!("No admin token configured; operator API disabled"),
    }

    router
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
