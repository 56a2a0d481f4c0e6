//! HTTP handlers for webhook ingress and the operator API.
//!
//! Handlers only translate between HTTP and the application layer. All
//! business rules live in the command handlers held by `BillingAppState`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::dto::{
    DeleteResponse, ErrorResponse, ListQuery, ListResponse, OutboxEntryView, SyncReportResponse,
    WebhookAck, WebhookEventView,
};
use crate::application::{
    BillingOperatorHandler, CatalogSyncHandler, DeleteCatalogEntityHandler, ReceiveWebhookCommand,
    ReceiveWebhookHandler, ReceiveWebhookResult,
};
use crate::domain::billing::WebhookError;
use crate::domain::foundation::{
    DomainError, ErrorCode, OutboxEntryId, PriceId, ProductId, WebhookEventId,
};

// ════════════════════════════════════════════════════════════════════════════════
// State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for billing routes.
#[derive(Clone)]
pub struct BillingAppState {
    pub receive_webhook: Arc<ReceiveWebhookHandler>,
    pub operator: Arc<BillingOperatorHandler>,
    pub catalog_sync: Arc<CatalogSyncHandler>,
    pub delete_catalog: Arc<DeleteCatalogEntityHandler>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook ingress
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/:provider - Verify and record a provider webhook
pub async fn receive_webhook(
    State(state): State<BillingAppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookApiError> {
    let handler = &state.receive_webhook;
    let resolved = handler.resolve_provider(&provider)?;

    let signature = handler
        .signature_header(resolved)
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = ReceiveWebhookCommand {
        provider,
        payload: body.to_vec(),
        signature,
    };

    let response = match handler.handle(cmd).await? {
        ReceiveWebhookResult::Accepted(id) => {
            (StatusCode::ACCEPTED, Json(WebhookAck::accepted(id))).into_response()
        }
        ReceiveWebhookResult::Duplicate => (StatusCode::OK, Json(WebhookAck::duplicate())).into_response(),
    };
    Ok(response)
}

/// GET /health - Liveness probe
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Operator: queues
// ════════════════════════════════════════════════════════════════════════════════

/// GET /admin/billing/webhooks/failed - List terminally failed webhook events
pub async fn list_failed_webhooks(
    State(state): State<BillingAppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<WebhookEventView>>, BillingApiError> {
    let events = state.operator.failed_webhooks(query.limit()).await?;
    Ok(Json(ListResponse::new(
        events.into_iter().map(WebhookEventView::from).collect(),
    )))
}

/// POST /admin/billing/webhooks/:id/requeue - Retry a failed webhook event
pub async fn requeue_webhook(
    State(state): State<BillingAppState>,
    Path(id): Path<String>,
) -> Result<Json<WebhookEventView>, BillingApiError> {
    let id: WebhookEventId = parse_id("webhook event", &id)?;
    let event = state.operator.requeue_webhook(id).await?;
    Ok(Json(event.into()))
}

/// GET /admin/billing/outbox/failed - List terminally failed outbox entries
pub async fn list_failed_outbox(
    State(state): State<BillingAppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<OutboxEntryView>>, BillingApiError> {
    let entries = state.operator.failed_outbox_entries(query.limit()).await?;
    Ok(Json(ListResponse::new(
        entries.into_iter().map(OutboxEntryView::from).collect(),
    )))
}

/// POST /admin/billing/outbox/:id/requeue - Retry a failed outbox entry
pub async fn requeue_outbox_entry(
    State(state): State<BillingAppState>,
    Path(id): Path<String>,
) -> Result<Json<OutboxEntryView>, BillingApiError> {
    let id: OutboxEntryId = parse_id("outbox entry", &id)?;
    let entry = state.operator.requeue_outbox_entry(id).await?;
    Ok(Json(entry.into()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Operator: catalog
// ════════════════════════════════════════════════════════════════════════════════

/// POST /admin/billing/catalog/sync - Sync the whole catalog to every provider
pub async fn sync_catalog(
    State(state): State<BillingAppState>,
) -> Result<Json<SyncReportResponse>, BillingApiError> {
    let report = state.catalog_sync.sync_all().await?;
    Ok(Json(report.into()))
}

/// POST /admin/billing/catalog/products/:id/sync - Sync one product
pub async fn sync_product(
    State(state): State<BillingAppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncReportResponse>, BillingApiError> {
    let id: ProductId = parse_id("product", &id)?;
    let report = state.catalog_sync.sync_product(id).await?;
    Ok(Json(report.into()))
}

/// DELETE /admin/billing/catalog/products/:id - Delete locally, archive remotely
pub async fn delete_product(
    State(state): State<BillingAppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, BillingApiError> {
    let id: ProductId = parse_id("product", &id)?;
    let result = state.delete_catalog.delete_product(id).await?;
    Ok(Json(result.into()))
}

/// DELETE /admin/billing/catalog/prices/:id - Delete locally, archive remotely
pub async fn delete_price(
    State(state): State<BillingAppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, BillingApiError> {
    let id: PriceId = parse_id("price", &id)?;
    let result = state.delete_catalog.delete_price(id).await?;
    Ok(Json(result.into()))
}

fn parse_id<T: std::str::FromStr>(what: &str, raw: &str) -> Result<T, BillingApiError> {
    raw.parse().map_err(|_| {
        BillingApiError(DomainError::validation("id", format!("Invalid {} id: {}", what, raw)))
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// Webhook ingress error rendered with the status providers expect.
///
/// Providers retry on 5xx and stop on 2xx/4xx.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Webhook ingress failed");
        } else {
            tracing::warn!(error = %self.0, status = status.as_u16(), "Webhook rejected");
        }

        // Infrastructure detail stays in the logs.
        let message = if status.is_server_error() {
            "Webhook could not be recorded".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(ErrorResponse::new(self.0.error_code(), message))).into_response()
    }
}

/// Operator API error that converts domain errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(DomainError);

impl From<DomainError> for BillingApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl BillingApiError {
    fn status(&self) -> StatusCode {
        match self.0.code {
            ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound
            | ErrorCode::ProductNotFound
            | ErrorCode::PriceNotFound
            | ErrorCode::WebhookEventNotFound
            | ErrorCode::OutboxEntryNotFound
            | ErrorCode::ProviderNotConfigured => StatusCode::NOT_FOUND,
            ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ExternalServiceError => StatusCode::BAD_GATEWAY,
            ErrorCode::DatabaseError | ErrorCode::CacheError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            tracing::error!(error = %self.0, "Operator request failed");
            ErrorResponse::new(self.0.code.to_string(), "Internal server error")
        } else if self.0.details.is_empty() {
            ErrorResponse::new(self.0.code.to_string(), self.0.message)
        } else {
            let details = serde_json::to_value(&self.0.details).unwrap_or_default();
            ErrorResponse::with_details(self.0.code.to_string(), self.0.message, details)
        };
        (status, Json(body)).into_response()
    }
}
