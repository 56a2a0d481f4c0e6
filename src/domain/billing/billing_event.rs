//! Normalized billing events produced by provider adapters.
//!
//! Provider adapters translate their native webhook shapes into these types so
//! that the event applier never sees provider-specific JSON.

use crate::domain::foundation::{TeamId, Timestamp};

use super::{InvoiceStatus, SubscriptionStatus};

/// A provider-independent state change.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    SubscriptionChanged(SubscriptionSnapshot),
    InvoiceRecorded(InvoiceSnapshot),
    /// Event type the pipeline does not act on.
    Ignored(String),
}

impl BillingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BillingEvent::SubscriptionChanged(_) => "subscription_changed",
            BillingEvent::InvoiceRecorded(_) => "invoice_recorded",
            BillingEvent::Ignored(_) => "ignored",
        }
    }
}

/// State of a subscription on the provider as of `occurred_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSnapshot {
    pub external_id: String,
    pub external_customer_id: Option<String>,
    pub external_price_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    /// Tenant from provider metadata (`team_id`), when the checkout set it.
    pub team_id: Option<TeamId>,
    pub occurred_at: Timestamp,
}

/// An invoice/transaction/order reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSnapshot {
    pub external_id: String,
    pub external_subscription_id: Option<String>,
    pub external_customer_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub team_id: Option<TeamId>,
    pub occurred_at: Timestamp,
}
