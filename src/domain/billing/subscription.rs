//! Local mirror of a provider subscription.
//!
//! Webhooks can arrive out of order and more than once. `apply` compares the
//! incoming snapshot against `last_event_at` so that an older event never
//! overwrites newer state and a repeated event changes nothing.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PriceId, SubscriptionId, TeamId, Timestamp};

use super::{BillingProvider, SubscriptionSnapshot};

/// Subscription status normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Paused,
    Canceled,
    Expired,
    Incomplete,
}

impl SubscriptionStatus {
    /// Returns true if this status grants access to paid features.
    pub fn has_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "paused" => Some(SubscriptionStatus::Paused),
            "canceled" | "cancelled" => Some(SubscriptionStatus::Canceled),
            "expired" => Some(SubscriptionStatus::Expired),
            "incomplete" => Some(SubscriptionStatus::Incomplete),
            _ => None,
        }
    }
}

/// Result of applying a snapshot to an existing subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Snapshot matches current state.
    Unchanged,
    /// Snapshot is older than the last applied event.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub team_id: TeamId,
    pub provider: BillingProvider,
    pub external_id: String,
    pub external_customer_id: Option<String>,
    pub price_id: Option<PriceId>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub last_event_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates the local record from the first snapshot seen for it.
    pub fn from_snapshot(
        team_id: TeamId,
        provider: BillingProvider,
        snapshot: &SubscriptionSnapshot,
        price_id: Option<PriceId>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            team_id,
            provider,
            external_id: snapshot.external_id.clone(),
            external_customer_id: snapshot.external_customer_id.clone(),
            price_id,
            status: snapshot.status,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            last_event_at: snapshot.occurred_at,
            updated_at: Timestamp::now(),
        }
    }

    /// Applies a newer snapshot. Idempotent for repeated snapshots.
    pub fn apply(&mut self, snapshot: &SubscriptionSnapshot, price_id: Option<PriceId>) -> ApplyOutcome {
        if snapshot.occurred_at.is_before(&self.last_event_at) {
            return ApplyOutcome::Stale;
        }

        let price_id = price_id.or(self.price_id);
        let customer = snapshot
            .external_customer_id
            .clone()
            .or_else(|| self.external_customer_id.clone());

        let unchanged = self.status == snapshot.status
            && self.current_period_end == snapshot.current_period_end
            && self.cancel_at_period_end == snapshot.cancel_at_period_end
            && self.price_id == price_id
            && self.external_customer_id == customer;

        self.last_event_at = snapshot.occurred_at;
        if unchanged {
            return ApplyOutcome::Unchanged;
        }

        self.status = snapshot.status;
        self.current_period_end = snapshot.current_period_end;
        self.cancel_at_period_end = snapshot.cancel_at_period_end;
        self.price_id = price_id;
        self.external_customer_id = customer;
        self.updated_at = Timestamp::now();
        ApplyOutcome::Applied
    }
}
