//! Invoices (Stripe invoices, Paddle transactions, LemonSqueezy orders).

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{InvoiceId, TeamId, Timestamp};

use super::{BillingProvider, InvoiceSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Open,
    Paid,
    PaymentFailed,
    Refunded,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::PaymentFailed => "payment_failed",
            InvoiceStatus::Refunded => "refunded",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(InvoiceStatus::Open),
            "paid" => Some(InvoiceStatus::Paid),
            "payment_failed" => Some(InvoiceStatus::PaymentFailed),
            "refunded" => Some(InvoiceStatus::Refunded),
            "void" => Some(InvoiceStatus::Void),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub id: InvoiceId,
    pub team_id: TeamId,
    pub provider: BillingProvider,
    pub external_id: String,
    pub external_subscription_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub occurred_at: Timestamp,
}

impl Invoice {
    pub fn from_snapshot(team_id: TeamId, provider: BillingProvider, snapshot: &InvoiceSnapshot) -> Self {
        Self {
            id: InvoiceId::new(),
            team_id,
            provider,
            external_id: snapshot.external_id.clone(),
            external_subscription_id: snapshot.external_subscription_id.clone(),
            amount_minor: snapshot.amount_minor,
            currency: snapshot.currency.to_ascii_lowercase(),
            status: snapshot.status,
            occurred_at: snapshot.occurred_at,
        }
    }

    /// Applies a later report about the same invoice. Returns true if anything changed.
    pub fn apply(&mut self, snapshot: &InvoiceSnapshot) -> bool {
        if snapshot.occurred_at.is_before(&self.occurred_at) {
            return false;
        }
        let changed = self.status != snapshot.status || self.amount_minor != snapshot.amount_minor;
        self.status = snapshot.status;
        self.amount_minor = snapshot.amount_minor;
        self.occurred_at = snapshot.occurred_at;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: InvoiceStatus, at: Timestamp) -> InvoiceSnapshot {
        InvoiceSnapshot {
            external_id: "in_1".to_string(),
            external_subscription_id: Some("sub_1".to_string()),
            external_customer_id: None,
            amount_minor: 1999,
            currency: "USD".to_string(),
            status,
            team_id: None,
            occurred_at: at,
        }
    }

    #[test]
    fn from_snapshot_lowercases_currency() {
        let invoice = Invoice::from_snapshot(
            TeamId::new(),
            BillingProvider::Paddle,
            &snapshot(InvoiceStatus::Paid, Timestamp::now()),
        );
        assert_eq!(invoice.currency, "usd");
    }

    #[test]
    fn refund_after_payment_is_applied() {
        let t0 = Timestamp::now();
        let mut invoice =
            Invoice::from_snapshot(TeamId::new(), BillingProvider::Stripe, &snapshot(InvoiceStatus::Paid, t0));
        assert!(invoice.apply(&snapshot(InvoiceStatus::Refunded, t0.plus_secs(5))));
        assert_eq!(invoice.status, InvoiceStatus::Refunded);
    }

    #[test]
    fn older_report_is_ignored() {
        let t0 = Timestamp::now();
        let mut invoice =
            Invoice::from_snapshot(TeamId::new(), BillingProvider::Stripe, &snapshot(InvoiceStatus::Paid, t0));
        assert!(!invoice.apply(&snapshot(InvoiceStatus::Open, t0.minus_secs(5))));
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[test]
    fn duplicate_report_changes_nothing() {
        let t0 = Timestamp::now();
        let mut invoice =
            Invoice::from_snapshot(TeamId::new(), BillingProvider::Stripe, &snapshot(InvoiceStatus::Paid, t0));
        assert!(!invoice.apply(&snapshot(InvoiceStatus::Paid, t0)));
    }
}
