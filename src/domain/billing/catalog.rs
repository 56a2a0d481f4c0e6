//! Local catalog definitions pushed to providers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::foundation::{PriceId, ProductId, Timestamp, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
    OneTime,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
            BillingInterval::OneTime => "one_time",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "month" => Some(BillingInterval::Month),
            "year" => Some(BillingInterval::Year),
            "one_time" => Some(BillingInterval::OneTime),
            _ => None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, BillingInterval::OneTime)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub updated_at: Timestamp,
}

impl Product {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        Ok(Self {
            id: ProductId::new(),
            name,
            description,
            active: true,
            updated_at: Timestamp::now(),
        })
    }

    /// Hash of the fields pushed to providers. A changed fingerprint means
    /// the remote copy is out of date.
    pub fn fingerprint(&self) -> String {
        fingerprint(&[
            self.name.as_str(),
            self.description.as_deref().unwrap_or(""),
            if self.active { "1" } else { "0" },
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub id: PriceId,
    pub product_id: ProductId,
    /// Amount in the currency's minor unit (cents).
    pub unit_amount: i64,
    /// Lowercase ISO 4217 code.
    pub currency: String,
    pub interval: BillingInterval,
    pub active: bool,
    pub updated_at: Timestamp,
}

impl Price {
    pub fn new(
        product_id: ProductId,
        unit_amount: i64,
        currency: &str,
        interval: BillingInterval,
    ) -> Result<Self, ValidationError> {
        if unit_amount < 0 {
            return Err(ValidationError::invalid_format("unit_amount", "must not be negative"));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format("currency", "must be a 3-letter code"));
        }
        Ok(Self {
            id: PriceId::new(),
            product_id,
            unit_amount,
            currency: currency.to_ascii_lowercase(),
            interval,
            active: true,
            updated_at: Timestamp::now(),
        })
    }

    /// Providers treat amount/currency/interval as immutable, so only those
    /// fields participate. A new fingerprint means a new remote price.
    pub fn fingerprint(&self) -> String {
        fingerprint(&[
            &self.unit_amount.to_string(),
            self.currency.as_str(),
            self.interval.as_str(),
        ])
    }
}

fn fingerprint(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
