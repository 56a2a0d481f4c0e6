//! External payment providers supported by the billing pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// A payment provider the platform synchronizes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingProvider {
    Stripe,
    Paddle,
    LemonSqueezy,
}

impl BillingProvider {
    /// Every supported provider, in a stable order.
    pub const ALL: [BillingProvider; 3] = [
        BillingProvider::Stripe,
        BillingProvider::Paddle,
        BillingProvider::LemonSqueezy,
    ];

    /// Returns the identifier used in URLs and database columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingProvider::Stripe => "stripe",
            BillingProvider::Paddle => "paddle",
            BillingProvider::LemonSqueezy => "lemonsqueezy",
        }
    }
}

impl fmt::Display for BillingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BillingProvider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(BillingProvider::Stripe),
            "paddle" => Ok(BillingProvider::Paddle),
            "lemonsqueezy" | "lemon_squeezy" | "lemon-squeezy" => Ok(BillingProvider::LemonSqueezy),
            other => Err(ValidationError::invalid_format(
                "provider",
                format!("unknown billing provider '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_segments() {
        assert_eq!("stripe".parse::<BillingProvider>().unwrap(), BillingProvider::Stripe);
        assert_eq!("Paddle".parse::<BillingProvider>().unwrap(), BillingProvider::Paddle);
        assert_eq!(
            "lemon-squeezy".parse::<BillingProvider>().unwrap(),
            BillingProvider::LemonSqueezy
        );
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!("braintree".parse::<BillingProvider>().is_err());
    }

    #[test]
    fn as_str_round_trips_for_all_providers() {
        for provider in BillingProvider::ALL {
            assert_eq!(provider.as_str().parse::<BillingProvider>().unwrap(), provider);
        }
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&BillingProvider::LemonSqueezy).unwrap();
        assert_eq!(json, "\"lemonsqueezy\"");
    }
}
