//! Links between local entities and their provider-side representations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::Timestamp;

use super::BillingProvider;

/// Kind of local entity a mapping or outbox row refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Product,
    Price,
    Subscription,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Price => "price",
            EntityType::Subscription => "subscription",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "product" => Some(EntityType::Product),
            "price" => Some(EntityType::Price),
            "subscription" => Some(EntityType::Subscription),
            _ => None,
        }
    }
}

/// A local entity's identity on one provider.
///
/// At most one mapping exists per `(entity_type, entity_id, provider)`, and
/// an external id belongs to at most one local entity per provider and type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMapping {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub provider: BillingProvider,
    pub external_id: String,
    /// Fingerprint of the local definition last pushed, if pushed by catalog sync.
    pub fingerprint: Option<String>,
    pub synced_at: Timestamp,
}

impl ProviderMapping {
    pub fn new(
        entity_type: EntityType,
        entity_id: Uuid,
        provider: BillingProvider,
        external_id: impl Into<String>,
        fingerprint: Option<String>,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            provider,
            external_id: external_id.into(),
            fingerprint,
            synced_at: Timestamp::now(),
        }
    }

    /// True if the remote copy was built from a definition with this fingerprint.
    pub fn is_current(&self, fingerprint: &str) -> bool {
        self.fingerprint.as_deref() == Some(fingerprint)
    }
}
