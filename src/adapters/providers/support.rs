//! Helpers shared by the HTTP provider adapters.

use serde_json::Value;

use crate::domain::billing::{BillingProvider, WebhookError};
use crate::domain::foundation::{TeamId, Timestamp};
use crate::ports::ProviderError;

/// Reads the tenant id a checkout attached to provider-side metadata.
///
/// A present but malformed id is treated as absent; the applier then decides
/// whether the event can proceed without one.
pub(crate) fn team_id_from(metadata: Option<&Value>) -> Option<TeamId> {
    metadata
        .and_then(|m| m.get("team_id"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

pub(crate) fn unix_timestamp(secs: Option<i64>) -> Option<Timestamp> {
    secs.and_then(Timestamp::from_unix_secs)
}

pub(crate) fn rfc3339_timestamp(value: Option<&str>) -> Option<Timestamp> {
    value.and_then(Timestamp::parse_rfc3339)
}

/// Deserializes a webhook object, naming the provider shape on failure.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<T, WebhookError> {
    serde_json::from_value(value.clone())
        .map_err(|e| WebhookError::ParseError(format!("invalid {}: {}", what, e)))
}

/// Converts a non-success API response into a classified error.
pub(crate) async fn error_from_response(
    provider: BillingProvider,
    operation: &'static str,
    response: reqwest::Response,
) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(
        provider = %provider,
        operation,
        status,
        error = %body,
        "Provider API call failed"
    );
    ProviderError::from_status(status, format!("{} API error: {}", provider, body))
}

pub(crate) fn network_error(e: reqwest::Error) -> ProviderError {
    ProviderError::network(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_team_id_from_metadata() {
        let id = TeamId::new();
        let meta = json!({ "team_id": id.to_string() });
        assert_eq!(team_id_from(Some(&meta)), Some(id));
    }

    #[test]
    fn malformed_team_id_is_absent() {
        let meta = json!({ "team_id": "not-a-uuid" });
        assert_eq!(team_id_from(Some(&meta)), None);
        assert_eq!(team_id_from(None), None);
    }
}
