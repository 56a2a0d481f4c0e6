//! Webhook signature verification for every supported provider.
//!
//! All three providers sign the raw request body with HMAC-SHA256:
//!
//! | Provider | Header | Signed message |
//! |----------|--------|----------------|
//! | Stripe | `Stripe-Signature: t=<ts>,v1=<hex>` | `<ts>.<body>` |
//! | Paddle | `Paddle-Signature: ts=<ts>;h1=<hex>` | `<ts>:<body>` |
//! | LemonSqueezy | `X-Signature: <hex>` | `<body>` |
//!
//! Stripe and Paddle signatures carry a timestamp which is checked against a
//! five minute window to block replays. Comparisons are constant-time.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::webhook_errors::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components from a timestamped signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// Candidate signatures. Providers send several while rotating secrets.
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a `Stripe-Signature` header: `t=<ts>,v1=<sig>[,v1=<sig>][,v0=<legacy>]`.
    pub fn parse_stripe(header: &str) -> Result<Self, WebhookError> {
        Self::parse(header, ',', "t", "v1")
    }

    /// Parses a `Paddle-Signature` header: `ts=<ts>;h1=<sig>`.
    pub fn parse_paddle(header: &str) -> Result<Self, WebhookError> {
        Self::parse(header, ';', "ts", "h1")
    }

    fn parse(
        header: &str,
        separator: char,
        timestamp_key: &str,
        signature_key: &str,
    ) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut signatures = Vec::new();

        for part in header.split(separator) {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            if key == timestamp_key {
                timestamp = Some(value.parse().map_err(|_| {
                    WebhookError::ParseError("invalid timestamp".to_string())
                })?);
            } else if key == signature_key {
                signatures.push(hex::decode(value).map_err(|_| {
                    WebhookError::ParseError("invalid signature hex".to_string())
                })?);
            }
            // Unknown keys (e.g. Stripe's v0) are ignored for forward compatibility.
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(WebhookError::ParseError("missing signature".to_string()));
        }

        Ok(SignatureHeader {
            timestamp,
            signatures,
        })
    }

    fn matches(&self, expected: &[u8]) -> bool {
        self.signatures
            .iter()
            .any(|candidate| constant_time_compare(expected, candidate))
    }
}

/// Verifies `Stripe-Signature` headers.
pub struct StripeSignatureVerifier {
    secret: SecretString,
}

impl StripeSignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies against the current wall clock.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Verifies as if the current time were `now` (Unix seconds).
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse_stripe(header)?;
        validate_timestamp(header.timestamp, now)?;

        let expected = hmac_sha256(
            self.secret.expose_secret().as_bytes(),
            &[header.timestamp.to_string().as_bytes(), b".", payload],
        )?;

        if !header.matches(&expected) {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }
}

/// Verifies `Paddle-Signature` headers.
pub struct PaddleSignatureVerifier {
    secret: SecretString,
}

impl PaddleSignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse_paddle(header)?;
        validate_timestamp(header.timestamp, now)?;

        let expected = hmac_sha256(
            self.secret.expose_secret().as_bytes(),
            &[header.timestamp.to_string().as_bytes(), b":", payload],
        )?;

        if !header.matches(&expected) {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }
}

/// Verifies LemonSqueezy `X-Signature` headers.
///
/// LemonSqueezy signs the body only, so there is no replay window here;
/// replays are absorbed by the event idempotency key instead.
pub struct LemonSqueezySignatureVerifier {
    secret: SecretString,
}

impl LemonSqueezySignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), WebhookError> {
        let provided = hex::decode(header.trim()).map_err(|_| WebhookError::InvalidSignature)?;
        let expected = hmac_sha256(self.secret.expose_secret().as_bytes(), &[payload])?;

        if !constant_time_compare(&expected, &provided) {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }
}

/// Validates that the timestamp is within acceptable bounds.
fn validate_timestamp(timestamp: i64, now: i64) -> Result<(), WebhookError> {
    let age = now
        .checked_sub(timestamp)
        .ok_or(WebhookError::InvalidTimestamp)?;

    if age > MAX_EVENT_AGE_SECS {
        return Err(WebhookError::TimestampOutOfRange);
    }
    if age < -MAX_CLOCK_SKEW_SECS {
        return Err(WebhookError::InvalidTimestamp);
    }
    Ok(())
}

/// Computes HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(secret: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| WebhookError::ParseError("invalid signing secret".to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time comparison of two byte slices.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a valid `Stripe-Signature` header for test fixtures.
#[cfg(test)]
pub fn stripe_test_header(secret: &str, timestamp: i64, payload: &str) -> String {
    let sig = hmac_sha256(
        secret.as_bytes(),
        &[timestamp.to_string().as_bytes(), b".", payload.as_bytes()],
    )
    .unwrap();
    format!("t={},v1={}", timestamp, hex::encode(sig))
}

/// Builds a valid `Paddle-Signature` header for test fixtures.
#[cfg(test)]
pub fn paddle_test_header(secret: &str, timestamp: i64, payload: &str) -> String {
    let sig = hmac_sha256(
        secret.as_bytes(),
        &[timestamp.to_string().as_bytes(), b":", payload.as_bytes()],
    )
    .unwrap();
    format!("ts={};h1={}", timestamp, hex::encode(sig))
}

/// Builds a valid LemonSqueezy `X-Signature` value for test fixtures.
#[cfg(test)]
pub fn lemonsqueezy_test_header(secret: &str, payload: &str) -> String {
    hex::encode(hmac_sha256(secret.as_bytes(), &[payload.as_bytes()]).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret_12345";
    const NOW: i64 = 1_700_000_000;
    const BODY: &str = r#"{"id":"evt_1","type":"invoice.paid"}"#;

    fn secret() -> SecretString {
        SecretString::new(SECRET.to_string())
    }

    // ══════════════════════════════════════════════════════════════
    // Header parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parses_stripe_header_with_unknown_keys() {
        let header = SignatureHeader::parse_stripe("t=123,v1=abcd,v0=ffff").unwrap();
        assert_eq!(header.timestamp, 123);
        assert_eq!(header.signatures, vec![vec![0xab, 0xcd]]);
    }

    #[test]
    fn parses_stripe_header_with_rotated_signatures() {
        let header = SignatureHeader::parse_stripe("t=1,v1=aa,v1=bb").unwrap();
        assert_eq!(header.signatures.len(), 2);
    }

    #[test]
    fn parses_paddle_header() {
        let header = SignatureHeader::parse_paddle("ts=99;h1=0a0b").unwrap();
        assert_eq!(header.timestamp, 99);
        assert_eq!(header.signatures, vec![vec![0x0a, 0x0b]]);
    }

    #[test]
    fn rejects_header_without_timestamp() {
        assert!(matches!(
            SignatureHeader::parse_stripe("v1=abcd"),
            Err(WebhookError::ParseError(_))
        ));
    }

    #[test]
    fn rejects_header_without_signature() {
        assert!(SignatureHeader::parse_paddle("ts=1").is_err());
    }

    #[test]
    fn rejects_non_hex_signature() {
        assert!(SignatureHeader::parse_stripe("t=1,v1=zz").is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Stripe
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn stripe_accepts_valid_signature() {
        let verifier = StripeSignatureVerifier::new(secret());
        let header = stripe_test_header(SECRET, NOW, BODY);
        assert!(verifier.verify_at(BODY.as_bytes(), &header, NOW + 10).is_ok());
    }

    #[test]
    fn stripe_rejects_tampered_body() {
        let verifier = StripeSignatureVerifier::new(secret());
        let header = stripe_test_header(SECRET, NOW, BODY);
        let result = verifier.verify_at(br#"{"id":"evt_2"}"#, &header, NOW);
        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
    }

    #[test]
    fn stripe_rejects_wrong_secret() {
        let verifier = StripeSignatureVerifier::new(SecretString::new("whsec_other".into()));
        let header = stripe_test_header(SECRET, NOW, BODY);
        assert!(matches!(
            verifier.verify_at(BODY.as_bytes(), &header, NOW),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn stripe_rejects_expired_timestamp() {
        let verifier = StripeSignatureVerifier::new(secret());
        let header = stripe_test_header(SECRET, NOW, BODY);
        assert!(matches!(
            verifier.verify_at(BODY.as_bytes(), &header, NOW + 301),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }

    #[test]
    fn stripe_rejects_far_future_timestamp() {
        let verifier = StripeSignatureVerifier::new(secret());
        let header = stripe_test_header(SECRET, NOW + 120, BODY);
        assert!(matches!(
            verifier.verify_at(BODY.as_bytes(), &header, NOW),
            Err(WebhookError::InvalidTimestamp)
        ));
    }

    #[test]
    fn stripe_tolerates_small_clock_skew() {
        let verifier = StripeSignatureVerifier::new(secret());
        let header = stripe_test_header(SECRET, NOW + 30, BODY);
        assert!(verifier.verify_at(BODY.as_bytes(), &header, NOW).is_ok());
    }

    #[test]
    fn stripe_rejects_extreme_timestamps_without_overflow() {
        let verifier = StripeSignatureVerifier::new(secret());
        for ts in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1=00", ts);
            assert!(verifier.verify_at(BODY.as_bytes(), &header, NOW).is_err());
        }
        assert!(matches!(
            verifier.verify_at(BODY.as_bytes(), "t=-9223372036854775808,v1=00", NOW),
            Err(WebhookError::InvalidTimestamp)
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Paddle
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn paddle_accepts_valid_signature() {
        let verifier = PaddleSignatureVerifier::new(secret());
        let header = paddle_test_header(SECRET, NOW, BODY);
        assert!(verifier.verify_at(BODY.as_bytes(), &header, NOW).is_ok());
    }

    #[test]
    fn paddle_rejects_stripe_style_signature() {
        let verifier = PaddleSignatureVerifier::new(secret());
        let stripe = stripe_test_header(SECRET, NOW, BODY);
        let sig = stripe.split("v1=").nth(1).unwrap();
        let header = format!("ts={};h1={}", NOW, sig);
        assert!(matches!(
            verifier.verify_at(BODY.as_bytes(), &header, NOW),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn paddle_rejects_replayed_event() {
        let verifier = PaddleSignatureVerifier::new(secret());
        let header = paddle_test_header(SECRET, NOW - 600, BODY);
        assert!(matches!(
            verifier.verify_at(BODY.as_bytes(), &header, NOW),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }

    #[test]
    fn paddle_rejects_extreme_timestamps_without_overflow() {
        let verifier = PaddleSignatureVerifier::new(secret());
        assert!(matches!(
            verifier.verify_at(BODY.as_bytes(), "ts=-9223372036854775808;h1=00", NOW),
            Err(WebhookError::InvalidTimestamp)
        ));
        assert!(matches!(
            verifier.verify_at(BODY.as_bytes(), "ts=9223372036854775807;h1=00", i64::MIN),
            Err(WebhookError::InvalidTimestamp)
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // LemonSqueezy
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn lemonsqueezy_accepts_valid_signature() {
        let verifier = LemonSqueezySignatureVerifier::new(secret());
        let header = lemonsqueezy_test_header(SECRET, BODY);
        assert!(verifier.verify(BODY.as_bytes(), &header).is_ok());
    }

    #[test]
    fn lemonsqueezy_rejects_garbage_header() {
        let verifier = LemonSqueezySignatureVerifier::new(secret());
        assert!(matches!(
            verifier.verify(BODY.as_bytes(), "not-hex"),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn lemonsqueezy_rejects_truncated_signature() {
        let verifier = LemonSqueezySignatureVerifier::new(secret());
        let header = lemonsqueezy_test_header(SECRET, BODY);
        assert!(verifier.verify(BODY.as_bytes(), &header[..32]).is_err());
    }

    #[test]
    fn constant_time_compare_checks_length() {
        assert!(!constant_time_compare(b"abc", b"abcd"));
        assert!(constant_time_compare(b"abc", b"abc"));
    }
}
