//! Billing provider credentials
//!
//! Each provider is optional; only configured providers get an adapter and a
//! webhook endpoint.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    pub stripe: Option<StripeSettings>,
    pub paddle: Option<PaddleSettings>,
    pub lemonsqueezy: Option<LemonSqueezySettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSettings {
    /// Secret API key (sk_live_... or sk_test_...)
    pub api_key: SecretString,
    /// Webhook signing secret (whsec_...)
    pub webhook_secret: SecretString,
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub require_livemode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaddleSettings {
    pub api_key: SecretString,
    /// Notification destination secret
    pub webhook_secret: SecretString,
    /// Set to the sandbox API for sandbox accounts
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LemonSqueezySettings {
    /// Webhook signing secret
    pub webhook_secret: SecretString,
    #[serde(default)]
    pub require_livemode: bool,
}

impl StripeSettings {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.api_key.expose_secret().starts_with("sk_test_")
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason| ValidationError::InvalidProviderCredential {
            provider: "stripe",
            reason,
        };
        if !self.api_key.expose_secret().starts_with("sk_") {
            return Err(invalid("api_key must start with sk_"));
        }
        if !self.webhook_secret.expose_secret().starts_with("whsec_") {
            return Err(invalid("webhook_secret must start with whsec_"));
        }
        if self.require_livemode && self.is_test_mode() {
            return Err(invalid("require_livemode is set but api_key is a test key"));
        }
        Ok(())
    }
}

impl ProvidersConfig {
    pub fn is_empty(&self) -> bool {
        self.stripe.is_none() && self.paddle.is_none() && self.lemonsqueezy.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::NoProviderConfigured);
        }
        if let Some(stripe) = &self.stripe {
            stripe.validate()?;
        }
        if let Some(paddle) = &self.paddle {
            require_secret("paddle", &paddle.api_key, "api_key is empty")?;
            require_secret("paddle", &paddle.webhook_secret, "webhook_secret is empty")?;
        }
        if let Some(lemonsqueezy) = &self.lemonsqueezy {
            require_secret("lemonsqueezy", &lemonsqueezy.webhook_secret, "webhook_secret is empty")?;
        }
        Ok(())
    }
}

fn require_secret(
    provider: &'static str,
    secret: &SecretString,
    reason: &'static str,
) -> Result<(), ValidationError> {
    if secret.expose_secret().trim().is_empty() {
        return Err(ValidationError::InvalidProviderCredential { provider, reason });
    }
    Ok(())
}
