//! Payment provider adapters.
//!
//! ## Available Adapters
//!
//! - `StripeProviderAdapter` - Stripe REST API + `Stripe-Signature` webhooks
//! - `PaddleProviderAdapter` - Paddle Billing API + `Paddle-Signature` webhooks
//! - `LemonSqueezyProviderAdapter` - `X-Signature` webhooks, no catalog API
//! - `MockProviderAdapter` - Scriptable adapter for tests

mod lemonsqueezy;
mod mock;
mod paddle;
mod stripe;
mod support;

pub use lemonsqueezy::{LemonSqueezyConfig, LemonSqueezyProviderAdapter};
pub use mock::{MethodCall, MockProviderAdapter, MOCK_SIGNATURE};
pub use paddle::{PaddleConfig, PaddleProviderAdapter};
pub use stripe::{StripeConfig, StripeProviderAdapter};

use std::sync::Arc;

use crate::config::ProvidersConfig;
use crate::ports::ProviderRegistry;

/// Builds one adapter per configured provider.
pub fn build_registry(config: &ProvidersConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    if let Some(settings) = &config.stripe {
        let mut stripe = StripeConfig::new(settings.api_key.clone(), settings.webhook_secret.clone())
            .with_require_livemode(settings.require_livemode);
        if let Some(url) = &settings.api_base_url {
            stripe = stripe.with_base_url(url.clone());
        }
        registry.register(Arc::new(StripeProviderAdapter::new(stripe)));
    }

    if let Some(settings) = &config.paddle {
        let mut paddle = PaddleConfig::new(settings.api_key.clone(), settings.webhook_secret.clone());
        if let Some(url) = &settings.api_base_url {
            paddle = paddle.with_base_url(url.clone());
        }
        registry.register(Arc::new(PaddleProviderAdapter::new(paddle)));
    }

    if let Some(settings) = &config.lemonsqueezy {
        let lemonsqueezy = LemonSqueezyConfig::new(settings.webhook_secret.clone())
            .with_require_livemode(settings.require_livemode);
        registry.register(Arc::new(LemonSqueezyProviderAdapter::new(lemonsqueezy)));
    }

    for provider in registry.providers() {
        tracing::info!(provider = %provider, "Billing provider enabled");
    }
    registry
}
