//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `BILLING_SYNC` prefix and
//! `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use billing_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod admin;
mod database;
mod error;
mod providers;
mod rate_limit;
mod redis;
mod server;
mod worker;

pub use admin::{AdminConfig, MIN_ADMIN_TOKEN_LEN};
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use providers::{LemonSqueezySettings, PaddleSettings, ProvidersConfig, StripeSettings};
pub use rate_limit::{RateLimitConfig, WINDOW_SECS};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};
pub use worker::WorkerConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    /// Optional shared cache for rate limits and entitlement invalidation
    pub redis: Option<RedisConfig>,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads variables with the `BILLING_SYNC` prefix
    /// 3. Splits nested keys on `__` and lists on `,`
    ///
    /// - `BILLING_SYNC__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `BILLING_SYNC__PROVIDERS__STRIPE__API_KEY=sk_...` -> `providers.stripe.api_key`
    /// - `BILLING_SYNC__WORKER__WEBHOOK_BACKOFF_SECS=10,60,300` -> list
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING_SYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("worker.webhook_backoff_secs"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        self.providers.validate()?;
        self.worker.validate()?;
        self.admin.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[(&str, &str)] = &[
        ("BILLING_SYNC__DATABASE__URL", "postgresql://test@localhost/billing"),
        ("BILLING_SYNC__PROVIDERS__STRIPE__API_KEY", "sk_test_xxx"),
        ("BILLING_SYNC__PROVIDERS__STRIPE__WEBHOOK_SECRET", "whsec_xxx"),
        ("BILLING_SYNC__PROVIDERS__LEMONSQUEEZY__WEBHOOK_SECRET", "ls_secret"),
    ];

    fn with_env<T>(extra: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for (k, v) in VARS.iter().chain(extra) {
            env::set_var(k, v);
        }
        let result = f();
        for (k, _) in VARS.iter().chain(extra) {
            env::remove_var(k);
        }
        result
    }

    #[test]
    fn loads_minimal_environment() {
        let config = with_env(&[], AppConfig::load).unwrap();

        assert_eq!(config.database.url, "postgresql://test@localhost/billing");
        assert!(config.redis.is_none());
        assert!(config.providers.paddle.is_none());
        let stripe = config.providers.stripe.as_ref().unwrap();
        assert_eq!(stripe.api_key.expose_secret(), "sk_test_xxx");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn applies_section_defaults() {
        let config = with_env(&[], AppConfig::load).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.worker.batch_size, 25);
        assert!(config.rate_limit.enabled);
        assert!(!config.admin.is_enabled());
    }

    #[test]
    fn parses_backoff_list() {
        let config = with_env(
            &[("BILLING_SYNC__WORKER__WEBHOOK_BACKOFF_SECS", "5,15,45")],
            AppConfig::load,
        )
        .unwrap();
        assert_eq!(config.worker.webhook_backoff_secs, vec![5, 15, 45]);
    }

    #[test]
    fn production_flag_comes_from_server_section() {
        let config = with_env(
            &[("BILLING_SYNC__SERVER__ENVIRONMENT", "production")],
            AppConfig::load,
        )
        .unwrap();
        assert!(config.is_production());
    }
}
