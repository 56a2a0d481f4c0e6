//! Webhook endpoint rate limits
//!
//! Fixed one-minute windows at three scopes: every webhook request, each
//! client IP, and each provider path.

use serde::Deserialize;

use crate::ports::RateLimitScope;

/// Window length used for every scope.
pub const WINDOW_SECS: u32 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Infrastructure protection across all webhook traffic
    #[serde(default = "default_global")]
    pub global_per_minute: u32,

    #[serde(default = "default_per_ip")]
    pub per_ip_per_minute: u32,

    #[serde(default = "default_per_provider")]
    pub per_provider_per_minute: u32,
}

impl RateLimitConfig {
    /// Returns `(limit, window_secs)` for a scope.
    pub fn limits_for(&self, scope: RateLimitScope) -> (u32, u32) {
        let limit = match scope {
            RateLimitScope::Global => self.global_per_minute,
            RateLimitScope::Ip => self.per_ip_per_minute,
            RateLimitScope::Provider => self.per_provider_per_minute,
        };
        (limit, WINDOW_SECS)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            global_per_minute: default_global(),
            per_ip_per_minute: default_per_ip(),
            per_provider_per_minute: default_per_provider(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_global() -> u32 {
    6000
}

fn default_per_ip() -> u32 {
    600
}

fn default_per_provider() -> u32 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_follow_scope() {
        let config = RateLimitConfig {
            per_ip_per_minute: 7,
            ..Default::default()
        };
        assert_eq!(config.limits_for(RateLimitScope::Ip), (7, 60));
        assert_eq!(config.limits_for(RateLimitScope::Global), (6000, 60));
    }
}
