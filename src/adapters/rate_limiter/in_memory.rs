//! In-memory fixed-window rate limiter.
//!
//! Counters live in a process-local map, so each instance enforces its own
//! budget. Use `RedisRateLimiter` when several instances share one.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::RateLimitConfig;
use crate::domain::foundation::Timestamp;
use crate::ports::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus, RateLimiter,
};

#[derive(Debug, Clone)]
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    windows: Arc<RwLock<HashMap<String, Window>>>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started_at: i64,
}

impl Window {
    fn fresh(now: i64) -> Self {
        Self {
            count: 0,
            started_at: now,
        }
    }

    fn resets_at(&self, window_secs: u32) -> i64 {
        self.started_at + i64::from(window_secs)
    }
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn status_for(limit: u32, window_secs: u32, window: &Window, now: i64) -> RateLimitStatus {
        let reset_in = window.resets_at(window_secs).saturating_sub(now).max(0) as u64;
        RateLimitStatus {
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_at: Timestamp::now().plus_secs(reset_in),
            window_secs,
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: RateLimitKey) -> Result<RateLimitResult, RateLimitError> {
        let (limit, window_secs) = self.config.limits_for(key.scope);
        let now = Timestamp::now().as_unix_secs();

        let mut windows = self.windows.write().await;
        let window = windows
            .entry(key.to_redis_key())
            .or_insert_with(|| Window::fresh(now));

        if now >= window.resets_at(window_secs) {
            *window = Window::fresh(now);
        }

        if window.count >= limit {
            let retry_after = window.resets_at(window_secs).saturating_sub(now).max(1) as u32;
            return Ok(RateLimitResult::Denied(RateLimitDenied {
                limit,
                retry_after_secs: retry_after,
                scope: key.scope,
                message: format!(
                    "Rate limit exceeded for {}. Retry after {} seconds.",
                    key.scope, retry_after
                ),
            }));
        }

        window.count += 1;
        Ok(RateLimitResult::Allowed(Self::status_for(limit, window_secs, window, now)))
    }

    async fn status(&self, key: RateLimitKey) -> Result<RateLimitStatus, RateLimitError> {
        let (limit, window_secs) = self.config.limits_for(key.scope);
        let now = Timestamp::now().as_unix_secs();

        let windows = self.windows.read().await;
        let window = windows
            .get(&key.to_redis_key())
            .copied()
            .filter(|w| now < w.resets_at(window_secs))
            .unwrap_or_else(|| Window::fresh(now));

        Ok(Self::status_for(limit, window_secs, &window, now))
    }

    async fn reset(&self, key: RateLimitKey) -> Result<(), RateLimitError> {
        self.windows.write().await.remove(&key.to_redis_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::BillingProvider;
    use crate::ports::RateLimitScope;

    fn limiter(per_ip: u32, per_provider: u32) -> InMemoryRateLimiter {
        InMemoryRateLimiter::new(RateLimitConfig {
            per_ip_per_minute: per_ip,
            per_provider_per_minute: per_provider,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn denies_once_window_budget_is_spent() {
        let limiter = limiter(3, 100);
        let key = RateLimitKey::ip("192.168.1.1");

        for _ in 0..3 {
            assert!(limiter.check(key.clone()).await.unwrap().is_allowed());
        }

        match limiter.check(key).await.unwrap() {
            RateLimitResult::Denied(denied) => {
                assert_eq!(denied.limit, 3);
                assert_eq!(denied.scope, RateLimitScope::Ip);
                assert!(denied.retry_after_secs >= 1);
            }
            RateLimitResult::Allowed(_) => panic!("fourth request should be denied"),
        }
    }

    #[tokio::test]
    async fn remaining_counts_down() {
        let limiter = limiter(5, 100);
        let key = RateLimitKey::ip("10.0.0.1");

        for expected in (0..5).rev() {
            let RateLimitResult::Allowed(status) = limiter.check(key.clone()).await.unwrap() else {
                panic!("request within budget was denied");
            };
            assert_eq!(status.remaining, expected);
        }
        assert_eq!(limiter.status(key).await.unwrap().remaining, 0);
    }

    #[tokio::test]
    async fn scopes_and_identifiers_are_independent() {
        let limiter = limiter(1, 2);
        assert!(limiter.check(RateLimitKey::ip("1.1.1.1")).await.unwrap().is_allowed());
        assert!(limiter.check(RateLimitKey::ip("1.1.1.1")).await.unwrap().is_denied());
        assert!(limiter.check(RateLimitKey::ip("2.2.2.2")).await.unwrap().is_allowed());

        let stripe = RateLimitKey::provider(BillingProvider::Stripe);
        assert!(limiter.check(stripe.clone()).await.unwrap().is_allowed());
        assert!(limiter.check(stripe.clone()).await.unwrap().is_allowed());
        assert!(limiter.check(stripe).await.unwrap().is_denied());
        assert!(limiter
            .check(RateLimitKey::provider(BillingProvider::Paddle))
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn reset_restores_budget() {
        let limiter = limiter(1, 100);
        let key = RateLimitKey::ip("10.0.0.2");
        limiter.check(key.clone()).await.unwrap();
        assert!(limiter.check(key.clone()).await.unwrap().is_denied());

        limiter.reset(key.clone()).await.unwrap();

        assert!(limiter.check(key).await.unwrap().is_allowed());
    }
}
