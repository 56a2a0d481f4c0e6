//! Rate limiter adapters for the webhook endpoint.
//!
//! - `InMemoryRateLimiter` - Single instance, also used in tests
//! - `RedisRateLimiter` - Shared budget across instances

mod in_memory;
mod redis;

pub use self::in_memory::InMemoryRateLimiter;
pub use self::redis::RedisRateLimiter;
