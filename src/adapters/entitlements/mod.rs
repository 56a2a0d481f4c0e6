//! Entitlements notifier adapters.
//!
//! - `LoggingEntitlementsNotifier` - Logs changes; used when Redis is absent and in tests
//! - `RedisEntitlementsNotifier` - Invalidates the cached entitlements and publishes a change message

mod logging;
mod redis;

pub use self::logging::LoggingEntitlementsNotifier;
pub use self::redis::RedisEntitlementsNotifier;
