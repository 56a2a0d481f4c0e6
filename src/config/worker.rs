//! Background worker configuration

use serde::Deserialize;
use std::time::Duration;

use crate::domain::billing::RetryPolicy;

use super::error::ValidationError;

/// Worker pool, queue polling and retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent webhook processing tasks
    #[serde(default = "default_webhook_workers")]
    pub webhook_workers: usize,

    /// Rows claimed per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Poll interval when no ingress wake-up arrives
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Processing attempts per webhook event
    #[serde(default = "default_webhook_max_attempts")]
    pub webhook_max_attempts: u32,

    /// Delay after each failed webhook attempt; the last entry repeats
    #[serde(default = "default_webhook_backoff")]
    pub webhook_backoff_secs: Vec<u64>,

    /// Archive attempts per outbox entry
    #[serde(default = "default_outbox_max_attempts")]
    pub outbox_max_attempts: u32,

    #[serde(default = "default_outbox_base_delay")]
    pub outbox_base_delay_secs: u64,

    #[serde(default = "default_outbox_max_delay")]
    pub outbox_max_delay_secs: u64,

    /// Tries per provider API call during catalog sync
    #[serde(default = "default_sync_call_attempts")]
    pub sync_call_attempts: usize,

    /// Catalog sync period; 0 disables the periodic sync
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Age after which a `processing` claim is considered abandoned
    #[serde(default = "default_stale_lease")]
    pub stale_lease_secs: u64,

    /// Days terminal rows are kept before purge
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stale_lease(&self) -> Duration {
        Duration::from_secs(self.stale_lease_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// `None` when periodic sync is disabled.
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }

    pub fn webhook_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.webhook_max_attempts, self.webhook_backoff_secs.clone())
    }

    pub fn outbox_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.outbox_max_attempts,
            self.outbox_base_delay_secs,
            self.outbox_max_delay_secs,
        )
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.webhook_workers == 0 {
            return Err(ValidationError::InvalidWorkerSetting("webhook_workers must be positive"));
        }
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidWorkerSetting("batch_size must be positive"));
        }
        if self.poll_interval_secs == 0 {
            return Err(ValidationError::InvalidWorkerSetting("poll_interval_secs must be positive"));
        }
        if self.webhook_max_attempts == 0 || self.outbox_max_attempts == 0 || self.sync_call_attempts == 0 {
            return Err(ValidationError::InvalidWorkerSetting("attempt budgets must be positive"));
        }
        if self.outbox_base_delay_secs > self.outbox_max_delay_secs {
            return Err(ValidationError::InvalidWorkerSetting(
                "outbox_base_delay_secs exceeds outbox_max_delay_secs",
            ));
        }
        if self.stale_lease_secs == 0 || self.maintenance_interval_secs == 0 {
            return Err(ValidationError::InvalidWorkerSetting("maintenance timings must be positive"));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            webhook_workers: default_webhook_workers(),
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            webhook_max_attempts: default_webhook_max_attempts(),
            webhook_backoff_secs: default_webhook_backoff(),
            outbox_max_attempts: default_outbox_max_attempts(),
            outbox_base_delay_secs: default_outbox_base_delay(),
            outbox_max_delay_secs: default_outbox_max_delay(),
            sync_call_attempts: default_sync_call_attempts(),
            sync_interval_secs: default_sync_interval(),
            stale_lease_secs: default_stale_lease(),
            retention_days: default_retention_days(),
            maintenance_interval_secs: default_maintenance_interval(),
        }
    }
}

fn default_webhook_workers() -> usize {
    2
}

fn default_batch_size() -> u32 {
    25
}

fn default_poll_interval() -> u64 {
    5
}

fn default_webhook_max_attempts() -> u32 {
    5
}

fn default_webhook_backoff() -> Vec<u64> {
    vec![10, 60, 300, 900, 3600]
}

fn default_outbox_max_attempts() -> u32 {
    8
}

fn default_outbox_base_delay() -> u64 {
    30
}

fn default_outbox_max_delay() -> u64 {
    3600
}

fn default_sync_call_attempts() -> usize {
    3
}

fn default_sync_interval() -> u64 {
    900
}

fn default_stale_lease() -> u64 {
    300
}

fn default_retention_days() -> u32 {
    30
}

fn default_maintenance_interval() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policies_match_queue_budgets() {
        let config = WorkerConfig::default();
        assert_eq!(config.webhook_retry_policy().max_attempts, 5);

        let outbox = config.outbox_retry_policy();
        assert_eq!(outbox.max_attempts, 8);
        assert_eq!(outbox.backoff(1), Duration::from_secs(30));
        assert_eq!(outbox.backoff(8), Duration::from_secs(3600));
    }

    #[test]
    fn zero_sync_interval_disables_sync() {
        let config = WorkerConfig {
            sync_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.sync_interval().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_budgets_are_rejected() {
        let config = WorkerConfig {
            outbox_max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            webhook_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_outbox_delays_are_rejected() {
        let config = WorkerConfig {
            outbox_base_delay_secs: 600,
            outbox_max_delay_secs: 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
