//! Bounded retry schedule shared by the webhook queue and the deletion outbox.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again no earlier than the given time.
    RetryAt(Timestamp),
    /// Attempt budget exhausted or error is permanent.
    GiveUp,
}

/// Retry policy with a capped attempt count and a per-attempt delay schedule.
///
/// `schedule[n]` is the delay after the `n+1`th failed attempt; attempts past
/// the end of the schedule reuse the last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub schedule_secs: Vec<u64>,
}

impl RetryPolicy {
    /// Fixed schedule, e.g. `[10, 60, 300]`.
    pub fn fixed(max_attempts: u32, schedule_secs: Vec<u64>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            schedule_secs,
        }
    }

    /// Exponential schedule: `base * 2^n`, capped at `cap_secs`.
    pub fn exponential(max_attempts: u32, base_secs: u64, cap_secs: u64) -> Self {
        let max_attempts = max_attempts.max(1);
        let schedule_secs = (0..max_attempts)
            .map(|n| {
                base_secs
                    .saturating_mul(1u64.checked_shl(n).unwrap_or(u64::MAX))
                    .min(cap_secs)
            })
            .collect();
        Self {
            max_attempts,
            schedule_secs,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        let secs = self
            .schedule_secs
            .get(idx)
            .or_else(|| self.schedule_secs.last())
            .copied()
            .unwrap_or(0);
        Duration::from_secs(secs)
    }

    /// Decides whether a row that just failed its `attempts`th attempt may run again.
    pub fn decide(&self, attempts: u32, retryable: bool, now: Timestamp) -> RetryDecision {
        if !retryable || attempts >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAt(now.plus_secs(self.backoff(attempts).as_secs()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, vec![10, 60, 300, 900, 3600])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_schedule_reuses_last_delay() {
        let policy = RetryPolicy::fixed(10, vec![5, 30]);
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(30));
        assert_eq!(policy.backoff(7), Duration::from_secs(30));
    }

    #[test]
    fn exponential_schedule_doubles_until_cap() {
        let policy = RetryPolicy::exponential(6, 2, 20);
        assert_eq!(policy.schedule_secs, vec![2, 4, 8, 16, 20, 20]);
    }

    #[test]
    fn empty_schedule_retries_immediately() {
        let policy = RetryPolicy::fixed(3, vec![]);
        assert_eq!(policy.backoff(1), Duration::ZERO);
    }

    #[test]
    fn decide_gives_up_at_max_attempts() {
        let policy = RetryPolicy::fixed(3, vec![1]);
        let now = Timestamp::now();
        assert_eq!(policy.decide(2, true, now), RetryDecision::RetryAt(now.plus_secs(1)));
        assert_eq!(policy.decide(3, true, now), RetryDecision::GiveUp);
    }

    #[test]
    fn decide_gives_up_on_permanent_error() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(1, false, Timestamp::now()), RetryDecision::GiveUp);
    }

    #[test]
    fn zero_max_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::fixed(0, vec![1]).max_attempts, 1);
    }
}
