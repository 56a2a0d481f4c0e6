//! Deletion outbox entries.
//!
//! Deleting a product or price locally must not wait on provider APIs. The
//! local delete writes one entry per provider mapping in the same transaction;
//! the outbox worker later archives the remote object.
//!
//! Entries move `pending → processing → completed | failed`. A retryable
//! failure with budget left returns the entry to `pending`; once
//! `attempts == max_attempts` (or on a permanent error) the entry is
//! terminally `failed` and waits for an operator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, OutboxEntryId, StateMachine, Timestamp};

use super::{BillingProvider, EntityType, FailureOutcome, RetryDecision, RetryPolicy};

/// Status of a deletion outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processing => "processing",
            OutboxStatus::Completed => "completed",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "processing" => Some(OutboxStatus::Processing),
            "completed" => Some(OutboxStatus::Completed),
            "failed" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

impl StateMachine for OutboxStatus {
    fn valid_transitions(&self) -> &'static [Self] {
        use OutboxStatus::*;
        match self {
            Pending => &[Processing],
            Processing => &[Pending, Completed, Failed],
            Failed => &[Pending],
            Completed => &[],
        }
    }
}

/// A pending remote archive of a product or price on one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOutboxEntry {
    pub id: OutboxEntryId,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub provider: BillingProvider,
    pub external_id: String,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DeletionOutboxEntry {
    pub fn new(
        entity_type: EntityType,
        entity_id: Uuid,
        provider: BillingProvider,
        external_id: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: OutboxEntryId::new(),
            entity_type,
            entity_id,
            provider,
            external_id: external_id.into(),
            status: OutboxStatus::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == OutboxStatus::Pending
            && self.attempts < self.max_attempts
            && !self.next_attempt_at.is_after(&now)
    }

    /// Claims the entry and counts the attempt. Refuses once the budget is spent.
    pub fn begin_attempt(&mut self) -> Result<(), DomainError> {
        if self.attempts >= self.max_attempts {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Outbox entry {} exhausted {} attempts", self.id, self.max_attempts),
            ));
        }
        self.status = self.status.transition_to(OutboxStatus::Processing)?;
        self.attempts += 1;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Marks the remote object archived. `note` records why no call was made.
    pub fn complete(&mut self, note: Option<String>) -> Result<(), DomainError> {
        self.status = self.status.transition_to(OutboxStatus::Completed)?;
        self.last_error = note;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        retryable: bool,
        policy: &RetryPolicy,
    ) -> Result<FailureOutcome, DomainError> {
        let now = Timestamp::now();
        self.last_error = Some(error.into());
        self.updated_at = now;

        let budget = RetryPolicy {
            max_attempts: self.max_attempts,
            schedule_secs: policy.schedule_secs.clone(),
        };
        match budget.decide(self.attempts, retryable, now) {
            RetryDecision::RetryAt(at) => {
                self.status = self.status.transition_to(OutboxStatus::Pending)?;
                self.next_attempt_at = at;
                Ok(FailureOutcome::RetryScheduled(at))
            }
            RetryDecision::GiveUp => {
                self.status = self.status.transition_to(OutboxStatus::Failed)?;
                Ok(FailureOutcome::Failed)
            }
        }
    }

    /// Operator action: retry a failed entry with a fresh attempt budget.
    pub fn requeue(&mut self) -> Result<(), DomainError> {
        if self.status != OutboxStatus::Failed {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Only failed outbox entries can be requeued (status: {})", self.status.as_str()),
            ));
        }
        let now = Timestamp::now();
        self.status = OutboxStatus::Pending;
        self.attempts = 0;
        self.next_attempt_at = now;
        self.updated_at = now;
        Ok(())
    }

    /// Returns an abandoned claim to the queue without touching the budget.
    ///
    /// A claim that held the last attempt cannot be retried and fails instead.
    pub fn reclaim(&mut self) -> Result<(), DomainError> {
        let now = Timestamp::now();
        if self.attempts >= self.max_attempts {
            self.status = self.status.transition_to(OutboxStatus::Failed)?;
            self.last_error = Some("worker lease expired on final attempt".to_string());
        } else {
            self.status = self.status.transition_to(OutboxStatus::Pending)?;
            self.next_attempt_at = now;
        }
        self.updated_at = now;
        Ok(())
    }
}
