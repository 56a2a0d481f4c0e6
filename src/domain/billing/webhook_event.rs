//! Durable record of an inbound provider webhook.
//!
//! A record is written once at ingress (`pending`) and then driven through
//! its lifecycle by the processor workers:
//!
//! ```text
//! pending ──claim──▶ processing ──▶ processed | ignored | failed
//!    ▲                   │
//!    └── retry/reclaim ──┘          failed ──requeue──▶ pending
//! ```
//!
//! `(provider, external_event_id)` is the idempotency key.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, ErrorCode, StateMachine, Timestamp, WebhookEventId};

use super::{BillingProvider, RetryDecision, RetryPolicy};

/// Processing status of a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventStatus {
    Pending,
    Processing,
    Processed,
    Ignored,
    Failed,
}

impl WebhookEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventStatus::Pending => "pending",
            WebhookEventStatus::Processing => "processing",
            WebhookEventStatus::Processed => "processed",
            WebhookEventStatus::Ignored => "ignored",
            WebhookEventStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WebhookEventStatus::Pending),
            "processing" => Some(WebhookEventStatus::Processing),
            "processed" => Some(WebhookEventStatus::Processed),
            "ignored" => Some(WebhookEventStatus::Ignored),
            "failed" => Some(WebhookEventStatus::Failed),
            _ => None,
        }
    }
}

impl StateMachine for WebhookEventStatus {
    fn valid_transitions(&self) -> &'static [Self] {
        use WebhookEventStatus::*;
        match self {
            Pending => &[Processing],
            Processing => &[Pending, Processed, Ignored, Failed],
            Failed => &[Pending],
            Processed | Ignored => &[],
        }
    }
}

/// Provider-independent identity of a webhook, extracted before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEnvelope {
    /// Provider event id, or a derived key for providers that send none.
    pub external_event_id: String,
    pub event_type: String,
    /// False for sandbox/test-mode deliveries.
    pub livemode: bool,
}

/// Outcome of recording a failed processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    RetryScheduled(Timestamp),
    Failed,
}

/// Stored webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: WebhookEventId,
    pub provider: BillingProvider,
    pub external_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: WebhookEventStatus,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub received_at: Timestamp,
    pub next_attempt_at: Timestamp,
    /// When the current `processing` claim was taken.
    pub claimed_at: Option<Timestamp>,
    pub processed_at: Option<Timestamp>,
}

impl WebhookEvent {
    /// Creates a pending record for a freshly verified delivery.
    pub fn received(
        provider: BillingProvider,
        envelope: WebhookEnvelope,
        payload: serde_json::Value,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: WebhookEventId::new(),
            provider,
            external_event_id: envelope.external_event_id,
            event_type: envelope.event_type,
            payload,
            status: WebhookEventStatus::Pending,
            attempts: 0,
            error_message: None,
            received_at: now,
            next_attempt_at: now,
            claimed_at: None,
            processed_at: None,
        }
    }

    /// True if a worker may claim this event at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == WebhookEventStatus::Pending && !self.next_attempt_at.is_after(&now)
    }

    /// Claims the event for processing and counts the attempt.
    pub fn begin_attempt(&mut self) -> Result<(), DomainError> {
        self.status = self.status.transition_to(WebhookEventStatus::Processing)?;
        self.attempts += 1;
        self.claimed_at = Some(Timestamp::now());
        Ok(())
    }

    pub fn mark_processed(&mut self) -> Result<(), DomainError> {
        self.status = self.status.transition_to(WebhookEventStatus::Processed)?;
        self.error_message = None;
        self.processed_at = Some(Timestamp::now());
        Ok(())
    }

    pub fn mark_ignored(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.status = self.status.transition_to(WebhookEventStatus::Ignored)?;
        self.error_message = Some(reason.into());
        self.processed_at = Some(Timestamp::now());
        Ok(())
    }

    /// Records a failed attempt, scheduling a retry when the policy allows it.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        retryable: bool,
        policy: &RetryPolicy,
    ) -> Result<FailureOutcome, DomainError> {
        let now = Timestamp::now();
        self.error_message = Some(error.into());

        match policy.decide(self.attempts, retryable, now) {
            RetryDecision::RetryAt(at) => {
                self.status = self.status.transition_to(WebhookEventStatus::Pending)?;
                self.next_attempt_at = at;
                Ok(FailureOutcome::RetryScheduled(at))
            }
            RetryDecision::GiveUp => {
                self.status = self.status.transition_to(WebhookEventStatus::Failed)?;
                self.processed_at = Some(now);
                Ok(FailureOutcome::Failed)
            }
        }
    }

    /// Operator action: put a failed event back in the queue with a fresh budget.
    pub fn requeue(&mut self) -> Result<(), DomainError> {
        if self.status != WebhookEventStatus::Failed {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Only failed events can be requeued (status: {})", self.status.as_str()),
            ));
        }
        self.status = WebhookEventStatus::Pending;
        self.attempts = 0;
        self.next_attempt_at = Timestamp::now();
        self.processed_at = None;
        Ok(())
    }

    /// Returns an abandoned `processing` claim to the queue, or fails the
    /// event when the abandoned claim was its last allowed attempt.
    pub fn reclaim(&mut self, max_attempts: u32) -> Result<(), DomainError> {
        let now = Timestamp::now();
        if self.attempts >= max_attempts {
            self.status = self.status.transition_to(WebhookEventStatus::Failed)?;
            self.error_message = Some("worker lease expired on final attempt".to_string());
            self.processed_at = Some(now);
        } else {
            self.status = self.status.transition_to(WebhookEventStatus::Pending)?;
            self.next_attempt_at = now;
        }
        self.claimed_at = None;
        Ok(())
    }
}
