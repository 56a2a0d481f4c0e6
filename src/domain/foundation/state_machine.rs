//! State machine trait for queue row statuses.
//!
//! Webhook events and deletion outbox rows both move through a small
//! lifecycle; this trait gives them one validated transition API.

use super::{DomainError, ErrorCode};

/// Trait for status enums that represent state machines.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug + 'static {
    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> &'static [Self];

    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, DomainError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Job {
        Queued,
        Running,
        Done,
    }

    impl StateMachine for Job {
        fn valid_transitions(&self) -> &'static [Self] {
            match self {
                Job::Queued => &[Job::Running],
                Job::Running => &[Job::Queued, Job::Done],
                Job::Done => &[],
            }
        }
    }

    #[test]
    fn valid_transition_returns_target() {
        assert_eq!(Job::Queued.transition_to(Job::Running).unwrap(), Job::Running);
    }

    #[test]
    fn invalid_transition_returns_state_error() {
        let err = Job::Queued.transition_to(Job::Done).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
    }

    #[test]
    fn terminal_state_has_no_transitions() {
        assert!(Job::Done.is_terminal());
        assert!(!Job::Running.is_terminal());
    }
}
