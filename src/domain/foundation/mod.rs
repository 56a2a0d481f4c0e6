//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the status state machine trait and
//! error types used across the billing domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{InvoiceId, OutboxEntryId, PriceId, ProductId, SubscriptionId, TeamId, WebhookEventId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
