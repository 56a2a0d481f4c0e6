//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `billing` - Provider sync, webhook lifecycle and deletion outbox

pub mod billing;
pub mod foundation;
