//! In-memory billing repositories.

mod billing_store;

pub use billing_store::InMemoryBillingStore;
