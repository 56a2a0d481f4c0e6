//! Billing Sync - Payment provider synchronization service
//!
//! This crate receives signed webhooks from Stripe, Paddle and LemonSqueezy,
//! records them in an idempotent inbox, and mirrors subscription and invoice
//! state locally. It also pushes the local product catalog to each provider
//! and archives deleted entities remotely through a bounded-retry outbox.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
