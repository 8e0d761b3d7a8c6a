//! Paylane - Payments platform backend
//!
//! This library provides the core functionality for the Paylane payments
//! platform: the payment ledger state machine, the merchant webhook
//! registry, signed webhook delivery with automatic retries, and the API
//! handlers.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod ledger;
pub mod models;
pub mod money;
pub mod pagination;
pub mod signature;
pub mod webhooks;
