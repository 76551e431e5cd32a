//! # Webhook Handlers
//!
//! - [`health`]: liveness with a store round trip
//! - [`files`]: bucket events for newly arrived partner files
//! - [`results`]: bucket events for workflow results objects

pub mod files;
pub mod health;
pub mod results;
