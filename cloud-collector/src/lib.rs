//! cloud-collector library crate.
//!
//! Periodically samples performance counters and events from
//! virtualization-cluster accounts and forwards them, batched as JSON, to a
//! local telemetry agent.

pub mod collector;
pub mod config;
pub mod credentials;
pub mod delivery;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod provider;
pub mod scheduler;
pub mod services;
pub mod sink;

pub use error::{Error, Result};
