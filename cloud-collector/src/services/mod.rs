//! Service layer: lifecycle of the long-running tasks.

pub mod controller;

pub use controller::{ServiceController, ShutdownReport, shutdown_signal};
