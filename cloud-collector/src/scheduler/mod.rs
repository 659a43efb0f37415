//! Scheduling of collection cycles.
//!
//! The [`CollectionSupervisor`] decodes the fleet task and starts one
//! [`FleetScheduler`] per accepted account, up to the concurrency cap.
//! Each scheduler owns its own timer and runs cycles for its account until
//! the shared cancellation token fires.

mod fleet;
mod supervisor;

pub use fleet::{FleetScheduler, SchedulerState};
pub use supervisor::{CollectionSupervisor, SupervisorReport, plan_accounts};
