//! Adapter health: the suspension state machine, rate-limit deadlines and
//! the status view built from them.

mod status;
mod tracker;

pub use status::{ProviderHealth, ProviderStatus};
pub use tracker::{AdapterHealth, HealthState, HealthTracker};
