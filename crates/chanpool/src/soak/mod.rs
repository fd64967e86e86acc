//! Soak testing against a simulated service
//!
//! Drives a registry with many concurrent workers so lease accounting can be
//! checked under contention, channel-count changes and creation failures.

mod driver;
mod factory;

pub use driver::{identity_params, run_soak, SoakOptions, SoakReport};
pub use factory::{SimulatedFactory, SimulatedHandle};
