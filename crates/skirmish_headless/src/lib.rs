//! Headless runner for skirmish scenarios.
//!
//! Scenarios are RON files describing a map, the agents placed on it and a
//! timeline of orders. The runner drives them through
//! [`skirmish_core::simulation::Simulation`] without any rendering and
//! reports the result as JSON, which makes it suitable for CI checks and
//! balance sweeps.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod runner;
pub mod scenario;

pub use runner::{run_batch, run_file, run_scenario, AgentReport, BatchEntry, RunReport};
pub use scenario::{Scenario, ScenarioError, ScenarioOrder};
