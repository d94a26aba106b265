//! Session simulation: mock sources, synchronizer and consumer.

mod runner;
mod stats;

pub use runner::{Simulation, SimulationConfig};
pub use stats::SimulationStats;
