//! Controller state engines: aggregation, turbo gating and gyro fusion

pub mod aggregator;
pub mod gyro;
pub mod turbo;

pub use aggregator::{ActiveController, Aggregator, AggregatorSettings, EventOutcome};
pub use gyro::GyroEngine;
pub use turbo::{PhaseClock, TurboMasks};
