//! Shared data structures for AHU fault detection
//!
//! - `series`: TimeSeries, semantic channels, channel alias map
//! - `mode`: OperatingMode and rule mode applicability
//! - `thresholds`: APAR parameter table keyed by unit system
//! - `report`: check status, aggregates, mode and rule summaries

mod mode;
mod report;
mod series;
// Public so callers can reach `types::thresholds::fahrenheit_to_celsius`.
pub mod thresholds;

pub use mode::*;
pub use report::*;
pub use series::*;
pub use thresholds::*;
