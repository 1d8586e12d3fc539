//! Analysis Configuration Module
//!
//! Every threshold, channel alias and rule binding of an APAR run is read
//! from a TOML file, so a site can be tuned without code changes.
//!
//! ## Loading Order
//!
//! 1. `APAR_CONFIG` environment variable (path to TOML file)
//! 2. `apar_config.toml` in the current working directory
//! 3. Built-in defaults (reference APAR thresholds, every rule enabled)
//!
//! ## Usage
//!
//! ```ignore
//! let config = AnalysisConfig::load();
//! let report = AnalysisPipeline::new(config).run(&series)?;
//! ```

mod analysis_config;
pub mod defaults;
pub mod validation;

pub use analysis_config::*;
