//! APAR-FDD: Air Handling Unit fault detection
//!
//! Rule-based fault detection for single-duct AHUs using the APAR
//! (Air handling unit Performance Assessment Rules) set.
//!
//! ## Architecture
//!
//! - **Classifier**: infers the operating mode of every sample from control signals
//! - **Rules**: table-driven APAR predicates evaluated point-wise
//! - **Exclusion**: masks faults outside a rule's modes and after mode changes
//! - **Summary**: fault-time share and PASS/FAIL/WARNING per rule
//! - **Precheck**: data-quality battery run before fault detection
//! - **Pipeline**: preprocessing → precheck → classify → rules → summaries

pub mod classifier;
pub mod config;
pub mod error;
pub mod exclusion;
pub mod pipeline;
pub mod precheck;
pub mod preprocessing;
pub mod rules;
pub mod sensors;
pub mod summary;
pub mod types;

// Re-export configuration
pub use config::{AnalysisConfig, ConfigError};

// Re-export commonly used types
pub use error::AnalysisError;
pub use types::{
    get_apar_params, Aggregate, AparParam, Channel, ChannelMap, CheckResult, CheckStatus,
    ModeApplicability, ModeShare, OperatingMode, RuleSummary, TimeSeries, UnitSystem,
};

// Re-export analysis stages
pub use classifier::{ClassifiedSeries, ClassifierThresholds, ModeClassifier, OnOffSource};
pub use exclusion::{ModeExclusionFilter, TransientWindow};
pub use pipeline::{AnalysisPipeline, AnalysisReport, AugmentedSeries};
pub use precheck::{Precheck, PrecheckReport, PrecheckThresholds};
pub use rules::{RuleBinding, RuleEngine, RuleEvaluation, RuleFailure, RuleId};
pub use summary::SummaryAggregator;
