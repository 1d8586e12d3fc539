//! APAR Rule Evaluation
//!
//! - `registry`: static rule table (id, channels, parameters, default modes)
//! - `predicates`: pure point-wise fault predicates
//! - `engine`: binding runs, stuck-sensor override, mode exclusion

mod engine;
pub mod predicates;
mod registry;

pub use engine::{
    EngineOutput, RuleBinding, RuleDiagnostics, RuleEngine, RuleEvaluation, RuleFailure,
    DEFAULT_STUCK_VARIANCE_THRESHOLD,
};
pub use predicates::{RuleOutcome, RuleThresholds, Sample};
pub use registry::{all_rules, ModeScope, RuleDefinition, RuleId};
