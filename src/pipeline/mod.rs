//! Analysis Pipeline Module
//!
//! ## 5-Stage Pipeline
//!
//! ```text
//! STAGE 1: Preprocessing
//! STAGE 2: Precheck battery
//! STAGE 3: Operating-mode classification
//! STAGE 4: Rule evaluation (rayon over bindings)
//! STAGE 5: Summaries
//! ```
//!
//! CRITICAL GUARANTEE: a rule failure never aborts the run; only the
//! classifier's missing inputs do.

mod coordinator;
mod report;

pub use coordinator::AnalysisPipeline;
pub use report::{AnalysisReport, AugmentedSeries, ReportSummary, RuleColumn};
