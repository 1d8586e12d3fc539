//! Report types: three-valued check status, aggregates, summaries

use serde::{Deserialize, Serialize};

use super::{ModeApplicability, OperatingMode};
use crate::error::AnalysisError;

// ============================================================================
// Check Status
// ============================================================================

/// Outcome of a rule or data check.
///
/// `Warning` means inconclusive (insufficient or ambiguous data), which is
/// distinct from a hard pass or fail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

impl CheckStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Pass => "✅",
            Self::Warning => "⚠️",
            Self::Fail => "❌",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASSED"),
            Self::Warning => write!(f, "WARNING"),
            Self::Fail => write!(f, "FAILED"),
        }
    }
}

/// Result of one named check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl CheckResult {
    pub fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// A ratio over a qualifying subset of samples.
///
/// `Undefined` is reported when the subset is empty; it is never coerced
/// to zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Value(f64),
    Undefined,
}

impl Aggregate {
    /// Percentage of `part` over `whole`, undefined for an empty whole.
    pub fn percentage(part: usize, whole: usize) -> Self {
        if whole == 0 {
            Self::Undefined
        } else {
            Self::Value(part as f64 / whole as f64 * 100.0)
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Numeric value, or `UndefinedAggregate` naming what was measured.
    pub fn value(&self, what: &str) -> Result<f64, AnalysisError> {
        match self {
            Self::Value(v) => Ok(*v),
            Self::Undefined => Err(AnalysisError::UndefinedAggregate(what.to_string())),
        }
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v:.2}%"),
            Self::Undefined => write!(f, "undefined"),
        }
    }
}

// ============================================================================
// Summaries
// ============================================================================

/// Share of the dataset spent in one operating mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModeShare {
    pub mode: OperatingMode,
    pub samples: usize,
    /// Percentage of total samples, rounded to 2 decimals
    pub percentage: f64,
}

/// Per-rule reduction of a masked fault series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSummary {
    /// Result column label (rule id unless overridden)
    pub name: String,
    pub applicable_modes: ModeApplicability,
    /// Samples whose mode is in the applicable set
    pub samples_in_mode: usize,
    /// Faulty samples among `samples_in_mode`
    pub faulty_samples: usize,
    pub fault_percentage: Aggregate,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
