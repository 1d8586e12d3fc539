//! Rule evaluation engine
//!
//! Runs configured rule bindings over a classified series. Each run reads
//! only shared immutable inputs and writes its own buffers, so bindings can
//! be evaluated on the rayon pool without coordination.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::predicates::{RuleThresholds, Sample};
use super::registry::RuleId;
use crate::classifier::ClassifiedSeries;
use crate::error::AnalysisError;
use crate::exclusion::{ModeExclusionFilter, TransientWindow};
use crate::preprocessing::{is_low_variance, normalize_01};
use crate::types::{ChannelMap, ModeApplicability, OperatingMode, TimeSeries, UnitSystem};

/// Default variance below which a sensor is considered stuck.
pub const DEFAULT_STUCK_VARIANCE_THRESHOLD: f64 = 0.01;

// ============================================================================
// Bindings and Results
// ============================================================================

/// One configured run of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBinding {
    pub rule: RuleId,
    /// Result column name
    pub label: String,
    pub modes: ModeApplicability,
    pub channels: ChannelMap,
}

impl RuleBinding {
    /// Bind a rule with its own label, default modes and semantic channel names.
    pub fn new(rule: RuleId) -> Self {
        let def = rule.definition();
        Self {
            rule,
            label: def.label.to_string(),
            modes: def.default_modes.to_applicability(),
            channels: ChannelMap::default(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_modes(mut self, modes: ModeApplicability) -> Self {
        self.modes = modes;
        self
    }

    #[must_use]
    pub fn with_channels(mut self, channels: ChannelMap) -> Self {
        self.channels = channels;
        self
    }
}

/// Predicate sides and mode-change flags, kept only when troubleshooting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDiagnostics {
    pub lhs: Vec<f64>,
    pub rhs: Vec<f64>,
    pub mode_switch: Option<Vec<bool>>,
}

/// Masked fault series of one binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub label: String,
    pub rule: RuleId,
    pub modes: ModeApplicability,
    /// Per-sample fault flag in {0, 1}
    pub flags: Vec<u8>,
    /// Alias of the channel that tripped the stuck-sensor override
    pub stuck_sensor: Option<String>,
    pub masked: bool,
    pub window: Option<TransientWindow>,
    pub excluded_by_mode: usize,
    pub suppressed_by_transient: usize,
    pub diagnostics: Option<RuleDiagnostics>,
}

impl RuleEvaluation {
    pub fn fault_count(&self) -> usize {
        self.flags.iter().filter(|f| **f == 1).count()
    }
}

/// A binding that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub label: String,
    pub rule: RuleId,
    pub error: String,
}

/// Results of a batch of bindings, in binding order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub evaluations: Vec<RuleEvaluation>,
    pub failures: Vec<RuleFailure>,
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone)]
pub struct RuleEngine {
    units: UnitSystem,
    apply_fan_rise: bool,
    stuck_variance_threshold: f64,
    troubleshoot: bool,
    parallel: bool,
}

impl RuleEngine {
    pub fn new(units: UnitSystem) -> Self {
        Self {
            units,
            apply_fan_rise: true,
            stuck_variance_threshold: DEFAULT_STUCK_VARIANCE_THRESHOLD,
            troubleshoot: false,
            parallel: true,
        }
    }

    #[must_use]
    pub fn with_fan_rise(mut self, apply: bool) -> Self {
        self.apply_fan_rise = apply;
        self
    }

    #[must_use]
    pub fn with_stuck_variance_threshold(mut self, threshold: f64) -> Self {
        self.stuck_variance_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_troubleshoot(mut self, troubleshoot: bool) -> Self {
        self.troubleshoot = troubleshoot;
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn units(&self) -> UnitSystem {
        self.units
    }

    /// Evaluate one binding.
    ///
    /// `modes` is the classifier output aligned with `series`; with `None`
    /// the result is returned unmasked. Control-signal inputs are rescaled
    /// to [0,1] when stored as percentages.
    pub fn evaluate(
        &self,
        binding: &RuleBinding,
        series: &TimeSeries,
        modes: Option<&[OperatingMode]>,
    ) -> Result<RuleEvaluation, AnalysisError> {
        self.evaluate_with(binding, series, modes, &BTreeSet::new())
    }

    /// `normalized` lists aliases whose values are already fractions. The
    /// percent test is a dataset-level decision and runs once per column.
    fn evaluate_with(
        &self,
        binding: &RuleBinding,
        series: &TimeSeries,
        modes: Option<&[OperatingMode]>,
        normalized: &BTreeSet<String>,
    ) -> Result<RuleEvaluation, AnalysisError> {
        let def = binding.rule.definition();
        if let Some(modes) = modes {
            if modes.len() != series.len() {
                return Err(AnalysisError::InvalidSeries(format!(
                    "{}: {} mode labels for {} samples",
                    binding.label,
                    modes.len(),
                    series.len()
                )));
            }
        }

        let thresholds = RuleThresholds::resolve(self.units, def.params, self.apply_fan_rise)?;

        let mut columns = Vec::with_capacity(def.channels.len());
        for channel in def.channels {
            let alias = binding.channels.alias(*channel);
            let mut values = series.require(alias, &binding.label)?.to_vec();
            if channel.is_control_signal()
                && !normalized.contains(alias)
                && normalize_01(&mut values)
            {
                warn!(
                    rule = %binding.label,
                    channel = %alias,
                    "Reducing control signal from percent to [0-1]"
                );
            }
            columns.push((*channel, values));
        }

        let n = series.len();
        let mut raw = Vec::with_capacity(n);
        let mut lhs = Vec::new();
        let mut rhs = Vec::new();
        for i in 0..n {
            let mut sample = Sample::default();
            for (channel, values) in &columns {
                sample.set(*channel, values[i]);
            }
            let outcome = (def.predicate)(&sample, &thresholds);
            raw.push(u8::from(outcome.fault));
            if self.troubleshoot {
                lhs.push(outcome.lhs);
                rhs.push(outcome.rhs);
            }
        }

        let stuck_sensor = def.stuck_sensor.and_then(|channel| {
            let alias = binding.channels.alias(channel);
            columns
                .iter()
                .find(|(c, _)| *c == channel)
                .filter(|(_, values)| {
                    is_low_variance(values, self.stuck_variance_threshold, alias)
                })
                .map(|_| alias.to_string())
        });

        let evaluation = if let Some(alias) = stuck_sensor {
            // Stuck sensor: every sample is faulty regardless of mode.
            RuleEvaluation {
                label: binding.label.clone(),
                rule: binding.rule,
                modes: binding.modes.clone(),
                flags: vec![1; n],
                stuck_sensor: Some(alias),
                masked: modes.is_some(),
                window: None,
                excluded_by_mode: 0,
                suppressed_by_transient: 0,
                diagnostics: self.troubleshoot.then(|| RuleDiagnostics {
                    lhs,
                    rhs,
                    mode_switch: None,
                }),
            }
        } else {
            let excl =
                ModeExclusionFilter::apply(&raw, modes, &binding.modes, series.timestamps());
            RuleEvaluation {
                label: binding.label.clone(),
                rule: binding.rule,
                modes: binding.modes.clone(),
                flags: excl.flags,
                stuck_sensor: None,
                masked: excl.masked,
                window: excl.window,
                excluded_by_mode: excl.excluded_by_mode,
                suppressed_by_transient: excl.suppressed_by_transient,
                diagnostics: self.troubleshoot.then(|| RuleDiagnostics {
                    lhs,
                    rhs,
                    mode_switch: excl.mode_switch,
                }),
            }
        };

        info!(
            rule = %evaluation.label,
            faults = evaluation.fault_count(),
            samples = n,
            masked = evaluation.masked,
            "Rule evaluated"
        );
        Ok(evaluation)
    }

    /// Evaluate every binding against a classified series.
    ///
    /// A failing binding is logged and recorded; the others still run.
    pub fn evaluate_all(&self, bindings: &[RuleBinding], classified: &ClassifiedSeries) -> EngineOutput {
        let run = |binding: &RuleBinding| {
            self.evaluate_with(
                binding,
                &classified.series,
                Some(&classified.modes),
                &classified.normalized_aliases,
            )
            .map_err(|e| {
                error!(rule = %binding.label, error = %e, "Rule evaluation failed");
                RuleFailure {
                    label: binding.label.clone(),
                    rule: binding.rule,
                    error: e.to_string(),
                }
            })
        };

        let results: Vec<Result<RuleEvaluation, RuleFailure>> = if self.parallel {
            bindings.par_iter().map(run).collect()
        } else {
            bindings.iter().map(run).collect()
        };

        let mut output = EngineOutput::default();
        for result in results {
            match result {
                Ok(evaluation) => output.evaluations.push(evaluation),
                Err(failure) => output.failures.push(failure),
            }
        }
        output
    }
}
