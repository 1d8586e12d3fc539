//! Pipeline Coordinator - 5-Stage APAR Analysis Sequence
//!
//! ```text
//! STAGE 1: Preprocessing (resample, interpolate, drop incomplete rows)
//! STAGE 2: Precheck battery (data-quality report, never fatal)
//! STAGE 3: Operating-mode classification (fatal on missing channels)
//! STAGE 4: Rule evaluation (per-rule failures isolated)
//! STAGE 5: Summaries (mode shares, fault-time share per rule)
//! ```
//!
//! Every stage takes its input by reference and returns a new value.

use std::time::Instant;

use chrono::Duration;
use tracing::{debug, info, warn};

use super::report::{AnalysisReport, AugmentedSeries};
use crate::classifier::ModeClassifier;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::precheck::Precheck;
use crate::preprocessing::{drop_incomplete, interpolate_series, resample_mean};
use crate::rules::RuleEngine;
use crate::summary::SummaryAggregator;
use crate::types::TimeSeries;

/// Runs the full analysis for one AHU dataset.
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    config: AnalysisConfig,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn classifier(&self) -> ModeClassifier {
        ModeClassifier::new(
            self.config.channels.clone(),
            self.config.classifier.clone(),
            self.config.analysis.unit_system,
        )
    }

    fn engine(&self) -> RuleEngine {
        let a = &self.config.analysis;
        RuleEngine::new(a.unit_system)
            .with_fan_rise(a.apply_fan_temperature_rise)
            .with_stuck_variance_threshold(a.stuck_sensor_variance_threshold)
            .with_troubleshoot(a.troubleshoot)
            .with_parallel(a.parallel)
    }

    /// STAGE 1. `required` are the aliases a row must carry to be kept.
    pub fn preprocess(
        &self,
        series: &TimeSeries,
        required: &[&str],
    ) -> Result<TimeSeries, AnalysisError> {
        let p = &self.config.preprocessing;
        if !p.enabled {
            debug!("Preprocessing disabled");
            return Ok(series.clone());
        }

        let resampled = if p.resample_minutes > 0 {
            resample_mean(series, Duration::minutes(i64::from(p.resample_minutes)))?
        } else {
            series.clone()
        };
        let filled = interpolate_series(&resampled, p.interpolation_limit);
        let prepared = if p.drop_incomplete {
            drop_incomplete(&filled, required)
        } else {
            filled
        };

        info!(
            input_rows = series.len(),
            output_rows = prepared.len(),
            resample_minutes = p.resample_minutes,
            "Preprocessing complete"
        );
        Ok(prepared)
    }

    /// Run all stages and assemble the report.
    ///
    /// Classification errors abort the run. A rule that cannot be evaluated
    /// is listed under `failures` and the remaining rules still run.
    pub fn run(&self, series: &TimeSeries) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();
        let cfg = &self.config;
        info!(
            analysis = %cfg.analysis.name,
            units = %cfg.analysis.unit_system,
            rows = series.len(),
            "Starting APAR analysis"
        );

        let classifier = self.classifier();
        let prepared = self.preprocess(series, &classifier.required_aliases())?;

        let precheck = cfg.analysis.run_precheck.then(|| {
            Precheck::new(
                cfg.channels.clone(),
                cfg.precheck.clone(),
                cfg.analysis.unit_system,
            )
            .run(&prepared)
        });

        let classified = classifier.classify(&prepared)?;
        let bindings = cfg.bindings()?;
        let output = self.engine().evaluate_all(&bindings, &classified);

        let rule_summaries = output
            .evaluations
            .iter()
            .map(|evaluation| {
                SummaryAggregator::rule_summary(
                    evaluation,
                    Some(&classified.modes),
                    cfg.analysis.fault_time_threshold_percent,
                )
            })
            .collect::<Vec<_>>();

        if !output.failures.is_empty() {
            warn!(
                failed = output.failures.len(),
                evaluated = output.evaluations.len(),
                "Some rules could not be evaluated"
            );
        }

        let report = AnalysisReport {
            name: cfg.analysis.name.clone(),
            unit_system: cfg.analysis.unit_system,
            input_rows: series.len(),
            mode_summary: classified.mode_summary(),
            series: AugmentedSeries::new(&classified, &output.evaluations),
            rule_summaries,
            failures: output.failures,
            precheck,
        };

        info!(
            analysis = %report.name,
            rules = report.rule_summaries.len(),
            failing = report.failing_rules().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "APAR analysis complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::rules::RuleId;
    use crate::types::{CheckStatus, OperatingMode};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(n: usize) -> Vec<DateTime<Utc>> {
        (0..n)
            .map(|i| Utc.timestamp_opt(1_700_000_100 + i as i64 * 900, 0).unwrap())
            .collect()
    }

    /// Unit in minimum-OA cooling with a saturated valve and warm supply air.
    /// Control signals in percent.
    fn min_oa_saturated(n: usize) -> TimeSeries {
        TimeSeries::new(ts(n))
            .unwrap()
            .with_channel("sys_ctl", vec![1.0; n])
            .unwrap()
            .with_channel("cooling_sig", vec![100.0; n])
            .unwrap()
            .with_channel("oa_dmpr_sig", vec![10.0; n])
            .unwrap()
            .with_channel("fan_vfd_speed", vec![80.0; n])
            .unwrap()
            .with_channel("oat", (0..n).map(|i| 30.0 + (i % 3) as f64).collect())
            .unwrap()
            .with_channel("sat", (0..n).map(|i| 18.0 + (i % 2) as f64).collect())
            .unwrap()
            .with_channel("satsp", vec![13.0; n])
            .unwrap()
            .with_channel("rat", (0..n).map(|i| 24.0 + (i % 2) as f64 * 0.5).collect())
            .unwrap()
            .with_channel("mat", (0..n).map(|i| 25.0 + (i % 2) as f64 * 0.5).collect())
            .unwrap()
    }

    fn config_with(rules: &[RuleId]) -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.analysis.parallel = false;
        config.rules = rules.iter().map(|id| RuleConfig::new(*id)).collect();
        config
    }

    #[test]
    fn test_run_flags_min_oa_valve_saturation() {
        let pipeline = AnalysisPipeline::new(config_with(&[RuleId::Apar19, RuleId::Apar13]));
        let report = pipeline.run(&min_oa_saturated(16)).unwrap();

        assert!(report
            .series
            .operating_mode
            .iter()
            .all(|m| *m == OperatingMode::MinimumOutdoorAir));
        let apar19 = report.rule("APAR19").unwrap();
        assert_eq!(apar19.status, CheckStatus::Fail);
        assert_eq!(apar19.faulty_samples, 16);

        // APAR13 applies to full outdoor air only: no qualifying samples
        let apar13 = report.rule("APAR13").unwrap();
        assert_eq!(apar13.status, CheckStatus::Warning);
        assert!(!apar13.fault_percentage.is_defined());
        assert_eq!(report.series.rule_flags("APAR13").unwrap(), &[0u8; 16][..]);
    }

    #[test]
    fn test_control_signals_normalized_in_output() {
        let report = AnalysisPipeline::new(config_with(&[RuleId::Apar19]))
            .run(&min_oa_saturated(8))
            .unwrap();
        let cooling = &report.series.channels["cooling_sig"];
        assert!(cooling.iter().all(|v| (*v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_valve_reading_above_full_scale_still_saturated() {
        let mut series = min_oa_saturated(8);
        let mut cooling = vec![100.0; 8];
        cooling[3] = 101.0;
        series.insert_channel("cooling_sig", cooling).unwrap();

        let report = AnalysisPipeline::new(config_with(&[RuleId::Apar20]))
            .run(&series)
            .unwrap();
        assert!((report.series.channels["cooling_sig"][3] - 1.01).abs() < 1e-12);
        let apar20 = report.rule("APAR20").unwrap();
        assert_eq!(apar20.samples_in_mode, 8);
        assert_eq!(apar20.faulty_samples, 8);
        assert_eq!(apar20.status, CheckStatus::Fail);
    }

    #[test]
    fn test_missing_rule_channel_is_isolated() {
        // APAR03 reads the heating valve, which this unit does not report
        let report = AnalysisPipeline::new(config_with(&[RuleId::Apar03, RuleId::Apar19]))
            .run(&min_oa_saturated(8))
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].rule, RuleId::Apar03);
        assert_eq!(report.rule_summaries.len(), 1);
    }

    #[test]
    fn test_missing_classifier_channel_is_fatal() {
        let series = TimeSeries::new(ts(4))
            .unwrap()
            .with_channel("sat", vec![12.0; 4])
            .unwrap();
        let err = AnalysisPipeline::new(AnalysisConfig::default())
            .run(&series)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingChannel { .. }));
    }

    #[test]
    fn test_troubleshoot_keeps_diagnostics() {
        let mut config = config_with(&[RuleId::Apar19]);
        config.analysis.troubleshoot = true;
        let report = AnalysisPipeline::new(config).run(&min_oa_saturated(8)).unwrap();
        let column = &report.series.rules[0];
        let diagnostics = column.diagnostics.as_ref().unwrap();
        assert_eq!(diagnostics.lhs.len(), 8);
        assert!(diagnostics.mode_switch.is_some());
    }

    #[test]
    fn test_precheck_optional() {
        let mut config = config_with(&[RuleId::Apar19]);
        let with = AnalysisPipeline::new(config.clone())
            .run(&min_oa_saturated(8))
            .unwrap();
        assert!(with.precheck.is_some());

        config.analysis.run_precheck = false;
        let without = AnalysisPipeline::new(config).run(&min_oa_saturated(8)).unwrap();
        assert!(without.precheck.is_none());
    }

    #[test]
    fn test_preprocess_drops_rows_missing_classifier_inputs() {
        let mut series = min_oa_saturated(12);
        // Trailing gap longer than the interpolation limit
        let mut oat = vec![f64::NAN; 12];
        oat[0] = 30.0;
        series.insert_channel("oat", oat).unwrap();

        let mut config = config_with(&[RuleId::Apar19]);
        config.preprocessing.interpolation_limit = 2;
        let pipeline = AnalysisPipeline::new(config);
        let prepared = pipeline.preprocess(&series, &["oat"]).unwrap();
        // Row 0 is valid, rows 1-2 are filled from it; the rest stay missing
        assert_eq!(prepared.len(), 3);
    }
}
