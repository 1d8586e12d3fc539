//! Analysis report: the classified table with one fault column per rule,
//! plus the summaries derived from it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::ClassifiedSeries;
use crate::precheck::PrecheckReport;
use crate::rules::{RuleDiagnostics, RuleEvaluation, RuleFailure};
use crate::types::{CheckStatus, ModeShare, OperatingMode, RuleSummary, UnitSystem};

/// Fault flags of one binding, aligned with the series index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleColumn {
    pub label: String,
    pub flags: Vec<u8>,
    /// Predicate sides and mode-change flags (troubleshoot runs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<RuleDiagnostics>,
}

/// Input channels (control signals in [0,1]) extended with the operating
/// mode and every rule's masked fault column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedSeries {
    pub timestamps: Vec<DateTime<Utc>>,
    pub channels: BTreeMap<String, Vec<f64>>,
    pub operating_mode: Vec<OperatingMode>,
    pub rules: Vec<RuleColumn>,
}

impl AugmentedSeries {
    pub fn new(classified: &ClassifiedSeries, evaluations: &[RuleEvaluation]) -> Self {
        Self {
            timestamps: classified.series.timestamps().to_vec(),
            channels: classified.series.channels().clone(),
            operating_mode: classified.modes.clone(),
            rules: evaluations
                .iter()
                .map(|e| RuleColumn {
                    label: e.label.clone(),
                    flags: e.flags.clone(),
                    diagnostics: e.diagnostics.clone(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn rule_flags(&self, label: &str) -> Option<&[u8]> {
        self.rules
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.flags.as_slice())
    }
}

/// Everything one analysis run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub name: String,
    pub unit_system: UnitSystem,
    /// Rows in the raw input, before preprocessing
    pub input_rows: usize,
    pub series: AugmentedSeries,
    pub mode_summary: Vec<ModeShare>,
    pub rule_summaries: Vec<RuleSummary>,
    pub failures: Vec<RuleFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precheck: Option<PrecheckReport>,
}

impl AnalysisReport {
    pub fn rule(&self, label: &str) -> Option<&RuleSummary> {
        self.rule_summaries.iter().find(|r| r.name == label)
    }

    pub fn failing_rules(&self) -> impl Iterator<Item = &RuleSummary> {
        self.rule_summaries
            .iter()
            .filter(|r| r.status == CheckStatus::Fail)
    }

    /// Worst status over rules and failed evaluations. A rule that could
    /// not run counts as a warning.
    pub fn overall(&self) -> CheckStatus {
        let worst_rule = self
            .rule_summaries
            .iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(CheckStatus::Pass);
        if self.failures.is_empty() {
            worst_rule
        } else {
            worst_rule.max(CheckStatus::Warning)
        }
    }

    /// The report without the per-sample table.
    pub fn summary(&self) -> ReportSummary<'_> {
        ReportSummary {
            name: &self.name,
            unit_system: self.unit_system,
            input_rows: self.input_rows,
            analyzed_rows: self.series.len(),
            overall: self.overall(),
            mode_summary: &self.mode_summary,
            rules: &self.rule_summaries,
            failures: &self.failures,
            precheck: self.precheck.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportSummary<'a> {
    pub name: &'a str,
    pub unit_system: UnitSystem,
    pub input_rows: usize,
    pub analyzed_rows: usize,
    pub overall: CheckStatus,
    pub mode_summary: &'a [ModeShare],
    pub rules: &'a [RuleSummary],
    pub failures: &'a [RuleFailure],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precheck: Option<&'a PrecheckReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleId;
    use crate::types::{Aggregate, ModeApplicability};

    fn summary(name: &str, status: CheckStatus) -> RuleSummary {
        RuleSummary {
            name: name.to_string(),
            applicable_modes: ModeApplicability::All,
            samples_in_mode: 4,
            faulty_samples: 0,
            fault_percentage: Aggregate::Value(0.0),
            status,
            note: None,
        }
    }

    fn report(rules: Vec<RuleSummary>, failures: Vec<RuleFailure>) -> AnalysisReport {
        AnalysisReport {
            name: "AHU".to_string(),
            unit_system: UnitSystem::Si,
            input_rows: 0,
            series: AugmentedSeries {
                timestamps: Vec::new(),
                channels: BTreeMap::new(),
                operating_mode: Vec::new(),
                rules: Vec::new(),
            },
            mode_summary: Vec::new(),
            rule_summaries: rules,
            failures,
            precheck: None,
        }
    }

    #[test]
    fn test_overall_is_worst_status() {
        let r = report(
            vec![
                summary("APAR13", CheckStatus::Pass),
                summary("APAR19", CheckStatus::Fail),
            ],
            Vec::new(),
        );
        assert_eq!(r.overall(), CheckStatus::Fail);
        assert_eq!(r.failing_rules().count(), 1);
    }

    #[test]
    fn test_rule_failure_degrades_to_warning() {
        let r = report(
            vec![summary("APAR13", CheckStatus::Pass)],
            vec![RuleFailure {
                label: "APAR03".to_string(),
                rule: RuleId::Apar03,
                error: "Missing channel 'heating_sig' required by APAR03".to_string(),
            }],
        );
        assert_eq!(r.overall(), CheckStatus::Warning);
    }

    #[test]
    fn test_summary_serializes_without_table() {
        let r = report(vec![summary("APAR25", CheckStatus::Pass)], Vec::new());
        let json = serde_json::to_value(r.summary()).unwrap();
        assert_eq!(json["rules"][0]["name"], "APAR25");
        assert!(json.get("series").is_none());
        assert!(json.get("precheck").is_none());
    }
}
