//! Summary Aggregator
//!
//! Reduces classified and masked series to human-facing shares:
//! mode distribution, per-rule fault-time percentage and status.

use std::collections::BTreeMap;

use tracing::warn;

use crate::rules::RuleEvaluation;
use crate::types::{Aggregate, CheckStatus, ModeShare, OperatingMode, RuleSummary};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct SummaryAggregator;

impl SummaryAggregator {
    /// Percentage of samples per observed mode, rounded to 2 decimals,
    /// sorted by count descending (ties in mode order).
    pub fn mode_shares(modes: &[OperatingMode]) -> Vec<ModeShare> {
        let mut counts: BTreeMap<OperatingMode, usize> = BTreeMap::new();
        for mode in modes {
            *counts.entry(*mode).or_default() += 1;
        }
        let total = modes.len();

        let mut shares: Vec<ModeShare> = counts
            .into_iter()
            .map(|(mode, samples)| ModeShare {
                mode,
                samples,
                percentage: round2(samples as f64 / total as f64 * 100.0),
            })
            .collect();
        shares.sort_by(|a, b| b.samples.cmp(&a.samples).then(a.mode.cmp(&b.mode)));
        shares
    }

    /// Reduce one rule evaluation to its fault-time share and status.
    ///
    /// Fault time is measured over samples in the rule's applicable modes.
    /// Without a mode column every sample qualifies and the result can at
    /// best be a warning. A stuck sensor bypasses mode gating: every sample
    /// qualifies and the rule fails.
    pub fn rule_summary(
        evaluation: &RuleEvaluation,
        modes: Option<&[OperatingMode]>,
        fault_threshold_percent: f64,
    ) -> RuleSummary {
        let stuck = evaluation.stuck_sensor.is_some();
        let (samples_in_mode, faulty_samples) = match modes {
            Some(modes) if !stuck => evaluation
                .flags
                .iter()
                .zip(modes)
                .filter(|(_, mode)| evaluation.modes.contains(**mode))
                .fold((0usize, 0usize), |(n, f), (flag, _)| {
                    (n + 1, f + usize::from(*flag == 1))
                }),
            _ => (
                evaluation.flags.len(),
                evaluation.flags.iter().filter(|f| **f == 1).count(),
            ),
        };

        let fault_percentage = Aggregate::percentage(faulty_samples, samples_in_mode);
        let mut notes = Vec::new();

        let status = match fault_percentage {
            Aggregate::Value(_) if stuck => CheckStatus::Fail,
            Aggregate::Undefined => {
                notes.push("no samples in applicable modes".to_string());
                CheckStatus::Warning
            }
            Aggregate::Value(_) if !evaluation.masked => {
                notes.push("not mode-masked".to_string());
                CheckStatus::Warning
            }
            Aggregate::Value(pct) if pct > fault_threshold_percent => CheckStatus::Fail,
            Aggregate::Value(_) => CheckStatus::Pass,
        };

        if let Some(channel) = &evaluation.stuck_sensor {
            notes.push(format!("low variance on '{channel}', all samples flagged"));
        }

        if status == CheckStatus::Warning {
            warn!(
                rule = %evaluation.label,
                fault_time = %fault_percentage,
                "Rule result inconclusive"
            );
        }

        RuleSummary {
            name: evaluation.label.clone(),
            applicable_modes: evaluation.modes.clone(),
            samples_in_mode,
            faulty_samples,
            fault_percentage,
            status,
            note: if notes.is_empty() {
                None
            } else {
                Some(notes.join("; "))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleId;
    use crate::types::ModeApplicability;

    fn evaluation(flags: Vec<u8>, modes: ModeApplicability, masked: bool) -> RuleEvaluation {
        RuleEvaluation {
            label: "APAR13".to_string(),
            rule: RuleId::Apar13,
            modes,
            flags,
            stuck_sensor: None,
            masked,
            window: None,
            excluded_by_mode: 0,
            suppressed_by_transient: 0,
            diagnostics: None,
        }
    }

    #[test]
    fn test_mode_shares_rounded_and_sorted() {
        use crate::types::OperatingMode::*;
        let shares = SummaryAggregator::mode_shares(&[Off, Economizer, Economizer]);
        assert_eq!(shares[0].mode, Economizer);
        assert_eq!(shares[0].percentage, 66.67);
        assert_eq!(shares[1].percentage, 33.33);
    }

    #[test]
    fn test_fault_share_over_applicable_modes() {
        let modes = [
            OperatingMode::FullOutdoorAir,
            OperatingMode::FullOutdoorAir,
            OperatingMode::Economizer,
            OperatingMode::Economizer,
        ];
        let eval = evaluation(
            vec![1, 0, 0, 0],
            ModeApplicability::Only(vec![OperatingMode::FullOutdoorAir]),
            true,
        );
        let summary = SummaryAggregator::rule_summary(&eval, Some(&modes), 0.0);
        assert_eq!(summary.samples_in_mode, 2);
        assert_eq!(summary.faulty_samples, 1);
        assert_eq!(summary.fault_percentage, Aggregate::Value(50.0));
        assert_eq!(summary.status, CheckStatus::Fail);
    }

    #[test]
    fn test_no_qualifying_samples_is_undefined_warning() {
        let modes = [OperatingMode::Off, OperatingMode::Off];
        let eval = evaluation(vec![0, 0], ModeApplicability::All, true);
        let summary = SummaryAggregator::rule_summary(&eval, Some(&modes), 0.0);
        assert_eq!(summary.fault_percentage, Aggregate::Undefined);
        assert_eq!(summary.status, CheckStatus::Warning);
        assert!(summary.note.is_some());
    }

    #[test]
    fn test_unmasked_result_is_warning() {
        let eval = evaluation(vec![0, 0], ModeApplicability::All, false);
        let summary = SummaryAggregator::rule_summary(&eval, None, 0.0);
        assert_eq!(summary.fault_percentage, Aggregate::Value(0.0));
        assert_eq!(summary.status, CheckStatus::Warning);
    }

    #[test]
    fn test_stuck_sensor_fails_even_when_unit_off() {
        let modes = [OperatingMode::Off; 4];
        let mut eval = evaluation(vec![1; 4], ModeApplicability::All, true);
        eval.stuck_sensor = Some("sat".to_string());
        let summary = SummaryAggregator::rule_summary(&eval, Some(&modes), 0.0);
        assert_eq!(summary.samples_in_mode, 4);
        assert_eq!(summary.faulty_samples, 4);
        assert_eq!(summary.fault_percentage, Aggregate::Value(100.0));
        assert_eq!(summary.status, CheckStatus::Fail);
        assert!(summary.note.unwrap().contains("low variance on 'sat'"));
    }

    #[test]
    fn test_threshold_allows_small_fault_share() {
        let modes = [OperatingMode::Economizer; 10];
        let mut flags = vec![0u8; 10];
        flags[0] = 1;
        let eval = evaluation(flags, ModeApplicability::All, true);
        let summary = SummaryAggregator::rule_summary(&eval, Some(&modes), 15.0);
        assert_eq!(summary.status, CheckStatus::Pass);
    }
}
