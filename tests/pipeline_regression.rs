//! Pipeline Regression Tests
//!
//! One synthetic AHU day at 15-minute resolution with four regimes:
//!
//! ```text
//! 00:00-06:00  OFF                  (sys_ctl = 0)
//! 06:00-12:00  ECONOMIZER           (valve closed, damper 50 %, mild OAT)
//! 12:00-20:00  MINIMUM_OUTDOOR_AIR  (valve saturated, SAT 6 °C above setpoint)
//! 20:00-24:00  FULL_OUTDOOR_AIR     (valve closed, damper 100 %)
//! ```
//!
//! Control signals are stored in percent, as most BAS exports do.

use apar_fdd::config::{AnalysisConfig, RuleConfig};
use apar_fdd::pipeline::{AnalysisPipeline, AnalysisReport};
use apar_fdd::rules::RuleId;
use apar_fdd::types::{CheckStatus, OperatingMode, TimeSeries};
use chrono::{DateTime, TimeZone, Utc};

const N: usize = 96;

fn regime(i: usize) -> OperatingMode {
    match i {
        0..=23 => OperatingMode::Off,
        24..=47 => OperatingMode::Economizer,
        48..=79 => OperatingMode::MinimumOutdoorAir,
        _ => OperatingMode::FullOutdoorAir,
    }
}

fn ahu_day() -> TimeSeries {
    let timestamps: Vec<DateTime<Utc>> = (0..N)
        .map(|i| Utc.timestamp_opt(1_700_000_100 + i as i64 * 900, 0).unwrap())
        .collect();
    let col = |f: &dyn Fn(usize, OperatingMode) -> f64| -> Vec<f64> {
        (0..N).map(|i| f(i, regime(i))).collect()
    };
    let wiggle = |i: usize, amp: f64| (i % 2) as f64 * amp;

    TimeSeries::new(timestamps)
        .unwrap()
        .with_channel("sys_ctl", col(&|_, m| f64::from(u8::from(m.is_on()))))
        .unwrap()
        .with_channel(
            "fan_vfd_speed",
            col(&|i, m| if m.is_on() { 70.0 + (i % 3) as f64 } else { 0.0 }),
        )
        .unwrap()
        .with_channel(
            "cooling_sig",
            col(&|_, m| if m == OperatingMode::MinimumOutdoorAir { 100.0 } else { 0.0 }),
        )
        .unwrap()
        .with_channel("heating_sig", vec![0.0; N])
        .unwrap()
        .with_channel(
            "oa_dmpr_sig",
            col(&|_, m| match m {
                OperatingMode::Economizer => 50.0,
                OperatingMode::MinimumOutdoorAir => 10.0,
                OperatingMode::FullOutdoorAir => 100.0,
                _ => 0.0,
            }),
        )
        .unwrap()
        .with_channel(
            "oat",
            col(&|i, m| match m {
                OperatingMode::Economizer => 10.0 + (i % 4) as f64 * 0.5,
                OperatingMode::MinimumOutdoorAir => 32.0 + (i % 3) as f64,
                OperatingMode::FullOutdoorAir => 22.0,
                _ => 8.0,
            }),
        )
        .unwrap()
        .with_channel(
            "sat",
            col(&|i, m| {
                if m == OperatingMode::MinimumOutdoorAir {
                    19.0 + wiggle(i, 0.5)
                } else {
                    13.0 + wiggle(i, 0.5)
                }
            }),
        )
        .unwrap()
        .with_channel("satsp", vec![13.0; N])
        .unwrap()
        .with_channel("rat", col(&|i, _| 23.0 + wiggle(i, 0.3)))
        .unwrap()
        .with_channel("mat", col(&|i, _| 20.0 + wiggle(i, 0.3)))
        .unwrap()
}

fn run(config: AnalysisConfig) -> AnalysisReport {
    AnalysisPipeline::new(config).run(&ahu_day()).unwrap()
}

#[test]
fn modes_follow_the_daily_schedule() {
    let report = run(AnalysisConfig::default());
    let expected: Vec<OperatingMode> = (0..N).map(regime).collect();
    assert_eq!(report.series.operating_mode, expected);
}

#[test]
fn mode_summary_sorted_by_share() {
    let report = run(AnalysisConfig::default());
    let shares: Vec<(OperatingMode, usize, f64)> = report
        .mode_summary
        .iter()
        .map(|s| (s.mode, s.samples, s.percentage))
        .collect();
    assert_eq!(
        shares,
        vec![
            (OperatingMode::MinimumOutdoorAir, 32, 33.33),
            (OperatingMode::Off, 24, 25.0),
            (OperatingMode::Economizer, 24, 25.0),
            (OperatingMode::FullOutdoorAir, 16, 16.67),
        ]
    );
}

#[test]
fn saturated_valve_fails_min_oa_rule() {
    let report = run(AnalysisConfig::default());
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.rule_summaries.len(), RuleId::ALL.len());

    let apar19 = report.rule("APAR19").unwrap();
    assert_eq!(apar19.samples_in_mode, 32);
    // First 4 samples after the ECONOMIZER -> MINIMUM_OUTDOOR_AIR switch are suppressed
    assert_eq!(apar19.faulty_samples, 28);
    assert_eq!(apar19.fault_percentage.value("APAR19").unwrap(), 87.5);
    assert_eq!(apar19.status, CheckStatus::Fail);

    let flags = report.series.rule_flags("APAR19").unwrap();
    assert!(flags[48..52].iter().all(|f| *f == 0));
    assert!(flags[52..80].iter().all(|f| *f == 1));

    // Valve closed in full outdoor air
    let apar13 = report.rule("APAR13").unwrap();
    assert_eq!(apar13.samples_in_mode, 16);
    assert_eq!(apar13.status, CheckStatus::Pass);

    assert_eq!(report.overall(), CheckStatus::Fail);
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let mut sequential = AnalysisConfig::default();
    sequential.analysis.parallel = false;
    let mut parallel = AnalysisConfig::default();
    parallel.analysis.parallel = true;
    assert_eq!(run(sequential), run(parallel));
}

#[test]
fn rule_order_follows_configuration() {
    let mut config = AnalysisConfig::default();
    config.rules = [RuleId::Apar25, RuleId::Apar13, RuleId::Apar19]
        .iter()
        .map(|id| RuleConfig::new(*id))
        .collect();
    let report = run(config);
    let labels: Vec<&str> = report.series.rules.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["APAR25", "APAR13", "APAR19"]);
}

#[test]
fn fault_threshold_relaxes_status() {
    let mut config = AnalysisConfig::default();
    config.analysis.fault_time_threshold_percent = 90.0;
    let report = run(config);
    assert_eq!(report.rule("APAR19").unwrap().status, CheckStatus::Pass);
}

#[test]
fn report_serializes_to_json() {
    let report = run(AnalysisConfig::default());
    let summary = serde_json::to_value(report.summary()).unwrap();
    assert_eq!(summary["overall"], "fail");
    assert_eq!(summary["analyzed_rows"], N);
    assert!(summary["rules"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["name"] == "APAR19" && r["status"] == "fail"));

    let full = serde_json::to_value(&report).unwrap();
    assert_eq!(full["series"]["operating_mode"][0], "OFF");
    assert_eq!(full["series"]["operating_mode"][50], "MINIMUM_OUTDOOR_AIR");
}
