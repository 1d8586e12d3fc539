//! Config Validation Tests
//!
//! Typo detection and range validation of the analysis config, exercised
//! independently from the rest of the pipeline.

use std::io::Write as _;

use apar_fdd::config::validation::{
    known_config_keys, suggest_correction, validate_physical_ranges, validate_unknown_keys,
};
use apar_fdd::config::{AnalysisConfig, ConfigError, RuleConfig};
use apar_fdd::rules::RuleId;
use apar_fdd::types::{OperatingMode, UnitSystem};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_classifier_threshold_warns_with_suggestion() {
    let toml_str = r#"
[classifier]
damper_treshold = 0.05
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("damper_treshold"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("classifier.damper_threshold")
    );
}

#[test]
fn typo_in_channel_alias_warns() {
    let toml_str = r#"
[channels]
sta = "SA_TEMP"
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].suggestion.is_some());
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[analysis]
name = "AHU-1"
unit_system = "si"
troubleshoot = true
fault_time_threshold_percent = 5.0

[channels]
oat = "OA_T"
sys_ctl = "SF_S"

[classifier]
fan_threshold = 0.02
economizer_oat_min = 1.0
economizer_oat_max = 15.5
on_off_source = "fan_speed"

[precheck]
freeze_oat_limit = 4.0

[[rules]]
id = "APAR13"
modes = ["FULL_OUTDOOR_AIR", "MINIMUM_OUTDOOR_AIR"]
channels = { sat = "SA_T2" }
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "Expected 0 warnings, got: {warnings:?}");

    let config = AnalysisConfig::from_toml_str(toml_str).unwrap();
    let bindings = config.bindings().unwrap();
    assert_eq!(bindings[0].channels.sat, "SA_T2");
    assert_eq!(bindings[0].channels.oat, "OA_T");
    assert!(bindings[0].modes.contains(OperatingMode::MinimumOutdoorAir));
}

#[test]
fn garbage_key_gets_no_suggestion() {
    let known = known_config_keys();
    assert!(suggest_correction("zzzz.qqqq.xxxx", &known).is_none());
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn defaults_are_valid() {
    let config = AnalysisConfig::default();
    assert!(config.validate().is_ok());
    let (errors, warnings) = validate_physical_ranges(&config);
    assert!(errors.is_empty());
    assert!(warnings.is_empty());
}

#[test]
fn inverted_economizer_band_rejected() {
    let toml_str = r#"
[classifier]
economizer_oat_min = 15.0
economizer_oat_max = 2.0
"#;
    match AnalysisConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("economizer_oat_min")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn non_finite_threshold_rejected() {
    let toml_str = r#"
[analysis]
stuck_sensor_variance_threshold = nan
"#;
    match AnalysisConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors
                .iter()
                .any(|e| e.contains("analysis.stuck_sensor_variance_threshold")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn unknown_mode_label_rejected() {
    let toml_str = r#"
[[rules]]
id = "APAR20"
modes = ["COOLING"]
"#;
    assert!(matches!(
        AnalysisConfig::from_toml_str(toml_str),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn unknown_channel_override_rejected() {
    let mut config = AnalysisConfig::default();
    let mut rule = RuleConfig::new(RuleId::Apar07);
    rule.channels.insert("supply_temp".to_string(), "SAT".to_string());
    config.rules = vec![rule];
    assert!(config.validate().is_err());
}

#[test]
fn malformed_toml_is_parse_error() {
    let file = write_temp("[analysis\nname = 1");
    match AnalysisConfig::load_from_file(file.path()) {
        Err(ConfigError::Parse(path, _)) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {other:?}"),
    }
}

// ============================================================================
// File Round Trip
// ============================================================================

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn save_and_reload_preserves_config() {
    let mut config = AnalysisConfig::default();
    config.analysis.name = "RTU-4".to_string();
    config.analysis.unit_system = UnitSystem::Imperial;
    config.classifier.min_damper_position = 0.2;
    config.preprocessing.resample_minutes = 0;
    let mut rule = RuleConfig::new(RuleId::Apar19);
    rule.label = Some("APAR19_RTU4".to_string());
    config.rules = vec![rule];

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apar_config.toml");
    config.save_to_file(&path).unwrap();
    let reloaded = AnalysisConfig::load_from_file(&path).unwrap();
    assert_eq!(reloaded, config);
}
