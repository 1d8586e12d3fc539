//! Analysis Configuration - every tunable of an APAR run as TOML values
//!
//! Each section implements `Default` with the reference APAR values, so an
//! empty or missing config file reproduces the standard analysis.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::defaults::{
    CONFIG_ENV_VAR, DEFAULT_ANALYSIS_NAME, DEFAULT_FAULT_TIME_THRESHOLD_PERCENT,
    DEFAULT_INTERPOLATION_LIMIT, DEFAULT_RESAMPLE_MINUTES, LOCAL_CONFIG_FILE,
};
use crate::classifier::ClassifierThresholds;
use crate::error::AnalysisError;
use crate::precheck::PrecheckThresholds;
use crate::rules::{RuleBinding, RuleId, DEFAULT_STUCK_VARIANCE_THRESHOLD};
use crate::types::{Channel, ChannelMap, ModeApplicability, UnitSystem};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of one analysis run.
///
/// Load with `AnalysisConfig::load()` which searches:
/// 1. `$APAR_CONFIG` env var
/// 2. `./apar_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Column alias per semantic channel
    #[serde(default)]
    pub channels: ChannelMap,

    /// Operating-mode classifier deadbands
    #[serde(default)]
    pub classifier: ClassifierThresholds,

    #[serde(default)]
    pub preprocessing: PreprocessingConfig,

    /// Data-quality precheck thresholds
    #[serde(default)]
    pub precheck: PrecheckThresholds,

    /// Rules to run. Empty means every registered rule with its defaults.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl AnalysisConfig {
    /// Load configuration using the standard search order:
    /// 1. `$APAR_CONFIG` environment variable
    /// 2. `./apar_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), analysis = %config.analysis.name, "Loaded analysis config from {CONFIG_ENV_VAR}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(analysis = %config.analysis.name, "Loaded analysis config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are reported as warnings; range violations are errors.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Analysis config saved");
        Ok(())
    }

    /// Rule bindings to run, in configured order.
    ///
    /// With no `[[rules]]` entries every registered rule runs with its
    /// default label and modes. Channel aliases start from `[channels]`.
    pub fn bindings(&self) -> Result<Vec<RuleBinding>, AnalysisError> {
        if self.rules.is_empty() {
            return Ok(RuleId::ALL
                .iter()
                .map(|id| RuleBinding::new(*id).with_channels(self.channels.clone()))
                .collect());
        }
        self.rules
            .iter()
            .map(|rule| rule.to_binding(&self.channels))
            .collect()
    }

    /// Keep only the bindings whose rule id is in `ids`.
    pub fn restrict_rules(&mut self, ids: &[RuleId]) -> Result<(), AnalysisError> {
        let bindings = self.bindings()?;
        self.rules = bindings
            .into_iter()
            .filter(|b| ids.contains(&b.rule))
            .map(|b| RuleConfig::from_binding(&b, &self.channels))
            .collect();
        if self.rules.is_empty() {
            return Err(AnalysisError::InvalidArgument(
                "rule selection matched no configured rule".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Control-signal deadbands are fractions in [0, 0.5)
    /// - Economizer band must be ordered when both bounds are set
    /// - Every `[[rules]]` entry names a known rule, modes and channels
    /// - Rule labels are unique
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let c = &self.classifier;
        Self::check_fraction(c.fan_threshold, "classifier.fan_threshold", 0.5, &mut errors);
        Self::check_fraction(c.valve_threshold, "classifier.valve_threshold", 0.5, &mut errors);
        Self::check_fraction(c.damper_threshold, "classifier.damper_threshold", 0.5, &mut errors);
        if !(c.min_damper_position > 0.0 && c.min_damper_position < 1.0) {
            errors.push(format!(
                "classifier.min_damper_position ({}) must be in (0, 1)",
                c.min_damper_position
            ));
        }
        if let (Some(lo), Some(hi)) = (c.economizer_oat_min, c.economizer_oat_max) {
            if lo >= hi {
                errors.push(format!(
                    "classifier.economizer_oat_min ({lo:.2}) must be < economizer_oat_max ({hi:.2})"
                ));
            }
        }

        let a = &self.analysis;
        if !(0.0..=100.0).contains(&a.fault_time_threshold_percent) {
            errors.push(format!(
                "analysis.fault_time_threshold_percent ({}) must be in [0, 100]",
                a.fault_time_threshold_percent
            ));
        }
        if a.stuck_sensor_variance_threshold < 0.0 {
            errors.push("analysis.stuck_sensor_variance_threshold must be >= 0".to_string());
        }

        if self.preprocessing.resample_minutes > 24 * 60 {
            errors.push(format!(
                "preprocessing.resample_minutes ({}) must be at most one day",
                self.preprocessing.resample_minutes
            ));
        }

        let pc = &self.precheck;
        Self::check_fraction(pc.valves_cutoff, "precheck.valves_cutoff", 1.0, &mut errors);
        Self::check_fraction(pc.damper_cutoff, "precheck.damper_cutoff", 1.0, &mut errors);
        Self::check_fraction(
            pc.damper_min_oa_threshold,
            "precheck.damper_min_oa_threshold",
            1.0,
            &mut errors,
        );

        let mut labels = HashSet::new();
        for (i, rule) in self.rules.iter().enumerate() {
            match rule.to_binding(&self.channels) {
                Ok(binding) => {
                    if !labels.insert(binding.label.clone()) {
                        errors.push(format!("rules[{i}]: duplicate label '{}'", binding.label));
                    }
                }
                Err(e) => errors.push(format!("rules[{i}]: {e}")),
            }
        }

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        // Reject NaN/Inf in any value (sweep all f64 fields via serialization)
        if let Ok(value) = toml::Value::try_from(self) {
            for field in super::validation::non_finite_fields(&value, "") {
                errors.push(format!("{field} must be a finite number"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_fraction(value: f64, name: &str, upper: f64, errors: &mut Vec<String>) {
        if !value.is_finite() || value < 0.0 || value >= upper {
            errors.push(format!("{name} ({value}) must be in [0, {upper})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Analysis Settings
// ============================================================================

/// Run-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSettings {
    /// Name of the unit or dataset, for logs and reports
    #[serde(default = "default_name")]
    pub name: String,

    /// Unit system of the temperature channels
    #[serde(default)]
    pub unit_system: UnitSystem,

    /// Keep predicate sides and mode-change flags in the output
    #[serde(default)]
    pub troubleshoot: bool,

    /// Evaluate rules on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Use the table fan temperature rise; `false` treats it as 0
    #[serde(default = "default_true")]
    pub apply_fan_temperature_rise: bool,

    /// Fault-time share (%) above which a rule fails
    #[serde(default = "default_fault_time_threshold")]
    pub fault_time_threshold_percent: f64,

    /// Variance at or below which a sensor is considered stuck
    #[serde(default = "default_stuck_variance")]
    pub stuck_sensor_variance_threshold: f64,

    /// Run the data-quality precheck battery before fault detection
    #[serde(default = "default_true")]
    pub run_precheck: bool,
}

fn default_name() -> String { DEFAULT_ANALYSIS_NAME.to_string() }
fn default_true() -> bool { true }
fn default_fault_time_threshold() -> f64 { DEFAULT_FAULT_TIME_THRESHOLD_PERCENT }
fn default_stuck_variance() -> f64 { DEFAULT_STUCK_VARIANCE_THRESHOLD }

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            unit_system: UnitSystem::default(),
            troubleshoot: false,
            parallel: default_true(),
            apply_fan_temperature_rise: default_true(),
            fault_time_threshold_percent: default_fault_time_threshold(),
            stuck_sensor_variance_threshold: default_stuck_variance(),
            run_precheck: default_true(),
        }
    }
}

// ============================================================================
// Preprocessing Config
// ============================================================================

/// Cleaning applied to the raw series before classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreprocessingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Longest gap (samples) filled by linear interpolation
    #[serde(default = "default_interpolation_limit")]
    pub interpolation_limit: usize,

    /// Fixed resampling window; 0 keeps the native cadence
    #[serde(default = "default_resample_minutes")]
    pub resample_minutes: u32,

    /// Drop rows where a classifier input is still missing
    #[serde(default = "default_true")]
    pub drop_incomplete: bool,
}

fn default_interpolation_limit() -> usize { DEFAULT_INTERPOLATION_LIMIT }
fn default_resample_minutes() -> u32 { DEFAULT_RESAMPLE_MINUTES }

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interpolation_limit: default_interpolation_limit(),
            resample_minutes: default_resample_minutes(),
            drop_incomplete: default_true(),
        }
    }
}

// ============================================================================
// Rule Config
// ============================================================================

/// One `[[rules]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleConfig {
    /// Rule id, e.g. `APAR13`
    pub id: String,

    /// Result column name (defaults to the rule id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Applicable modes, e.g. `["FULL_OUTDOOR_AIR"]` or `["ALL"]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modes: Option<Vec<String>>,

    /// Semantic channel -> column alias overrides for this rule
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channels: BTreeMap<String, String>,
}

impl RuleConfig {
    pub fn new(id: RuleId) -> Self {
        Self {
            id: id.label().to_string(),
            label: None,
            modes: None,
            channels: BTreeMap::new(),
        }
    }

    /// Resolve into a binding on top of the run-wide channel map.
    pub fn to_binding(&self, base: &ChannelMap) -> Result<RuleBinding, AnalysisError> {
        let rule = RuleId::parse(&self.id)
            .ok_or_else(|| AnalysisError::InvalidArgument(format!("unknown rule '{}'", self.id)))?;

        let mut channels = base.clone();
        for (name, alias) in &self.channels {
            let channel = Channel::parse(name).ok_or_else(|| {
                AnalysisError::InvalidArgument(format!("{}: unknown channel '{name}'", self.id))
            })?;
            channels.set(channel, alias.clone());
        }

        let mut binding = RuleBinding::new(rule).with_channels(channels);
        if let Some(label) = &self.label {
            binding = binding.with_label(label.clone());
        }
        if let Some(modes) = &self.modes {
            binding = binding.with_modes(ModeApplicability::from_labels(modes)?);
        }
        Ok(binding)
    }

    /// Inverse of `to_binding`, keeping only values that differ from defaults.
    pub fn from_binding(binding: &RuleBinding, base: &ChannelMap) -> Self {
        let def = binding.rule.definition();
        let channels = Channel::ALL
            .iter()
            .filter(|c| binding.channels.alias(**c) != base.alias(**c))
            .map(|c| (c.name().to_string(), binding.channels.alias(*c).to_string()))
            .collect();
        Self {
            id: def.label.to_string(),
            label: (binding.label != def.label).then(|| binding.label.clone()),
            modes: (binding.modes != def.default_modes.to_applicability())
                .then(|| binding.modes.labels()),
            channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperatingMode;

    #[test]
    fn test_defaults_validate() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_rules_runs_every_rule() {
        let bindings = AnalysisConfig::default().bindings().unwrap();
        assert_eq!(bindings.len(), RuleId::ALL.len());
        assert_eq!(bindings[0].label, "APAR01");
    }

    #[test]
    fn test_rule_entry_overrides() {
        let toml_str = r#"
[channels]
sat = "SA_TEMP"

[[rules]]
id = "APAR19"
label = "APAR19_AHU2"
modes = ["MINIMUM_OUTDOOR_AIR", "ECONOMIZER"]
channels = { cooling_sig = "CHW_VLV" }
"#;
        let config = AnalysisConfig::from_toml_str(toml_str).unwrap();
        let bindings = config.bindings().unwrap();
        assert_eq!(bindings.len(), 1);
        let b = &bindings[0];
        assert_eq!(b.label, "APAR19_AHU2");
        assert_eq!(b.channels.sat, "SA_TEMP");
        assert_eq!(b.channels.cooling_sig, "CHW_VLV");
        assert!(b.modes.contains(OperatingMode::Economizer));
    }

    #[test]
    fn test_unknown_rule_rejected() {
        let toml_str = r#"
[[rules]]
id = "APAR99"
"#;
        let err = AnalysisConfig::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("APAR99"));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let mut config = AnalysisConfig::default();
        config.rules = vec![RuleConfig::new(RuleId::Apar13), RuleConfig::new(RuleId::Apar13)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_mode_list_rejected() {
        let mut config = AnalysisConfig::default();
        let mut rule = RuleConfig::new(RuleId::Apar13);
        rule.modes = Some(vec![]);
        config.rules = vec![rule];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut config = AnalysisConfig::default();
        config.classifier.valve_threshold = 0.7;
        config.analysis.fault_time_threshold_percent = 150.0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_restrict_rules() {
        let mut config = AnalysisConfig::default();
        config.restrict_rules(&[RuleId::Apar13, RuleId::Apar19]).unwrap();
        let labels: Vec<String> = config.bindings().unwrap().into_iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["APAR13", "APAR19"]);
        assert!(config.restrict_rules(&[RuleId::Apar01]).is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_rules() {
        let mut config = AnalysisConfig::default();
        let mut rule = RuleConfig::new(RuleId::Apar25);
        rule.modes = Some(vec!["ALL".to_string()]);
        config.rules = vec![rule];
        let text = config.to_toml().unwrap();
        let back = AnalysisConfig::from_toml_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
