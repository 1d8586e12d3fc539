//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::AnalysisConfig;
use crate::types::UnitSystem;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `AnalysisConfig`.
///
/// Entries of the `[[rules]]` array share the `rules.` prefix.
/// Any new field added to `AnalysisConfig` must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [analysis]
        "analysis",
        "analysis.name",
        "analysis.unit_system",
        "analysis.troubleshoot",
        "analysis.parallel",
        "analysis.apply_fan_temperature_rise",
        "analysis.fault_time_threshold_percent",
        "analysis.stuck_sensor_variance_threshold",
        "analysis.run_precheck",
        // [channels]
        "channels",
        "channels.sat",
        "channels.satsp",
        "channels.rat",
        "channels.oat",
        "channels.mat",
        "channels.cooling_sig",
        "channels.heating_sig",
        "channels.oa_dmpr_sig",
        "channels.fan_vfd_speed",
        "channels.sys_ctl",
        // [classifier]
        "classifier",
        "classifier.fan_threshold",
        "classifier.valve_threshold",
        "classifier.damper_threshold",
        "classifier.min_damper_position",
        "classifier.economizer_oat_min",
        "classifier.economizer_oat_max",
        "classifier.on_off_source",
        // [preprocessing]
        "preprocessing",
        "preprocessing.enabled",
        "preprocessing.interpolation_limit",
        "preprocessing.resample_minutes",
        "preprocessing.drop_incomplete",
        // [precheck]
        "precheck",
        "precheck.valves_cutoff",
        "precheck.damper_cutoff",
        "precheck.temperature_sensor_variance_threshold",
        "precheck.control_sensor_variance_threshold",
        "precheck.damper_min_oa_threshold",
        "precheck.diff_damper_oaf_threshold",
        "precheck.freeze_oat_limit",
        // [[rules]]
        "rules",
        "rules.id",
        "rules.label",
        "rules.modes",
        "rules.channels",
        "rules.channels.sat",
        "rules.channels.satsp",
        "rules.channels.rat",
        "rules.channels.oat",
        "rules.channels.mat",
        "rules.channels.cooling_sig",
        "rules.channels.heating_sig",
        "rules.channels.oa_dmpr_sig",
        "rules.channels.fan_vfd_speed",
        "rules.channels.sys_ctl",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`. Tables inside arrays are walked under the
/// array's own path, so `[[rules]] id = "APAR01"` yields `rules.id`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        for key in walk_toml_keys(item, &path) {
                            if !keys.contains(&key) {
                                keys.push(key);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    keys
}

/// Dotted paths of every float that is NaN or infinite.
pub fn non_finite_fields(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut fields = Vec::new();
    match value {
        toml::Value::Float(f) if !f.is_finite() => fields.push(prefix.to_string()),
        toml::Value::Table(table) => {
            for (k, v) in table {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                fields.extend(non_finite_fields(v, &path));
            }
        }
        toml::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                fields.extend(non_finite_fields(item, &format!("{prefix}[{i}]")));
            }
        }
        _ => {}
    }
    fields
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist <= 3 {
            match best {
                Some((best_key, best_dist))
                    if dist > best_dist || (dist == best_dist && k >= best_key) => {}
                _ => best = Some((k, dist)),
            }
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new(); // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed `AnalysisConfig`.
///
/// Returns (errors, warnings). Errors are impossible values that must
/// prevent a run; warnings are suspicious but not fatal.
pub fn validate_physical_ranges(config: &AnalysisConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let units = config.analysis.unit_system;

    let pc = &config.precheck;
    for (name, value) in [
        (
            "precheck.temperature_sensor_variance_threshold",
            pc.temperature_sensor_variance_threshold,
        ),
        (
            "precheck.control_sensor_variance_threshold",
            pc.control_sensor_variance_threshold,
        ),
        ("precheck.diff_damper_oaf_threshold", pc.diff_damper_oaf_threshold),
    ] {
        if value < 0.0 {
            errors.push(format!("{name} = {value:.4} cannot be negative"));
        }
    }

    // Outdoor temperatures outside -50..130 °F are not plausible AHU conditions
    let (plausible_lo, plausible_hi) = (units.from_fahrenheit(-50.0), units.from_fahrenheit(130.0));
    let unit = units.temperature_unit();
    let bounds = [
        ("classifier.economizer_oat_min", config.classifier.economizer_oat_min),
        ("classifier.economizer_oat_max", config.classifier.economizer_oat_max),
        ("precheck.freeze_oat_limit", pc.freeze_oat_limit),
    ];
    for (name, value) in bounds {
        if let Some(v) = value {
            if v < plausible_lo || v > plausible_hi {
                warnings.push(ValidationWarning {
                    field: name.to_string(),
                    message: format!(
                        "{name} = {v:.1} is outside the plausible outdoor range \
                         ({plausible_lo:.0} to {plausible_hi:.0} {unit}); check analysis.unit_system"
                    ),
                    suggestion: None,
                });
            }
        }
    }

    // A fan deadband above 20% hides genuine low-speed operation
    if config.classifier.fan_threshold > 0.2 {
        warnings.push(ValidationWarning {
            field: "classifier.fan_threshold".to_string(),
            message: format!(
                "fan_threshold = {:.2} is unusually high (typical 0.01-0.2)",
                config.classifier.fan_threshold
            ),
            suggestion: None,
        });
    }

    if config.analysis.stuck_sensor_variance_threshold > 1.0 {
        warnings.push(ValidationWarning {
            field: "analysis.stuck_sensor_variance_threshold".to_string(),
            message: format!(
                "stuck_sensor_variance_threshold = {:.2} would flag most healthy sensors as stuck",
                config.analysis.stuck_sensor_variance_threshold
            ),
            suggestion: None,
        });
    }

    if units == UnitSystem::Imperial {
        if let Some(limit) = pc.freeze_oat_limit {
            if limit < 0.0 {
                warnings.push(ValidationWarning {
                    field: "precheck.freeze_oat_limit".to_string(),
                    message: format!(
                        "freeze_oat_limit = {limit:.1} °F looks like a Celsius value"
                    ),
                    suggestion: None,
                });
            }
        }
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
