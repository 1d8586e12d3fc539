//! Data-quality precheck battery
//!
//! Runs before fault detection to tell the operator whether the dataset
//! can support the rules at all. Each check is three-valued:
//! - **Pass**: condition verified
//! - **Warning**: inconclusive, or a soft anomaly worth inspecting
//! - **Fail**: the dataset or the unit violates a hard requirement
//!
//! Checks never abort the analysis; they only report.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::preprocessing::{finite_mean, finite_median, is_low_variance, normalize_channels};
use crate::types::{Channel, ChannelMap, CheckResult, CheckStatus, TimeSeries, UnitSystem};

/// Freeze-protection outdoor temperature limit (°F)
pub const FREEZE_OAT_LIMIT_F: f64 = 40.0;

/// Damper readings at or above this are not candidates for the minimum position.
pub const MIN_OA_TRIM: f64 = 0.4;

/// A damper at most this factor above the minimum position counts as closed down.
const FREEZE_DAMPER_MARGIN: f64 = 1.2;

const REQUIRED_CHANNELS: [Channel; 7] = [
    Channel::Satsp,
    Channel::Sat,
    Channel::Oat,
    Channel::Rat,
    Channel::CoolingSig,
    Channel::HeatingSig,
    Channel::OaDmprSig,
];

const TEMPERATURE_SENSORS: [Channel; 4] = [Channel::Sat, Channel::Oat, Channel::Rat, Channel::Mat];
const CONTROL_SENSORS: [Channel; 3] = [Channel::CoolingSig, Channel::HeatingSig, Channel::OaDmprSig];

// ============================================================================
// Thresholds
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrecheckThresholds {
    /// Valve command above which a coil counts as active
    #[serde(default = "default_valves_cutoff")]
    pub valves_cutoff: f64,
    /// Damper command above which the damper counts as open
    #[serde(default)]
    pub damper_cutoff: f64,
    #[serde(default = "default_variance_threshold")]
    pub temperature_sensor_variance_threshold: f64,
    #[serde(default = "default_variance_threshold")]
    pub control_sensor_variance_threshold: f64,
    /// Largest acceptable minimum damper position
    #[serde(default = "default_damper_min_oa_threshold")]
    pub damper_min_oa_threshold: f64,
    /// Largest acceptable mean |OAF - damper| in free-cooling conditions
    #[serde(default = "default_diff_damper_oaf_threshold")]
    pub diff_damper_oaf_threshold: f64,
    /// Freeze limit in the analysis unit system (default 40 °F converted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze_oat_limit: Option<f64>,
}

fn default_valves_cutoff() -> f64 {
    0.01
}
fn default_variance_threshold() -> f64 {
    0.01
}
fn default_damper_min_oa_threshold() -> f64 {
    0.3
}
fn default_diff_damper_oaf_threshold() -> f64 {
    0.3
}

impl Default for PrecheckThresholds {
    fn default() -> Self {
        Self {
            valves_cutoff: default_valves_cutoff(),
            damper_cutoff: 0.0,
            temperature_sensor_variance_threshold: default_variance_threshold(),
            control_sensor_variance_threshold: default_variance_threshold(),
            damper_min_oa_threshold: default_damper_min_oa_threshold(),
            diff_damper_oaf_threshold: default_diff_damper_oaf_threshold(),
            freeze_oat_limit: None,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrecheckReport {
    pub checks: Vec<CheckResult>,
    /// Minimum damper position estimated by `check_min_oa`
    pub damper_min: Option<f64>,
}

impl PrecheckReport {
    /// One status symbol per check, in run order.
    pub fn symbol_strip(&self) -> String {
        self.checks.iter().map(|c| c.status.symbol()).collect()
    }

    /// Worst status over all checks (`Pass` when empty).
    pub fn overall(&self) -> CheckStatus {
        self.checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(CheckStatus::Pass)
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }
}

fn log_result(result: &CheckResult) {
    match result.status {
        CheckStatus::Pass => info!(check = %result.name, "{} {} {}", result.status, result.status.symbol(), result.message),
        CheckStatus::Warning => warn!(check = %result.name, "{} {} {}", result.status, result.status.symbol(), result.message),
        CheckStatus::Fail => error!(check = %result.name, "{} {} {}", result.status, result.status.symbol(), result.message),
    }
}

// ============================================================================
// Checks
// ============================================================================

/// Column holds at least one finite non-zero reading.
fn is_informative(values: &[f64]) -> bool {
    values.iter().any(|v| v.is_finite() && *v != 0.0)
}

#[derive(Debug, Clone)]
pub struct Precheck {
    channels: ChannelMap,
    thresholds: PrecheckThresholds,
    units: UnitSystem,
}

impl Precheck {
    pub fn new(channels: ChannelMap, thresholds: PrecheckThresholds, units: UnitSystem) -> Self {
        Self {
            channels,
            thresholds,
            units,
        }
    }

    fn column<'a>(&self, series: &'a TimeSeries, channel: Channel) -> Option<&'a [f64]> {
        series.get(self.channels.alias(channel))
    }

    fn informative<'a>(&self, series: &'a TimeSeries, channel: Channel) -> Option<&'a [f64]> {
        self.column(series, channel).filter(|v| is_informative(v))
    }

    fn freeze_limit(&self) -> f64 {
        self.thresholds
            .freeze_oat_limit
            .unwrap_or_else(|| self.units.from_fahrenheit(FREEZE_OAT_LIMIT_F))
    }

    /// Run every check in order. Control signals are rescaled to [0,1] first.
    pub fn run(&self, series: &TimeSeries) -> PrecheckReport {
        let series = normalize_channels(series, &self.channels.control_aliases());

        let mut checks = vec![self.check_variables(&series), self.check_sensor(&series)];
        let (min_oa, damper_min) = self.check_min_oa(&series);
        checks.push(min_oa);
        checks.push(self.check_freeze_protection(&series, damper_min));
        checks.push(self.check_damper(&series));
        checks.push(self.check_hc(&series));
        checks.push(self.check_valves(&series));

        for check in &checks {
            log_result(check);
        }
        let report = PrecheckReport { checks, damper_min };
        info!(result = %report.symbol_strip(), "Precheck complete");
        report
    }

    /// Required channels present and informative. Only heating missing
    /// is a warning; anything else missing fails.
    pub fn check_variables(&self, series: &TimeSeries) -> CheckResult {
        let missing: Vec<&str> = REQUIRED_CHANNELS
            .iter()
            .filter(|c| self.informative(series, **c).is_none())
            .map(|c| c.name())
            .collect();

        if missing.is_empty() {
            CheckResult::new("check_variables", CheckStatus::Pass, "")
        } else if missing == [Channel::HeatingSig.name()] {
            CheckResult::new(
                "check_variables",
                CheckStatus::Warning,
                format!("(Measure {missing:?} if possible)"),
            )
        } else {
            CheckResult::new(
                "check_variables",
                CheckStatus::Fail,
                format!("(Missing variables {missing:?})"),
            )
        }
    }

    /// Temperature and control sensors with near-zero variance.
    pub fn check_sensor(&self, series: &TimeSeries) -> CheckResult {
        let t = &self.thresholds;
        let groups = [
            (&TEMPERATURE_SENSORS[..], t.temperature_sensor_variance_threshold),
            (&CONTROL_SENSORS[..], t.control_sensor_variance_threshold),
        ];

        let mut stuck = Vec::new();
        for (channels, threshold) in groups {
            for channel in channels {
                let Some(values) = self.informative(series, *channel) else {
                    continue;
                };
                if is_low_variance(values, threshold, self.channels.alias(*channel)) {
                    stuck.push(channel.name());
                }
            }
        }

        if stuck.is_empty() {
            CheckResult::new("check_sensor", CheckStatus::Pass, "")
        } else {
            CheckResult::new(
                "check_sensor",
                CheckStatus::Warning,
                format!("(Possible sensor freeze/stuck {stuck:?})"),
            )
        }
    }

    /// Estimate the minimum damper position as the median of open readings
    /// below `MIN_OA_TRIM`, and fail when it exceeds the configured limit.
    pub fn check_min_oa(&self, series: &TimeSeries) -> (CheckResult, Option<f64>) {
        let Some(damper) = self.column(series, Channel::OaDmprSig) else {
            return (
                CheckResult::new("check_min_oa", CheckStatus::Warning, "(Not enough data)"),
                None,
            );
        };
        let candidates: Vec<f64> = damper
            .iter()
            .copied()
            .filter(|d| *d > self.thresholds.damper_cutoff && *d < MIN_OA_TRIM)
            .collect();

        let Some(damper_min) = finite_median(&candidates) else {
            return (
                CheckResult::new("check_min_oa", CheckStatus::Warning, "(Not enough data)"),
                None,
            );
        };

        let result = if damper_min > self.thresholds.damper_min_oa_threshold {
            CheckResult::new(
                "check_min_oa",
                CheckStatus::Fail,
                format!("(damper_min = {damper_min:.3}) - Verify the minimum ventilation"),
            )
        } else {
            CheckResult::new(
                "check_min_oa",
                CheckStatus::Pass,
                format!("(damper_min = {damper_min:.3})"),
            )
        };
        (result, Some(damper_min))
    }

    /// Below the freeze limit the open damper should sit at the minimum position.
    pub fn check_freeze_protection(
        &self,
        series: &TimeSeries,
        damper_min: Option<f64>,
    ) -> CheckResult {
        let name = "check_freeze_protection";
        let (Some(damper), Some(oat), Some(damper_min)) = (
            self.column(series, Channel::OaDmprSig),
            self.column(series, Channel::Oat),
            damper_min,
        ) else {
            return CheckResult::new(name, CheckStatus::Warning, "(Not enough info)");
        };

        let limit = self.freeze_limit();
        let cold_open: Vec<f64> = damper
            .iter()
            .zip(oat)
            .filter(|(d, o)| **o < limit && **d > 0.0)
            .map(|(d, _)| *d)
            .collect();

        match finite_median(&cold_open) {
            None => CheckResult::new(
                name,
                CheckStatus::Warning,
                format!("(No open-damper samples below {limit:.1} {})", self.units.temperature_unit()),
            ),
            Some(frozen) if frozen < damper_min * FREEZE_DAMPER_MARGIN => CheckResult::new(
                name,
                CheckStatus::Pass,
                format!("Damper at minimum or lower ({frozen:.3} <= {damper_min:.3})"),
            ),
            Some(frozen) => CheckResult::new(
                name,
                CheckStatus::Warning,
                format!("Freeze protection not activated ({frozen:.3} > {damper_min:.3})"),
            ),
        }
    }

    /// Outdoor-air fraction vs damper command in free-cooling conditions.
    pub fn check_damper(&self, series: &TimeSeries) -> CheckResult {
        let name = "check_damper";
        let t = &self.thresholds;
        let (Some(cooling), Some(damper), Some(oat), Some(rat), Some(mat)) = (
            self.column(series, Channel::CoolingSig),
            self.column(series, Channel::OaDmprSig),
            self.column(series, Channel::Oat),
            self.column(series, Channel::Rat),
            self.column(series, Channel::Mat),
        ) else {
            return CheckResult::new(name, CheckStatus::Warning, "(Not enough info)");
        };
        let heating = self.column(series, Channel::HeatingSig);

        let deviations: Vec<f64> = (0..series.len())
            .filter(|&i| {
                let heating_off = heating.map_or(true, |h| h[i] < t.valves_cutoff);
                cooling[i] < t.valves_cutoff
                    && heating_off
                    && damper[i] > t.damper_cutoff
                    && oat[i] < rat[i]
            })
            .map(|i| {
                let oaf = (mat[i] - rat[i]) / (oat[i] - rat[i]);
                (oaf - damper[i]).abs()
            })
            .collect();

        match finite_mean(&deviations) {
            None => CheckResult::new(name, CheckStatus::Warning, "(Not enough info)"),
            Some(diff) if diff > t.diff_damper_oaf_threshold => CheckResult::new(
                name,
                CheckStatus::Warning,
                format!(
                    "(oaf_oa_dmpr_diff = {diff:.3}>{}) OAF deviates too much from damper position signal",
                    t.diff_damper_oaf_threshold
                ),
            ),
            Some(diff) => CheckResult::new(
                name,
                CheckStatus::Pass,
                format!("(oaf_oa_dmpr_diff = {diff:.3}<{})", t.diff_damper_oaf_threshold),
            ),
        }
    }

    /// Heating and cooling valves open at the same time.
    pub fn check_hc(&self, series: &TimeSeries) -> CheckResult {
        let name = "check_hc";
        let cut = self.thresholds.valves_cutoff;
        let (Some(cooling), Some(heating)) = (
            self.column(series, Channel::CoolingSig),
            self.column(series, Channel::HeatingSig),
        ) else {
            return CheckResult::new(name, CheckStatus::Warning, "(Not enough info)");
        };

        let simultaneous = cooling
            .iter()
            .zip(heating)
            .filter(|(c, h)| **c > cut && **h > cut)
            .count();
        if simultaneous > 0 {
            CheckResult::new(
                name,
                CheckStatus::Warning,
                format!("(Possible contemporary heating and cooling, {simultaneous} samples)"),
            )
        } else {
            CheckResult::new(name, CheckStatus::Pass, "")
        }
    }

    /// Cooling coil should not modulate when OAT is below the SAT setpoint.
    pub fn check_valves(&self, series: &TimeSeries) -> CheckResult {
        let name = "check_valves";
        let cut = self.thresholds.valves_cutoff;
        let (Some(cooling), Some(oat), Some(satsp)) = (
            self.column(series, Channel::CoolingSig),
            self.column(series, Channel::Oat),
            self.column(series, Channel::Satsp),
        ) else {
            return CheckResult::new(name, CheckStatus::Warning, "(Not enough info)");
        };
        let heating = self.column(series, Channel::HeatingSig);

        let any_valve_active = cooling.iter().any(|c| *c > cut)
            || heating.is_some_and(|h| h.iter().any(|v| *v > cut));
        let cooling_eco: Vec<f64> = cooling
            .iter()
            .zip(oat.iter().zip(satsp))
            .filter(|(_, (o, sp))| **o < **sp)
            .map(|(c, _)| *c)
            .collect();

        match finite_median(&cooling_eco) {
            Some(median) if any_valve_active => {
                if median > cut {
                    CheckResult::new(
                        name,
                        CheckStatus::Warning,
                        format!("(cooling_coil_median_eco = {median:.3}) cooling coil is modulating in eco mode"),
                    )
                } else {
                    CheckResult::new(name, CheckStatus::Pass, "")
                }
            }
            _ => CheckResult::new(name, CheckStatus::Warning, "(Not enough info)"),
        }
    }
}
