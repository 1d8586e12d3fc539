//! Point-wise APAR rule predicates
//!
//! Every predicate is a pure function of one sample and the resolved
//! thresholds. Missing readings are `NaN`, and every comparison involving
//! `NaN` is false, so a predicate never fires on incomplete input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::types::{get_apar_params, AparParam, Channel, UnitSystem};

// ============================================================================
// Inputs and Outputs
// ============================================================================

/// Readings of every semantic channel at one timestamp.
///
/// Channels a rule does not bind stay `NaN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    values: [f64; Channel::COUNT],
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            values: [f64::NAN; Channel::COUNT],
        }
    }
}

impl Sample {
    pub fn get(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: f64) {
        self.values[channel.index()] = value;
    }

    /// Builder-style setter, mostly for tests.
    pub fn with(mut self, channel: Channel, value: f64) -> Self {
        self.set(channel, value);
        self
    }
}

/// APAR thresholds resolved for one rule run.
///
/// Parameters the rule does not declare are left `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    pub e_t: f64,
    pub e_f: f64,
    pub e_hc: f64,
    pub e_cc: f64,
    pub e_d: f64,
    pub dt_sf: f64,
    pub dt_rf: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            e_t: f64::NAN,
            e_f: f64::NAN,
            e_hc: f64::NAN,
            e_cc: f64::NAN,
            e_d: f64::NAN,
            dt_sf: f64::NAN,
            dt_rf: f64::NAN,
        }
    }
}

impl RuleThresholds {
    /// Build from a resolved parameter map.
    ///
    /// With `apply_fan_rise = false` the fan temperature rises are zero.
    pub fn from_params(params: &BTreeMap<AparParam, f64>, apply_fan_rise: bool) -> Self {
        let get = |p: AparParam| params.get(&p).copied().unwrap_or(f64::NAN);
        let fan = |p: AparParam| {
            if apply_fan_rise {
                get(p)
            } else {
                0.0
            }
        };
        Self {
            e_t: get(AparParam::TemperatureErrorBand),
            e_f: get(AparParam::AirflowErrorBand),
            e_hc: get(AparParam::HeatingValveErrorBand),
            e_cc: get(AparParam::CoolingValveErrorBand),
            e_d: get(AparParam::DamperErrorBand),
            dt_sf: fan(AparParam::SupplyFanTemperatureRise),
            dt_rf: fan(AparParam::ReturnFanTemperatureRise),
        }
    }

    /// Resolve the declared parameters of a rule from the APAR table.
    pub fn resolve(
        units: UnitSystem,
        params: &[AparParam],
        apply_fan_rise: bool,
    ) -> Result<Self, AnalysisError> {
        let keys: Vec<&str> = params.iter().map(AparParam::key).collect();
        let resolved = get_apar_params(units, &keys)?;
        Ok(Self::from_params(&resolved, apply_fan_rise))
    }
}

/// Predicate result with both sides of the comparison kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleOutcome {
    pub fault: bool,
    pub lhs: f64,
    pub rhs: f64,
}

pub type Predicate = fn(&Sample, &RuleThresholds) -> RuleOutcome;

// ============================================================================
// Shapes
// ============================================================================

fn above(lhs: f64, rhs: f64) -> RuleOutcome {
    RuleOutcome {
        fault: lhs > rhs,
        lhs,
        rhs,
    }
}

fn below(lhs: f64, rhs: f64) -> RuleOutcome {
    RuleOutcome {
        fault: lhs < rhs,
        lhs,
        rhs,
    }
}

/// Valve command within `band` of fully open
fn saturated(signal: f64, band: f64) -> bool {
    (signal - 1.0).abs() <= band
}

/// Saturated valve with a one-sided temperature error at least `e_t`.
fn saturated_with_error(signal: f64, band: f64, error: f64, e_t: f64) -> RuleOutcome {
    RuleOutcome {
        fault: saturated(signal, band) && error >= e_t,
        lhs: error,
        rhs: e_t,
    }
}

fn saturated_only(signal: f64, band: f64) -> RuleOutcome {
    RuleOutcome {
        fault: saturated(signal, band),
        lhs: (signal - 1.0).abs(),
        rhs: band,
    }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

// ============================================================================
// Heating
// ============================================================================

/// Supply air colder than mixed air plus fan rise
pub fn apar01(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    below(s.get(Channel::Sat), s.get(Channel::Mat) + t.dt_sf - t.e_t)
}

/// Heating valve saturated and supply air still below setpoint
pub fn apar03(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    saturated_with_error(
        s.get(Channel::HeatingSig),
        t.e_hc,
        s.get(Channel::Satsp) - s.get(Channel::Sat),
        t.e_t,
    )
}

/// Heating valve saturated
pub fn apar04(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    saturated_only(s.get(Channel::HeatingSig), t.e_hc)
}

// ============================================================================
// Economizer
// ============================================================================

/// Outdoor air too warm for free cooling
pub fn apar05(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above(s.get(Channel::Oat), s.get(Channel::Satsp) - t.dt_sf + t.e_t)
}

/// Supply air warmer than return air less return fan rise
pub fn apar06(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above(s.get(Channel::Sat), s.get(Channel::Rat) - t.dt_rf + t.e_t)
}

/// Supply air not mixed air plus fan rise
pub fn apar07(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above(
        (s.get(Channel::Sat) - s.get(Channel::Mat) - t.dt_sf).abs(),
        t.e_t,
    )
}

// ============================================================================
// Full Outdoor Air
// ============================================================================

/// Outdoor air cold enough that mechanical cooling should be off
pub fn apar08(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    below(s.get(Channel::Oat), s.get(Channel::Satsp) - t.dt_sf - t.e_t)
}

/// Mixed air differs from outdoor air with the damper fully open
pub fn apar10(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above((s.get(Channel::Oat) - s.get(Channel::Mat)).abs(), t.e_t)
}

/// Supply air warmer than mixed air plus fan rise while cooling
pub fn apar11(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above(s.get(Channel::Sat), s.get(Channel::Mat) + t.dt_sf + t.e_t)
}

/// Supply air warmer than return air less return fan rise while cooling
pub fn apar12(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above(s.get(Channel::Sat), s.get(Channel::Rat) - t.dt_rf + t.e_t)
}

/// Cooling valve saturated and supply air still above setpoint
pub fn apar13(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    saturated_with_error(
        s.get(Channel::CoolingSig),
        t.e_cc,
        s.get(Channel::Sat) - s.get(Channel::Satsp),
        t.e_t,
    )
}

/// Cooling valve saturated
pub fn apar14(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    saturated_only(s.get(Channel::CoolingSig), t.e_cc)
}

// ============================================================================
// Minimum Outdoor Air
// ============================================================================

pub fn apar16(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above(s.get(Channel::Sat), s.get(Channel::Mat) + t.dt_sf + t.e_t)
}

pub fn apar17(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above(s.get(Channel::Sat), s.get(Channel::Rat) - t.dt_rf + t.e_t)
}

pub fn apar19(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    saturated_with_error(
        s.get(Channel::CoolingSig),
        t.e_cc,
        s.get(Channel::Sat) - s.get(Channel::Satsp),
        t.e_t,
    )
}

pub fn apar20(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    saturated_only(s.get(Channel::CoolingSig), t.e_cc)
}

// ============================================================================
// Any Mode
// ============================================================================

/// Damper modulating while the cooling valve is open
pub fn apar24(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    let damper = s.get(Channel::OaDmprSig);
    let cooling = s.get(Channel::CoolingSig);
    RuleOutcome {
        fault: damper > t.e_d && damper < 1.0 - t.e_d && cooling > t.e_cc,
        lhs: cooling,
        rhs: t.e_cc,
    }
}

/// Persistent supply air setpoint error
pub fn apar25(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above(
        (s.get(Channel::Sat) - s.get(Channel::Satsp)).abs(),
        t.e_t,
    )
}

/// Mixed air colder than both return and outdoor air
pub fn apar26(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    below(
        s.get(Channel::Mat),
        nan_min(s.get(Channel::Rat), s.get(Channel::Oat)) - t.e_t,
    )
}

/// Mixed air warmer than both return and outdoor air
pub fn apar27(s: &Sample, t: &RuleThresholds) -> RuleOutcome {
    above(
        s.get(Channel::Mat),
        nan_max(s.get(Channel::Rat), s.get(Channel::Oat)) + t.e_t,
    )
}
