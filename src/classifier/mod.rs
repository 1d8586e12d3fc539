//! Operating-Mode Classifier
//!
//! Assigns one `OperatingMode` per sample from the raw control signals
//! using a fixed-precedence cascade (first match wins):
//!
//! 1. `OFF` when the on/off source reports the unit switched off
//! 2. `HEATING` (declared, not yet detected; such samples stay `UNKNOWN`)
//! 3. `ECONOMIZER`: cooling valve closed, damper modulating, OAT in band
//! 4. `FULL_OUTDOOR_AIR`: cooling valve closed, damper fully open
//! 5. `MINIMUM_OUTDOOR_AIR`: cooling valve open, damper at minimum position
//! 6. `UNKNOWN` otherwise
//!
//! Modes are computed once per dataset and never mutated afterwards.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::preprocessing::normalize_channels;
use crate::summary::SummaryAggregator;
use crate::types::{Channel, ChannelMap, ModeShare, OperatingMode, TimeSeries, UnitSystem};

/// Lower economizer OAT bound (°F)
pub const ECONOMIZER_OAT_MIN_F: f64 = 33.8;
/// Upper economizer OAT bound (°F)
pub const ECONOMIZER_OAT_MAX_F: f64 = 60.0;

// ============================================================================
// Thresholds
// ============================================================================

/// Which signal decides whether the unit is running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnOffSource {
    /// `sys_ctl == 0` means off
    #[default]
    SystemStatus,
    /// `fan_vfd_speed <= fan_threshold` means off
    FanSpeed,
}

impl OnOffSource {
    fn channel(self) -> Channel {
        match self {
            Self::SystemStatus => Channel::SysCtl,
            Self::FanSpeed => Channel::FanVfdSpeed,
        }
    }
}

/// Classifier deadbands and economizer band.
///
/// Control-signal thresholds are fractions of full scale. The economizer
/// OAT bounds are expressed in the analysis unit system; when unset they
/// default to 33.8–60 °F converted to that system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierThresholds {
    #[serde(default = "default_fan_threshold")]
    pub fan_threshold: f64,
    #[serde(default = "default_valve_threshold")]
    pub valve_threshold: f64,
    #[serde(default = "default_damper_threshold")]
    pub damper_threshold: f64,
    /// Damper position of the minimum outdoor-air regime
    #[serde(default = "default_min_damper_position")]
    pub min_damper_position: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economizer_oat_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economizer_oat_max: Option<f64>,
    #[serde(default)]
    pub on_off_source: OnOffSource,
}

fn default_fan_threshold() -> f64 {
    0.01
}
fn default_valve_threshold() -> f64 {
    0.05
}
fn default_damper_threshold() -> f64 {
    0.05
}
fn default_min_damper_position() -> f64 {
    0.1
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            fan_threshold: default_fan_threshold(),
            valve_threshold: default_valve_threshold(),
            damper_threshold: default_damper_threshold(),
            min_damper_position: default_min_damper_position(),
            economizer_oat_min: None,
            economizer_oat_max: None,
            on_off_source: OnOffSource::default(),
        }
    }
}

impl ClassifierThresholds {
    /// Economizer OAT band `(min, max)` in `units`.
    pub fn economizer_band(&self, units: UnitSystem) -> (f64, f64) {
        (
            self.economizer_oat_min
                .unwrap_or_else(|| units.from_fahrenheit(ECONOMIZER_OAT_MIN_F)),
            self.economizer_oat_max
                .unwrap_or_else(|| units.from_fahrenheit(ECONOMIZER_OAT_MAX_F)),
        )
    }
}

// ============================================================================
// Classified Series
// ============================================================================

/// Normalized series plus one mode label per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSeries {
    pub series: TimeSeries,
    pub modes: Vec<OperatingMode>,
    /// Control-signal aliases already reduced to [0,1]; never rescaled again
    #[serde(default)]
    pub normalized_aliases: BTreeSet<String>,
}

impl ClassifiedSeries {
    /// Share of samples per observed mode, sorted by count descending.
    pub fn mode_summary(&self) -> Vec<ModeShare> {
        SummaryAggregator::mode_shares(&self.modes)
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Per-sample inputs of the cascade, already normalized.
#[derive(Debug, Clone, Copy)]
struct ControlReading {
    on_signal: f64,
    cooling: f64,
    damper: f64,
    oat: f64,
}

#[derive(Debug, Clone)]
pub struct ModeClassifier {
    channels: ChannelMap,
    thresholds: ClassifierThresholds,
    units: UnitSystem,
}

impl ModeClassifier {
    pub fn new(channels: ChannelMap, thresholds: ClassifierThresholds, units: UnitSystem) -> Self {
        Self {
            channels,
            thresholds,
            units,
        }
    }

    pub fn thresholds(&self) -> &ClassifierThresholds {
        &self.thresholds
    }

    /// Channels the cascade reads at every sample.
    pub fn required_channels(&self) -> [Channel; 4] {
        [
            self.thresholds.on_off_source.channel(),
            Channel::CoolingSig,
            Channel::OaDmprSig,
            Channel::Oat,
        ]
    }

    /// Column aliases of `required_channels`.
    pub fn required_aliases(&self) -> Vec<&str> {
        self.required_channels()
            .iter()
            .map(|c| self.channels.alias(*c))
            .collect()
    }

    /// Classify every sample of `series`.
    ///
    /// Control-signal columns present in the table are rescaled to [0,1]
    /// first. A missing required channel is fatal.
    pub fn classify(&self, series: &TimeSeries) -> Result<ClassifiedSeries, AnalysisError> {
        for channel in self.required_channels() {
            series.require(self.channels.alias(channel), "operating-mode classifier")?;
        }

        let control_aliases = self.channels.control_aliases();
        let normalized = normalize_channels(series, &control_aliases);
        let normalized_aliases = control_aliases
            .into_iter()
            .filter(|alias| series.get(alias).is_some())
            .map(str::to_string)
            .collect();
        let col = |c: Channel| {
            normalized.require(self.channels.alias(c), "operating-mode classifier")
        };
        let on_signal = col(self.thresholds.on_off_source.channel())?;
        let cooling = col(Channel::CoolingSig)?;
        let damper = col(Channel::OaDmprSig)?;
        let oat = col(Channel::Oat)?;

        self.warn_heating_unimplemented();

        let (oat_min, oat_max) = self.thresholds.economizer_band(self.units);
        debug!(
            oat_min = oat_min,
            oat_max = oat_max,
            units = %self.units,
            "Economizer OAT band"
        );

        let modes: Vec<OperatingMode> = (0..normalized.len())
            .map(|i| {
                self.classify_sample(
                    ControlReading {
                        on_signal: on_signal[i],
                        cooling: cooling[i],
                        damper: damper[i],
                        oat: oat[i],
                    },
                    oat_min,
                    oat_max,
                )
            })
            .collect();

        let classified = ClassifiedSeries {
            series: normalized,
            modes,
            normalized_aliases,
        };
        for share in classified.mode_summary() {
            info!(
                mode = %share.mode,
                samples = share.samples,
                percentage = share.percentage,
                "Operating mode share"
            );
        }
        Ok(classified)
    }

    fn is_off(&self, on_signal: f64) -> bool {
        match self.thresholds.on_off_source {
            OnOffSource::SystemStatus => on_signal == 0.0,
            OnOffSource::FanSpeed => on_signal <= self.thresholds.fan_threshold,
        }
    }

    fn classify_sample(&self, r: ControlReading, oat_min: f64, oat_max: f64) -> OperatingMode {
        let t = &self.thresholds;

        if self.is_off(r.on_signal) {
            return OperatingMode::Off;
        }

        // HEATING: no detection test is defined yet, so heating samples
        // fall through to the remaining branches.

        if r.cooling < t.valve_threshold
            && r.damper > t.damper_threshold
            && r.damper < 1.0 - t.damper_threshold
            && r.oat >= oat_min
            && r.oat <= oat_max
        {
            return OperatingMode::Economizer;
        }

        if r.cooling < t.valve_threshold && r.damper > 1.0 - t.damper_threshold {
            return OperatingMode::FullOutdoorAir;
        }

        if r.cooling > t.valve_threshold
            && r.damper > t.min_damper_position - t.damper_threshold
            && r.damper < t.min_damper_position + t.damper_threshold
        {
            return OperatingMode::MinimumOutdoorAir;
        }

        OperatingMode::Unknown
    }

    fn warn_heating_unimplemented(&self) {
        warn!(
            heating_channel = %self.channels.alias(Channel::HeatingSig),
            "HEATING mode detection not implemented, heating samples are classified UNKNOWN"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(i: usize) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_100 + i as i64 * 900, 0).unwrap()
    }

    fn series(sys: &[f64], cooling: &[f64], damper: &[f64], oat: &[f64]) -> TimeSeries {
        TimeSeries::new((0..sys.len()).map(ts).collect())
            .unwrap()
            .with_channel("sys_ctl", sys.to_vec())
            .unwrap()
            .with_channel("cooling_sig", cooling.to_vec())
            .unwrap()
            .with_channel("oa_dmpr_sig", damper.to_vec())
            .unwrap()
            .with_channel("oat", oat.to_vec())
            .unwrap()
    }

    fn classifier() -> ModeClassifier {
        ModeClassifier::new(
            ChannelMap::default(),
            ClassifierThresholds::default(),
            UnitSystem::Si,
        )
    }

    #[test]
    fn test_off_when_system_status_zero() {
        let s = series(&[0.0, 0.0], &[0.5, 0.0], &[0.5, 1.0], &[10.0, 10.0]);
        let out = classifier().classify(&s).unwrap();
        assert_eq!(out.modes, vec![OperatingMode::Off, OperatingMode::Off]);
    }

    #[test]
    fn test_cascade_precedence() {
        let s = series(
            &[1.0, 1.0, 1.0, 1.0, 1.0],
            &[0.0, 0.0, 0.6, 0.6, 0.0],
            &[0.5, 1.0, 0.1, 0.5, 0.5],
            &[10.0, 25.0, 25.0, 25.0, 25.0],
        );
        let out = classifier().classify(&s).unwrap();
        assert_eq!(
            out.modes,
            vec![
                OperatingMode::Economizer,
                OperatingMode::FullOutdoorAir,
                OperatingMode::MinimumOutdoorAir,
                OperatingMode::Unknown,
                // Damper modulating but OAT above the economizer band
                OperatingMode::Unknown,
            ]
        );
    }

    #[test]
    fn test_percent_scale_signals_rescaled() {
        let s = series(&[1.0], &[0.0], &[50.0], &[10.0]);
        let out = classifier().classify(&s).unwrap();
        assert_eq!(out.modes, vec![OperatingMode::Economizer]);
        assert_eq!(out.series.get("oa_dmpr_sig").unwrap(), &[0.5]);
    }

    #[test]
    fn test_normalized_aliases_recorded() {
        let s = series(&[1.0, 1.0], &[100.0, 101.0], &[10.0, 10.0], &[25.0, 25.0]);
        let out = classifier().classify(&s).unwrap();
        let recorded: Vec<&str> = out.normalized_aliases.iter().map(String::as_str).collect();
        assert_eq!(recorded, vec!["cooling_sig", "oa_dmpr_sig", "sys_ctl"]);
        assert_eq!(out.series.get("cooling_sig").unwrap(), &[1.0, 1.01]);
        assert_eq!(out.modes, vec![OperatingMode::MinimumOutdoorAir; 2]);
    }

    #[test]
    fn test_missing_required_channel_is_fatal() {
        let s = TimeSeries::new(vec![ts(0)])
            .unwrap()
            .with_channel("sys_ctl", vec![1.0])
            .unwrap();
        assert!(matches!(
            classifier().classify(&s),
            Err(AnalysisError::MissingChannel { .. })
        ));
    }

    #[test]
    fn test_fan_speed_on_off_source() {
        let thresholds = ClassifierThresholds {
            on_off_source: OnOffSource::FanSpeed,
            ..ClassifierThresholds::default()
        };
        let c = ModeClassifier::new(ChannelMap::default(), thresholds, UnitSystem::Si);
        let s = TimeSeries::new(vec![ts(0), ts(1)])
            .unwrap()
            .with_channel("fan_vfd_speed", vec![0.0, 0.8])
            .unwrap()
            .with_channel("cooling_sig", vec![0.0, 0.0])
            .unwrap()
            .with_channel("oa_dmpr_sig", vec![1.0, 1.0])
            .unwrap()
            .with_channel("oat", vec![20.0, 20.0])
            .unwrap();
        let out = c.classify(&s).unwrap();
        assert_eq!(out.modes, vec![OperatingMode::Off, OperatingMode::FullOutdoorAir]);
    }

    #[test]
    fn test_economizer_band_defaults_follow_units() {
        let t = ClassifierThresholds::default();
        let (lo, hi) = t.economizer_band(UnitSystem::Si);
        assert!((lo - 1.0).abs() < 1e-9);
        assert!((hi - 15.555_555).abs() < 1e-4);
        assert_eq!(t.economizer_band(UnitSystem::Imperial), (33.8, 60.0));
    }

    #[test]
    fn test_min_damper_position_configurable() {
        let thresholds = ClassifierThresholds {
            min_damper_position: 0.2,
            ..ClassifierThresholds::default()
        };
        let c = ModeClassifier::new(ChannelMap::default(), thresholds, UnitSystem::Si);
        let s = series(&[1.0, 1.0], &[0.6, 0.6], &[0.1, 0.2], &[25.0, 25.0]);
        let out = c.classify(&s).unwrap();
        assert_eq!(
            out.modes,
            vec![OperatingMode::Unknown, OperatingMode::MinimumOutdoorAir]
        );
    }

    #[test]
    fn test_min_oa_band_edges_are_exclusive() {
        let t = ClassifierThresholds::default();
        let lo = t.min_damper_position - t.damper_threshold;
        let hi = t.min_damper_position + t.damper_threshold;
        let s = series(
            &[1.0; 5],
            &[0.6, 0.6, 0.6, 0.6, t.valve_threshold],
            &[lo, hi, lo + 1e-6, hi - 1e-6, t.min_damper_position],
            &[25.0; 5],
        );
        let out = classifier().classify(&s).unwrap();
        assert_eq!(
            out.modes,
            vec![
                OperatingMode::Unknown,
                OperatingMode::Unknown,
                OperatingMode::MinimumOutdoorAir,
                OperatingMode::MinimumOutdoorAir,
                // Valve exactly at the deadband is not open
                OperatingMode::Unknown,
            ]
        );
    }

    #[test]
    fn test_mode_summary_sorted_descending() {
        let s = series(
            &[0.0, 1.0, 1.0, 1.0],
            &[0.0, 0.0, 0.0, 0.0],
            &[0.0, 1.0, 1.0, 1.0],
            &[5.0, 20.0, 20.0, 20.0],
        );
        let summary = classifier().classify(&s).unwrap().mode_summary();
        assert_eq!(summary[0].mode, OperatingMode::FullOutdoorAir);
        assert_eq!(summary[0].percentage, 75.0);
        assert_eq!(summary[1].mode, OperatingMode::Off);
        assert_eq!(summary.len(), 2);
    }
}
