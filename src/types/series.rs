//! Time-indexed AHU channel table
//!
//! Missing readings are stored as `NaN`. Every comparison against a missing
//! value is false, so a rule whose inputs are incomplete at a sample never
//! fires there.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

// ============================================================================
// Semantic Channels
// ============================================================================

/// Semantic AHU channel referenced by the classifier and the rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Supply air temperature
    Sat,
    /// Supply air temperature setpoint
    Satsp,
    /// Return air temperature
    Rat,
    /// Outdoor air temperature
    Oat,
    /// Mixed air temperature
    Mat,
    /// Cooling coil valve command [0,1]
    CoolingSig,
    /// Heating coil valve command [0,1]
    HeatingSig,
    /// Outdoor air damper command [0,1]
    OaDmprSig,
    /// Supply fan speed [0,1]
    FanVfdSpeed,
    /// System on/off status
    SysCtl,
}

impl Channel {
    pub const COUNT: usize = 10;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Sat,
        Self::Satsp,
        Self::Rat,
        Self::Oat,
        Self::Mat,
        Self::CoolingSig,
        Self::HeatingSig,
        Self::OaDmprSig,
        Self::FanVfdSpeed,
        Self::SysCtl,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sat => "sat",
            Self::Satsp => "satsp",
            Self::Rat => "rat",
            Self::Oat => "oat",
            Self::Mat => "mat",
            Self::CoolingSig => "cooling_sig",
            Self::HeatingSig => "heating_sig",
            Self::OaDmprSig => "oa_dmpr_sig",
            Self::FanVfdSpeed => "fan_vfd_speed",
            Self::SysCtl => "sys_ctl",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|c| c.name() == s)
    }

    /// Control signals are normalized to [0,1] before use.
    pub fn is_control_signal(&self) -> bool {
        matches!(
            self,
            Self::CoolingSig | Self::HeatingSig | Self::OaDmprSig | Self::FanVfdSpeed | Self::SysCtl
        )
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Channel Aliases
// ============================================================================

/// Maps each semantic channel to the column alias used in the input table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMap {
    pub sat: String,
    pub satsp: String,
    pub rat: String,
    pub oat: String,
    pub mat: String,
    pub cooling_sig: String,
    pub heating_sig: String,
    pub oa_dmpr_sig: String,
    pub fan_vfd_speed: String,
    pub sys_ctl: String,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            sat: Channel::Sat.name().to_string(),
            satsp: Channel::Satsp.name().to_string(),
            rat: Channel::Rat.name().to_string(),
            oat: Channel::Oat.name().to_string(),
            mat: Channel::Mat.name().to_string(),
            cooling_sig: Channel::CoolingSig.name().to_string(),
            heating_sig: Channel::HeatingSig.name().to_string(),
            oa_dmpr_sig: Channel::OaDmprSig.name().to_string(),
            fan_vfd_speed: Channel::FanVfdSpeed.name().to_string(),
            sys_ctl: Channel::SysCtl.name().to_string(),
        }
    }
}

impl ChannelMap {
    pub fn alias(&self, channel: Channel) -> &str {
        match channel {
            Channel::Sat => &self.sat,
            Channel::Satsp => &self.satsp,
            Channel::Rat => &self.rat,
            Channel::Oat => &self.oat,
            Channel::Mat => &self.mat,
            Channel::CoolingSig => &self.cooling_sig,
            Channel::HeatingSig => &self.heating_sig,
            Channel::OaDmprSig => &self.oa_dmpr_sig,
            Channel::FanVfdSpeed => &self.fan_vfd_speed,
            Channel::SysCtl => &self.sys_ctl,
        }
    }

    pub fn set(&mut self, channel: Channel, alias: impl Into<String>) {
        let alias = alias.into();
        match channel {
            Channel::Sat => self.sat = alias,
            Channel::Satsp => self.satsp = alias,
            Channel::Rat => self.rat = alias,
            Channel::Oat => self.oat = alias,
            Channel::Mat => self.mat = alias,
            Channel::CoolingSig => self.cooling_sig = alias,
            Channel::HeatingSig => self.heating_sig = alias,
            Channel::OaDmprSig => self.oa_dmpr_sig = alias,
            Channel::FanVfdSpeed => self.fan_vfd_speed = alias,
            Channel::SysCtl => self.sys_ctl = alias,
        }
    }

    /// Column aliases of every control-signal channel.
    pub fn control_aliases(&self) -> Vec<&str> {
        Channel::ALL
            .iter()
            .filter(|c| c.is_control_signal())
            .map(|c| self.alias(*c))
            .collect()
    }
}

// ============================================================================
// Time Series
// ============================================================================

/// Ordered samples with named `f64` channels of equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    channels: BTreeMap<String, Vec<f64>>,
}

impl TimeSeries {
    /// Create an empty-channel series. Timestamps must be strictly increasing.
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Result<Self, AnalysisError> {
        if let Some(pos) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidSeries(format!(
                "timestamps not strictly increasing at index {} ({} -> {})",
                pos + 1,
                timestamps[pos],
                timestamps[pos + 1]
            )));
        }
        Ok(Self {
            timestamps,
            channels: BTreeMap::new(),
        })
    }

    /// Builder-style channel insertion
    pub fn with_channel(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, AnalysisError> {
        self.insert_channel(name, values)?;
        Ok(self)
    }

    /// Insert or replace a channel. Length must match the timestamp index.
    pub fn insert_channel(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), AnalysisError> {
        let name = name.into();
        if values.len() != self.timestamps.len() {
            return Err(AnalysisError::InvalidSeries(format!(
                "channel '{name}' has {} values, index has {}",
                values.len(),
                self.timestamps.len()
            )));
        }
        self.channels.insert(name, values);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Channel values, or `None` if the table does not carry the alias.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.channels.get(name).map(Vec::as_slice)
    }

    /// Channel values, or `MissingChannel` naming the requester.
    pub fn require(&self, name: &str, context: &str) -> Result<&[f64], AnalysisError> {
        self.get(name)
            .ok_or_else(|| AnalysisError::missing_channel(name, context))
    }

    pub fn channels(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.channels
    }

    /// Keep only the rows selected by `keep` (same length as the index).
    pub fn select_rows(&self, keep: &[bool]) -> Self {
        let timestamps = self
            .timestamps
            .iter()
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|(t, _)| *t)
            .collect();
        let channels = self
            .channels
            .iter()
            .map(|(name, values)| {
                let kept = values
                    .iter()
                    .zip(keep)
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| *v)
                    .collect();
                (name.clone(), kept)
            })
            .collect();
        Self {
            timestamps,
            channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + minutes * 60, 0).unwrap()
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let err = TimeSeries::new(vec![ts(0), ts(15), ts(15)]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidSeries(_)));
    }

    #[test]
    fn test_rejects_ragged_channel() {
        let series = TimeSeries::new(vec![ts(0), ts(15)]).unwrap();
        assert!(series.with_channel("sat", vec![12.0]).is_err());
    }

    #[test]
    fn test_require_reports_missing_channel() {
        let series = TimeSeries::new(vec![ts(0)])
            .unwrap()
            .with_channel("sat", vec![12.0])
            .unwrap();
        assert_eq!(series.require("sat", "test").unwrap(), &[12.0]);
        match series.require("mat", "APAR07") {
            Err(AnalysisError::MissingChannel { channel, context }) => {
                assert_eq!(channel, "mat");
                assert_eq!(context, "APAR07");
            }
            other => panic!("expected MissingChannel, got {other:?}"),
        }
    }

    #[test]
    fn test_select_rows_keeps_alignment() {
        let series = TimeSeries::new(vec![ts(0), ts(15), ts(30)])
            .unwrap()
            .with_channel("oat", vec![1.0, 2.0, 3.0])
            .unwrap();
        let kept = series.select_rows(&[true, false, true]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.get("oat").unwrap(), &[1.0, 3.0]);
        assert_eq!(kept.timestamps()[1], ts(30));
    }

    #[test]
    fn test_channel_map_defaults_to_semantic_names() {
        let map = ChannelMap::default();
        assert_eq!(map.alias(Channel::OaDmprSig), "oa_dmpr_sig");
        assert_eq!(map.control_aliases().len(), 5);
        assert_eq!(Channel::parse("fan_vfd_speed"), Some(Channel::FanVfdSpeed));
    }
}
