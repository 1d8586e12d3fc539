//! APAR parameter table and measurement-unit conventions
//!
//! The SI and imperial tables come from different design-tolerance
//! conventions in the APAR literature. They are kept as two literal tables;
//! neither is derived from the other by unit conversion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

// ============================================================================
// Unit System
// ============================================================================

/// Measurement-unit convention of the temperature channels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// Degrees Celsius
    #[default]
    Si,
    /// Degrees Fahrenheit
    Imperial,
}

impl UnitSystem {
    /// Parse from string (for CLI/config)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "si" | "metric" | "celsius" | "c" => Some(Self::Si),
            "imperial" | "ip" | "us" | "fahrenheit" | "f" => Some(Self::Imperial),
            _ => None,
        }
    }

    pub fn temperature_unit(&self) -> &'static str {
        match self {
            Self::Si => "°C",
            Self::Imperial => "°F",
        }
    }

    /// Express a Fahrenheit reference temperature in this unit system.
    pub fn from_fahrenheit(&self, fahrenheit: f64) -> f64 {
        match self {
            Self::Si => fahrenheit_to_celsius(fahrenheit),
            Self::Imperial => fahrenheit,
        }
    }
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Si => write!(f, "SI"),
            Self::Imperial => write!(f, "imperial"),
        }
    }
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * (5.0 / 9.0)
}

// ============================================================================
// Parameter Keys
// ============================================================================

/// Threshold parameters of the APAR rule set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AparParam {
    /// ε_t: error band of temperature measurements
    TemperatureErrorBand,
    /// ε_f: error band of airflow-derived quantities
    AirflowErrorBand,
    /// ε_hc: heating coil valve control signal band
    HeatingValveErrorBand,
    /// ε_cc: cooling coil valve control signal band
    CoolingValveErrorBand,
    /// ε_d: mixing box damper control signal band
    DamperErrorBand,
    /// ΔT_sf: supply fan temperature rise
    SupplyFanTemperatureRise,
    /// ΔT_rf: return fan temperature rise
    ReturnFanTemperatureRise,
}

impl AparParam {
    pub const ALL: [Self; 7] = [
        Self::TemperatureErrorBand,
        Self::AirflowErrorBand,
        Self::HeatingValveErrorBand,
        Self::CoolingValveErrorBand,
        Self::DamperErrorBand,
        Self::SupplyFanTemperatureRise,
        Self::ReturnFanTemperatureRise,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::TemperatureErrorBand => "temperature_error_band",
            Self::AirflowErrorBand => "airflow_error_band",
            Self::HeatingValveErrorBand => "heating_valve_error_band",
            Self::CoolingValveErrorBand => "cooling_valve_error_band",
            Self::DamperErrorBand => "damper_error_band",
            Self::SupplyFanTemperatureRise => "supply_fan_temperature_rise",
            Self::ReturnFanTemperatureRise => "return_fan_temperature_rise",
        }
    }

    /// Short APAR symbol (`e_t`, `dt_sf`, ...)
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::TemperatureErrorBand => "e_t",
            Self::AirflowErrorBand => "e_f",
            Self::HeatingValveErrorBand => "e_hc",
            Self::CoolingValveErrorBand => "e_cc",
            Self::DamperErrorBand => "e_d",
            Self::SupplyFanTemperatureRise => "dt_sf",
            Self::ReturnFanTemperatureRise => "dt_rf",
        }
    }

    /// Look up by long key or APAR symbol
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.key() == key || p.symbol() == key)
    }
}

impl std::fmt::Display for AparParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

// ============================================================================
// Parameter Table
// ============================================================================

/// One complete APAR parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AparParams {
    pub temperature_error_band: f64,
    pub airflow_error_band: f64,
    pub heating_valve_error_band: f64,
    pub cooling_valve_error_band: f64,
    pub damper_error_band: f64,
    pub supply_fan_temperature_rise: f64,
    pub return_fan_temperature_rise: f64,
}

impl AparParams {
    /// SI table (°C)
    pub const fn si() -> Self {
        Self {
            temperature_error_band: 2.0,
            airflow_error_band: 0.3,
            heating_valve_error_band: 0.1,
            cooling_valve_error_band: 0.1,
            damper_error_band: 0.02,
            supply_fan_temperature_rise: 1.1,
            return_fan_temperature_rise: 1.1,
        }
    }

    /// Imperial table (°F)
    pub const fn imperial() -> Self {
        Self {
            temperature_error_band: 3.6,
            airflow_error_band: 0.3,
            heating_valve_error_band: 0.02,
            cooling_valve_error_band: 0.02,
            damper_error_band: 0.02,
            supply_fan_temperature_rise: 2.0,
            return_fan_temperature_rise: 2.0,
        }
    }

    /// Get the table for a unit system
    pub const fn for_units(units: UnitSystem) -> Self {
        match units {
            UnitSystem::Si => Self::si(),
            UnitSystem::Imperial => Self::imperial(),
        }
    }

    pub fn value(&self, param: AparParam) -> f64 {
        match param {
            AparParam::TemperatureErrorBand => self.temperature_error_band,
            AparParam::AirflowErrorBand => self.airflow_error_band,
            AparParam::HeatingValveErrorBand => self.heating_valve_error_band,
            AparParam::CoolingValveErrorBand => self.cooling_valve_error_band,
            AparParam::DamperErrorBand => self.damper_error_band,
            AparParam::SupplyFanTemperatureRise => self.supply_fan_temperature_rise,
            AparParam::ReturnFanTemperatureRise => self.return_fan_temperature_rise,
        }
    }
}

impl Default for AparParams {
    fn default() -> Self {
        Self::si()
    }
}

/// Resolve the requested APAR parameters for a unit system.
///
/// Keys may be long names (`temperature_error_band`) or APAR symbols (`e_t`).
/// Fails with `InvalidArgument` on an empty list or an unknown key.
pub fn get_apar_params<S: AsRef<str>>(
    units: UnitSystem,
    keys: &[S],
) -> Result<BTreeMap<AparParam, f64>, AnalysisError> {
    if keys.is_empty() {
        return Err(AnalysisError::InvalidArgument(
            "parameter key list must not be empty".to_string(),
        ));
    }

    let table = AparParams::for_units(units);
    keys.iter()
        .map(|key| {
            let key = key.as_ref();
            AparParam::from_key(key)
                .map(|p| (p, table.value(p)))
                .ok_or_else(|| {
                    AnalysisError::InvalidArgument(format!("unknown APAR parameter '{key}'"))
                })
        })
        .collect()
}
