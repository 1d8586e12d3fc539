//! Table-driven APAR rule registry
//!
//! Each rule is a static record: the channels it reads, the APAR parameters
//! it needs, the modes where it is meaningful, and a plain predicate fn.
//! Result columns are keyed by the binding label, never by type names.

use serde::{Deserialize, Serialize};

use super::predicates::{self, Predicate};
use crate::types::{AparParam, Channel, ModeApplicability, OperatingMode};

// ============================================================================
// Rule Identifiers
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleId {
    #[serde(rename = "APAR01")]
    Apar01,
    #[serde(rename = "APAR03")]
    Apar03,
    #[serde(rename = "APAR04")]
    Apar04,
    #[serde(rename = "APAR05")]
    Apar05,
    #[serde(rename = "APAR06")]
    Apar06,
    #[serde(rename = "APAR07")]
    Apar07,
    #[serde(rename = "APAR08")]
    Apar08,
    #[serde(rename = "APAR10")]
    Apar10,
    #[serde(rename = "APAR11")]
    Apar11,
    #[serde(rename = "APAR12")]
    Apar12,
    #[serde(rename = "APAR13")]
    Apar13,
    #[serde(rename = "APAR14")]
    Apar14,
    #[serde(rename = "APAR16")]
    Apar16,
    #[serde(rename = "APAR17")]
    Apar17,
    #[serde(rename = "APAR19")]
    Apar19,
    #[serde(rename = "APAR20")]
    Apar20,
    #[serde(rename = "APAR24")]
    Apar24,
    #[serde(rename = "APAR25")]
    Apar25,
    #[serde(rename = "APAR26")]
    Apar26,
    #[serde(rename = "APAR27")]
    Apar27,
}

impl RuleId {
    pub const ALL: [Self; 20] = [
        Self::Apar01,
        Self::Apar03,
        Self::Apar04,
        Self::Apar05,
        Self::Apar06,
        Self::Apar07,
        Self::Apar08,
        Self::Apar10,
        Self::Apar11,
        Self::Apar12,
        Self::Apar13,
        Self::Apar14,
        Self::Apar16,
        Self::Apar17,
        Self::Apar19,
        Self::Apar20,
        Self::Apar24,
        Self::Apar25,
        Self::Apar26,
        Self::Apar27,
    ];

    pub fn label(&self) -> &'static str {
        self.definition().label
    }

    /// Parse `APAR13`, `apar13` or bare `13`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_uppercase();
        let digits = s.strip_prefix("APAR").unwrap_or(&s);
        let number: u8 = digits.parse().ok()?;
        let label = format!("APAR{number:02}");
        Self::ALL.into_iter().find(|r| r.label() == label)
    }

    pub fn definition(&self) -> &'static RuleDefinition {
        &RULES[*self as usize]
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Rule Definitions
// ============================================================================

/// Default applicability declared by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeScope {
    All,
    Only(&'static [OperatingMode]),
}

impl ModeScope {
    pub fn to_applicability(self) -> ModeApplicability {
        match self {
            Self::All => ModeApplicability::All,
            Self::Only(modes) => ModeApplicability::Only(modes.to_vec()),
        }
    }
}

/// Static description of one APAR rule.
#[derive(Clone, Copy)]
pub struct RuleDefinition {
    pub id: RuleId,
    pub label: &'static str,
    pub description: &'static str,
    /// Human-readable fault expression
    pub expression: &'static str,
    pub channels: &'static [Channel],
    pub params: &'static [AparParam],
    pub default_modes: ModeScope,
    pub predicate: Predicate,
    /// Channel whose low variance flags every sample as faulty
    pub stuck_sensor: Option<Channel>,
}

impl std::fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("id", &self.id)
            .field("expression", &self.expression)
            .field("channels", &self.channels)
            .field("params", &self.params)
            .field("default_modes", &self.default_modes)
            .field("stuck_sensor", &self.stuck_sensor)
            .finish_non_exhaustive()
    }
}

const HEATING: &[OperatingMode] = &[OperatingMode::Heating];
const ECONOMIZER: &[OperatingMode] = &[OperatingMode::Economizer];
const FULL_OA: &[OperatingMode] = &[OperatingMode::FullOutdoorAir];
const MIN_OA: &[OperatingMode] = &[OperatingMode::MinimumOutdoorAir];

use crate::types::AparParam::{
    CoolingValveErrorBand as E_CC, DamperErrorBand as E_D, HeatingValveErrorBand as E_HC,
    ReturnFanTemperatureRise as DT_RF, SupplyFanTemperatureRise as DT_SF,
    TemperatureErrorBand as E_T,
};
use crate::types::Channel::{CoolingSig, HeatingSig, Mat, OaDmprSig, Oat, Rat, Sat, Satsp};

/// Indexed by `RuleId as usize`.
static RULES: [RuleDefinition; 20] = [
    RuleDefinition {
        id: RuleId::Apar01,
        label: "APAR01",
        description: "Supply air temperature too low in heating mode",
        expression: "sat < mat + dt_sf - e_t",
        channels: &[Sat, Mat],
        params: &[E_T, DT_SF],
        default_modes: ModeScope::Only(HEATING),
        predicate: predicates::apar01,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar03,
        label: "APAR03",
        description: "Heating coil valve saturated with supply air below setpoint",
        expression: "|heating_sig - 1| <= e_hc and satsp - sat >= e_t",
        channels: &[HeatingSig, Sat, Satsp],
        params: &[E_T, E_HC],
        default_modes: ModeScope::Only(HEATING),
        predicate: predicates::apar03,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar04,
        label: "APAR04",
        description: "Heating coil valve saturated",
        expression: "|heating_sig - 1| <= e_hc",
        channels: &[HeatingSig],
        params: &[E_HC],
        default_modes: ModeScope::Only(HEATING),
        predicate: predicates::apar04,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar05,
        label: "APAR05",
        description: "Outdoor air temperature too high for free cooling",
        expression: "oat > satsp - dt_sf + e_t",
        channels: &[Oat, Satsp],
        params: &[E_T, DT_SF],
        default_modes: ModeScope::Only(ECONOMIZER),
        predicate: predicates::apar05,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar06,
        label: "APAR06",
        description: "Supply air temperature too high in economizer mode",
        expression: "sat > rat - dt_rf + e_t",
        channels: &[Sat, Rat],
        params: &[E_T, DT_RF],
        default_modes: ModeScope::Only(ECONOMIZER),
        predicate: predicates::apar06,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar07,
        label: "APAR07",
        description: "Supply and mixed air temperatures inconsistent in economizer mode",
        expression: "|sat - mat - dt_sf| > e_t",
        channels: &[Sat, Mat],
        params: &[E_T, DT_SF],
        default_modes: ModeScope::Only(ECONOMIZER),
        predicate: predicates::apar07,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar08,
        label: "APAR08",
        description: "Outdoor air temperature too low for mechanical cooling",
        expression: "oat < satsp - dt_sf - e_t",
        channels: &[Oat, Satsp],
        params: &[E_T, DT_SF],
        default_modes: ModeScope::Only(FULL_OA),
        predicate: predicates::apar08,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar10,
        label: "APAR10",
        description: "Mixed and outdoor air temperatures differ with 100% outdoor air",
        expression: "|oat - mat| > e_t",
        channels: &[Oat, Mat],
        params: &[E_T],
        default_modes: ModeScope::Only(FULL_OA),
        predicate: predicates::apar10,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar11,
        label: "APAR11",
        description: "Supply air warmer than mixed air with 100% outdoor air",
        expression: "sat > mat + dt_sf + e_t",
        channels: &[Sat, Mat],
        params: &[E_T, DT_SF],
        default_modes: ModeScope::Only(FULL_OA),
        predicate: predicates::apar11,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar12,
        label: "APAR12",
        description: "Supply air warmer than return air with 100% outdoor air",
        expression: "sat > rat - dt_rf + e_t",
        channels: &[Sat, Rat],
        params: &[E_T, DT_RF],
        default_modes: ModeScope::Only(FULL_OA),
        predicate: predicates::apar12,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar13,
        label: "APAR13",
        description: "Cooling coil valve saturated with supply air above setpoint",
        expression: "|cooling_sig - 1| <= e_cc and sat - satsp >= e_t",
        channels: &[CoolingSig, Sat, Satsp],
        params: &[E_T, E_CC],
        default_modes: ModeScope::Only(FULL_OA),
        predicate: predicates::apar13,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar14,
        label: "APAR14",
        description: "Cooling coil valve saturated with 100% outdoor air",
        expression: "|cooling_sig - 1| <= e_cc",
        channels: &[CoolingSig],
        params: &[E_CC],
        default_modes: ModeScope::Only(FULL_OA),
        predicate: predicates::apar14,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar16,
        label: "APAR16",
        description: "Supply air warmer than mixed air with minimum outdoor air",
        expression: "sat > mat + dt_sf + e_t",
        channels: &[Sat, Mat],
        params: &[E_T, DT_SF],
        default_modes: ModeScope::Only(MIN_OA),
        predicate: predicates::apar16,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar17,
        label: "APAR17",
        description: "Supply air warmer than return air with minimum outdoor air",
        expression: "sat > rat - dt_rf + e_t",
        channels: &[Sat, Rat],
        params: &[E_T, DT_RF],
        default_modes: ModeScope::Only(MIN_OA),
        predicate: predicates::apar17,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar19,
        label: "APAR19",
        description: "Cooling coil valve saturated with supply air above setpoint (minimum outdoor air)",
        expression: "|cooling_sig - 1| <= e_cc and sat - satsp >= e_t",
        channels: &[CoolingSig, Sat, Satsp],
        params: &[E_T, E_CC],
        default_modes: ModeScope::Only(MIN_OA),
        predicate: predicates::apar19,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar20,
        label: "APAR20",
        description: "Cooling coil valve saturated with minimum outdoor air",
        expression: "|cooling_sig - 1| <= e_cc",
        channels: &[CoolingSig],
        params: &[E_CC],
        default_modes: ModeScope::Only(MIN_OA),
        predicate: predicates::apar20,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar24,
        label: "APAR24",
        description: "Outdoor air damper modulating while the cooling valve is open",
        expression: "e_d < oa_dmpr_sig < 1 - e_d and cooling_sig > e_cc",
        channels: &[OaDmprSig, CoolingSig],
        params: &[E_D, E_CC],
        default_modes: ModeScope::All,
        predicate: predicates::apar24,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar25,
        label: "APAR25",
        description: "Persistent supply air temperature setpoint error",
        expression: "|sat - satsp| > e_t",
        channels: &[Sat, Satsp],
        params: &[E_T],
        default_modes: ModeScope::All,
        predicate: predicates::apar25,
        stuck_sensor: Some(Sat),
    },
    RuleDefinition {
        id: RuleId::Apar26,
        label: "APAR26",
        description: "Mixed air colder than both return and outdoor air",
        expression: "mat < min(rat, oat) - e_t",
        channels: &[Mat, Rat, Oat],
        params: &[E_T],
        default_modes: ModeScope::All,
        predicate: predicates::apar26,
        stuck_sensor: None,
    },
    RuleDefinition {
        id: RuleId::Apar27,
        label: "APAR27",
        description: "Mixed air warmer than both return and outdoor air",
        expression: "mat > max(rat, oat) + e_t",
        channels: &[Mat, Rat, Oat],
        params: &[E_T],
        default_modes: ModeScope::All,
        predicate: predicates::apar27,
        stuck_sensor: None,
    },
];

/// Every registered rule, in id order.
pub fn all_rules() -> &'static [RuleDefinition] {
    &RULES
}
