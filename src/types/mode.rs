//! Operating modes of the air handler and rule applicability sets

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

// ============================================================================
// Operating Mode (Auto-Classified)
// ============================================================================

/// Operating regime of the AHU at one timestamp.
///
/// Assigned once per dataset by the mode classifier:
/// - **Off**: system status reports the unit switched off
/// - **Unknown**: unit on, but no regime test matched
/// - **Heating**: APAR mode 1 (declared, not yet detected by the classifier)
/// - **Economizer**: APAR mode 2, free cooling with modulating outdoor air
/// - **FullOutdoorAir**: APAR mode 3, mechanical cooling with 100% outdoor air
/// - **MinimumOutdoorAir**: APAR mode 4, mechanical cooling with minimum outdoor air
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingMode {
    Off,
    #[default]
    Unknown,
    Heating,
    Economizer,
    FullOutdoorAir,
    MinimumOutdoorAir,
}

impl OperatingMode {
    /// Every label the classifier may emit.
    pub const ALL: [Self; 6] = [
        Self::Off,
        Self::Unknown,
        Self::Heating,
        Self::Economizer,
        Self::FullOutdoorAir,
        Self::MinimumOutdoorAir,
    ];

    /// Canonical label used in reports and config files
    pub fn label(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Unknown => "UNKNOWN",
            Self::Heating => "HEATING",
            Self::Economizer => "ECONOMIZER",
            Self::FullOutdoorAir => "FULL_OUTDOOR_AIR",
            Self::MinimumOutdoorAir => "MINIMUM_OUTDOOR_AIR",
        }
    }

    /// APAR mode code as numbered in the rule tables
    pub fn apar_code(&self) -> &'static str {
        match self {
            Self::Off => "OM_OFF",
            Self::Unknown => "OM_5_UNKWN",
            Self::Heating => "OM_1_HTG",
            Self::Economizer => "OM_2_ECO",
            Self::FullOutdoorAir => "OM_3_OUT",
            Self::MinimumOutdoorAir => "OM_4_MIN",
        }
    }

    /// Parse from a label or APAR code (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.label() == s || m.apar_code() == s)
    }

    /// Whether the unit is running in this mode
    pub fn is_on(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Mode Applicability
// ============================================================================

/// Set of operating modes in which a rule's output is meaningful.
///
/// `All` is the APAR "mode 0" sentinel: every mode except `OFF`.
/// Serialized as a list of labels, with `["ALL"]` standing for `All`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub enum ModeApplicability {
    All,
    Only(Vec<OperatingMode>),
}

impl ModeApplicability {
    /// Build from configured labels. An empty list is rejected.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, AnalysisError> {
        if labels.is_empty() {
            return Err(AnalysisError::InvalidArgument(
                "applicable mode list must not be empty".to_string(),
            ));
        }
        if labels.iter().any(|l| l.as_ref().trim().eq_ignore_ascii_case("ALL")) {
            return Ok(Self::All);
        }

        let mut modes = Vec::with_capacity(labels.len());
        for label in labels {
            let mode = OperatingMode::parse(label.as_ref()).ok_or_else(|| {
                AnalysisError::InvalidArgument(format!(
                    "unknown operating mode '{}'",
                    label.as_ref()
                ))
            })?;
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        Ok(Self::Only(modes))
    }

    /// Does a sample in `mode` qualify for this rule?
    pub fn contains(&self, mode: OperatingMode) -> bool {
        match self {
            Self::All => mode.is_on(),
            Self::Only(modes) => modes.contains(&mode),
        }
    }

    pub fn labels(&self) -> Vec<String> {
        match self {
            Self::All => vec!["ALL".to_string()],
            Self::Only(modes) => modes.iter().map(|m| m.label().to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for ModeApplicability {
    type Error = AnalysisError;

    fn try_from(labels: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_labels(&labels)
    }
}

impl From<ModeApplicability> for Vec<String> {
    fn from(value: ModeApplicability) -> Self {
        value.labels()
    }
}

impl std::fmt::Display for ModeApplicability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.labels().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_labels_and_apar_codes() {
        assert_eq!(OperatingMode::parse("economizer"), Some(OperatingMode::Economizer));
        assert_eq!(OperatingMode::parse("OM_4_MIN"), Some(OperatingMode::MinimumOutdoorAir));
        assert_eq!(OperatingMode::parse("OM_OFF"), Some(OperatingMode::Off));
        assert_eq!(OperatingMode::parse("cruise"), None);
        for mode in OperatingMode::ALL {
            assert_eq!(OperatingMode::parse(mode.apar_code()), Some(mode));
        }
    }

    #[test]
    fn test_all_excludes_only_off() {
        let all = ModeApplicability::All;
        assert!(!all.contains(OperatingMode::Off));
        for mode in OperatingMode::ALL.iter().filter(|m| m.is_on()) {
            assert!(all.contains(*mode), "{mode} should qualify under ALL");
        }
    }

    #[test]
    fn test_from_labels_rejects_empty_and_unknown() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            ModeApplicability::from_labels(&empty),
            Err(AnalysisError::InvalidArgument(_))
        ));
        assert!(ModeApplicability::from_labels(&["ECONOMIZER", "SPRINTING"]).is_err());
    }

    #[test]
    fn test_from_labels_dedupes() {
        let set = ModeApplicability::from_labels(&["OM_2_ECO", "ECONOMIZER"]).unwrap();
        assert_eq!(set, ModeApplicability::Only(vec![OperatingMode::Economizer]));
    }

    #[test]
    fn test_serde_roundtrip_through_labels() {
        let json = serde_json::to_string(&ModeApplicability::All).unwrap();
        assert_eq!(json, r#"["ALL"]"#);
        let parsed: ModeApplicability =
            serde_json::from_str(r#"["FULL_OUTDOOR_AIR","MINIMUM_OUTDOOR_AIR"]"#).unwrap();
        assert!(parsed.contains(OperatingMode::FullOutdoorAir));
        assert!(!parsed.contains(OperatingMode::Economizer));
    }
}
