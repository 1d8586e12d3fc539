//! Default constants for configuration loading and preprocessing.

// ============================================================================
// Config Loading
// ============================================================================

/// Environment variable holding the path of the analysis config file.
pub const CONFIG_ENV_VAR: &str = "APAR_CONFIG";

/// Config file looked up in the current working directory.
pub const LOCAL_CONFIG_FILE: &str = "apar_config.toml";

/// Default analysis name used in logs and reports.
pub const DEFAULT_ANALYSIS_NAME: &str = "AHU";

// ============================================================================
// Preprocessing
// ============================================================================

/// Resampling window (minutes).
///
/// 15 minutes gives a transient window of 4 samples.
pub const DEFAULT_RESAMPLE_MINUTES: u32 = 15;

/// Longest run of consecutive missing samples filled by interpolation.
pub const DEFAULT_INTERPOLATION_LIMIT: usize = 5;

// ============================================================================
// Reporting
// ============================================================================

/// Fault-time share (%) above which a rule fails. 0 means any fault fails.
pub const DEFAULT_FAULT_TIME_THRESHOLD_PERCENT: f64 = 0.0;
