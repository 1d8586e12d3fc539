//! Mode-Exclusion / Transient-Suppression Filter
//!
//! Masks a raw per-sample fault series in two steps:
//! 1. keep faults only in the rule's applicable modes (`ALL` means not `OFF`)
//! 2. zero faults while the operating mode has changed within the trailing
//!    settling window (one hour of samples at the dataset cadence)
//!
//! The filter never raises a flag; masked flags are always <= raw flags.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{ModeApplicability, OperatingMode};

/// Cadence is rounded up to a multiple of this many minutes.
pub const CADENCE_GRAIN_MINUTES: i64 = 5;
/// Settling horizon after a mode change.
pub const TRANSIENT_HORIZON_MINUTES: i64 = 60;

// ============================================================================
// Transient Window
// ============================================================================

/// Largest inter-sample gap, rounded up to the cadence grain.
///
/// Never less than one grain; one grain with fewer than two samples.
pub fn sampling_cadence(timestamps: &[DateTime<Utc>]) -> Duration {
    let grain_secs = CADENCE_GRAIN_MINUTES * 60;
    let max_gap_secs = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds())
        .max()
        .unwrap_or(0);
    let grains = (max_gap_secs + grain_secs - 1).div_euclid(grain_secs).max(1);
    Duration::seconds(grains * grain_secs)
}

/// Number of trailing samples inspected for a mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientWindow {
    pub cadence_minutes: i64,
    pub samples: usize,
}

impl TransientWindow {
    pub fn from_cadence(cadence: Duration) -> Self {
        let cadence_minutes = cadence.num_minutes().max(CADENCE_GRAIN_MINUTES);
        let samples = usize::try_from(TRANSIENT_HORIZON_MINUTES / cadence_minutes)
            .unwrap_or(0)
            .max(1);
        Self {
            cadence_minutes,
            samples,
        }
    }

    pub fn from_timestamps(timestamps: &[DateTime<Utc>]) -> Self {
        Self::from_cadence(sampling_cadence(timestamps))
    }
}

/// `true` at sample `i` when the mode changed anywhere in `(i - window, i]`.
///
/// No change is recorded at the first sample: there is no previous mode to
/// differ from, so the start of the dataset is not treated as a switch and
/// sample `window - 1` is flagged only for a real change inside the first
/// window. Samples whose window is not yet complete (`i < window - 1`) are
/// never flagged.
pub fn mode_switch_flags(modes: &[OperatingMode], window: usize) -> Vec<bool> {
    let window = window.max(1);
    // changes_upto[k] = number of changes at positions < k
    let mut changes_upto = Vec::with_capacity(modes.len() + 1);
    changes_upto.push(0usize);
    for j in 0..modes.len() {
        let changed = j > 0 && modes[j] != modes[j - 1];
        changes_upto.push(changes_upto[j] + usize::from(changed));
    }

    (0..modes.len())
        .map(|i| {
            if i + 1 < window {
                return false;
            }
            let start = i + 1 - window;
            changes_upto[i + 1] - changes_upto[start] > 0
        })
        .collect()
}

// ============================================================================
// Filter
// ============================================================================

/// Masked fault series with bookkeeping of what was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionResult {
    pub flags: Vec<u8>,
    /// Per-sample mode-change flag; `None` when unmasked
    pub mode_switch: Option<Vec<bool>>,
    /// `false` when no operating-mode column was available
    pub masked: bool,
    pub window: Option<TransientWindow>,
    /// Raw faults removed because the mode is outside the applicable set
    pub excluded_by_mode: usize,
    /// Raw faults removed inside the settling window
    pub suppressed_by_transient: usize,
}

pub struct ModeExclusionFilter;

impl ModeExclusionFilter {
    /// Mask `raw` by operating mode and transient window.
    ///
    /// With no mode column the raw flags are returned unchanged and the
    /// result is marked unmasked.
    pub fn apply(
        raw: &[u8],
        modes: Option<&[OperatingMode]>,
        applicability: &ModeApplicability,
        timestamps: &[DateTime<Utc>],
    ) -> ExclusionResult {
        let Some(modes) = modes else {
            warn!("No operating mode column, fault flags are not mode-masked");
            return ExclusionResult {
                flags: raw.to_vec(),
                mode_switch: None,
                masked: false,
                window: None,
                excluded_by_mode: 0,
                suppressed_by_transient: 0,
            };
        };

        let window = TransientWindow::from_timestamps(timestamps);
        let switch = mode_switch_flags(modes, window.samples);

        let mut excluded_by_mode = 0;
        let mut suppressed_by_transient = 0;
        let flags = raw
            .iter()
            .zip(modes)
            .zip(&switch)
            .map(|((&fault, &mode), &changed)| {
                if fault == 0 {
                    0
                } else if !applicability.contains(mode) {
                    excluded_by_mode += 1;
                    0
                } else if changed {
                    suppressed_by_transient += 1;
                    0
                } else {
                    1
                }
            })
            .collect();

        debug!(
            cadence_minutes = window.cadence_minutes,
            window_samples = window.samples,
            excluded_by_mode = excluded_by_mode,
            suppressed_by_transient = suppressed_by_transient,
            "Mode exclusion applied"
        );

        ExclusionResult {
            flags,
            mode_switch: Some(switch),
            masked: true,
            window: Some(window),
            excluded_by_mode,
            suppressed_by_transient,
        }
    }
}
