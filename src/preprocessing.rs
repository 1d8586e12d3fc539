//! Dataset preprocessing
//!
//! Column-level cleaning applied before classification:
//! - percent-to-fraction rescaling of control signals (dataset-level decision)
//! - low-variance (stuck sensor) detection via sample variance (statrs)
//! - linear interpolation of short gaps
//! - fixed-window mean resampling
//! - dropping incomplete rows

use chrono::{DateTime, Duration, Utc};
use statrs::statistics::{Data, Median, Statistics};
use tracing::{error, info, warn};

use crate::error::AnalysisError;
use crate::types::TimeSeries;

/// Rescale a percent-scale column to [0,1].
///
/// If any value exceeds 1 the whole column is divided by 100. Returns
/// `true` when the column was rescaled.
pub fn normalize_01(values: &mut [f64]) -> bool {
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if max > 1.0 {
        for v in values.iter_mut() {
            *v /= 100.0;
        }
        true
    } else {
        false
    }
}

/// Return a copy of `series` with the named columns rescaled to [0,1].
///
/// Aliases not present in the table are skipped.
pub fn normalize_channels(series: &TimeSeries, aliases: &[&str]) -> TimeSeries {
    let mut out = series.clone();
    for alias in aliases {
        let Some(values) = series.get(alias) else {
            continue;
        };
        let mut values = values.to_vec();
        if normalize_01(&mut values) {
            warn!(channel = %alias, "Reducing control signal from percent to [0-1]");
            // Length is unchanged, insertion cannot fail.
            let _ = out.insert_channel(*alias, values);
        }
    }
    out
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Sample variance over the finite values (NaN with fewer than two).
pub fn finite_variance(values: &[f64]) -> f64 {
    finite(values).iter().variance()
}

/// Median over the finite values, `None` when there are none.
pub fn finite_median(values: &[f64]) -> Option<f64> {
    let data = finite(values);
    if data.is_empty() {
        return None;
    }
    Some(Data::new(data).median())
}

/// Mean over the finite values, `None` when there are none.
pub fn finite_mean(values: &[f64]) -> Option<f64> {
    let data = finite(values);
    if data.is_empty() {
        return None;
    }
    Some(data.iter().mean())
}

/// Stuck-sensor test: variance not above `threshold`.
///
/// An undefined variance (fewer than two readings) counts as low.
pub fn is_low_variance(values: &[f64], threshold: f64, channel: &str) -> bool {
    let variance = finite_variance(values);
    if variance > threshold {
        return false;
    }
    error!(
        channel = %channel,
        variance = variance,
        threshold = threshold,
        "Possible sensor freeze/stuck"
    );
    true
}

/// Linearly interpolate missing values.
///
/// A gap sample is filled when it lies within `limit` samples of a valid
/// reading on either side. Interior gaps are interpolated by position;
/// leading and trailing gaps take the nearest valid value.
pub fn interpolate_linear(values: &[f64], limit: usize) -> Vec<f64> {
    let n = values.len();
    let mut prev_valid: Vec<Option<usize>> = vec![None; n];
    let mut next_valid: Vec<Option<usize>> = vec![None; n];

    let mut last = None;
    for i in 0..n {
        if values[i].is_finite() {
            last = Some(i);
        }
        prev_valid[i] = last;
    }
    let mut next = None;
    for i in (0..n).rev() {
        if values[i].is_finite() {
            next = Some(i);
        }
        next_valid[i] = next;
    }

    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if v.is_finite() {
                return v;
            }
            let near_prev = prev_valid[i].filter(|p| i - p <= limit);
            let near_next = next_valid[i].filter(|n| n - i <= limit);
            if near_prev.is_none() && near_next.is_none() {
                return f64::NAN;
            }
            match (prev_valid[i], next_valid[i]) {
                (Some(p), Some(q)) => {
                    let frac = (i - p) as f64 / (q - p) as f64;
                    values[p] + (values[q] - values[p]) * frac
                }
                (Some(p), None) => values[p],
                (None, Some(q)) => values[q],
                (None, None) => f64::NAN,
            }
        })
        .collect()
}

/// Interpolate every channel of `series`.
pub fn interpolate_series(series: &TimeSeries, limit: usize) -> TimeSeries {
    let mut out = series.clone();
    let mut filled_channels = 0usize;
    for (name, values) in series.channels() {
        if values.iter().any(|v| !v.is_finite()) {
            filled_channels += 1;
            let _ = out.insert_channel(name.clone(), interpolate_linear(values, limit));
        }
    }
    if filled_channels > 0 {
        warn!(channels = filled_channels, limit = limit, "Linear interpolating NaN");
    }
    out
}

/// Drop rows where any of `aliases` (all channels when empty) is missing.
pub fn drop_incomplete(series: &TimeSeries, aliases: &[&str]) -> TimeSeries {
    let columns: Vec<&[f64]> = if aliases.is_empty() {
        series.channels().values().map(Vec::as_slice).collect()
    } else {
        aliases.iter().filter_map(|a| series.get(a)).collect()
    };

    let keep: Vec<bool> = (0..series.len())
        .map(|i| columns.iter().all(|c| c[i].is_finite()))
        .collect();
    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        info!(dropped = dropped, total = series.len(), "Dropping incomplete rows");
    }
    series.select_rows(&keep)
}

fn bin_start(t: DateTime<Utc>, window_secs: i64) -> i64 {
    t.timestamp().div_euclid(window_secs) * window_secs
}

/// Resample to a fixed window by averaging the finite values in each bin.
///
/// Bins are aligned on multiples of the window since the Unix epoch and
/// span the whole dataset; empty bins are kept with `NaN` values.
pub fn resample_mean(series: &TimeSeries, window: Duration) -> Result<TimeSeries, AnalysisError> {
    let window_secs = window.num_seconds();
    if window_secs <= 0 {
        return Err(AnalysisError::InvalidArgument(format!(
            "resample window must be positive, got {window}"
        )));
    }
    let (Some(first), Some(last)) = (series.timestamps().first(), series.timestamps().last())
    else {
        return Ok(series.clone());
    };

    let start = bin_start(*first, window_secs);
    let end = bin_start(*last, window_secs);
    let bins = usize::try_from((end - start) / window_secs + 1).unwrap_or(0);

    let timestamps = (0..bins)
        .map(|b| {
            DateTime::<Utc>::from_timestamp(start + b as i64 * window_secs, 0).ok_or_else(|| {
                AnalysisError::InvalidSeries("resampled timestamp out of range".to_string())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let bin_of: Vec<usize> = series
        .timestamps()
        .iter()
        .map(|t| ((bin_start(*t, window_secs) - start) / window_secs) as usize)
        .collect();

    let mut out = TimeSeries::new(timestamps)?;
    for (name, values) in series.channels() {
        let mut sums = vec![0.0; bins];
        let mut counts = vec![0usize; bins];
        for (v, b) in values.iter().zip(&bin_of) {
            if v.is_finite() {
                sums[*b] += v;
                counts[*b] += 1;
            }
        }
        let means = sums
            .iter()
            .zip(&counts)
            .map(|(s, c)| if *c == 0 { f64::NAN } else { s / *c as f64 })
            .collect();
        out.insert_channel(name.clone(), means)?;
    }

    info!(
        window_minutes = window.num_minutes(),
        rows_in = series.len(),
        rows_out = out.len(),
        "Resampled dataset"
    );
    Ok(out)
}
