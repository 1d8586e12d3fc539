//! AHU trend data ingestion from CSV files
//!
//! Expected layout: a header row, a timestamp in the first column and one
//! numeric column per point:
//!
//! ```text
//! timestamp,sat,satsp,rat,oat,mat,cooling_sig,heating_sig,oa_dmpr_sig,fan_vfd_speed,sys_ctl
//! 2023-07-01T00:00:00Z,13.1,12.8,23.4,28.0,25.9,64.0,0,20.0,71.0,1
//! ```
//!
//! Empty cells and `nan`/`NA`/`null` become missing samples. Lines that
//! cannot be parsed are logged and skipped; rows are returned sorted by time
//! with duplicate timestamps dropped.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::AnalysisError;
use crate::types::TimeSeries;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}: no header row")]
    MissingHeader(String),

    #[error("{file}: duplicate column '{column}'")]
    DuplicateColumn { file: String, column: String },

    #[error("{0}: no parsable data rows")]
    NoRows(String),

    #[error(transparent)]
    Series(#[from] AnalysisError),
}

/// Read a trend CSV file into a `TimeSeries`.
pub fn read_csv(path: &Path) -> Result<TimeSeries, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let series = parse_csv(BufReader::new(file), &path.display().to_string())?;
    info!(
        path = %path.display(),
        rows = series.len(),
        channels = series.channels().len(),
        "Loaded AHU trend data from CSV"
    );
    Ok(series)
}

/// Parse CSV content from any buffered reader. `source` names it in logs.
pub fn parse_csv<R: BufRead>(reader: R, source: &str) -> Result<TimeSeries, IngestError> {
    let mut lines = reader.lines().enumerate();

    let columns = loop {
        match lines.next() {
            Some((_, Ok(line))) if line.trim().is_empty() => {}
            Some((_, Ok(line))) => break csv_split(line.trim_start_matches('\u{feff}')),
            Some((_, Err(e))) => {
                return Err(IngestError::Io {
                    path: PathBuf::from(source),
                    source: e,
                })
            }
            None => return Err(IngestError::MissingHeader(source.to_string())),
        }
    };
    let names: Vec<String> = columns.iter().skip(1).map(|c| c.trim().to_string()).collect();
    let mut seen = HashSet::new();
    for name in &names {
        if !seen.insert(name.as_str()) {
            return Err(IngestError::DuplicateColumn {
                file: source.to_string(),
                column: name.clone(),
            });
        }
    }

    // Keyed by timestamp so rows come out sorted; first occurrence wins.
    let mut rows: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
    let mut skipped = 0usize;
    let mut duplicates = 0usize;

    for (idx, line_result) in lines {
        let line_num = idx + 1;
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                warn!(line = line_num, error = %e, "Error reading CSV line");
                skipped += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_row(&line, names.len()) {
            Ok((timestamp, values)) => {
                if rows.contains_key(&timestamp) {
                    duplicates += 1;
                } else {
                    rows.insert(timestamp, values);
                }
            }
            Err(e) => {
                warn!(line = line_num, error = %e, "Error parsing CSV line");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!(source, skipped, "Skipped unparsable CSV lines");
    }
    if duplicates > 0 {
        warn!(source, duplicates, "Dropped rows with duplicate timestamps");
    }
    if rows.is_empty() {
        return Err(IngestError::NoRows(source.to_string()));
    }

    let timestamps: Vec<DateTime<Utc>> = rows.keys().copied().collect();
    let mut series = TimeSeries::new(timestamps)?;
    for (col, name) in names.iter().enumerate() {
        let values = rows.values().map(|r| r[col]).collect();
        series.insert_channel(name.clone(), values)?;
    }
    Ok(series)
}

fn parse_row(line: &str, expected: usize) -> Result<(DateTime<Utc>, Vec<f64>), String> {
    let fields = csv_split(line);
    if fields.len() != expected + 1 {
        return Err(format!(
            "Expected {} fields, got {}",
            expected + 1,
            fields.len()
        ));
    }
    let timestamp = parse_timestamp(&fields[0])?;
    let values = fields[1..]
        .iter()
        .map(|f| parse_value(f))
        .collect::<Result<Vec<f64>, String>>()?;
    Ok((timestamp, values))
}

// ============================================================================
// Field Parsing
// ============================================================================

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Check for escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// RFC 3339, naive `YYYY-MM-DD[ T]HH:MM:SS` (taken as UTC) or unix seconds.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();

    if let Ok(epoch) = s.parse::<i64>() {
        return DateTime::from_timestamp(epoch, 0)
            .ok_or_else(|| format!("Timestamp out of range: '{s}'"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc());
        }
    }

    Err(format!("Cannot parse timestamp: '{s}'"))
}

/// Numeric cell; blank and the usual missing markers map to `NaN`.
fn parse_value(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if s.is_empty()
        || s.eq_ignore_ascii_case("nan")
        || s.eq_ignore_ascii_case("na")
        || s.eq_ignore_ascii_case("null")
        || s == "-"
    {
        return Ok(f64::NAN);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) => Ok(f64::NAN),
        Err(_) => Err(format!("Cannot parse value as f64: '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<TimeSeries, IngestError> {
        parse_csv(Cursor::new(text), "test.csv")
    }

    #[test]
    fn test_parses_header_and_rows() {
        let series = parse(
            "timestamp,sat,oat\n\
             2023-07-01T00:15:00Z,13.0,28.0\n\
             2023-07-01 00:00:00,12.5,27.5\n",
        )
        .unwrap();
        assert_eq!(series.len(), 2);
        // Sorted by time
        assert_eq!(series.get("sat").unwrap(), &[12.5, 13.0]);
        assert_eq!(series.timestamps()[0].timestamp(), 1_688_169_600);
    }

    #[test]
    fn test_missing_markers_become_nan() {
        let series = parse("time,sat,oat,mat\n1700000100,,NA,nan\n").unwrap();
        assert!(series.get("sat").unwrap()[0].is_nan());
        assert!(series.get("oat").unwrap()[0].is_nan());
        assert!(series.get("mat").unwrap()[0].is_nan());
    }

    #[test]
    fn test_bad_lines_skipped() {
        let series = parse(
            "timestamp,sat\n\
             1700000100,12.0\n\
             not-a-time,13.0\n\
             1700001000,abc\n\
             1700001900,14.0,99\n\
             1700002800,15.0\n",
        )
        .unwrap();
        assert_eq!(series.get("sat").unwrap(), &[12.0, 15.0]);
    }

    #[test]
    fn test_duplicate_timestamps_keep_first() {
        let series = parse("timestamp,sat\n1700000100,12.0\n1700000100,99.0\n").unwrap();
        assert_eq!(series.get("sat").unwrap(), &[12.0]);
    }

    #[test]
    fn test_quoted_header_and_fields() {
        let series = parse("\"timestamp\",\"SA Temp, degC\"\n1700000100,\"12.0\"\n").unwrap();
        assert_eq!(series.get("SA Temp, degC").unwrap(), &[12.0]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse(""), Err(IngestError::MissingHeader(_))));
        assert!(matches!(
            parse("timestamp,sat,sat\n"),
            Err(IngestError::DuplicateColumn { .. })
        ));
        assert!(matches!(parse("timestamp,sat\n"), Err(IngestError::NoRows(_))));
    }
}
