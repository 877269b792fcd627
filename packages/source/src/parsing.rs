//! Shared parsing utilities for raw CSV cells.
//!
//! All parsers are total: a value that does not parse is `None`, and the
//! caller decides whether that is worth logging.

use chrono::{NaiveDate, NaiveDateTime};

/// Timestamp layout used by the crime dataset (`03/01/2020 12:00:00 AM`).
pub const OCCURRENCE_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// Parses an occurrence timestamp and keeps only its calendar date.
#[must_use]
pub fn parse_occurrence_date(s: &str) -> Option<NaiveDate> {
    NaiveDateTime::parse_from_str(s, OCCURRENCE_FORMAT)
        .ok()
        .map(|dt| dt.date())
}

/// Parses a floating-point cell.
#[must_use]
pub fn parse_f64(s: Option<&str>) -> Option<f64> {
    s?.parse::<f64>().ok()
}

/// Parses a whole-number cell.
///
/// Integral decimals such as `"512.0"` are accepted, since spreadsheet
/// exports often write counts that way. Fractional values are not.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
pub fn parse_i64(s: Option<&str>) -> Option<i64> {
    let s = s?;
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        return Some(v as i64);
    }
    None
}
