//! Core data types for the glucose reading cache
//!
//! - `Reading`: a single timestamped glucose value (mmol/L)
//! - timestamp helpers shared by the store and the upstream record parser

use crate::storage::error::ParseError;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::Serialize;

/// On-disk timestamp layout. Fixed width, so lexical order is chronological order.
pub const STORED_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Formats accepted for timestamps that carry no offset; these are taken as UTC.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Highest value accepted as a real measurement, mmol/L. Sensors top out
/// well below this; anything above is a unit mix-up or a corrupt record.
pub const MAX_READING_MMOL: f64 = 50.0;

/// A single glucose measurement
///
/// Immutable once built. The value is in mmol/L, in `(0, MAX_READING_MMOL]`;
/// timestamps are kept at millisecond precision, matching what the
/// store can hold.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Reading {
    timestamp: DateTime<Utc>,
    value: f64,
}

impl Reading {
    /// Create a reading, rejecting values outside `(0, MAX_READING_MMOL]`
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Result<Self, ParseError> {
        if !(value > 0.0 && value <= MAX_READING_MMOL) {
            return Err(ParseError::InvalidValue(value));
        }

        Ok(Self {
            timestamp: timestamp.trunc_subsecs(3),
            value,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Minutes elapsed from `earlier` to this reading (negative if `earlier` is later)
    pub fn minutes_since(&self, earlier: &Reading) -> f64 {
        (self.timestamp - earlier.timestamp).num_milliseconds() as f64 / 60_000.0
    }
}

/// Render a timestamp in the store's fixed ISO-8601 layout
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(STORED_TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp previously written by [`format_timestamp`]
pub fn parse_stored_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Normalize an upstream ISO-8601-like timestamp to UTC
///
/// A trailing `Z` or an explicit offset is honoured and converted to UTC;
/// a timestamp with no offset at all is taken to already be UTC.
pub fn normalize_timestamp(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    let raw = raw.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|parsed| parsed.and_utc())
        .ok_or_else(|| ParseError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, h, m, 0).unwrap()
    }

    #[test]
    fn test_reading_rejects_non_positive_values() {
        assert!(Reading::new(at(8, 0), 5.4).is_ok());
        assert_eq!(
            Reading::new(at(8, 0), 0.0),
            Err(ParseError::InvalidValue(0.0))
        );
        assert!(Reading::new(at(8, 0), -2.0).is_err());
        assert!(Reading::new(at(8, 0), f64::NAN).is_err());
    }

    #[test]
    fn test_reading_rejects_impossible_values() {
        assert!(Reading::new(at(8, 0), MAX_READING_MMOL).is_ok());
        assert_eq!(
            Reading::new(at(8, 0), 1e7),
            Err(ParseError::InvalidValue(1e7))
        );
        // mg/dL sent where mmol/L was expected
        assert!(Reading::new(at(8, 0), 120.0).is_err());
        assert!(Reading::new(at(8, 0), f64::INFINITY).is_err());
    }

    #[test]
    fn test_reading_truncates_to_millis() {
        let ts = at(8, 0) + Duration::nanoseconds(1_234_567);
        let reading = Reading::new(ts, 6.0).unwrap();
        assert_eq!(reading.timestamp(), at(8, 0) + Duration::milliseconds(1));
    }

    #[test]
    fn test_minutes_since() {
        let earlier = Reading::new(at(8, 0), 5.0).unwrap();
        let later = Reading::new(at(8, 20), 3.8).unwrap();
        assert_eq!(later.minutes_since(&earlier), 20.0);
        assert_eq!(earlier.minutes_since(&later), -20.0);
    }

    #[test]
    fn test_normalize_strips_zulu_and_offsets() {
        assert_eq!(normalize_timestamp("2025-03-14T08:00:00Z").unwrap(), at(8, 0));
        assert_eq!(
            normalize_timestamp("2025-03-14T08:00:00+00:00").unwrap(),
            at(8, 0)
        );
        assert_eq!(
            normalize_timestamp("2025-03-14T09:00:00+01:00").unwrap(),
            at(8, 0)
        );
        assert_eq!(normalize_timestamp("2025-03-14T08:00:00").unwrap(), at(8, 0));
        assert_eq!(
            normalize_timestamp("2025-03-14T08:00:00.500").unwrap(),
            at(8, 0) + Duration::milliseconds(500)
        );
        assert_eq!(normalize_timestamp("2025-03-14 08:00:00").unwrap(), at(8, 0));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(
            normalize_timestamp("yesterday"),
            Err(ParseError::InvalidTimestamp("yesterday".to_string()))
        );
    }

    #[test]
    fn test_stored_format_is_sortable() {
        let a = format_timestamp(at(8, 0));
        let b = format_timestamp(at(8, 0) + Duration::milliseconds(5));
        let c = format_timestamp(at(10, 0));

        assert_eq!(a, "2025-03-14T08:00:00.000");
        assert!(a < b && b < c);
        assert_eq!(parse_stored_timestamp(&b), Some(at(8, 0) + Duration::milliseconds(5)));
    }
}
