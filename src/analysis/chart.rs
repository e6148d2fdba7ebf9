//! Chart series for the 24h history view
//!
//! Readings arrive at irregular intervals, so the history is resampled into
//! fixed buckets (bucket mean), and empty buckets between the first and last
//! populated bucket are filled by linear interpolation.

use crate::storage::Reading;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default bucket width
pub const CHART_STEP_MINUTES: i64 = 5;

/// Lowest labelled y tick, mmol/L
const Y_TICK_START: u32 = 2;

/// One resampled point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    /// Start of the bucket
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// True when the bucket had no readings and the value was interpolated
    pub interpolated: bool,
}

/// Data needed to draw the history chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub points: Vec<ChartPoint>,
    /// Upper y limit: the highest raw reading rounded up
    pub y_max: f64,
    /// Whole-unit y ticks from 2 up to `y_max`
    pub y_ticks: Vec<u32>,
}

impl ChartSeries {
    /// Build a series from ascending readings; `None` when there is nothing to draw
    pub fn build(readings: &[Reading], step: Duration) -> Option<Self> {
        if readings.is_empty() {
            return None;
        }

        let step_ms = match step.num_milliseconds() {
            ms if ms > 0 => ms,
            _ => CHART_STEP_MINUTES * 60_000,
        };

        let mut buckets: BTreeMap<i64, (f64, u32)> = BTreeMap::new();
        for reading in readings {
            let bucket = reading.timestamp().timestamp_millis().div_euclid(step_ms);
            let entry = buckets.entry(bucket).or_insert((0.0, 0));
            entry.0 += reading.value();
            entry.1 += 1;
        }

        let means: Vec<(i64, f64)> = buckets
            .into_iter()
            .map(|(bucket, (sum, count))| (bucket, sum / count as f64))
            .collect();

        let mut points = Vec::new();
        for pair in means.windows(2) {
            let (b0, v0) = pair[0];
            let (b1, v1) = pair[1];

            points.extend(bucket_point(b0, step_ms, v0, false));
            for b in (b0 + 1)..b1 {
                let frac = (b - b0) as f64 / (b1 - b0) as f64;
                points.extend(bucket_point(b, step_ms, v0 + (v1 - v0) * frac, true));
            }
        }
        if let Some(&(b, v)) = means.last() {
            points.extend(bucket_point(b, step_ms, v, false));
        }

        let peak = readings
            .iter()
            .map(|r| r.value())
            .fold(f64::NEG_INFINITY, f64::max);
        let y_max = peak.ceil();
        let y_ticks = (Y_TICK_START..=y_max as u32).collect();

        Some(Self {
            points,
            y_max,
            y_ticks,
        })
    }

    /// Default 5-minute resampling
    pub fn five_minute(readings: &[Reading]) -> Option<Self> {
        Self::build(readings, Duration::minutes(CHART_STEP_MINUTES))
    }
}

fn bucket_point(bucket: i64, step_ms: i64, value: f64, interpolated: bool) -> Option<ChartPoint> {
    DateTime::<Utc>::from_timestamp_millis(bucket * step_ms).map(|timestamp| ChartPoint {
        timestamp,
        value,
        interpolated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{parse_records, RawRecord};
    use crate::storage::types::MAX_READING_MMOL;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn at(minutes: i64, value: f64) -> Reading {
        Reading::new(t0() + Duration::minutes(minutes), value).unwrap()
    }

    #[test]
    fn test_empty_history_has_no_chart() {
        assert!(ChartSeries::five_minute(&[]).is_none());
    }

    #[test]
    fn test_readings_in_same_bucket_are_averaged() {
        let series = ChartSeries::five_minute(&[at(0, 5.0), at(2, 6.0), at(4, 7.0)]).unwrap();

        assert_eq!(series.points.len(), 1);
        assert_eq!(series.points[0].timestamp, t0());
        assert_eq!(series.points[0].value, 6.0);
        assert!(!series.points[0].interpolated);
    }

    #[test]
    fn test_gaps_are_interpolated() {
        // 20-minute gap: buckets at 5, 10 and 15 are missing
        let series = ChartSeries::five_minute(&[at(0, 4.0), at(20, 8.0)]).unwrap();

        let values: Vec<f64> = series.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![4.0, 5.0, 6.0, 7.0, 8.0]);

        let filled: Vec<bool> = series.points.iter().map(|p| p.interpolated).collect();
        assert_eq!(filled, vec![false, true, true, true, false]);

        assert_eq!(series.points[2].timestamp, t0() + Duration::minutes(10));
    }

    #[test]
    fn test_y_axis_uses_whole_unit_ticks() {
        let series = ChartSeries::five_minute(&[at(0, 4.2), at(5, 9.3)]).unwrap();

        assert_eq!(series.y_max, 10.0);
        assert_eq!(series.y_ticks, vec![2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_low_peak_has_no_ticks_below_start() {
        let series = ChartSeries::five_minute(&[at(0, 1.2)]).unwrap();
        assert_eq!(series.y_max, 2.0);
        assert_eq!(series.y_ticks, vec![2]);
    }

    #[test]
    fn test_tick_count_is_bounded_by_highest_valid_reading() {
        let records = [
            RawRecord::new("2025-06-01T12:00:00Z", 6.0),
            RawRecord::new("2025-06-01T12:05:00Z", 1e7),
        ];
        let batch = parse_records(&records);
        assert_eq!(batch.readings.len(), 1);
        assert_eq!(batch.skipped, 1);

        let series = ChartSeries::five_minute(&[at(0, 6.0), at(5, MAX_READING_MMOL)]).unwrap();
        assert_eq!(series.y_max, 50.0);
        assert_eq!(series.y_ticks.len(), 49);
    }
}
