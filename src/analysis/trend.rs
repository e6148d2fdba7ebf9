//! Trend arrow estimation
//!
//! The rate of change is measured between the newest reading and the most
//! recent earlier reading that is at least [`TREND_LOOKBACK_MINUTES`] older.
//! Anchoring on elapsed time rather than "the previous sample" keeps
//! back-to-back near-duplicate samples from producing noisy arrows.

use crate::storage::Reading;
use serde::{Deserialize, Serialize};

/// Minimum span between the two readings a rate is computed from
pub const TREND_LOOKBACK_MINUTES: f64 = 15.0;

/// mmol/L per minute at or beyond which the trend is "fast"
pub const FAST_RATE: f64 = 0.167;

/// mmol/L per minute at or beyond which the trend is directional
pub const SLOW_RATE: f64 = 0.111;

/// Direction of recent glucose movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    #[default]
    Flat,
    Up,
    UpFast,
    Down,
    DownFast,
}

impl Trend {
    /// Classify a rate of change in mmol/L per minute
    pub fn from_rate(rate: f64) -> Self {
        if rate >= FAST_RATE {
            Trend::UpFast
        } else if rate >= SLOW_RATE {
            Trend::Up
        } else if rate <= -FAST_RATE {
            Trend::DownFast
        } else if rate <= -SLOW_RATE {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    /// Arrow shown next to the current value
    pub fn symbol(&self) -> &'static str {
        match self {
            Trend::Flat => "→",
            Trend::Up => "↑",
            Trend::UpFast => "↑↑",
            Trend::Down => "↓",
            Trend::DownFast => "↓↓",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Rate of change in mmol/L per minute, if the history spans the lookback
///
/// `points` must be ordered oldest first.
pub fn rate_of_change(points: &[Reading]) -> Option<f64> {
    let (latest, earlier) = points.split_last()?;

    let anchor = earlier
        .iter()
        .rev()
        .find(|prev| latest.minutes_since(prev) >= TREND_LOOKBACK_MINUTES)?;

    let minutes = latest.minutes_since(anchor);
    Some((latest.value() - anchor.value()) / minutes)
}

/// Trend arrow for an ascending sequence of readings
///
/// Fewer than two points, or a history shorter than the lookback, is `Flat`.
pub fn compute_trend(points: &[Reading]) -> Trend {
    rate_of_change(points)
        .map(Trend::from_rate)
        .unwrap_or(Trend::Flat)
}
