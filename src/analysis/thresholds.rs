//! Glucose thresholds (mmol/L).
//!
//! The defaults are compile-time constants with ordering assertions; a
//! [`Thresholds`] value carries the effective set, which may come from
//! the config file.

use serde::{Deserialize, Serialize};

/// Below this a low alert fires and the band is RED.
pub const LOW_THRESHOLD: f64 = 4.0;

/// Lower edge of the GREEN band. 4.0-5.0 is YELLOW.
pub const NORMAL_MIN: f64 = 5.0;

/// Upper edge of the GREEN band. 10.0-15.0 is YELLOW.
pub const NORMAL_MAX: f64 = 10.0;

/// Above this a high alert fires and the band is RED.
pub const HIGH_THRESHOLD: f64 = 15.0;

const _: () = assert!(LOW_THRESHOLD < NORMAL_MIN);
const _: () = assert!(NORMAL_MIN < NORMAL_MAX);
const _: () = assert!(NORMAL_MAX < HIGH_THRESHOLD);

/// Effective threshold set used by alerting and band classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_low")]
    pub low: f64,
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_normal_min")]
    pub normal_min: f64,
    #[serde(default = "default_normal_max")]
    pub normal_max: f64,
}

fn default_low() -> f64 {
    LOW_THRESHOLD
}

fn default_high() -> f64 {
    HIGH_THRESHOLD
}

fn default_normal_min() -> f64 {
    NORMAL_MIN
}

fn default_normal_max() -> f64 {
    NORMAL_MAX
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: LOW_THRESHOLD,
            high: HIGH_THRESHOLD,
            normal_min: NORMAL_MIN,
            normal_max: NORMAL_MAX,
        }
    }
}

impl Thresholds {
    /// `low < normal_min < normal_max < high`, all finite and positive
    pub fn is_ordered(&self) -> bool {
        let all = [self.low, self.normal_min, self.normal_max, self.high];
        all.iter().all(|v| v.is_finite() && *v > 0.0)
            && self.low < self.normal_min
            && self.normal_min < self.normal_max
            && self.normal_max < self.high
    }

    /// Inside the alert-free range `[low, high]` (inclusive)
    pub fn in_range(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_ordered() {
        assert!(Thresholds::default().is_ordered());
    }

    #[test]
    fn test_misordered_thresholds_rejected() {
        let swapped = Thresholds {
            low: 6.0,
            ..Thresholds::default()
        };
        assert!(!swapped.is_ordered());

        let negative = Thresholds {
            low: -1.0,
            ..Thresholds::default()
        };
        assert!(!negative.is_ordered());
    }

    #[test]
    fn test_in_range_is_inclusive() {
        let t = Thresholds::default();
        assert!(t.in_range(4.0));
        assert!(t.in_range(15.0));
        assert!(!t.in_range(3.99));
        assert!(!t.in_range(15.01));
    }
}
