//! Low/high glucose alerting with hysteresis
//!
//! An alert fires once when the value leaves the `[low, high]` range and is
//! re-armed only after a value back inside that range is seen. The state is
//! an explicit [`AlertState`] owned by the caller, one per monitored account.

use crate::analysis::thresholds::Thresholds;
use serde::{Deserialize, Serialize};

/// Which threshold was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Low,
    High,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Low => write!(f, "low"),
            AlertKind::High => write!(f, "high"),
        }
    }
}

/// An alert to be delivered to the notification collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    /// The value that triggered the alert, mmol/L
    pub value: f64,
}

impl AlertEvent {
    pub fn low(value: f64) -> Self {
        Self {
            kind: AlertKind::Low,
            value,
        }
    }

    pub fn high(value: f64) -> Self {
        Self {
            kind: AlertKind::High,
            value,
        }
    }

    /// Notification title
    pub fn title(&self) -> &'static str {
        match self.kind {
            AlertKind::Low => "Low Glucose Alert",
            AlertKind::High => "High Glucose Alert",
        }
    }

    /// Notification body
    pub fn message(&self) -> String {
        format!("Glucose {}: {:.1} mmol/L", self.kind, self.value)
    }
}

/// Decoded view of an [`AlertState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    Normal,
    LowAlerted,
    HighAlerted,
}

/// Alert flags for one monitored account
///
/// The flags are never both set; only [`AlertEngine::evaluate`] mutates them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    low_alerted: bool,
    high_alerted: bool,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn low_alerted(&self) -> bool {
        self.low_alerted
    }

    pub fn high_alerted(&self) -> bool {
        self.high_alerted
    }

    pub fn phase(&self) -> AlertPhase {
        match (self.low_alerted, self.high_alerted) {
            (true, _) => AlertPhase::LowAlerted,
            (false, true) => AlertPhase::HighAlerted,
            (false, false) => AlertPhase::Normal,
        }
    }

    fn enter(&mut self, phase: AlertPhase) {
        self.low_alerted = phase == AlertPhase::LowAlerted;
        self.high_alerted = phase == AlertPhase::HighAlerted;
    }
}

/// Colour classification of a value for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Red,
    Yellow,
    Green,
}

impl Band {
    pub fn color_name(&self) -> &'static str {
        match self {
            Band::Red => "red",
            Band::Yellow => "yellow",
            Band::Green => "green",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.color_name())
    }
}

/// Stateless band classification, independent of any alert state
pub fn classify_band(thresholds: &Thresholds, value: f64) -> Band {
    if value < thresholds.low || value > thresholds.high {
        Band::Red
    } else if value < thresholds.normal_min || value > thresholds.normal_max {
        Band::Yellow
    } else {
        Band::Green
    }
}

/// Hysteresis alert classifier
#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    thresholds: Thresholds,
}

impl AlertEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Evaluate one value, returning the alert to deliver, if any
    ///
    /// The branches are checked in order and only the first match applies.
    /// The high branch looks only at `high_alerted`, so a direct jump from a
    /// low alert to above `high` fires a high alert without passing through
    /// the normal range first.
    pub fn evaluate(&self, state: &mut AlertState, value: f64) -> Option<AlertEvent> {
        let t = &self.thresholds;

        if value < t.low && !state.low_alerted {
            state.enter(AlertPhase::LowAlerted);
            Some(AlertEvent::low(value))
        } else if value > t.high && !state.high_alerted {
            state.enter(AlertPhase::HighAlerted);
            Some(AlertEvent::high(value))
        } else {
            if t.in_range(value) {
                state.enter(AlertPhase::Normal);
            }
            None
        }
    }

    pub fn classify(&self, value: f64) -> Band {
        classify_band(&self.thresholds, value)
    }
}
