//! Analysis over cached readings
//!
//! - **trend**: trend arrow from the rate of change over a 15-minute lookback
//! - **alert**: low/high hysteresis alerts and display band classification
//! - **thresholds**: the glucose limits both of the above are driven by
//! - **chart**: resampled series for the history chart

pub mod alert;
pub mod chart;
pub mod thresholds;
pub mod trend;

pub use alert::{classify_band, AlertEngine, AlertEvent, AlertKind, AlertPhase, AlertState, Band};
pub use chart::{ChartPoint, ChartSeries};
pub use thresholds::Thresholds;
pub use trend::{compute_trend, rate_of_change, Trend};
