//! Presentation Handoff
//!
//! The poller never calls into the UI. It pushes [`PresentationEvent`]s onto
//! an unbounded channel and the presentation side (tray icon, notifications)
//! drains it on its own task.

use crate::analysis::{AlertEvent, Band, Trend};
use serde::Serialize;
use tokio::sync::mpsc;

/// Messages sent from the poller to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresentationEvent {
    /// Redraw the tray with this snapshot
    Refresh(Snapshot),
    /// Deliver a notification
    Alert(AlertEvent),
}

/// What the tray shows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct Snapshot {
    /// Latest cached value, mmol/L
    pub value: Option<f64>,
    pub trend: Trend,
    pub band: Option<Band>,
    /// Sent on wake, from cached data, before any new fetch has completed
    pub forced: bool,
}

impl Snapshot {
    pub fn new(value: f64, trend: Trend, band: Band) -> Self {
        Self {
            value: Some(value),
            trend,
            band: Some(band),
            forced: false,
        }
    }

    /// Nothing cached yet
    pub fn empty() -> Self {
        Self::default()
    }

    /// The same values, marked as a forced redraw
    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    /// Tray label, e.g. `↓ 3.8 mmol/L`
    pub fn label(&self) -> String {
        match self.value {
            Some(value) => format!("{} {:.1} mmol/L", self.trend, value),
            None => "---".to_string(),
        }
    }

    /// Tooltip text
    pub fn tooltip(&self) -> String {
        match self.value {
            Some(value) => format!("{:.1} mmol/L", value),
            None => "No data available".to_string(),
        }
    }

    /// Icon colour; blue while there is no data
    pub fn icon_color(&self) -> &'static str {
        self.band.map(|b| b.color_name()).unwrap_or("blue")
    }
}

pub type PresentationSender = mpsc::UnboundedSender<PresentationEvent>;
pub type PresentationReceiver = mpsc::UnboundedReceiver<PresentationEvent>;

/// Create the poller → presentation channel
pub fn channel() -> (PresentationSender, PresentationReceiver) {
    mpsc::unbounded_channel()
}

/// Headless presenter: logs tray updates and notifications until the poller goes away
pub async fn run_console_presenter(mut events: PresentationReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            PresentationEvent::Refresh(snapshot) => {
                tracing::info!(
                    label = %snapshot.label(),
                    color = snapshot.icon_color(),
                    forced = snapshot.forced,
                    "Tray updated"
                );
            }
            PresentationEvent::Alert(alert) => {
                tracing::warn!(title = alert.title(), "{}", alert.message());
            }
        }
    }

    tracing::debug!("Presentation channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_and_tooltip() {
        let snapshot = Snapshot::new(3.8, Trend::Down, Band::Red);
        assert_eq!(snapshot.label(), "↓ 3.8 mmol/L");
        assert_eq!(snapshot.tooltip(), "3.8 mmol/L");
        assert_eq!(snapshot.icon_color(), "red");

        let flat = Snapshot::new(7.04, Trend::Flat, Band::Green);
        assert_eq!(flat.label(), "→ 7.0 mmol/L");
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Snapshot::empty();
        assert_eq!(snapshot.label(), "---");
        assert_eq!(snapshot.tooltip(), "No data available");
        assert_eq!(snapshot.icon_color(), "blue");
        assert!(!snapshot.forced);
    }

    #[test]
    fn test_forced_keeps_cached_values() {
        let snapshot = Snapshot::new(9.1, Trend::Up, Band::Green).forced();
        assert!(snapshot.forced);
        assert_eq!(snapshot.value, Some(9.1));
        assert_eq!(snapshot.label(), "↑ 9.1 mmol/L");
    }

    #[test]
    fn test_event_serialization() {
        let event = PresentationEvent::Alert(AlertEvent::low(3.5));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "alert");
        assert_eq!(json["kind"], "low");
        assert_eq!(json["value"], 3.5);

        let event = PresentationEvent::Refresh(Snapshot::new(6.0, Trend::UpFast, Band::Green));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "refresh");
        assert_eq!(json["trend"], "up_fast");
        assert_eq!(json["band"], "green");
    }

    #[tokio::test]
    async fn test_console_presenter_drains_until_closed() {
        let (tx, rx) = channel();
        tx.send(PresentationEvent::Refresh(Snapshot::empty())).unwrap();
        tx.send(PresentationEvent::Alert(AlertEvent::high(16.0))).unwrap();
        drop(tx);

        run_console_presenter(rx).await;
    }
}
