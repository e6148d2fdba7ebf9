//! # Glucotray
//!
//! Background glucose poller for a system-tray display. Periodically pulls
//! continuous-glucose-monitor readings from a remote follower API, caches
//! the last 24 hours locally, derives a trend arrow and alert state, and
//! hands the results to a presentation layer over a channel.
//!
//! ## Modules
//!
//! - [`storage`]: SQLite reading cache with dedup and retention pruning
//! - [`analysis`]: trend estimation, hysteresis alerts, display bands, chart resampling
//! - [`source`]: the upstream API trait and its HTTP implementation
//! - [`scheduler`]: the poll loop that ties everything together
//! - [`presenter`]: messages to the tray/notification side
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use glucotray::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     config.validate()?;
//!
//!     let store = ReadingStore::open(config.storage.db_path())?;
//!     let source = HttpSource::new(config.source.to_http_config(), config.account.clone())?;
//!
//!     let (tx, rx) = presenter::channel();
//!     let scheduler = PollingScheduler::new(
//!         Arc::new(source),
//!         store,
//!         config.thresholds,
//!         config.polling.to_settings()?,
//!         tx,
//!     );
//!
//!     let wake = scheduler.wake_handle();
//!     scheduler.spawn();
//!     tokio::spawn(presenter::run_console_presenter(rx));
//!
//!     // e.g. from a resume-from-sleep hook
//!     wake.wake();
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod presenter;
pub mod scheduler;
pub mod source;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    format_timestamp, normalize_timestamp, ParseError, Reading, ReadingStore, StorageError,
    StorageResult,
};

pub use analysis::{
    classify_band, compute_trend, rate_of_change, AlertEngine, AlertEvent, AlertKind, AlertPhase,
    AlertState, Band, ChartPoint, ChartSeries, Thresholds, Trend,
};

pub use source::{
    parse_records, CredentialError, Credentials, GlucoseSource, HttpSource, HttpSourceConfig,
    ParsedBatch, RawRecord, SourceError,
};

pub use scheduler::{CycleOutcome, PollError, PollSettings, PollingScheduler, WakeHandle};

pub use presenter::{PresentationEvent, PresentationReceiver, PresentationSender, Snapshot};

pub use config::{
    generate_default_config, Config, ConfigError, LoggingConfig, PollingConfig, SourceConfig,
    StorageConfig,
};
