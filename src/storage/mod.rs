//! Glucose Reading Storage
//!
//! This module provides the local time-series cache:
//!
//! - **types**: `Reading` and timestamp normalization
//! - **store**: SQLite-backed `ReadingStore` (ingest, prune, range queries)
//! - **error**: Error types
//!
//! # Lifecycle
//!
//! ```text
//! fetch → ingest (dedup by timestamp) → prune(retention) → query_range(window)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::{Duration, Utc};
//! use glucotray::storage::{Reading, ReadingStore};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = ReadingStore::open("./glucose.db")?;
//!
//!     store.ingest(&[Reading::new(Utc::now(), 6.2)?])?;
//!     store.prune(Duration::hours(24))?;
//!
//!     let last_day = store.query_range(Duration::hours(24))?;
//!     println!("{} readings cached", last_day.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod store;
pub mod types;

pub use error::{ParseError, StorageError, StorageResult};
pub use store::ReadingStore;
pub use types::{format_timestamp, normalize_timestamp, Reading, MAX_READING_MMOL};
