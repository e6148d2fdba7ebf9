//! Polling Scheduler
//!
//! One long-lived task that logs in, fetches the trailing window of
//! readings, caches them, and hands snapshots and alerts to the
//! presentation channel. It is the only writer to the [`ReadingStore`]
//! and the only owner of the [`AlertState`].
//!
//! Between cycles it sleeps for the poll interval plus random jitter.
//! A [`WakeHandle`] cuts the sleep short: the cached snapshot is re-sent
//! as a forced refresh and the next cycle starts immediately.

use crate::analysis::{compute_trend, AlertEngine, AlertKind, AlertState, Thresholds};
use crate::presenter::{PresentationEvent, PresentationSender, Snapshot};
use crate::source::{parse_records, GlucoseSource, SourceError};
use crate::storage::{ReadingStore, StorageError, StorageResult};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Timing and window settings for the poll loop
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Base sleep between cycles
    pub interval: Duration,
    /// Sleep is randomised by up to this much either way
    pub jitter: Duration,
    /// Sleep after a failed login or account lookup
    pub retry_delay: Duration,
    /// How far back each fetch reaches
    pub fetch_window: chrono::Duration,
    /// How much history the cache keeps, relative to its newest reading
    pub retention: chrono::Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            jitter: Duration::from_secs(30),
            retry_delay: Duration::from_secs(60),
            fetch_window: chrono::Duration::hours(24),
            retention: chrono::Duration::hours(24),
        }
    }
}

/// Non-blocking "poll now" signal
///
/// Holds at most one pending wake: several wakes before the scheduler
/// next sleeps collapse into one.
#[derive(Debug, Clone, Default)]
pub struct WakeHandle {
    notify: Arc<Notify>,
}

impl WakeHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an immediate cycle. Safe to call from any thread or task.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Sleep for `delay`; returns true if a wake cut it short
    async fn sleep_or_wake(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.notify.notified() => true,
        }
    }
}

/// Errors inside one poll cycle. None of them stop the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Fetch window out of range: {0}")]
    WindowOutOfRange(chrono::Duration),
}

/// What a single cycle ended with
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Login or account lookup failed; retry after the retry delay
    AuthRetry,
    /// Fetch or storage failed; try again next interval
    Failed,
    /// Nothing usable came back
    NoData,
    /// The cache was updated and a refresh was published
    Updated {
        value: f64,
        inserted: usize,
        alert: Option<AlertKind>,
    },
}

/// Drives fetch → store → analyse → publish
pub struct PollingScheduler {
    source: Arc<dyn GlucoseSource>,
    store: ReadingStore,
    engine: AlertEngine,
    alert_state: AlertState,
    settings: PollSettings,
    presenter: PresentationSender,
    wake: WakeHandle,
    account_id: Option<String>,
    snapshot: Snapshot,
}

impl PollingScheduler {
    pub fn new(
        source: Arc<dyn GlucoseSource>,
        store: ReadingStore,
        thresholds: Thresholds,
        settings: PollSettings,
        presenter: PresentationSender,
    ) -> Self {
        Self {
            source,
            store,
            engine: AlertEngine::new(thresholds),
            alert_state: AlertState::new(),
            settings,
            presenter,
            wake: WakeHandle::new(),
            account_id: None,
            snapshot: Snapshot::empty(),
        }
    }

    /// Handle for OS signal handlers (resume, unlock) to request a poll
    pub fn wake_handle(&self) -> WakeHandle {
        self.wake.clone()
    }

    /// Last published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }

    pub fn alert_state(&self) -> AlertState {
        self.alert_state
    }

    /// Run one cycle, logging any failure
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match self.poll().await {
            Ok(outcome) => outcome,
            Err(PollError::Auth(reason)) => {
                tracing::warn!(
                    source = self.source.name(),
                    retry_secs = self.settings.retry_delay.as_secs(),
                    "Login failed: {}",
                    reason
                );
                CycleOutcome::AuthRetry
            }
            Err(e) => {
                tracing::error!(source = self.source.name(), error = %e, "Poll cycle failed");
                CycleOutcome::Failed
            }
        }
    }

    /// Loop forever. Only process shutdown (or aborting the task) stops it.
    pub async fn run(mut self) {
        tracing::info!(
            source = self.source.name(),
            interval_secs = self.settings.interval.as_secs(),
            "Polling scheduler started"
        );

        let wake = self.wake.clone();

        loop {
            let delay = match self.run_cycle().await {
                CycleOutcome::AuthRetry => self.settings.retry_delay,
                _ => jittered(self.settings.interval, self.settings.jitter),
            };

            tracing::debug!(delay_ms = delay.as_millis() as u64, "Sleeping until next poll");

            if wake.sleep_or_wake(delay).await {
                tracing::info!("Wake requested, polling now");
                self.publish(PresentationEvent::Refresh(self.snapshot.forced()));
            }
        }
    }

    /// Start the scheduler on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn poll(&mut self) -> Result<CycleOutcome, PollError> {
        let account_id = self.ensure_session().await?;

        let window = self.settings.fetch_window;
        let now = Utc::now();
        let from = now
            .checked_sub_signed(window)
            .ok_or(PollError::WindowOutOfRange(window))?;

        let records = self
            .source
            .fetch_readings(&account_id, from, now)
            .await?;

        let batch = parse_records(&records);
        tracing::debug!(
            received = records.len(),
            valid = batch.readings.len(),
            skipped = batch.skipped,
            "Fetched readings"
        );

        if batch.readings.is_empty() {
            tracing::info!("No valid readings in fetch window");
            return Ok(CycleOutcome::NoData);
        }

        let store = &mut self.store;
        let retention = self.settings.retention;
        let (inserted, recent) = blocking(|| -> StorageResult<_> {
            let inserted = store.ingest(&batch.readings)?;
            store.prune(retention)?;
            Ok((inserted, store.query_range(retention)?))
        })?;

        let Some(latest) = recent.last() else {
            return Ok(CycleOutcome::NoData);
        };

        let value = latest.value();
        let trend = compute_trend(&recent);
        let alert = self.engine.evaluate(&mut self.alert_state, value);
        let band = self.engine.classify(value);

        self.snapshot = Snapshot::new(value, trend, band);
        self.publish(PresentationEvent::Refresh(self.snapshot));

        if let Some(event) = alert {
            tracing::info!(kind = ?event.kind, value, "Glucose alert");
            self.publish(PresentationEvent::Alert(event));
        }

        tracing::info!(
            value,
            trend = %trend,
            band = band.color_name(),
            inserted,
            "Poll cycle complete"
        );

        Ok(CycleOutcome::Updated {
            value,
            inserted,
            alert: alert.map(|event| event.kind),
        })
    }

    /// Log in and resolve the account when either is missing
    async fn ensure_session(&mut self) -> Result<String, PollError> {
        if self.source.is_authenticated() {
            if let Some(id) = &self.account_id {
                return Ok(id.clone());
            }
        }

        self.source
            .login()
            .await
            .map_err(|e| PollError::Auth(e.to_string()))?;

        let id = self
            .source
            .resolve_account_id()
            .await
            .map_err(|e| PollError::Auth(e.to_string()))?
            .ok_or_else(|| PollError::Auth("no account visible to this login".into()))?;

        tracing::info!(account_id = %id, "Resolved account");
        self.account_id = Some(id.clone());
        Ok(id)
    }

    fn publish(&self, event: PresentationEvent) {
        if self.presenter.send(event).is_err() {
            tracing::debug!("Presentation channel closed, event dropped");
        }
    }
}

/// `interval` shifted by a uniform offset in `[-jitter, +jitter]`
fn jittered(interval: Duration, jitter: Duration) -> Duration {
    let interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
    let jitter_ms = i64::try_from(jitter.as_millis()).unwrap_or(i64::MAX);
    let offset = rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);
    let millis = interval_ms.saturating_add(offset).max(0);
    Duration::from_millis(millis as u64)
}

/// Run SQLite work in place, handing the worker thread off first on a
/// multi-threaded runtime
fn blocking<R>(work: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(work),
        _ => work(),
    }
}
