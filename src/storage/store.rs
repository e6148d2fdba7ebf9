//! Reading Store - SQLite-backed cache of recent glucose readings
//!
//! One table, keyed by timestamp:
//!
//! ```text
//! readings(timestamp TEXT PRIMARY KEY, value REAL NOT NULL)
//! ```
//!
//! Timestamps are stored as fixed-width ISO-8601 UTC strings, so range
//! queries and ordering run directly on the primary key.
//!
//! Ingestion and pruning are separate operations: `ingest` never deletes,
//! and the caller decides when to `prune`.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{format_timestamp, parse_stored_timestamp, Reading};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

/// SQLite-backed reading cache
///
/// Single writer: the polling scheduler owns the store. Other readers
/// (the `history` command) open their own connection.
pub struct ReadingStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl ReadingStore {
    /// Create or open a store at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Self::init(conn, Some(path))
    }

    /// Create a throwaway store that lives only as long as the value
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS readings (
                timestamp TEXT PRIMARY KEY,
                value REAL NOT NULL
            )",
            [],
        )?;

        Ok(Self { conn, path })
    }

    /// Backing file, or `None` for an in-memory store
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert readings, returning how many timestamps were new
    ///
    /// A timestamp that is already stored is not duplicated; its value is
    /// overwritten by the incoming one (last write wins, also within a batch).
    pub fn ingest(&mut self, readings: &[Reading]) -> StorageResult<usize> {
        if readings.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO readings (timestamp, value) VALUES (?1, ?2)",
            )?;
            let mut overwrite =
                tx.prepare_cached("UPDATE readings SET value = ?2 WHERE timestamp = ?1")?;

            for reading in readings {
                let timestamp = format_timestamp(reading.timestamp());
                if insert.execute(params![timestamp, reading.value()])? == 1 {
                    inserted += 1;
                } else {
                    overwrite.execute(params![timestamp, reading.value()])?;
                }
            }
        }

        tx.commit()?;

        tracing::debug!(received = readings.len(), inserted, "Ingested readings");
        Ok(inserted)
    }

    /// Delete readings older than `retention` before the newest stored reading
    ///
    /// Returns the number of rows removed. No-op on an empty store.
    pub fn prune(&mut self, retention: Duration) -> StorageResult<usize> {
        let Some(latest) = self.latest()? else {
            return Ok(0);
        };

        let cutoff = latest
            .timestamp()
            .checked_sub_signed(retention)
            .ok_or(StorageError::WindowOutOfRange(retention))?;
        let cutoff = format_timestamp(cutoff);
        let removed = self
            .conn
            .execute("DELETE FROM readings WHERE timestamp < ?1", params![cutoff])?;

        if removed > 0 {
            tracing::debug!(removed, cutoff = %cutoff, "Pruned expired readings");
        }

        Ok(removed)
    }

    /// All readings from the last `window`, relative to the wall clock, oldest first
    pub fn query_range(&self, window: Duration) -> StorageResult<Vec<Reading>> {
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .ok_or(StorageError::WindowOutOfRange(window))?;
        self.query_since(cutoff)
    }

    /// All readings at or after `cutoff`, oldest first
    pub fn query_since(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Reading>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT timestamp, value FROM readings
             WHERE timestamp >= ?1
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map(params![format_timestamp(cutoff)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut readings = Vec::new();
        for row in rows {
            let (timestamp, value) = row?;
            match decode_row(&timestamp, value) {
                Some(reading) => readings.push(reading),
                None => {
                    tracing::warn!(timestamp = %timestamp, value, "Skipping undecodable row");
                }
            }
        }

        Ok(readings)
    }

    /// The most recent reading, if any
    pub fn latest(&self) -> StorageResult<Option<Reading>> {
        let row = self
            .conn
            .query_row(
                "SELECT timestamp, value FROM readings ORDER BY timestamp DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )
            .optional()?;

        Ok(row.and_then(|(timestamp, value)| decode_row(&timestamp, value)))
    }

    /// Number of stored readings
    pub fn len(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn decode_row(timestamp: &str, value: f64) -> Option<Reading> {
    let timestamp = parse_stored_timestamp(timestamp)?;
    Reading::new(timestamp, value).ok()
}
