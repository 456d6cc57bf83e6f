pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

use deaddrop_types::DropRecord;

const READER_POOL_SIZE: usize = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable home of every drop record.
///
/// The store is the only synchronization point between requests and
/// between server instances, so the budget claim is a compare-and-swap
/// here rather than a lock in the caller.
pub trait RecordStore: Send + Sync {
    fn insert(&self, record: &DropRecord) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<DropRecord>>;

    /// Increment `download_count` only if it still equals `expected_count`
    /// and the budget is not spent. Returns whether the update applied.
    fn compare_and_increment(&self, id: &str, expected_count: u32) -> Result<bool>;

    /// Returns whether a row was removed. Deleting a missing id is not an error.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Records that are expired at `now` or have spent their budget.
    fn scan_dead(&self, now: DateTime<Utc>) -> Result<Vec<DropRecord>>;
}

/// SQLite record store with a reader/writer split.
///
/// All writes go through the single writer connection; reads rotate over a
/// small pool of read-only connections (WAL keeps them from blocking).
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Drop DB opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| anyhow::anyhow!("Reader lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Writer lock poisoned: {}", e))?;
        f(&conn)
    }
}
