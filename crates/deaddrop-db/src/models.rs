//! Row mapping for the `drops` table.
//!
//! Timestamps are stored as Unix milliseconds so range filters in SQL
//! compare integers, not text.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use deaddrop_types::DropRecord;

pub const DROP_COLUMNS: &str = "id, delete_token, storage_path, original_name, mime_type, \
     declared_size, download_limit, download_count, created_at, expires_at, \
     is_password_protected, password_salt, has_preview, webhook_url";

pub fn drop_from_row(row: &Row<'_>) -> rusqlite::Result<DropRecord> {
    Ok(DropRecord {
        id: row.get(0)?,
        delete_token: row.get(1)?,
        storage_path: row.get(2)?,
        original_name: row.get(3)?,
        mime_type: row.get(4)?,
        declared_size: row.get::<_, i64>(5)? as u64,
        download_limit: row.get::<_, i64>(6)? as u32,
        download_count: row.get::<_, i64>(7)? as u32,
        created_at: millis_to_utc(8, row.get(8)?)?,
        expires_at: millis_to_utc(9, row.get(9)?)?,
        is_password_protected: row.get(10)?,
        password_salt: row.get(11)?,
        has_preview: row.get(12)?,
        webhook_url: row.get(13)?,
    })
}

pub fn utc_to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn millis_to_utc(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}
