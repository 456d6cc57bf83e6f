use crate::models::{DROP_COLUMNS, drop_from_row, utc_to_millis};
use crate::{Database, RecordStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use deaddrop_types::DropRecord;

impl RecordStore for Database {
    fn insert(&self, record: &DropRecord) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO drops (
                    id, delete_token, storage_path, original_name, mime_type,
                    declared_size, download_limit, download_count, created_at, expires_at,
                    is_password_protected, password_salt, has_preview, webhook_url
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    &record.id,
                    &record.delete_token,
                    &record.storage_path,
                    &record.original_name,
                    &record.mime_type,
                    record.declared_size as i64,
                    record.download_limit as i64,
                    record.download_count as i64,
                    utc_to_millis(record.created_at),
                    utc_to_millis(record.expires_at),
                    record.is_password_protected,
                    &record.password_salt,
                    record.has_preview,
                    &record.webhook_url,
                ],
            )?;
            Ok(())
        })
    }

    fn get(&self, id: &str) -> Result<Option<DropRecord>> {
        self.with_conn(|conn| query_drop(conn, id))
    }

    fn compare_and_increment(&self, id: &str, expected_count: u32) -> Result<bool> {
        self.with_conn_mut(|conn| {
            // Single statement: the count guard is the compare, the SET is the swap.
            let changed = conn.execute(
                "UPDATE drops SET download_count = download_count + 1
                 WHERE id = ?1
                   AND download_count = ?2
                   AND (download_limit = 0 OR download_count < download_limit)",
                rusqlite::params![id, expected_count as i64],
            )?;
            Ok(changed == 1)
        })
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM drops WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    fn scan_dead(&self, now: DateTime<Utc>) -> Result<Vec<DropRecord>> {
        self.with_conn(|conn| query_dead(conn, now))
    }
}

fn query_drop(conn: &Connection, id: &str) -> Result<Option<DropRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM drops WHERE id = ?1", DROP_COLUMNS))?;
    let row = stmt.query_row([id], drop_from_row).optional()?;
    Ok(row)
}

fn query_dead(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<DropRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM drops
         WHERE expires_at < ?1
            OR (download_limit > 0 AND download_count >= download_limit)
         ORDER BY expires_at",
        DROP_COLUMNS
    ))?;

    let rows = stmt
        .query_map([utc_to_millis(now)], drop_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SubsecRound};
    use tempfile::TempDir;

    fn open_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("drops.db")).unwrap();
        (dir, db)
    }

    fn record(id: &str, limit: u32, expires_in: Duration) -> DropRecord {
        let now = Utc::now().trunc_subsecs(3);
        DropRecord {
            id: id.to_string(),
            delete_token: format!("token-{}", id),
            storage_path: format!("drops/{}", id),
            original_name: "notes.txt".into(),
            mime_type: "text/plain".into(),
            declared_size: 42,
            download_limit: limit,
            download_count: 0,
            created_at: now,
            expires_at: now + expires_in,
            is_password_protected: true,
            password_salt: Some("c2FsdHNhbHRzYWx0c2FsdA==".into()),
            has_preview: true,
            webhook_url: Some("https://hooks.example/drop".into()),
        }
    }

    #[test]
    fn insert_then_get_roundtrip() {
        let (_dir, db) = open_db();
        let r = record("d1", 2, Duration::hours(24));
        db.insert(&r).unwrap();

        assert_eq!(db.get("d1").unwrap(), Some(r));
        assert_eq!(db.get("missing").unwrap(), None);
    }

    #[test]
    fn duplicate_id_rejected() {
        let (_dir, db) = open_db();
        let r = record("d1", 1, Duration::hours(1));
        db.insert(&r).unwrap();
        assert!(db.insert(&r).is_err());
    }

    #[test]
    fn stale_count_loses_the_swap() {
        let (_dir, db) = open_db();
        db.insert(&record("d1", 3, Duration::hours(1))).unwrap();

        assert!(db.compare_and_increment("d1", 0).unwrap());
        // A second caller that also observed 0 must not succeed.
        assert!(!db.compare_and_increment("d1", 0).unwrap());
        assert!(db.compare_and_increment("d1", 1).unwrap());

        assert_eq!(db.get("d1").unwrap().unwrap().download_count, 2);
    }

    #[test]
    fn increment_never_passes_the_limit() {
        let (_dir, db) = open_db();
        db.insert(&record("d1", 1, Duration::hours(1))).unwrap();

        assert!(db.compare_and_increment("d1", 0).unwrap());
        assert!(!db.compare_and_increment("d1", 1).unwrap());
        assert_eq!(db.get("d1").unwrap().unwrap().download_count, 1);
    }

    #[test]
    fn unlimited_keeps_counting() {
        let (_dir, db) = open_db();
        db.insert(&record("d1", 0, Duration::hours(1))).unwrap();
        for n in 0..5 {
            assert!(db.compare_and_increment("d1", n).unwrap());
        }
        assert_eq!(db.get("d1").unwrap().unwrap().download_count, 5);
    }

    #[test]
    fn increment_on_missing_row_is_false() {
        let (_dir, db) = open_db();
        assert!(!db.compare_and_increment("ghost", 0).unwrap());
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, db) = open_db();
        db.insert(&record("d1", 1, Duration::hours(1))).unwrap();
        assert!(db.delete("d1").unwrap());
        assert!(!db.delete("d1").unwrap());
    }

    #[test]
    fn scan_finds_expired_and_exhausted_only() {
        let (_dir, db) = open_db();
        db.insert(&record("live", 1, Duration::hours(1))).unwrap();
        db.insert(&record("old", 1, Duration::hours(-1))).unwrap();
        db.insert(&record("spent", 1, Duration::hours(1))).unwrap();
        db.insert(&record("unlimited", 0, Duration::hours(1))).unwrap();
        db.compare_and_increment("spent", 0).unwrap();
        db.compare_and_increment("unlimited", 0).unwrap();

        let mut ids: Vec<String> = db
            .scan_dead(Utc::now())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["old".to_string(), "spent".to_string()]);
    }

    #[test]
    fn reopening_keeps_schema_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drops.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert(&record("d1", 1, Duration::hours(1))).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.get("d1").unwrap().is_some());
    }
}
