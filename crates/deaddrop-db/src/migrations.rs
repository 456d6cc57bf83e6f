use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Drop DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE drops (
                id                      TEXT PRIMARY KEY,
                delete_token            TEXT NOT NULL UNIQUE,
                storage_path            TEXT NOT NULL UNIQUE,
                original_name           TEXT NOT NULL,
                mime_type               TEXT NOT NULL,
                declared_size           INTEGER NOT NULL,
                download_limit          INTEGER NOT NULL DEFAULT 1 CHECK (download_limit >= 0),
                download_count          INTEGER NOT NULL DEFAULT 0 CHECK (download_count >= 0),
                created_at              INTEGER NOT NULL,
                expires_at              INTEGER NOT NULL,
                is_password_protected   INTEGER NOT NULL DEFAULT 0,
                password_salt           TEXT,
                has_preview             INTEGER NOT NULL DEFAULT 0,
                webhook_url             TEXT
            );

            CREATE INDEX idx_drops_expires_at ON drops(expires_at);

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    Ok(())
}
