//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Content digest -> Telegram file reference
        CREATE TABLE IF NOT EXISTS conversions (
            digest TEXT PRIMARY KEY,
            reference TEXT NOT NULL,
            source_url TEXT,
            size_bytes INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        PRAGMA user_version = 1;
        ",
    )?;

    Ok(())
}

/// Record which kind each reference was filed under
///
/// Rows from v1 were all resent as videos, so they default to `video`.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        ALTER TABLE conversions ADD COLUMN kind TEXT NOT NULL DEFAULT 'video';

        PRAGMA user_version = 2;
        ",
    )?;

    Ok(())
}
