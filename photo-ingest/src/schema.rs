use rusqlite::{Connection, Result};

/// Initialize the photo intake database schema
///
/// Enables WAL mode so readers never block behind the single writer,
/// then applies versioned migrations.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        create_schema_v1(conn)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

/// Create schema version 1: photos table plus the storage aggregate singleton
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL UNIQUE,
            original_name TEXT NOT NULL,
            guest_name TEXT,
            caption TEXT,
            mime_type TEXT NOT NULL,
            file_size INTEGER NOT NULL CHECK(file_size > 0),
            width INTEGER NOT NULL CHECK(width > 0),
            height INTEGER NOT NULL CHECK(height > 0),
            uploaded_at TEXT NOT NULL,
            uploader_ip TEXT
        )",
        [],
    )?;

    // Listing is always newest-first
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_photos_uploaded_at
         ON photos(uploaded_at DESC, id DESC)",
        [],
    )?;

    // Single-row aggregate: total count and byte size over all live photos.
    // Kept in the same transaction as every insert/delete.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS storage_stats (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            total_files INTEGER NOT NULL DEFAULT 0 CHECK(total_files >= 0),
            total_size_bytes INTEGER NOT NULL DEFAULT 0 CHECK(total_size_bytes >= 0)
        )",
        [],
    )?;

    conn.execute("INSERT OR IGNORE INTO storage_stats (id) VALUES (1)", [])?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('photos', 'storage_stats')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);

        // Aggregate row is seeded at zero
        let (files, bytes): (i64, i64) = conn
            .query_row(
                "SELECT total_files, total_size_bytes FROM storage_stats WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(files, 0);
        assert_eq!(bytes, 0);
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let versions: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
