use crate::models::{NewPhoto, Photo, StorageStats};
use crate::schema::init_schema;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Error type for photo store operations
#[derive(Debug)]
pub enum StoreError {
    Database(rusqlite::Error),
    /// UNIQUE constraint on the generated filename fired
    DuplicateFilename(String),
    /// A CHECK constraint rejected the record (non-positive size or dimensions)
    InvalidRecord(String),
    NotFound(String),
    Other(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::DuplicateFilename(name) => write!(f, "Duplicate filename: {}", name),
            StoreError::InvalidRecord(msg) => write!(f, "Invalid record: {}", msg),
            StoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StoreError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, msg) = &err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation {
                let detail = msg.clone().unwrap_or_default();
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                    return StoreError::DuplicateFilename(detail);
                }
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK {
                    return StoreError::InvalidRecord(detail);
                }
            }
        }
        StoreError::Database(err)
    }
}

/// SQLite-backed photo store with a transactional storage aggregate
///
/// One writer, many readers: the database runs in WAL mode and the
/// connection sits behind a mutex, so every store call is a short
/// critical section.
#[derive(Clone)]
pub struct PhotoStore {
    conn: Arc<Mutex<Connection>>,
}

impl PhotoStore {
    /// Open (or create) the database file and apply the schema
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Other(format!("Create database directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("Connection lock poisoned".to_string()))
    }

    /// Insert a photo record, assigning id and timestamp
    ///
    /// The storage aggregate is incremented in the same transaction, so
    /// readers never observe a row without its accounted size.
    pub fn insert(&self, new: NewPhoto) -> Result<Photo, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let uploaded_at = Utc::now();
        tx.execute(
            "INSERT INTO photos (filename, original_name, guest_name, caption, mime_type,
                                 file_size, width, height, uploaded_at, uploader_ip)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.filename,
                new.original_name,
                new.guest_name,
                new.caption,
                new.mime_type,
                new.file_size,
                new.width,
                new.height,
                uploaded_at,
                new.uploader_ip,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE storage_stats
             SET total_files = total_files + 1, total_size_bytes = total_size_bytes + ?1
             WHERE id = 1",
            params![new.file_size],
        )?;

        tx.commit()?;

        log::debug!(
            "Inserted photo {} ({}, {} bytes)",
            id,
            new.filename,
            new.file_size
        );

        Ok(Photo {
            id,
            filename: new.filename,
            original_name: new.original_name,
            guest_name: new.guest_name,
            caption: new.caption,
            mime_type: new.mime_type,
            file_size: new.file_size,
            width: new.width,
            height: new.height,
            uploaded_at,
            uploader_ip: new.uploader_ip,
        })
    }

    /// Look up a single photo by id
    pub fn get(&self, id: i64) -> Result<Option<Photo>, StoreError> {
        let conn = self.conn()?;
        let photo = conn
            .query_row(
                "SELECT id, filename, original_name, guest_name, caption, mime_type,
                        file_size, width, height, uploaded_at, uploader_ip
                 FROM photos WHERE id = ?1",
                params![id],
                row_to_photo,
            )
            .optional()?;
        Ok(photo)
    }

    /// List photos, newest first
    pub fn list(&self, limit: i64, offset: i64) -> Result<Vec<Photo>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, original_name, guest_name, caption, mime_type,
                    file_size, width, height, uploaded_at, uploader_ip
             FROM photos
             ORDER BY uploaded_at DESC, id DESC
             LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt.query_map(params![limit, offset], row_to_photo)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Total number of photo records
    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete a photo record by id, returning the removed row
    ///
    /// The aggregate is decremented in the same transaction, and only if
    /// a row was actually removed. Returns `None` for an unknown id,
    /// leaving the aggregate untouched. The caller is responsible for
    /// unlinking the backing file afterwards, so a failure here can only
    /// orphan a file, never retain a dangling record.
    pub fn delete(&self, id: i64) -> Result<Option<Photo>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let photo = tx
            .query_row(
                "SELECT id, filename, original_name, guest_name, caption, mime_type,
                        file_size, width, height, uploaded_at, uploader_ip
                 FROM photos WHERE id = ?1",
                params![id],
                row_to_photo,
            )
            .optional()?;

        let photo = match photo {
            Some(p) => p,
            None => return Ok(None),
        };

        tx.execute("DELETE FROM photos WHERE id = ?1", params![id])?;
        tx.execute(
            "UPDATE storage_stats
             SET total_files = total_files - 1, total_size_bytes = total_size_bytes - ?1
             WHERE id = 1",
            params![photo.file_size],
        )?;

        tx.commit()?;

        log::debug!("Deleted photo {} ({})", id, photo.filename);
        Ok(Some(photo))
    }

    /// Current storage aggregate
    pub fn stats(&self) -> Result<StorageStats, StoreError> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            "SELECT total_files, total_size_bytes FROM storage_stats WHERE id = 1",
            [],
            |row| {
                Ok(StorageStats {
                    total_files: row.get(0)?,
                    total_size_bytes: row.get(1)?,
                })
            },
        )?;
        Ok(stats)
    }
}

/// Map a database row to a Photo
fn row_to_photo(row: &Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_name: row.get(2)?,
        guest_name: row.get(3)?,
        caption: row.get(4)?,
        mime_type: row.get(5)?,
        file_size: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        uploaded_at: row.get(9)?,
        uploader_ip: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_photo(filename: &str, size: i64) -> NewPhoto {
        NewPhoto {
            filename: filename.to_string(),
            original_name: "holiday.jpg".to_string(),
            guest_name: Some("Anna".to_string()),
            caption: None,
            mime_type: "image/jpeg".to_string(),
            file_size: size,
            width: 1200,
            height: 800,
            uploader_ip: None,
        }
    }

    #[test]
    fn test_insert_assigns_id_and_updates_stats() {
        let store = PhotoStore::open_in_memory().unwrap();

        let photo = store.insert(sample_photo("a.jpg", 1000)).unwrap();
        assert!(photo.id > 0);
        assert_eq!(photo.mime_type, "image/jpeg");

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size_bytes, 1000);

        let second = store.insert(sample_photo("b.jpg", 500)).unwrap();
        assert_ne!(photo.id, second.id);

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_size_bytes, 1500);
    }

    #[test]
    fn test_stats_match_sum_after_insert_and_delete() {
        let store = PhotoStore::open_in_memory().unwrap();
        let a = store.insert(sample_photo("a.jpg", 300)).unwrap();
        store.insert(sample_photo("b.jpg", 700)).unwrap();

        store.delete(a.id).unwrap().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size_bytes, 700);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_unknown_id_leaves_stats_unchanged() {
        let store = PhotoStore::open_in_memory().unwrap();
        store.insert(sample_photo("a.jpg", 300)).unwrap();

        assert!(store.delete(9999).unwrap().is_none());

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size_bytes, 300);
    }

    #[test]
    fn test_duplicate_filename_is_rejected() {
        let store = PhotoStore::open_in_memory().unwrap();
        store.insert(sample_photo("same.jpg", 100)).unwrap();

        let err = store.insert(sample_photo("same.jpg", 100)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFilename(_)));

        // The failed insert must not have touched the aggregate
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size_bytes, 100);
    }

    #[test]
    fn test_non_positive_size_is_rejected() {
        let store = PhotoStore::open_in_memory().unwrap();
        let mut photo = sample_photo("zero.jpg", 0);
        photo.file_size = 0;

        let err = store.insert(photo).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }

    #[test]
    fn test_list_is_newest_first_and_paginated() {
        let store = PhotoStore::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .insert(sample_photo(&format!("p{}.jpg", i), 100))
                .unwrap();
        }

        let page = store.list(2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].filename, "p4.jpg");
        assert_eq!(page[1].filename, "p3.jpg");

        let page = store.list(2, 4).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].filename, "p0.jpg");

        let page = store.list(10, 10).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_get_roundtrip() {
        let store = PhotoStore::open_in_memory().unwrap();
        let inserted = store.insert(sample_photo("a.jpg", 250)).unwrap();

        let fetched = store.get(inserted.id).unwrap().unwrap();
        assert_eq!(fetched, inserted);

        assert!(store.get(inserted.id + 1).unwrap().is_none());
    }
}
