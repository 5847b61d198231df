//! SQLite model store
//!
//! One row per model in the `models` table. Content is checksummed on
//! write and verified on read, so a row edited outside the server loads
//! as a corrupt model rather than as silently different data.

#![allow(clippy::result_large_err)]

use crate::db;
use crate::errors::{corrupt_content, from_rusqlite, Result};
use crate::migrations::{apply_migrations, content_checksum};
use crate::storage::ModelStore;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Stores models as rows of a SQLite database
pub struct SqliteModelStore {
    conn: Mutex<Connection>,
}

impl SqliteModelStore {
    /// Open (creating if needed) a database file and apply migrations
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut conn = db::open(path)?;
        db::configure(&conn)?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = db::open_in_memory()?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl std::fmt::Debug for SqliteModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteModelStore").finish_non_exhaustive()
    }
}

impl ModelStore for SqliteModelStore {
    fn load(&self, model_id: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let row: Option<(Vec<u8>, String)> = conn
            .query_row(
                "SELECT content, checksum FROM models WHERE id = ?1",
                [model_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| from_rusqlite(e).with_model_id(model_id))?;

        match row {
            None => Ok(None),
            Some((content, checksum)) => {
                let actual = content_checksum(&content);
                if actual != checksum {
                    return Err(corrupt_content(model_id, &checksum, &actual));
                }
                Ok(Some(content))
            }
        }
    }

    fn store(&self, model_id: &str, bytes: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO models (id, content, checksum, size_bytes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                checksum = excluded.checksum,
                size_bytes = excluded.size_bytes,
                updated_at = excluded.updated_at",
            params![
                model_id,
                bytes,
                content_checksum(bytes),
                bytes.len() as i64,
                now
            ],
        )
        .map_err(|e| from_rusqlite(e).with_model_id(model_id))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM models ORDER BY id")
            .map_err(from_rusqlite)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(from_rusqlite)?;
        Ok(ids)
    }
}
