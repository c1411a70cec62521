// src/services/sqlite.rs
//! SQLite snapshot backend.
//!
//! - One row per collection in `collections(name, body, updated_at)`.
//! - A transaction is `BEGIN IMMEDIATE ... COMMIT`, so SQLite's own write lock
//!   serializes units across connections and processes; a waiting writer
//!   retries for up to `BUSY_TIMEOUT`.
//! - WAL journal; plain reads see the last committed state without the lock.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{StorageError, StorageResult};
use crate::services::store::{Collection, RecordStore, StoreTxn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const UPSERT: &str = r#"
    INSERT INTO collections(name, body, updated_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(name) DO UPDATE SET
      body       = excluded.body,
      updated_at = excluded.updated_at
"#;

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open/create the database file and ensure the schema exists.
    pub fn open(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Open {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let db = Connection::open(db_path)?;
        Self::with_connection(db)
    }

    /// Private in-memory database; handy for tests that want the SQL path.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> StorageResult<Self> {
        db.busy_timeout(BUSY_TIMEOUT)?;
        db.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS collections (
              name        TEXT PRIMARY KEY,  -- collection name, e.g. "promises"
              body        BLOB NOT NULL,     -- JSON snapshot
              updated_at  TEXT NOT NULL      -- RFC3339 UTC
            );
            "#,
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    // An open transaction is rolled back when its guard drops, even while
    // unwinding, so a poisoned connection is still consistent.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn select(db: &Connection, collection: Collection) -> StorageResult<Option<Vec<u8>>> {
    let body = db
        .query_row(
            "SELECT body FROM collections WHERE name=?1",
            [collection.name()],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?;
    Ok(body)
}

impl RecordStore for SqliteStore {
    fn begin(&self) -> StorageResult<Box<dyn StoreTxn + '_>> {
        let db = self.conn();
        db.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTxn { db, open: true }))
    }

    fn read(&self, collection: Collection) -> StorageResult<Option<Vec<u8>>> {
        select(&self.conn(), collection)
    }
}

struct SqliteTxn<'a> {
    db: MutexGuard<'a, Connection>,
    open: bool,
}

impl StoreTxn for SqliteTxn<'_> {
    fn read(&mut self, collection: Collection) -> StorageResult<Option<Vec<u8>>> {
        select(&self.db, collection)
    }

    fn commit(mut self: Box<Self>, batch: &[(Collection, Vec<u8>)]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        {
            let mut upsert = self.db.prepare_cached(UPSERT)?;
            for (collection, bytes) in batch {
                upsert.execute((collection.name(), bytes.as_slice(), now.as_str()))?;
            }
        }
        self.db.execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }
}

impl Drop for SqliteTxn<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(err) = self.db.execute_batch("ROLLBACK") {
            tracing::warn!(error = %err, "sqlite rollback failed");
        }
    }
}
