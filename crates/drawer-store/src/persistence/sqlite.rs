//! `SQLite` backend: one row holding the latest snapshot.

use std::path::Path;

use drawer_core::EventRecord;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use super::{PersistenceGateway, SNAPSHOT_VERSION, Snapshot, encode_records};
use crate::errors::Result;

const PRAGMAS: &str = "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;";

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS drawer_snapshot (
    id       INTEGER PRIMARY KEY CHECK (id = 1),
    version  INTEGER NOT NULL,
    saved_at TEXT    NOT NULL,
    payload  TEXT    NOT NULL
);";

/// Snapshot stored in a single-row `SQLite` table.
/// Uses `parking_lot::Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(CREATE_TABLE)?;
        info!(path = %path.display(), "snapshot database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Delete the database at `path` (with its WAL side files) and create a
    /// fresh one. Used when the existing file cannot be opened.
    pub fn reset(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        warn!(path = %path.display(), "snapshot database reset");
        Self::open(path)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl PersistenceGateway for SqliteGateway {
    fn save(&self, records: &[EventRecord]) -> Result<()> {
        let payload = encode_records(records)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let _ = tx.execute(
            "INSERT OR REPLACE INTO drawer_snapshot (id, version, saved_at, payload)
             VALUES (1, ?1, ?2, ?3)",
            params![SNAPSHOT_VERSION, chrono::Utc::now().to_rfc3339(), payload],
        )?;
        tx.commit()?;
        debug!(count = records.len(), "snapshot row written");
        Ok(())
    }

    fn load(&self) -> Result<Vec<EventRecord>> {
        let conn = self.conn.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM drawer_snapshot WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(blob) => Ok(Snapshot::decode(&blob)?.records),
            None => Ok(Vec::new()),
        }
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        let _ = conn.execute("DELETE FROM drawer_snapshot", [])?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
