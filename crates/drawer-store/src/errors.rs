//! Error types for snapshot persistence.
//!
//! Store mutations never fail; only reading or writing the durable snapshot
//! can. Callers log these and carry on with in-memory state.

use thiserror::Error;

/// Errors that can occur while saving, loading or clearing a snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error.
    #[error("serde error: {0}")]
    Json(#[from] serde_json::Error),

    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot written by an incompatible format version.
    #[error("unsupported snapshot version: {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the blob.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },
}

/// Convenience type alias for persistence results.
pub type Result<T> = std::result::Result<T, PersistenceError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
