//! Durable snapshots of the event store.
//!
//! Every backend stores one versioned [`Snapshot`] blob and overwrites it
//! atomically. Loading is corruption-tolerant at the call site:
//! [`load_or_empty`] turns any failure into an empty record set so a damaged
//! blob can never block startup.

mod file;
mod memory;
mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use drawer_core::EventRecord;
use drawer_settings::{PersistenceBackend, PersistenceSettings};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{PersistenceError, Result};

pub use file::FileGateway;
pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

/// Snapshot format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Storage for the durable snapshot.
///
/// Implementations must be safe to call from any thread. They never mutate
/// records; they only (de)serialize them.
pub trait PersistenceGateway: Send + Sync {
    /// Overwrite the stored snapshot with `records`.
    fn save(&self, records: &[EventRecord]) -> Result<()>;

    /// Read the stored snapshot. A missing blob is `Ok(vec![])`.
    fn load(&self) -> Result<Vec<EventRecord>>;

    /// Delete the stored snapshot. Deleting a missing blob is not an error.
    fn clear(&self) -> Result<()>;

    /// Backend name, for logs.
    fn name(&self) -> &'static str;
}

/// On-disk snapshot envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,
    /// Live records in store order.
    pub records: Vec<EventRecord>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl Snapshot {
    /// Wrap `records` in a current-version envelope stamped now.
    pub fn new(records: Vec<EventRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            records,
        }
    }

    /// Serialize to the JSON blob format.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON blob, rejecting versions this build cannot read.
    pub fn decode(blob: &str) -> Result<Self> {
        let probe: VersionProbe = serde_json::from_str(blob)?;
        if probe.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: probe.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(serde_json::from_str(blob)?)
    }
}

/// Encode `records` as a current snapshot blob.
pub(crate) fn encode_records(records: &[EventRecord]) -> Result<String> {
    Snapshot::new(records.to_vec()).encode()
}

/// Load the stored records, treating any failure as "no prior state".
pub fn load_or_empty(gateway: &dyn PersistenceGateway) -> Vec<EventRecord> {
    match gateway.load() {
        Ok(records) => {
            debug!(backend = gateway.name(), count = records.len(), "snapshot loaded");
            records
        }
        Err(error) => {
            counter!("drawer_persist_failures_total", "op" => "load").increment(1);
            warn!(backend = gateway.name(), %error, "failed to load snapshot, starting empty");
            Vec::new()
        }
    }
}

/// Build the gateway selected by `settings`.
pub fn open_gateway(settings: &PersistenceSettings) -> Result<Arc<dyn PersistenceGateway>> {
    let gateway: Arc<dyn PersistenceGateway> = match settings.backend {
        PersistenceBackend::File => Arc::new(FileGateway::new(&settings.path)),
        PersistenceBackend::Sqlite => Arc::new(SqliteGateway::open(&settings.path)?),
        PersistenceBackend::Memory => Arc::new(MemoryGateway::new()),
    };
    Ok(gateway)
}

/// Like [`open_gateway`], but never fails.
///
/// A `SQLite` file that cannot be opened is deleted and recreated; if that
/// fails too, snapshots are kept in memory for this run.
pub fn open_or_recover(settings: &PersistenceSettings) -> Arc<dyn PersistenceGateway> {
    let error = match open_gateway(settings) {
        Ok(gateway) => return gateway,
        Err(error) => error,
    };
    counter!("drawer_persist_failures_total", "op" => "open").increment(1);
    warn!(backend = ?settings.backend, path = %settings.path, %error, "failed to open snapshot store");

    if settings.backend == PersistenceBackend::Sqlite {
        match SqliteGateway::reset(&settings.path) {
            Ok(gateway) => return Arc::new(gateway),
            Err(error) => {
                counter!("drawer_persist_failures_total", "op" => "open").increment(1);
                warn!(path = %settings.path, %error, "failed to reset snapshot database");
            }
        }
    }

    warn!("keeping snapshots in memory for this session");
    Arc::new(MemoryGateway::new())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
