//! In-process backend.

use drawer_core::EventRecord;
use parking_lot::Mutex;

use super::{PersistenceGateway, Snapshot, encode_records};
use crate::errors::Result;

/// Keeps the encoded snapshot in memory. State does not survive the process,
/// but every save goes through the same codec as the durable backends.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    blob: Mutex<Option<String>>,
    saves: Mutex<u64>,
}

impl MemoryGateway {
    /// Empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a snapshot is currently stored.
    pub fn has_snapshot(&self) -> bool {
        self.blob.lock().is_some()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        *self.saves.lock()
    }
}

impl PersistenceGateway for MemoryGateway {
    fn save(&self, records: &[EventRecord]) -> Result<()> {
        let blob = encode_records(records)?;
        *self.blob.lock() = Some(blob);
        *self.saves.lock() += 1;
        Ok(())
    }

    fn load(&self) -> Result<Vec<EventRecord>> {
        match self.blob.lock().as_deref() {
            Some(blob) => Ok(Snapshot::decode(blob)?.records),
            None => Ok(Vec::new()),
        }
    }

    fn clear(&self) -> Result<()> {
        *self.blob.lock() = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
