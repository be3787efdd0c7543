//! JSON file backend.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use drawer_core::EventRecord;
use tracing::debug;

use super::{PersistenceGateway, Snapshot, encode_records};
use crate::errors::Result;

/// Snapshot stored as a JSON file.
///
/// Saves write a sibling `<name>.tmp` file and rename it over the target, so
/// a crash mid-write leaves the previous snapshot intact.
#[derive(Clone, Debug)]
pub struct FileGateway {
    path: PathBuf,
}

impl FileGateway {
    /// Gateway for the snapshot at `path`. Nothing is touched until the first
    /// save.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl PersistenceGateway for FileGateway {
    fn save(&self, records: &[EventRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let blob = encode_records(records)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, blob)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), count = records.len(), "snapshot written");
        Ok(())
    }

    fn load(&self) -> Result<Vec<EventRecord>> {
        let blob = match std::fs::read_to_string(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(Snapshot::decode(&blob)?.records)
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "snapshot deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
