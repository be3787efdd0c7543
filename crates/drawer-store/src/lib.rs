//! # drawer-store
//!
//! The in-memory collection of not-yet-cleared notifiable records and its
//! durable snapshot.
//!
//! - **Event store**: insertion-ordered records with the dedup rule (live
//!   stream beats push gateway) and edit-chain collapse
//! - **Persistence gateway**: trait plus file (JSON), `SQLite` and in-memory
//!   backends, all corruption-tolerant on load

#![deny(unsafe_code)]

pub mod errors;
pub mod persistence;
pub mod store;

pub use errors::{PersistenceError, Result};
pub use persistence::{
    FileGateway, MemoryGateway, PersistenceGateway, SNAPSHOT_VERSION, Snapshot, SqliteGateway,
    load_or_empty, open_gateway, open_or_recover,
};
pub use store::{EventStore, MergeOutcome};
