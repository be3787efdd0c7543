//! # drawer-core
//!
//! Foundation types for the notification drawer engine.
//!
//! - **Branded IDs**: `EventId`, `ConversationId` as newtypes for type safety
//! - **Event records**: [`EventRecord`] with a closed [`EventKind`] union
//!   (message, invitation, simple alert) and the shared mutable flags
//!   (rendered, redacted, noisy)
//! - **Logging**: [`logging::init_subscriber`] for hosts that want the
//!   default `tracing` setup

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod record;

pub use ids::{ConversationId, EventId};
pub use record::{EventKind, EventRecord, InvitationContent, MessageContent, SimpleContent};
