//! Host-supplied capabilities consumed around the engine.

use drawer_core::EventRecord;

/// Turns a raw protocol event into a notifiable record (decryption,
/// display-name lookup and body extraction happen here, in the host).
///
/// `None` means the event is not worth notifying about; nothing is submitted.
pub trait EventResolver: Send + Sync {
    /// Host-side raw event type.
    type RawEvent;

    /// Resolve one raw event.
    fn resolve(&self, raw: &Self::RawEvent) -> Option<EventRecord>;
}

/// Fetches avatar images for the renderer. The engine itself never calls
/// this; it only passes opaque references through.
pub trait AvatarResolver: Send + Sync {
    /// Host-side image handle.
    type Image;

    /// Resolve an avatar reference, `None` if unavailable.
    fn resolve(&self, avatar_ref: &str) -> Option<Self::Image>;
}

/// Decides whether a message is stale (e.g. already read on another device).
/// Stale messages are forgotten during the next pass.
pub trait OutdatedEventDetector: Send + Sync {
    /// Whether `record` no longer needs a notification.
    fn is_outdated(&self, record: &EventRecord) -> bool;
}

impl<F> OutdatedEventDetector for F
where
    F: Fn(&EventRecord) -> bool + Send + Sync,
{
    fn is_outdated(&self, record: &EventRecord) -> bool {
        self(record)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
