//! Branded ID newtypes for type safety.
//!
//! Event and conversation identifiers are both opaque strings issued by the
//! chat protocol. Wrapping them prevents passing a conversation ID where an
//! event ID is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Protocol-issued identifier of a notifiable event.
    EventId
}

branded_id! {
    /// Identifier of a conversation (room/channel), the grouping key for
    /// message notifications.
    ConversationId
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_from_str() {
        let id = EventId::from("$abc:server");
        assert_eq!(id.as_str(), "$abc:server");
    }

    #[test]
    fn conversation_id_display() {
        let id = ConversationId::from("!room:server");
        assert_eq!(format!("{id}"), "!room:server");
    }

    #[test]
    fn deref_to_str() {
        let id = EventId::from("e1");
        assert!(id.starts_with('e'));
        assert_eq!(id.len(), 2);
    }

    #[test]
    fn serde_is_transparent() {
        let id = ConversationId::from("!r");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"!r\"");
        let back: ConversationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn into_inner_and_string_conversion() {
        let id = EventId::from_string("e9".to_string());
        let s: String = id.clone().into();
        assert_eq!(s, "e9");
        assert_eq!(id.into_inner(), "e9");
    }

    #[test]
    fn distinct_types_compare_by_value() {
        let a = EventId::from("x");
        let b = EventId::from("x");
        let c = EventId::from("y");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }
}
