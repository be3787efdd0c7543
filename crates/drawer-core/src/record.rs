//! The [`EventRecord`]: one already-resolved notifiable event.
//!
//! A record is the common envelope (identity, edit link, conversation,
//! origin and the mutable display flags) plus a closed [`EventKind`] union
//! carrying the kind-specific content. Records are produced by the host's
//! resolver and owned by the event store until they are cleared.
//!
//! The persisted wire format is camelCase JSON with the kind stored under
//! `kind` as an internally-tagged object (`{"type": "message", ...}`).

use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, EventId};

/// A resolved, self-contained notifiable event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Stable identity of the event.
    pub event_id: EventId,
    /// Set when this record supersedes (edits) a prior record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_event_id: Option<EventId>,
    /// Owning conversation; absent for alerts outside any conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    /// Wall-clock milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Arrived via the out-of-band push channel instead of the live stream.
    #[serde(default)]
    pub is_push_gateway_origin: bool,
    /// Already handed to the renderer by a previous pass.
    #[serde(default)]
    pub has_been_rendered: bool,
    /// Content was retroactively deleted.
    #[serde(default)]
    pub is_redacted: bool,
    /// Should trigger an audible/visual alert.
    #[serde(default)]
    pub is_noisy: bool,
    /// Custom alert sound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_identifier: Option<String>,
    /// Kind-specific content.
    pub kind: EventKind,
}

/// Closed set of notifiable event kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A chat message in a conversation.
    Message(MessageContent),
    /// An invitation to join a conversation.
    Invitation(InvitationContent),
    /// Any other alert worth showing on its own.
    Simple(SimpleContent),
}

/// Content of a chat message notification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    /// Sender user ID.
    pub sender_id: String,
    /// Sender display name, when resolvable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,
    /// Conversation display name, when resolvable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_display_name: Option<String>,
    /// One-to-one conversation.
    #[serde(default)]
    pub conversation_is_direct: bool,
    /// Displayable body (already decrypted and formatted).
    pub body: String,
    /// Opaque sender avatar reference, resolved by the renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar_ref: Option<String>,
    /// Opaque conversation avatar reference, resolved by the renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_avatar_ref: Option<String>,
    /// Sent by the local user (e.g. an inline reply).
    #[serde(default)]
    pub outgoing: bool,
    /// The outgoing message failed to send.
    #[serde(default)]
    pub outgoing_failed: bool,
}

/// Content of an invitation notification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationContent {
    /// Notification title.
    pub title: String,
    /// Notification text.
    pub description: String,
}

/// Content of a generic alert.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleContent {
    /// Notification title.
    pub title: String,
    /// Notification text.
    pub description: String,
    /// Free-form classification (usually the protocol event type).
    #[serde(default)]
    pub kind_tag: String,
}

impl EventRecord {
    fn base(
        event_id: EventId,
        conversation_id: Option<ConversationId>,
        timestamp: i64,
        kind: EventKind,
    ) -> Self {
        Self {
            event_id,
            edited_event_id: None,
            conversation_id,
            timestamp,
            is_push_gateway_origin: false,
            has_been_rendered: false,
            is_redacted: false,
            is_noisy: false,
            sound_identifier: None,
            kind,
        }
    }

    /// New message record in `conversation_id`.
    #[must_use]
    pub fn message(
        event_id: impl Into<EventId>,
        conversation_id: impl Into<ConversationId>,
        timestamp: i64,
        content: MessageContent,
    ) -> Self {
        Self::base(
            event_id.into(),
            Some(conversation_id.into()),
            timestamp,
            EventKind::Message(content),
        )
    }

    /// New invitation record for `conversation_id`.
    #[must_use]
    pub fn invitation(
        event_id: impl Into<EventId>,
        conversation_id: impl Into<ConversationId>,
        timestamp: i64,
        content: InvitationContent,
    ) -> Self {
        Self::base(
            event_id.into(),
            Some(conversation_id.into()),
            timestamp,
            EventKind::Invitation(content),
        )
    }

    /// New generic alert, optionally tied to a conversation.
    #[must_use]
    pub fn simple(
        event_id: impl Into<EventId>,
        conversation_id: Option<ConversationId>,
        timestamp: i64,
        content: SimpleContent,
    ) -> Self {
        Self::base(event_id.into(), conversation_id, timestamp, EventKind::Simple(content))
    }

    /// Mark this record as an edit of `target`.
    #[must_use]
    pub fn editing(mut self, target: impl Into<EventId>) -> Self {
        self.edited_event_id = Some(target.into());
        self
    }

    /// Mark this record as delivered by the push gateway.
    #[must_use]
    pub fn via_push_gateway(mut self) -> Self {
        self.is_push_gateway_origin = true;
        self
    }

    /// Set the alert flag.
    #[must_use]
    pub fn noisy(mut self, noisy: bool) -> Self {
        self.is_noisy = noisy;
        self
    }

    /// Set a custom alert sound.
    #[must_use]
    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound_identifier = Some(sound.into());
        self
    }

    /// Same logical identity (equal `event_id`), regardless of content.
    pub fn same_event(&self, other: &EventRecord) -> bool {
        self.event_id == other.event_id
    }

    /// Whether `other` replaces this record as an edit.
    ///
    /// True when `other` edits this record directly, or when both are edits
    /// of the same original (an edit of an edit always references the
    /// original event).
    pub fn superseded_by(&self, other: &EventRecord) -> bool {
        match &other.edited_event_id {
            Some(target) => {
                *target == self.event_id || self.edited_event_id.as_ref() == Some(target)
            }
            None => false,
        }
    }

    /// Message content, if this is a message.
    pub fn as_message(&self) -> Option<&MessageContent> {
        match &self.kind {
            EventKind::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this is a message record.
    pub fn is_message(&self) -> bool {
        matches!(self.kind, EventKind::Message(_))
    }

    /// Whether this is an invitation record.
    pub fn is_invitation(&self) -> bool {
        matches!(self.kind, EventKind::Invitation(_))
    }

    /// Short human-readable text used for summary lines.
    pub fn description(&self) -> &str {
        match &self.kind {
            EventKind::Message(m) => &m.body,
            EventKind::Invitation(i) => &i.description,
            EventKind::Simple(s) => &s.description,
        }
    }

    /// Kind discriminator, for logging.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            EventKind::Message(_) => "message",
            EventKind::Invitation(_) => "invitation",
            EventKind::Simple(_) => "simple",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn msg(id: &str, body: &str) -> EventRecord {
        EventRecord::message(
            id,
            "!room",
            1_000,
            MessageContent {
                sender_id: "@alice".into(),
                body: body.into(),
                ..MessageContent::default()
            },
        )
    }

    #[test]
    fn message_constructor_defaults_flags() {
        let r = msg("e1", "hi");
        assert!(!r.has_been_rendered);
        assert!(!r.is_redacted);
        assert!(!r.is_noisy);
        assert!(!r.is_push_gateway_origin);
        assert_eq!(r.conversation_id.as_deref(), Some("!room"));
        assert!(r.is_message());
        assert_eq!(r.kind_label(), "message");
    }

    #[test]
    fn builders_set_flags() {
        let r = msg("e1", "hi").via_push_gateway().noisy(true).with_sound("ding");
        assert!(r.is_push_gateway_origin);
        assert!(r.is_noisy);
        assert_eq!(r.sound_identifier.as_deref(), Some("ding"));
    }

    #[test]
    fn direct_edit_supersedes() {
        let original = msg("e1", "a");
        let edit = msg("e2", "b").editing("e1");
        assert!(original.superseded_by(&edit));
        assert!(!edit.superseded_by(&original));
    }

    #[test]
    fn edit_of_edit_supersedes_previous_edit() {
        let first_edit = msg("e2", "b").editing("e1");
        let second_edit = msg("e3", "c").editing("e1");
        assert!(first_edit.superseded_by(&second_edit));
    }

    #[test]
    fn edit_chain_by_latest_id_supersedes() {
        let first_edit = msg("e2", "b").editing("e1");
        let second_edit = msg("e3", "c").editing("e2");
        assert!(first_edit.superseded_by(&second_edit));
    }

    #[test]
    fn unrelated_edit_does_not_supersede() {
        let a = msg("e1", "a");
        let edit = msg("e9", "x").editing("e8");
        assert!(!a.superseded_by(&edit));
        assert!(!a.superseded_by(&msg("e5", "y")));
    }

    #[test]
    fn same_event_ignores_content() {
        assert!(msg("e1", "a").same_event(&msg("e1", "b")));
        assert!(!msg("e1", "a").same_event(&msg("e2", "a")));
    }

    #[test]
    fn description_per_kind() {
        let inv = EventRecord::invitation(
            "i1",
            "!r",
            5,
            InvitationContent {
                title: "Invite".into(),
                description: "Bob invited you".into(),
            },
        );
        let simple = EventRecord::simple(
            "s1",
            None,
            5,
            SimpleContent {
                title: "T".into(),
                description: "Something happened".into(),
                kind_tag: "m.custom".into(),
            },
        );
        assert_eq!(msg("e1", "body").description(), "body");
        assert_eq!(inv.description(), "Bob invited you");
        assert_eq!(simple.description(), "Something happened");
        assert!(inv.is_invitation());
        assert!(simple.conversation_id.is_none());
        assert_matches!(simple.kind, EventKind::Simple(_));
    }

    #[test]
    fn wire_format_is_tagged_camel_case() {
        let r = msg("e1", "hi").editing("e0");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["eventId"], "e1");
        assert_eq!(v["editedEventId"], "e0");
        assert_eq!(v["kind"]["type"], "message");
        assert_eq!(v["kind"]["senderId"], "@alice");
        assert!(v.get("soundIdentifier").is_none());
    }

    #[test]
    fn deserializes_with_missing_flags() {
        let v = json!({
            "eventId": "e1",
            "timestamp": 42,
            "kind": { "type": "simple", "title": "t", "description": "d" }
        });
        let r: EventRecord = serde_json::from_value(v).unwrap();
        assert_eq!(r.timestamp, 42);
        assert!(!r.is_noisy);
        assert_matches!(&r.kind, EventKind::Simple(s) if s.kind_tag.is_empty());
    }
}
