//! Per-pass derived views: [`ConversationGroup`] and [`GlobalSummary`].
//!
//! Both are rebuilt from the store on every pass and never persisted.

use drawer_core::{ConversationId, EventRecord, MessageContent};
use serde::Serialize;

/// Live messages of one conversation, as handed to the renderer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationGroup {
    /// Grouping key.
    pub conversation_id: ConversationId,
    /// One-to-one conversation (taken from the most recent record).
    pub is_direct: bool,
    /// Conversation name, else sender name of the most recent record.
    pub display_name: String,
    /// Live, non-redacted messages ordered by timestamp.
    pub messages: Vec<EventRecord>,
    /// At least one newly rendered message is noisy.
    pub should_alert: bool,
    /// Sound of the most recent newly rendered message that has one.
    pub custom_sound: Option<String>,
    /// Something in the group changed since the previous pass.
    pub has_unrendered: bool,
    /// An outgoing message in the group failed to send.
    pub has_reply_error: bool,
}

impl ConversationGroup {
    /// Build a group from its live messages. `messages` must be sorted by
    /// timestamp.
    pub fn new(
        conversation_id: ConversationId,
        messages: Vec<EventRecord>,
        should_alert: bool,
        custom_sound: Option<String>,
        has_unrendered: bool,
    ) -> Self {
        let latest = messages.last().and_then(EventRecord::as_message);
        let is_direct = latest.is_some_and(|m| m.conversation_is_direct);
        let display_name = latest
            .and_then(|m| {
                m.conversation_display_name
                    .clone()
                    .or_else(|| m.sender_display_name.clone())
            })
            .unwrap_or_default();
        let has_reply_error = messages
            .iter()
            .filter_map(EventRecord::as_message)
            .any(|m| m.outgoing && m.outgoing_failed);

        Self {
            conversation_id,
            is_direct,
            display_name,
            messages,
            should_alert,
            custom_sound,
            has_unrendered,
            has_reply_error,
        }
    }

    /// Most recent message.
    pub fn latest(&self) -> Option<&EventRecord> {
        self.messages.last()
    }

    /// Timestamp of the most recent message, or 0 for an empty group.
    pub fn last_timestamp(&self) -> i64 {
        self.latest().map_or(0, |r| r.timestamp)
    }

    /// Avatar of the conversation, falling back to the sender's, taken from
    /// the most recent message.
    pub fn avatar_ref(&self) -> Option<&str> {
        let latest = self.latest()?.as_message()?;
        latest
            .conversation_avatar_ref
            .as_deref()
            .or(latest.sender_avatar_ref.as_deref())
    }

    /// One line for the global summary.
    pub fn summary_line(&self) -> String {
        match self.messages.as_slice() {
            [only] => {
                let sender = only.as_message().map_or("", sender_name);
                let body = only.description();
                if self.is_direct {
                    format!("{sender}: {body}")
                } else {
                    format!("{}: {sender} {body}", self.display_name)
                }
            }
            many => format!("{}: {} messages", self.display_name, many.len()),
        }
    }
}

fn sender_name(message: &MessageContent) -> &str {
    message
        .sender_display_name
        .as_deref()
        .unwrap_or(&message.sender_id)
}

/// Drawer-wide summary of everything still live after a pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSummary {
    /// Total live items (messages, invitations, simple alerts).
    pub alert_count: usize,
    /// An item rendered by this pass alerts.
    pub should_alert: bool,
    /// Most recent timestamp across every live item.
    pub last_timestamp: i64,
    /// Conversations with live messages.
    pub conversation_count: usize,
    /// Live messages.
    pub message_count: usize,
    /// Live invitations.
    pub invitation_count: usize,
    /// Live simple alerts.
    pub simple_count: usize,
    /// Summary title.
    pub title: String,
    /// One line per conversation, then one per invitation and simple alert.
    pub lines: Vec<String>,
    /// Content-free wording used when the full format is off.
    pub compact_text: String,
}

impl GlobalSummary {
    /// Summarize the live groups and standalone records of a pass.
    pub fn build(
        groups: &[ConversationGroup],
        invitations: &[EventRecord],
        simples: &[EventRecord],
        should_alert: bool,
    ) -> Self {
        let message_count: usize = groups.iter().map(|g| g.messages.len()).sum();
        let conversation_count = groups.len();
        let invitation_count = invitations.len();
        let simple_count = simples.len();

        let last_timestamp = groups
            .iter()
            .map(ConversationGroup::last_timestamp)
            .chain(invitations.iter().chain(simples).map(|r| r.timestamp))
            .max()
            .unwrap_or(0);

        let lines = groups
            .iter()
            .map(ConversationGroup::summary_line)
            .chain(
                invitations
                    .iter()
                    .chain(simples)
                    .map(|r| r.description().to_owned()),
            )
            .collect();

        let item_count = conversation_count + invitation_count + simple_count;

        Self {
            alert_count: message_count + invitation_count + simple_count,
            should_alert,
            last_timestamp,
            conversation_count,
            message_count,
            invitation_count,
            simple_count,
            title: plural(item_count, "notification", "notifications"),
            lines,
            compact_text: compact_text(
                message_count + simple_count,
                conversation_count,
                invitation_count,
            ),
        }
    }
}

/// Privacy wording: counts only, no names or bodies.
pub fn compact_text(messages: usize, conversations: usize, invitations: usize) -> String {
    let m = plural(messages, "new message", "new messages");
    let c = plural(conversations, "conversation", "conversations");
    let i = plural(invitations, "invitation", "invitations");

    match (messages > 0, invitations > 0, conversations > 1) {
        (true, true, true) => format!("{m} in {c} and {i}"),
        (true, true, false) => format!("{m} and {i}"),
        (false, true, _) => i,
        (_, false, true) => format!("{m} in {c}"),
        (_, false, false) => m,
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
