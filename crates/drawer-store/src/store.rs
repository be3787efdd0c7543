//! In-memory collection of live notifiable records.
//!
//! [`EventStore`] keeps records in insertion order and applies the merge
//! rules for every incoming record:
//!
//! 1. **Same `event_id` already live**: a live-stream record replaces a
//!    push-gateway record (content refresh, alert suppressed). Any other
//!    duplicate is dropped.
//! 2. **Edit** (`edited_event_id` set): replaces the record it supersedes
//!    in place; an edit whose target is not in the store is ignored.
//! 3. **Anything else**: appended, unless its id was already folded into a
//!    later edit (a re-delivered original or stale edit is dropped).
//!
//! INVARIANT: no two records share an `event_id`, and an edit chain is
//! represented by at most one record.
//!
//! The store does no locking of its own; the engine owns it behind a single
//! mutex.

use std::collections::{HashMap, HashSet};

use drawer_core::{ConversationId, EventId, EventRecord};

/// Result of [`EventStore::insert_or_merge`].
#[derive(Clone, Debug, PartialEq)]
pub enum MergeOutcome {
    /// New record appended.
    Inserted,
    /// An existing record was replaced; carries the replaced record.
    Replaced(Box<EventRecord>),
    /// Duplicate of a live record; the incoming record was dropped.
    KeptExisting,
    /// Edit of a record that is not in the store; dropped.
    IgnoredEditOfUnknown,
}

impl MergeOutcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced(_) => "replaced",
            Self::KeptExisting => "kept_existing",
            Self::IgnoredEditOfUnknown => "ignored_edit",
        }
    }

    /// Whether the store changed.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced(_))
    }
}

/// Insertion-ordered set of live records keyed by `event_id`.
#[derive(Clone, Debug, Default)]
pub struct EventStore {
    records: Vec<EventRecord>,
    /// Ids replaced by an edit, mapped to the live record of their chain.
    superseded: HashMap<EventId, EventId>,
}

impl EventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a persisted snapshot.
    ///
    /// Later duplicates of an `event_id` are dropped so a damaged snapshot
    /// cannot break the uniqueness invariant.
    pub fn from_records(records: Vec<EventRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            if store.position(&record.event_id).is_none() {
                if let Some(target) = &record.edited_event_id {
                    let _ = store
                        .superseded
                        .insert(target.clone(), record.event_id.clone());
                }
                store.records.push(record);
            }
        }
        store
    }

    /// Apply the dedup/edit merge rules to an incoming record.
    pub fn insert_or_merge(&mut self, mut incoming: EventRecord) -> MergeOutcome {
        if let Some(pos) = self.position(&incoming.event_id) {
            let existing = &self.records[pos];
            if existing.is_push_gateway_origin && !incoming.is_push_gateway_origin {
                // The push copy may already have alerted: refresh content, stay quiet.
                incoming.has_been_rendered = false;
                incoming.is_noisy = false;
                let old = std::mem::replace(&mut self.records[pos], incoming);
                return MergeOutcome::Replaced(Box::new(old));
            }
            return MergeOutcome::KeptExisting;
        }

        if self.is_superseded(&incoming.event_id) {
            return MergeOutcome::KeptExisting;
        }

        if let Some(target) = &incoming.edited_event_id {
            let pos = self
                .records
                .iter()
                .position(|r| r.superseded_by(&incoming))
                .or_else(|| self.superseded.get(target).and_then(|head| self.position(head)));
            return match pos {
                Some(pos) => {
                    let old = std::mem::replace(&mut self.records[pos], incoming);
                    self.fold_into(&old, pos);
                    MergeOutcome::Replaced(Box::new(old))
                }
                None => MergeOutcome::IgnoredEditOfUnknown,
            };
        }

        self.records.push(incoming);
        MergeOutcome::Inserted
    }

    /// Whether `event_id` already lives on inside a later edit.
    fn is_superseded(&self, event_id: &EventId) -> bool {
        self.superseded.contains_key(event_id)
            || self
                .records
                .iter()
                .any(|r| r.edited_event_id.as_ref() == Some(event_id))
    }

    /// Point every id of `old`'s chain at the record now at `pos`.
    fn fold_into(&mut self, old: &EventRecord, pos: usize) {
        let head = self.records[pos].event_id.clone();
        for value in self.superseded.values_mut() {
            if *value == old.event_id {
                value.clone_from(&head);
            }
        }
        let _ = self.superseded.insert(old.event_id.clone(), head.clone());
        if let Some(target) = &old.edited_event_id {
            let _ = self.superseded.insert(target.clone(), head);
        }
    }

    /// Drop chain entries whose live record is gone.
    fn prune_superseded(&mut self) {
        let live: HashSet<&EventId> = self.records.iter().map(|r| &r.event_id).collect();
        self.superseded.retain(|_, head| live.contains(head));
    }

    /// Flag a record as redacted and due for re-render. Returns `false` if
    /// the id is unknown.
    pub fn mark_redacted(&mut self, event_id: &EventId) -> bool {
        match self.records.iter_mut().find(|r| r.event_id == *event_id) {
            Some(record) => {
                record.is_redacted = true;
                record.has_been_rendered = false;
                true
            }
            None => false,
        }
    }

    /// Remove every message record of a conversation. Returns how many were
    /// removed.
    pub fn remove_by_conversation(&mut self, conversation_id: &ConversationId) -> usize {
        self.remove_where(|r| {
            r.is_message() && r.conversation_id.as_ref() == Some(conversation_id)
        })
    }

    /// Remove every invitation record of a conversation.
    pub fn remove_invitations(&mut self, conversation_id: &ConversationId) -> usize {
        self.remove_where(|r| {
            r.is_invitation() && r.conversation_id.as_ref() == Some(conversation_id)
        })
    }

    /// Remove every record.
    pub fn remove_all(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        self.superseded.clear();
        removed
    }

    /// Remove records matching `pred`. Returns how many were removed.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&EventRecord) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !pred(r));
        let removed = before - self.records.len();
        if removed > 0 {
            self.prune_superseded();
        }
        removed
    }

    /// Look up a live record.
    pub fn get(&self, event_id: &EventId) -> Option<&EventRecord> {
        self.records.iter().find(|r| r.event_id == *event_id)
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Mutable access for the aggregation pass (flag updates only; the
    /// caller must not change identities).
    pub fn records_mut(&mut self) -> &mut [EventRecord] {
        &mut self.records
    }

    /// Owned copy of all records, for persistence.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.records.clone()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether anything is left to show (at least one non-redacted record).
    pub fn has_renderable(&self) -> bool {
        self.records.iter().any(|r| !r.is_redacted)
    }

    fn position(&self, event_id: &EventId) -> Option<usize> {
        self.records.iter().position(|r| r.event_id == *event_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
