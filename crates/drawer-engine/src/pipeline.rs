//! The aggregation pass.
//!
//! A pass runs with the store locked and does only in-memory work:
//!
//! 1. **Partition** records into per-conversation message buckets (first
//!    appearance order), invitations and simple alerts. Messages of the
//!    current conversation, outdated messages and (with `hide_invites`)
//!    invitations are forgotten here. A bucket is still created for a
//!    conversation whose messages were all forgotten, so it gets cleared.
//! 2. **Groups**: a bucket with nothing but redacted records emits one clear
//!    and leaves the store. Otherwise the group re-renders when it holds
//!    anything not yet rendered (a redaction counts) or on the first pass.
//!    Alerting only considers unrendered, non-redacted records.
//! 3. **Standalone records** render when new or on the first pass.
//! 4. **Summary**: rendered when anything changed (or on the first pass),
//!    cleared once nothing renderable is left.
//!
//! Every surviving record is marked rendered, so a second pass over an
//! unchanged store emits nothing.

use std::collections::HashMap;

use drawer_core::{ConversationId, EventKind, EventRecord};
use drawer_settings::DrawerSettings;
use drawer_store::EventStore;
use metrics::counter;
use tracing::{debug, instrument, trace, warn};

use crate::group::{ConversationGroup, GlobalSummary};
use crate::renderer::RenderInstruction;
use crate::resolver::OutdatedEventDetector;

/// Inputs of one pass besides the store.
#[derive(Clone, Copy)]
pub struct PassContext<'a> {
    /// Conversation the user is looking at.
    pub current_conversation: Option<&'a ConversationId>,
    /// Full per-item rendering; otherwise summary only.
    pub complete_format: bool,
    /// Forget invitations.
    pub hide_invites: bool,
    /// Stale-message check.
    pub detector: Option<&'a dyn OutdatedEventDetector>,
}

impl<'a> PassContext<'a> {
    /// Context taking its flags from `settings`, with no current
    /// conversation and no detector.
    pub fn from_settings(settings: &DrawerSettings) -> Self {
        Self {
            current_conversation: None,
            complete_format: settings.complete_format,
            hide_invites: settings.hide_invites,
            detector: None,
        }
    }

    /// Set the current conversation.
    #[must_use]
    pub fn with_current(mut self, conversation_id: Option<&'a ConversationId>) -> Self {
        self.current_conversation = conversation_id;
        self
    }

    /// Set the stale-message detector.
    #[must_use]
    pub fn with_detector(mut self, detector: Option<&'a dyn OutdatedEventDetector>) -> Self {
        self.detector = detector;
        self
    }
}

/// What a pass decided.
#[derive(Clone, Debug, Default)]
pub struct PassOutput {
    /// Renderer calls, in order.
    pub instructions: Vec<RenderInstruction>,
    /// Summary of everything still live, if anything is.
    pub summary: Option<GlobalSummary>,
    /// Store contents after the pass, to persist.
    pub snapshot: Vec<EventRecord>,
    /// Records removed by the pass.
    pub forgotten: usize,
}

/// Pass-to-pass state of the pipeline.
#[derive(Debug)]
pub struct AggregationPipeline {
    first_pass: bool,
    summary_shown: bool,
    last_complete_format: Option<bool>,
}

impl Default for AggregationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

struct Bucket {
    conversation_id: ConversationId,
    indices: Vec<usize>,
}

impl AggregationPipeline {
    /// Pipeline that has not run yet; its first pass re-renders everything.
    pub fn new() -> Self {
        Self {
            first_pass: true,
            summary_shown: false,
            last_complete_format: None,
        }
    }

    /// Whether the next pass is the first.
    pub fn is_first_pass(&self) -> bool {
        self.first_pass
    }

    /// Whether the last pass left a summary on screen.
    pub fn summary_shown(&self) -> bool {
        self.summary_shown
    }

    /// Note that the host removed every rendering (e.g. `clear_all`).
    pub fn forget_rendered(&mut self) {
        self.summary_shown = false;
    }

    /// Run one pass over `store`.
    #[instrument(skip_all, fields(first_pass = self.first_pass, records = store.len()))]
    pub fn run(&mut self, store: &mut EventStore, ctx: &PassContext<'_>) -> PassOutput {
        let mut instructions = Vec::new();
        let mut force = self.first_pass;

        if self
            .last_complete_format
            .is_some_and(|previous| previous != ctx.complete_format)
        {
            debug!(
                complete_format = ctx.complete_format,
                "notification format changed, cancelling all"
            );
            instructions.push(RenderInstruction::CancelAll);
            self.summary_shown = false;
            force = true;
        }
        self.last_complete_format = Some(ctx.complete_format);

        let records = store.records_mut();
        let mut forget = vec![false; records.len()];
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut bucket_of: HashMap<ConversationId, usize> = HashMap::new();
        let mut invitations = Vec::new();
        let mut simples = Vec::new();

        // ── Partition ───────────────────────────────────────────────────
        for (i, record) in records.iter().enumerate() {
            match &record.kind {
                EventKind::Message(_) => {
                    let Some(conversation_id) = &record.conversation_id else {
                        warn!(event_id = %record.event_id, "message without conversation, dropping");
                        forget[i] = true;
                        continue;
                    };
                    let slot = *bucket_of.entry(conversation_id.clone()).or_insert_with(|| {
                        buckets.push(Bucket {
                            conversation_id: conversation_id.clone(),
                            indices: Vec::new(),
                        });
                        buckets.len() - 1
                    });
                    let suppressed = ctx.current_conversation == Some(conversation_id)
                        || ctx.detector.is_some_and(|d| d.is_outdated(record));
                    if suppressed {
                        trace!(event_id = %record.event_id, %conversation_id, "forgetting message");
                        forget[i] = true;
                    } else {
                        buckets[slot].indices.push(i);
                    }
                }
                EventKind::Invitation(_) => {
                    if ctx.hide_invites {
                        forget[i] = true;
                    } else {
                        invitations.push(i);
                    }
                }
                EventKind::Simple(_) => simples.push(i),
            }
        }

        let mut changed = false;
        let mut should_alert = false;

        // ── Conversation groups ─────────────────────────────────────────
        let mut groups = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let mut live: Vec<usize> = bucket
                .indices
                .iter()
                .copied()
                .filter(|&i| !records[i].is_redacted)
                .collect();

            if live.is_empty() {
                debug!(conversation_id = %bucket.conversation_id, "nothing left in conversation, clearing");
                for &i in &bucket.indices {
                    forget[i] = true;
                }
                if ctx.complete_format {
                    instructions.push(RenderInstruction::ClearConversation(bucket.conversation_id));
                }
                changed = true;
                continue;
            }

            live.sort_by_key(|&i| records[i].timestamp);

            let has_unrendered = bucket.indices.iter().any(|&i| !records[i].has_been_rendered);
            let mut group_alert = false;
            let mut custom_sound = None;
            for &i in &live {
                let record = &records[i];
                if !record.has_been_rendered {
                    group_alert |= record.is_noisy;
                    if record.sound_identifier.is_some() {
                        custom_sound.clone_from(&record.sound_identifier);
                    }
                }
            }

            for &i in &bucket.indices {
                if records[i].is_redacted {
                    forget[i] = true;
                } else {
                    records[i].has_been_rendered = true;
                }
            }

            let group = ConversationGroup::new(
                bucket.conversation_id,
                live.iter().map(|&i| records[i].clone()).collect(),
                group_alert,
                custom_sound,
                has_unrendered,
            );

            if force || has_unrendered {
                changed = true;
                should_alert |= group_alert;
                if ctx.complete_format {
                    instructions.push(RenderInstruction::RenderConversation(group.clone()));
                }
            }
            groups.push(group);
        }

        // ── Invitations and simple alerts ───────────────────────────────
        let mut live_invitations = Vec::with_capacity(invitations.len());
        for i in invitations {
            let record = &mut records[i];
            if record.is_redacted {
                forget[i] = true;
                changed = true;
                if ctx.complete_format {
                    if let Some(conversation_id) = &record.conversation_id {
                        instructions.push(RenderInstruction::ClearInvitation(conversation_id.clone()));
                    }
                }
                continue;
            }
            if force || !record.has_been_rendered {
                changed = true;
                should_alert |= record.is_noisy && !record.has_been_rendered;
                record.has_been_rendered = true;
                if ctx.complete_format {
                    instructions.push(RenderInstruction::RenderInvitation(record.clone()));
                }
            }
            live_invitations.push(record.clone());
        }

        let mut live_simples = Vec::with_capacity(simples.len());
        for i in simples {
            let record = &mut records[i];
            if record.is_redacted {
                forget[i] = true;
                changed = true;
                continue;
            }
            if force || !record.has_been_rendered {
                changed = true;
                should_alert |= record.is_noisy && !record.has_been_rendered;
                record.has_been_rendered = true;
                if ctx.complete_format {
                    instructions.push(RenderInstruction::RenderSimple(record.clone()));
                }
            }
            live_simples.push(record.clone());
        }

        let mut idx = 0;
        let forgotten = store.remove_where(|_| {
            let drop_it = forget[idx];
            idx += 1;
            drop_it
        });

        // ── Summary ─────────────────────────────────────────────────────
        let renderable = !groups.is_empty() || !live_invitations.is_empty() || !live_simples.is_empty();
        let summary = if renderable {
            let summary = GlobalSummary::build(&groups, &live_invitations, &live_simples, should_alert);
            if force || changed || !self.summary_shown {
                instructions.push(RenderInstruction::RenderSummary(summary.clone()));
                self.summary_shown = true;
            }
            Some(summary)
        } else {
            if force || self.summary_shown {
                instructions.push(RenderInstruction::ClearSummary);
            }
            self.summary_shown = false;
            None
        };

        self.first_pass = false;

        counter!("drawer_passes_total").increment(1);
        counter!("drawer_render_instructions_total").increment(instructions.len() as u64);
        debug!(
            groups = groups.len(),
            invitations = live_invitations.len(),
            simples = live_simples.len(),
            forgotten,
            instructions = instructions.len(),
            alert = should_alert,
            "aggregation pass done"
        );

        PassOutput {
            instructions,
            summary,
            snapshot: store.snapshot(),
            forgotten,
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
    use drawer_core::{EventId, InvitationContent, MessageContent, SimpleContent};

    fn msg(id: &str, room: &str, ts: i64) -> EventRecord {
        EventRecord::message(
            id,
            room,
            ts,
            MessageContent {
                sender_id: "@bob".into(),
                sender_display_name: Some("Bob".into()),
                conversation_display_name: Some(format!("Room {room}")),
                body: format!("body {id}"),
                ..MessageContent::default()
            },
        )
        .noisy(true)
    }

    fn invite(id: &str, room: &str) -> EventRecord {
        EventRecord::invitation(
            id,
            room,
            50,
            InvitationContent {
                title: "Invite".into(),
                description: format!("invited to {room}"),
            },
        )
        .noisy(true)
    }

    fn simple(id: &str) -> EventRecord {
        EventRecord::simple(
            id,
            None,
            60,
            SimpleContent {
                title: "Alert".into(),
                description: "something".into(),
                kind_tag: "m.custom".into(),
            },
        )
    }

    fn complete() -> PassContext<'static> {
        PassContext::from_settings(&DrawerSettings::default())
    }

    fn store_of(records: Vec<EventRecord>) -> EventStore {
        let mut store = EventStore::new();
        for r in records {
            let _ = store.insert_or_merge(r);
        }
        store
    }

    fn rendered_groups(out: &PassOutput) -> Vec<&ConversationGroup> {
        out.instructions
            .iter()
            .filter_map(|i| match i {
                RenderInstruction::RenderConversation(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_pass_groups_by_conversation_in_first_appearance_order() {
        let mut store = store_of(vec![msg("e1", "!b", 3), msg("e2", "!a", 1), msg("e3", "!b", 2)]);
        let mut pipeline = AggregationPipeline::new();
        let out = pipeline.run(&mut store, &complete());

        let groups = rendered_groups(&out);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].conversation_id.as_str(), "!b");
        let ids: Vec<&str> = groups[0].messages.iter().map(|m| m.event_id.as_str()).collect();
        assert_eq!(ids, ["e3", "e1"]);
        assert!(groups[0].should_alert);
        assert_matches!(out.instructions.last(), Some(RenderInstruction::RenderSummary(s)) if s.should_alert && s.message_count == 3);
        assert!(out.snapshot.iter().all(|r| r.has_been_rendered));
        assert!(!pipeline.is_first_pass());
    }

    #[test]
    fn second_pass_without_changes_is_silent() {
        let mut store = store_of(vec![msg("e1", "!a", 1), invite("i1", "!x"), simple("s1")]);
        let mut pipeline = AggregationPipeline::new();
        let first = pipeline.run(&mut store, &complete());
        assert!(!first.instructions.is_empty());

        let second = pipeline.run(&mut store, &complete());
        assert!(second.instructions.is_empty(), "{:?}", second.instructions);
        assert!(second.summary.is_some());
    }

    #[test]
    fn only_changed_group_rerenders() {
        let mut store = store_of(vec![msg("e1", "!a", 1), msg("e2", "!b", 2)]);
        let mut pipeline = AggregationPipeline::new();
        let _ = pipeline.run(&mut store, &complete());

        let _ = store.insert_or_merge(msg("e3", "!b", 3));
        let out = pipeline.run(&mut store, &complete());
        let groups = rendered_groups(&out);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].conversation_id.as_str(), "!b");
        assert_eq!(groups[0].messages.len(), 2);
        assert_matches!(out.instructions.last(), Some(RenderInstruction::RenderSummary(s)) if s.conversation_count == 2);
    }

    #[test]
    fn redacting_only_message_clears_without_alert() {
        let mut store = store_of(vec![msg("e1", "!a", 1)]);
        let mut pipeline = AggregationPipeline::new();
        let _ = pipeline.run(&mut store, &complete());

        assert!(store.mark_redacted(&EventId::from("e1")));
        let out = pipeline.run(&mut store, &complete());
        assert_eq!(
            out.instructions,
            vec![
                RenderInstruction::ClearConversation("!a".into()),
                RenderInstruction::ClearSummary,
            ]
        );
        assert!(!out.instructions.iter().any(RenderInstruction::alerts));
        assert!(store.is_empty());

        let again = pipeline.run(&mut store, &complete());
        assert!(again.instructions.is_empty());
    }

    #[test]
    fn redaction_rerenders_group_quietly() {
        let mut store = store_of(vec![msg("e1", "!a", 1), msg("e2", "!a", 2)]);
        let mut pipeline = AggregationPipeline::new();
        let _ = pipeline.run(&mut store, &complete());

        let _ = store.mark_redacted(&EventId::from("e1"));
        let out = pipeline.run(&mut store, &complete());
        let groups = rendered_groups(&out);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].messages.len(), 1);
        assert!(!groups[0].should_alert);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn current_conversation_is_forgotten_and_cleared() {
        let mut store = store_of(vec![msg("e1", "!a", 1), msg("e2", "!b", 2)]);
        let current = ConversationId::from("!a");
        let ctx = complete().with_current(Some(&current));
        let out = AggregationPipeline::new().run(&mut store, &ctx);

        assert_eq!(out.instructions[0], RenderInstruction::ClearConversation("!a".into()));
        assert_eq!(rendered_groups(&out)[0].conversation_id.as_str(), "!b");
        assert_eq!(out.forgotten, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn outdated_messages_are_forgotten() {
        let mut store = store_of(vec![msg("e1", "!a", 1), msg("e2", "!a", 200)]);
        let detector: &dyn OutdatedEventDetector = &|r: &EventRecord| r.timestamp < 100;
        let ctx = complete().with_detector(Some(detector));
        let out = AggregationPipeline::new().run(&mut store, &ctx);

        let groups = rendered_groups(&out);
        assert_eq!(groups[0].messages.len(), 1);
        assert_eq!(groups[0].messages[0].event_id.as_str(), "e2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn hidden_invites_are_dropped() {
        let mut store = store_of(vec![invite("i1", "!x"), msg("e1", "!a", 1)]);
        let mut ctx = complete();
        ctx.hide_invites = true;
        let out = AggregationPipeline::new().run(&mut store, &ctx);

        assert!(!out.instructions.iter().any(|i| matches!(i, RenderInstruction::RenderInvitation(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn invitations_and_simples_render_once() {
        let mut store = store_of(vec![invite("i1", "!x"), simple("s1")]);
        let mut pipeline = AggregationPipeline::new();
        let out = pipeline.run(&mut store, &complete());
        let labels: Vec<&str> = out.instructions.iter().map(RenderInstruction::label).collect();
        assert_eq!(labels, ["render_invitation", "render_simple", "render_summary"]);

        let _ = store.insert_or_merge(invite("i2", "!y"));
        let out = pipeline.run(&mut store, &complete());
        let labels: Vec<&str> = out.instructions.iter().map(RenderInstruction::label).collect();
        assert_eq!(labels, ["render_invitation", "render_summary"]);
    }

    #[test]
    fn empty_first_pass_clears_summary_once() {
        let mut store = EventStore::new();
        let mut pipeline = AggregationPipeline::new();
        let out = pipeline.run(&mut store, &complete());
        assert_eq!(out.instructions, vec![RenderInstruction::ClearSummary]);
        assert!(out.summary.is_none());
        assert!(pipeline.run(&mut store, &complete()).instructions.is_empty());
    }

    #[test]
    fn compact_format_emits_summary_only() {
        let mut store = store_of(vec![msg("e1", "!a", 1), msg("e2", "!b", 2), invite("i1", "!x")]);
        let mut ctx = complete();
        ctx.complete_format = false;
        let out = AggregationPipeline::new().run(&mut store, &ctx);

        assert_eq!(out.instructions.len(), 1);
        assert_matches!(
            &out.instructions[0],
            RenderInstruction::RenderSummary(s) if s.compact_text == "2 new messages in 2 conversations and 1 invitation"
        );
    }

    #[test]
    fn format_change_cancels_and_rerenders_everything() {
        let mut store = store_of(vec![msg("e1", "!a", 1)]);
        let mut pipeline = AggregationPipeline::new();
        let _ = pipeline.run(&mut store, &complete());

        let mut compact = complete();
        compact.complete_format = false;
        let out = pipeline.run(&mut store, &compact);
        assert_eq!(out.instructions[0], RenderInstruction::CancelAll);
        assert_matches!(&out.instructions[1], RenderInstruction::RenderSummary(s) if !s.should_alert);

        let out = pipeline.run(&mut store, &complete());
        let labels: Vec<&str> = out.instructions.iter().map(RenderInstruction::label).collect();
        assert_eq!(labels, ["cancel_all", "render_conversation", "render_summary"]);
    }

    #[test]
    fn custom_sound_from_latest_unrendered() {
        let mut store = store_of(vec![
            msg("e1", "!a", 1).with_sound("one"),
            msg("e2", "!a", 2).with_sound("two"),
            msg("e3", "!a", 3),
        ]);
        let out = AggregationPipeline::new().run(&mut store, &complete());
        assert_eq!(rendered_groups(&out)[0].custom_sound.as_deref(), Some("two"));
    }

    #[test]
    fn message_without_conversation_is_dropped() {
        let mut orphan = msg("e1", "!a", 1);
        orphan.conversation_id = None;
        let mut store = store_of(vec![orphan]);
        let out = AggregationPipeline::new().run(&mut store, &complete());
        assert!(store.is_empty());
        assert_eq!(out.instructions, vec![RenderInstruction::ClearSummary]);
    }

    #[test]
    fn summary_reappears_after_forget_rendered() {
        let mut store = store_of(vec![msg("e1", "!a", 1)]);
        let mut pipeline = AggregationPipeline::new();
        let _ = pipeline.run(&mut store, &complete());
        assert!(pipeline.summary_shown());

        pipeline.forget_rendered();
        let out = pipeline.run(&mut store, &complete());
        assert_matches!(out.instructions.as_slice(), [RenderInstruction::RenderSummary(_)]);
    }
}
