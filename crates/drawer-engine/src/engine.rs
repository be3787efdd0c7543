//! The drawer engine facade.
//!
//! [`DrawerEngine`] is what producers (live stream, push handler, UI) call.
//! Every operation is synchronous and thread-safe: it mutates the store
//! under one short critical section and asks the [`Scheduler`] for a pass.
//! The pass itself runs on the scheduler's worker, renders after the store
//! lock is released, then persists the post-pass snapshot once the pipeline
//! lock is released too.
//!
//! Lock order: `pipeline` before `state`. The pipeline lock serializes
//! passes with the facade operations that talk to the renderer directly,
//! so a clear can never be overtaken by a stale render. Snapshot writes
//! happen outside both locks under `written`; each snapshot carries the
//! generation it was taken at and an older one never overwrites a newer one.
//!
//! Nothing here returns an error to producers; persistence failures
//! (including a store that cannot be opened) are logged and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use drawer_core::{ConversationId, EventId, EventRecord};
use drawer_settings::DrawerSettings;
use drawer_store::{EventStore, MergeOutcome, PersistenceGateway, load_or_empty, open_or_recover};
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::pipeline::{AggregationPipeline, PassContext};
use crate::renderer::{RenderInstruction, Renderer};
use crate::resolver::{EventResolver, OutdatedEventDetector};
use crate::scheduler::{Scheduler, SchedulerState};

/// Store plus the conversation the user is looking at; guarded together.
#[derive(Debug, Default)]
struct DrawerState {
    store: EventStore,
    current_conversation: Option<ConversationId>,
}

struct Inner {
    state: Mutex<DrawerState>,
    pipeline: Mutex<AggregationPipeline>,
    settings: RwLock<DrawerSettings>,
    renderer: Arc<dyn Renderer>,
    gateway: Arc<dyn PersistenceGateway>,
    detector: Option<Arc<dyn OutdatedEventDetector>>,
    /// Bumped under the state lock whenever a snapshot is taken.
    generation: AtomicU64,
    /// Generation of the last snapshot handed to the gateway.
    written: Mutex<u64>,
}

/// Outcome of one pass as seen by the engine.
#[derive(Clone, Debug)]
pub struct PassReport {
    /// Instructions applied to the renderer.
    pub instructions: Vec<RenderInstruction>,
    /// Records left in the store.
    pub live_records: usize,
    /// Whether the snapshot write (or delete) succeeded.
    pub persisted: bool,
}

impl Inner {
    fn run_pass(&self) -> PassReport {
        let (output, generation) = {
            let mut pipeline = self.pipeline.lock();
            let settings = self.settings.read().clone();

            let (output, generation) = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                let ctx = PassContext::from_settings(&settings)
                    .with_current(state.current_conversation.as_ref())
                    .with_detector(self.detector.as_deref());
                (pipeline.run(&mut state.store, &ctx), self.next_generation())
            };

            for instruction in &output.instructions {
                instruction.apply(self.renderer.as_ref());
            }
            (output, generation)
        };

        let persisted = self.write_snapshot(generation, &output.snapshot);
        PassReport {
            live_records: output.snapshot.len(),
            instructions: output.instructions,
            persisted,
        }
    }

    /// Call with the state lock held so generations follow store order.
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Save `snapshot`, or delete the blob when there is nothing to keep.
    /// A snapshot older than the last one written is skipped.
    fn write_snapshot(&self, generation: u64, snapshot: &[EventRecord]) -> bool {
        let mut written = self.written.lock();
        if *written > generation {
            debug!(generation, newer = *written, "newer snapshot already written, skipping");
            return true;
        }
        *written = generation;

        let (op, result) = if snapshot.is_empty() {
            ("clear", self.gateway.clear())
        } else {
            ("save", self.gateway.save(snapshot))
        };
        match result {
            Ok(()) => true,
            Err(error) => {
                counter!("drawer_persist_failures_total", "op" => op).increment(1);
                warn!(backend = self.gateway.name(), op, %error, "failed to persist notifications");
                false
            }
        }
    }
}

/// Install the default `tracing` subscriber at `settings.log_level`.
///
/// `RUST_LOG` still takes precedence. Hosts that bring their own subscriber
/// skip this.
pub fn init_logging(settings: &DrawerSettings) {
    drawer_core::logging::init_subscriber(&settings.log_level);
}

/// Builder for [`DrawerEngine`].
pub struct DrawerEngineBuilder {
    renderer: Arc<dyn Renderer>,
    settings: DrawerSettings,
    gateway: Option<Arc<dyn PersistenceGateway>>,
    detector: Option<Arc<dyn OutdatedEventDetector>>,
}

impl DrawerEngineBuilder {
    /// Use `settings` instead of the defaults.
    #[must_use]
    pub fn settings(mut self, settings: DrawerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use `gateway` instead of opening the one named by the settings.
    #[must_use]
    pub fn gateway(mut self, gateway: Arc<dyn PersistenceGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Forget messages this detector reports as outdated.
    #[must_use]
    pub fn outdated_detector(mut self, detector: Arc<dyn OutdatedEventDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Restore the persisted snapshot and start the worker on the current
    /// Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(self) -> DrawerEngine {
        self.start_on(&Handle::current())
    }

    /// Restore the persisted snapshot and start the worker on `runtime`.
    ///
    /// Never fails: an unreadable snapshot store starts the engine empty.
    pub fn start_on(self, runtime: &Handle) -> DrawerEngine {
        let gateway = match self.gateway {
            Some(gateway) => gateway,
            None => open_or_recover(&self.settings.persistence),
        };

        let restored = EventStore::from_records(load_or_empty(gateway.as_ref()));
        let restored_count = restored.len();
        let quiet_period = Duration::from_millis(self.settings.scheduler.quiet_period_ms);

        let inner = Arc::new(Inner {
            state: Mutex::new(DrawerState {
                store: restored,
                current_conversation: None,
            }),
            pipeline: Mutex::new(AggregationPipeline::new()),
            settings: RwLock::new(self.settings),
            renderer: self.renderer,
            gateway,
            detector: self.detector,
            generation: AtomicU64::new(0),
            written: Mutex::new(0),
        });

        let worker = Arc::clone(&inner);
        let scheduler = Scheduler::spawn_on(runtime, quiet_period, move || {
            let _ = worker.run_pass();
        });

        info!(
            backend = inner.gateway.name(),
            restored = restored_count,
            quiet_ms = quiet_period.as_millis(),
            "drawer engine started"
        );

        let engine = DrawerEngine { inner, scheduler };
        if restored_count > 0 {
            engine.request_refresh();
        }
        engine
    }
}

/// Thread-safe facade over the event store, pipeline and scheduler.
pub struct DrawerEngine {
    inner: Arc<Inner>,
    scheduler: Scheduler,
}

impl std::fmt::Debug for DrawerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawerEngine")
            .field("backend", &self.inner.gateway.name())
            .field("scheduler", &self.scheduler.state())
            .finish_non_exhaustive()
    }
}

impl DrawerEngine {
    /// Start building an engine rendering to `renderer`.
    pub fn builder(renderer: Arc<dyn Renderer>) -> DrawerEngineBuilder {
        DrawerEngineBuilder {
            renderer,
            settings: DrawerSettings::default(),
            gateway: None,
            detector: None,
        }
    }

    // ── Producer operations ─────────────────────────────────────────────

    /// Merge a resolved record into the store and schedule a pass.
    ///
    /// Returns `None` when notifications are disabled and the record was
    /// dropped.
    pub fn on_notifiable_event_received(&self, record: EventRecord) -> Option<MergeOutcome> {
        if !self.inner.settings.read().notifications_enabled {
            counter!("drawer_events_received_total", "outcome" => "disabled").increment(1);
            debug!(event_id = %record.event_id, "notifications disabled, dropping record");
            return None;
        }

        let event_id = record.event_id.clone();
        let kind = record.kind_label();
        let outcome = self.inner.state.lock().store.insert_or_merge(record);

        counter!("drawer_events_received_total", "outcome" => outcome.label()).increment(1);
        debug!(%event_id, kind, outcome = outcome.label(), "notifiable event received");
        self.request_refresh();
        Some(outcome)
    }

    /// Resolve a raw protocol event through `resolver` and submit it.
    /// Returns `None` when the resolver declines or notifications are off.
    pub fn on_raw_event_received<R: EventResolver>(
        &self,
        resolver: &R,
        raw: &R::RawEvent,
    ) -> Option<MergeOutcome> {
        let record = resolver.resolve(raw)?;
        self.on_notifiable_event_received(record)
    }

    /// Flag a record as redacted and schedule a pass. Returns whether the
    /// record was known.
    pub fn on_event_redacted(&self, event_id: &EventId) -> bool {
        let found = self.inner.state.lock().store.mark_redacted(event_id);
        debug!(%event_id, found, "event redacted");
        self.request_refresh();
        found
    }

    /// Record which conversation the user has open (`None` when none).
    /// Switching to a conversation drops its pending messages and clears its
    /// notification right away.
    pub fn set_current_conversation(&self, conversation_id: Option<ConversationId>) {
        let _pipeline = self.inner.pipeline.lock();
        let entered = {
            let mut state = self.inner.state.lock();
            if state.current_conversation == conversation_id {
                return;
            }
            state.current_conversation = conversation_id;
            let Some(id) = state.current_conversation.clone() else {
                return;
            };
            let removed = state.store.remove_by_conversation(&id);
            debug!(conversation_id = %id, removed, "conversation opened");
            id
        };

        self.inner.renderer.clear_conversation_render(&entered);
        self.request_refresh();
    }

    /// Drop every message of a conversation and its notification.
    pub fn clear_conversation(&self, conversation_id: &ConversationId) {
        let _pipeline = self.inner.pipeline.lock();
        let removed = self
            .inner
            .state
            .lock()
            .store
            .remove_by_conversation(conversation_id);
        debug!(%conversation_id, removed, "conversation cleared");
        self.inner.renderer.clear_conversation_render(conversation_id);
        self.request_refresh();
    }

    /// Drop the invitation of a conversation and its notification (after
    /// the user accepted or declined it elsewhere).
    pub fn clear_membership_notification(&self, conversation_id: &ConversationId) {
        let _pipeline = self.inner.pipeline.lock();
        let removed = self
            .inner
            .state
            .lock()
            .store
            .remove_invitations(conversation_id);
        debug!(%conversation_id, removed, "membership notification cleared");
        self.inner.renderer.clear_invitation_render(conversation_id);
        self.request_refresh();
    }

    /// Drop everything and remove every notification.
    pub fn clear_all(&self) {
        let mut pipeline = self.inner.pipeline.lock();
        let removed = self.inner.state.lock().store.remove_all();
        info!(removed, "all notifications cleared");
        self.inner.renderer.cancel_all();
        self.inner.renderer.clear_summary();
        pipeline.forget_rendered();
        self.request_refresh();
    }

    /// Schedule a pass after the quiet period.
    pub fn request_refresh(&self) {
        if !self.scheduler.request() {
            debug!("refresh requested after shutdown, ignoring");
        }
    }

    /// Run a pass on the calling thread, bypassing the debounce.
    pub fn refresh_now(&self) -> PassReport {
        self.inner.run_pass()
    }

    /// Write the current store contents now. Returns whether the write
    /// succeeded.
    pub fn persist(&self) -> bool {
        let (snapshot, generation) = {
            let state = self.inner.state.lock();
            (state.store.snapshot(), self.inner.next_generation())
        };
        self.inner.write_snapshot(generation, &snapshot)
    }

    // ── Configuration and inspection ────────────────────────────────────

    /// Replace the settings and schedule a pass so format changes apply.
    /// The quiet period is fixed at start.
    pub fn update_settings(&self, settings: DrawerSettings) {
        *self.inner.settings.write() = settings;
        self.request_refresh();
    }

    /// Current settings.
    pub fn settings(&self) -> DrawerSettings {
        self.inner.settings.read().clone()
    }

    /// Conversation the user has open.
    pub fn current_conversation(&self) -> Option<ConversationId> {
        self.inner.state.lock().current_conversation.clone()
    }

    /// Copy of the live records in store order.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.inner.state.lock().store.snapshot()
    }

    /// Scheduler worker state.
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Passes run by the worker so far (excludes [`refresh_now`](Self::refresh_now)).
    pub fn passes_completed(&self) -> u64 {
        self.scheduler.passes_completed()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// The owning session ended: stop the worker, forget everything, delete
    /// the durable blob and remove the summary.
    pub fn end_session(&self) {
        self.scheduler.shutdown();
        let generation = {
            let mut pipeline = self.inner.pipeline.lock();
            let generation = {
                let mut state = self.inner.state.lock();
                let _ = state.store.remove_all();
                state.current_conversation = None;
                self.inner.next_generation()
            };
            self.inner.renderer.clear_summary();
            pipeline.forget_rendered();
            generation
        };
        let _ = self.inner.write_snapshot(generation, &[]);
        info!("drawer session ended");
    }

    /// Stop the worker. Pending passes are dropped; the store is kept.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
