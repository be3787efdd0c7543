//! # drawer-engine
//!
//! Turns a bursty stream of resolved notifiable records into grouped,
//! deduplicated render instructions.
//!
//! - **Aggregation pipeline**: one pass groups messages by conversation,
//!   decides what needs re-rendering and builds the global summary
//! - **Scheduler**: a single worker task that debounces refresh requests
//!   into one pass after a quiet period
//! - **Drawer engine**: the thread-safe facade producers call; owns the
//!   event store and persists it after every pass
//! - **Host seams**: [`Renderer`], [`EventResolver`], [`AvatarResolver`] and
//!   [`OutdatedEventDetector`]

#![deny(unsafe_code)]

pub mod engine;
pub mod group;
pub mod pipeline;
pub mod renderer;
pub mod resolver;
pub mod scheduler;

pub use engine::{DrawerEngine, DrawerEngineBuilder, PassReport, init_logging};
pub use group::{ConversationGroup, GlobalSummary};
pub use pipeline::{AggregationPipeline, PassContext, PassOutput};
pub use renderer::{RecordingRenderer, RenderInstruction, Renderer};
pub use resolver::{AvatarResolver, EventResolver, OutdatedEventDetector};
pub use scheduler::{RefreshHandle, Scheduler, SchedulerState};
