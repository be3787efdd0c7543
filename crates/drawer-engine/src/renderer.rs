//! The presentation seam.
//!
//! The engine never builds platform notifications itself: each pass produces
//! a list of [`RenderInstruction`]s which are applied to the host's
//! [`Renderer`] after the store lock is released.

use drawer_core::{ConversationId, EventRecord};
use parking_lot::Mutex;
use serde::Serialize;

use crate::group::{ConversationGroup, GlobalSummary};

/// Platform notification presentation layer, supplied by the host.
///
/// Calls arrive from the engine's worker (or the thread calling
/// `refresh_now`/`clear_*`), never concurrently with each other.
pub trait Renderer: Send + Sync {
    /// Show or update the notification of one conversation.
    fn render_conversation(&self, group: &ConversationGroup);

    /// Remove the notification of one conversation.
    fn clear_conversation_render(&self, conversation_id: &ConversationId);

    /// Show an invitation.
    fn render_invitation(&self, record: &EventRecord);

    /// Remove the invitation notification of a conversation.
    fn clear_invitation_render(&self, conversation_id: &ConversationId) {
        let _ = conversation_id;
    }

    /// Show a standalone alert.
    fn render_simple(&self, record: &EventRecord);

    /// Show or update the drawer summary.
    fn render_summary(&self, summary: &GlobalSummary);

    /// Remove the drawer summary.
    fn clear_summary(&self);

    /// Remove every notification this renderer has shown.
    fn cancel_all(&self) {}
}

/// One renderer call, as decided by a pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum RenderInstruction {
    /// Drop everything (notification format changed).
    CancelAll,
    /// [`Renderer::render_conversation`].
    RenderConversation(ConversationGroup),
    /// [`Renderer::clear_conversation_render`].
    ClearConversation(ConversationId),
    /// [`Renderer::render_invitation`].
    RenderInvitation(EventRecord),
    /// [`Renderer::clear_invitation_render`].
    ClearInvitation(ConversationId),
    /// [`Renderer::render_simple`].
    RenderSimple(EventRecord),
    /// [`Renderer::render_summary`].
    RenderSummary(GlobalSummary),
    /// [`Renderer::clear_summary`].
    ClearSummary,
}

impl RenderInstruction {
    /// Invoke the matching renderer method.
    pub fn apply(&self, renderer: &dyn Renderer) {
        match self {
            Self::CancelAll => renderer.cancel_all(),
            Self::RenderConversation(group) => renderer.render_conversation(group),
            Self::ClearConversation(id) => renderer.clear_conversation_render(id),
            Self::RenderInvitation(record) => renderer.render_invitation(record),
            Self::ClearInvitation(id) => renderer.clear_invitation_render(id),
            Self::RenderSimple(record) => renderer.render_simple(record),
            Self::RenderSummary(summary) => renderer.render_summary(summary),
            Self::ClearSummary => renderer.clear_summary(),
        }
    }

    /// Whether this shows something (as opposed to removing it).
    pub fn is_render(&self) -> bool {
        matches!(
            self,
            Self::RenderConversation(_)
                | Self::RenderInvitation(_)
                | Self::RenderSimple(_)
                | Self::RenderSummary(_)
        )
    }

    /// Whether this instruction would make the device alert.
    pub fn alerts(&self) -> bool {
        match self {
            Self::RenderConversation(group) => group.should_alert,
            Self::RenderSummary(summary) => summary.should_alert,
            _ => false,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CancelAll => "cancel_all",
            Self::RenderConversation(_) => "render_conversation",
            Self::ClearConversation(_) => "clear_conversation",
            Self::RenderInvitation(_) => "render_invitation",
            Self::ClearInvitation(_) => "clear_invitation",
            Self::RenderSimple(_) => "render_simple",
            Self::RenderSummary(_) => "render_summary",
            Self::ClearSummary => "clear_summary",
        }
    }
}

/// Renderer that only records what it was asked to do.
///
/// Useful for host-side diagnostics and tests.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    log: Mutex<Vec<RenderInstruction>>,
}

impl RecordingRenderer {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn instructions(&self) -> Vec<RenderInstruction> {
        self.log.lock().clone()
    }

    /// Drain the recorded instructions.
    pub fn take(&self) -> Vec<RenderInstruction> {
        std::mem::take(&mut *self.log.lock())
    }

    /// Number of recorded instructions.
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    fn push(&self, instruction: RenderInstruction) {
        self.log.lock().push(instruction);
    }
}

impl Renderer for RecordingRenderer {
    fn render_conversation(&self, group: &ConversationGroup) {
        self.push(RenderInstruction::RenderConversation(group.clone()));
    }

    fn clear_conversation_render(&self, conversation_id: &ConversationId) {
        self.push(RenderInstruction::ClearConversation(conversation_id.clone()));
    }

    fn render_invitation(&self, record: &EventRecord) {
        self.push(RenderInstruction::RenderInvitation(record.clone()));
    }

    fn clear_invitation_render(&self, conversation_id: &ConversationId) {
        self.push(RenderInstruction::ClearInvitation(conversation_id.clone()));
    }

    fn render_simple(&self, record: &EventRecord) {
        self.push(RenderInstruction::RenderSimple(record.clone()));
    }

    fn render_summary(&self, summary: &GlobalSummary) {
        self.push(RenderInstruction::RenderSummary(summary.clone()));
    }

    fn clear_summary(&self) {
        self.push(RenderInstruction::ClearSummary);
    }

    fn cancel_all(&self) {
        self.push(RenderInstruction::CancelAll);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
