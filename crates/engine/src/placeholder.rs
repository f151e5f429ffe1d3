//! Transient "thinking" placeholder shown before real reasoning arrives.

use shared::message::Message;
use shared::stream::TransportStatus;
use tracing::debug;

/// Sentinel text marking a UI placeholder. Renderers map this to a spinner;
/// it must never be mistaken for model output.
pub const THINKING_PLACEHOLDER: &str = "__thinking__";

/// Inserts the placeholder while a thinking-capable model is responding and
/// removes it again if no real reasoning ever replaced it.
pub struct PlaceholderManager;

impl PlaceholderManager {
    /// Reconcile placeholder state with the current transport status. Safe
    /// to call on every tick.
    pub fn sync(
        &self,
        status: TransportStatus,
        supports_thinking: bool,
        messages: &mut [Message],
    ) {
        if status.is_busy() {
            if !supports_thinking {
                return;
            }
            if let Some(last) = messages.last_mut() {
                if last.is_assistant() && last.reasoning_text().is_none() {
                    debug!(message_id = %last.id, "inserting thinking placeholder");
                    last.set_reasoning_text(THINKING_PLACEHOLDER);
                }
            }
        } else if let Some(newest_assistant) =
            messages.iter_mut().rev().find(|m| m.is_assistant())
        {
            // Leaving the busy states with the sentinel still in place means
            // no delta ever arrived; drop the part rather than persisting an
            // empty placeholder.
            if newest_assistant.reasoning_text() == Some(THINKING_PLACEHOLDER)
                && newest_assistant.reasoning.is_none()
            {
                debug!(message_id = %newest_assistant.id, "removing unused thinking placeholder");
                newest_assistant.remove_reasoning_part();
            }
        }
    }
}
