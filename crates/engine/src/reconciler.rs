//! Reconciles out-of-order reasoning stream events with the live message
//! list.
//!
//! Reasoning tokens and message-list mutations arrive on independent
//! timelines: the transport may append the assistant message before or after
//! the first delta. Text with no target yet is held in a
//! [`ReasoningBuffer`] and flushed by the message-list watcher the moment an
//! assistant message appears. Every path re-resolves the target against the
//! current list; nothing is cached across callbacks.

use shared::message::Message;
use shared::stream::{ReasoningBuffer, ReasoningEvent};
use tracing::debug;

/// What a reconciliation step did to the message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A message was patched in place.
    Patched,
    /// No assistant target existed; the text is held in the buffer.
    Buffered,
    /// Nothing to do.
    Unchanged,
}

/// Reducer over `(accumulated, target, buffer)` state. The message list is
/// passed in by the caller on every step, never stored.
#[derive(Debug, Default)]
pub struct ReasoningReconciler {
    accumulated: String,
    target_message_id: Option<String>,
    /// Message id excluded from target resolution while a regeneration
    /// keeps its slot in the list waiting for the replacement.
    withheld_from: Option<String>,
    buffer: ReasoningBuffer,
}

impl ReasoningReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stream event against the current message list.
    pub fn apply(&mut self, event: ReasoningEvent, messages: &mut [Message]) -> ReconcileOutcome {
        match event {
            ReasoningEvent::Start => {
                debug!("reasoning stream started");
                self.accumulated.clear();
                self.target_message_id = None;
                // A new stream supersedes anything still waiting from the
                // previous one.
                self.buffer.clear();
                ReconcileOutcome::Unchanged
            }
            ReasoningEvent::Delta { text } => {
                self.merge_delta(&text);
                self.attach(messages, None)
            }
            ReasoningEvent::End {
                duration_secs,
                total_text,
            } => {
                self.accumulated = total_text;
                self.attach(messages, Some(duration_secs))
            }
        }
    }

    /// Watcher hook: call after every change to the message list. Flushes a
    /// pending buffer onto a newly appeared assistant message, exactly once.
    pub fn on_messages_changed(&mut self, messages: &mut [Message]) -> ReconcileOutcome {
        if !self.buffer.pending {
            return ReconcileOutcome::Unchanged;
        }
        let Some(last) = messages.last_mut() else {
            return ReconcileOutcome::Unchanged;
        };
        if !last.is_assistant() || self.withheld_from.as_deref() == Some(last.id.as_str()) {
            return ReconcileOutcome::Unchanged;
        }
        let Some((text, duration)) = self.buffer.take() else {
            return ReconcileOutcome::Unchanged;
        };

        debug!(target_id = %last.id, "flushing buffered reasoning");
        self.target_message_id = Some(last.id.clone());
        self.withheld_from = None;
        match duration {
            // A recorded duration means the stream already ended; the flush
            // carries the top-level mirror with it.
            Some(secs) => last.finish_reasoning(&text, Some(secs)),
            None => last.set_reasoning_text(&text),
        }
        ReconcileOutcome::Patched
    }

    /// Exclude a message from target resolution. A regeneration keeps its
    /// slot in the list while the replacement streams in; reasoning that
    /// arrives meanwhile belongs to the incoming reply, so it buffers until
    /// that reply appears. Binding any other assistant message lifts the
    /// exclusion.
    pub fn withhold_from(&mut self, message_id: impl Into<String>) {
        let id = message_id.into();
        if self.target_message_id.as_deref() == Some(id.as_str()) {
            self.target_message_id = None;
        }
        self.withheld_from = Some(id);
    }

    /// Lift the exclusion set by [`withhold_from`](Self::withhold_from).
    pub fn release_withheld(&mut self) {
        self.withheld_from = None;
    }

    /// Buffer contents, for hosts that surface "reasoning waiting" state.
    pub fn buffer(&self) -> &ReasoningBuffer {
        &self.buffer
    }

    /// Id of the message currently bound as the reasoning target.
    pub fn target(&self) -> Option<&str> {
        self.target_message_id.as_deref()
    }

    /// Deltas normally carry the full accumulated text so far; a proper
    /// prefix of what we already hold is a replayed or stale frame. Only a
    /// source that sends true increments falls through to appending.
    fn merge_delta(&mut self, text: &str) {
        if text.starts_with(self.accumulated.as_str()) {
            self.accumulated.clear();
            self.accumulated.push_str(text);
        } else if self.accumulated.starts_with(text) {
            // replay of an older frame; keep the longer state
        } else {
            self.accumulated.push_str(text);
        }
    }

    /// Patch the bound target, or resolve a new one from the newest message,
    /// or buffer. `finished` carries the end-event duration when the stream
    /// is complete.
    fn attach(&mut self, messages: &mut [Message], finished: Option<f64>) -> ReconcileOutcome {
        if let Some(id) = self.target_message_id.clone() {
            if let Some(message) = messages.iter_mut().find(|m| m.id == id) {
                Self::patch(message, &self.accumulated, finished);
                return ReconcileOutcome::Patched;
            }
            // The bound message was deleted out from under us; resolve
            // fresh below.
            self.target_message_id = None;
        }

        match messages.last_mut() {
            Some(last)
                if last.is_assistant()
                    && self.withheld_from.as_deref() != Some(last.id.as_str()) =>
            {
                self.target_message_id = Some(last.id.clone());
                self.withheld_from = None;
                Self::patch(last, &self.accumulated, finished);
                // Anything buffered earlier is superseded by this direct
                // attach.
                self.buffer.clear();
                ReconcileOutcome::Patched
            }
            _ => {
                debug!("no assistant target; buffering reasoning");
                self.buffer.store(&self.accumulated, finished);
                ReconcileOutcome::Buffered
            }
        }
    }

    fn patch(message: &mut Message, accumulated: &str, finished: Option<f64>) {
        match finished {
            Some(secs) => message.finish_reasoning(accumulated, Some(secs)),
            None => message.set_reasoning_text(accumulated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::MessagePart;

    fn delta(text: &str) -> ReasoningEvent {
        ReasoningEvent::Delta { text: text.into() }
    }

    fn end(duration_secs: f64, total_text: &str) -> ReasoningEvent {
        ReasoningEvent::End {
            duration_secs,
            total_text: total_text.into(),
        }
    }

    fn reasoning_part_count(message: &Message) -> usize {
        message
            .parts
            .iter()
            .filter(|p| matches!(p, MessagePart::Reasoning { .. }))
            .count()
    }

    #[test]
    fn test_delta_attaches_to_newest_assistant() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::user("hi"), Message::assistant("")];

        let outcome = rec.apply(delta("considering"), &mut messages);

        assert_eq!(outcome, ReconcileOutcome::Patched);
        assert_eq!(messages[1].reasoning_text(), Some("considering"));
        assert!(matches!(messages[1].parts[0], MessagePart::Reasoning { .. }));
        assert!(!rec.buffer().pending);
        assert_eq!(rec.target(), Some(messages[1].id.as_str()));
    }

    #[test]
    fn test_delta_with_no_assistant_buffers() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::user("hi")];

        let outcome = rec.apply(delta("early thought"), &mut messages);

        assert_eq!(outcome, ReconcileOutcome::Buffered);
        assert!(rec.buffer().pending);
        assert_eq!(rec.buffer().text, "early thought");
        assert!(messages[0].reasoning_text().is_none());
    }

    #[test]
    fn test_buffer_flushes_when_assistant_appears() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::user("hi")];
        rec.apply(delta("early thought"), &mut messages);

        messages.push(Message::assistant(""));
        let outcome = rec.on_messages_changed(&mut messages);

        assert_eq!(outcome, ReconcileOutcome::Patched);
        assert_eq!(messages[1].reasoning_text(), Some("early thought"));
        assert!(!rec.buffer().pending);
        // A second watcher pass does nothing: the buffer flushed once.
        assert_eq!(
            rec.on_messages_changed(&mut messages),
            ReconcileOutcome::Unchanged
        );
    }

    #[test]
    fn test_buffered_end_flushes_mirror_and_duration() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::user("hi")];
        rec.apply(ReasoningEvent::Start, &mut messages);
        rec.apply(delta("partial"), &mut messages);
        rec.apply(end(4.0, "the whole trace"), &mut messages);
        assert!(rec.buffer().pending);

        messages.push(Message::assistant("answer"));
        rec.on_messages_changed(&mut messages);

        let target = &messages[1];
        assert_eq!(target.reasoning_text(), Some("the whole trace"));
        assert_eq!(target.reasoning.as_deref(), Some("the whole trace"));
        match &target.parts[0] {
            MessagePart::Reasoning { duration_secs, .. } => {
                assert_eq!(*duration_secs, Some(4.0))
            }
            other => panic!("expected reasoning part, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_full_state_delta_is_idempotent() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::assistant("")];

        rec.apply(delta("abc"), &mut messages);
        rec.apply(delta("abc def"), &mut messages);
        rec.apply(delta("abc def"), &mut messages);

        assert_eq!(messages[0].reasoning_text(), Some("abc def"));
        assert_eq!(reasoning_part_count(&messages[0]), 1);
    }

    #[test]
    fn test_stale_shorter_delta_is_ignored() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::assistant("")];

        rec.apply(delta("abc def"), &mut messages);
        rec.apply(delta("abc"), &mut messages);

        assert_eq!(messages[0].reasoning_text(), Some("abc def"));
    }

    #[test]
    fn test_incremental_source_appends() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::assistant("")];

        rec.apply(delta("first half, "), &mut messages);
        rec.apply(delta("second half"), &mut messages);

        assert_eq!(
            messages[0].reasoning_text(),
            Some("first half, second half")
        );
    }

    #[test]
    fn test_end_overwrites_with_total_text() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::assistant("answer")];

        rec.apply(delta("rough accumulation"), &mut messages);
        rec.apply(end(2.0, "clean final trace"), &mut messages);

        let msg = &messages[0];
        assert_eq!(msg.reasoning_text(), Some("clean final trace"));
        assert_eq!(msg.reasoning.as_deref(), Some("clean final trace"));
        assert_eq!(reasoning_part_count(msg), 1);
    }

    #[test]
    fn test_start_clears_pending_buffer() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::user("hi")];

        rec.apply(delta("orphaned thought"), &mut messages);
        assert!(rec.buffer().pending);

        rec.apply(ReasoningEvent::Start, &mut messages);
        assert!(!rec.buffer().pending);
        assert!(rec.buffer().text.is_empty());

        // The next stream starts from scratch
        rec.apply(delta("fresh"), &mut messages);
        assert_eq!(rec.buffer().text, "fresh");
    }

    #[test]
    fn test_rebinds_when_target_deleted() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::assistant("first")];
        rec.apply(delta("bound to first"), &mut messages);

        let replacement = Message::assistant("second");
        let replacement_id = replacement.id.clone();
        messages.clear();
        messages.push(replacement);

        rec.apply(delta("bound to first, continued"), &mut messages);

        assert_eq!(rec.target(), Some(replacement_id.as_str()));
        assert_eq!(
            messages[0].reasoning_text(),
            Some("bound to first, continued")
        );
    }

    #[test]
    fn test_withheld_slot_buffers_instead_of_binding() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::user("q"), Message::assistant("kept slot")];
        rec.withhold_from(messages[1].id.clone());

        rec.apply(ReasoningEvent::Start, &mut messages);
        let outcome = rec.apply(delta("for the replacement"), &mut messages);

        assert_eq!(outcome, ReconcileOutcome::Buffered);
        assert!(messages[1].reasoning_text().is_none());
        assert!(rec.buffer().pending);

        // The watcher refuses to flush onto the withheld slot too.
        assert_eq!(
            rec.on_messages_changed(&mut messages),
            ReconcileOutcome::Unchanged
        );
        assert!(rec.buffer().pending);

        // A different assistant message lifts the exclusion and takes the
        // buffered text.
        messages.push(Message::assistant(""));
        assert_eq!(
            rec.on_messages_changed(&mut messages),
            ReconcileOutcome::Patched
        );
        assert_eq!(messages[2].reasoning_text(), Some("for the replacement"));
        assert_eq!(rec.target(), Some(messages[2].id.as_str()));
    }

    #[test]
    fn test_withhold_unbinds_a_bound_target() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::assistant("old answer")];
        rec.apply(delta("earlier stream"), &mut messages);
        assert_eq!(rec.target(), Some(messages[0].id.as_str()));

        rec.withhold_from(messages[0].id.clone());
        let outcome = rec.apply(delta("earlier stream, resumed"), &mut messages);

        assert_eq!(outcome, ReconcileOutcome::Buffered);
        assert_eq!(rec.target(), None);
        assert_eq!(messages[0].reasoning_text(), Some("earlier stream"));
    }

    #[test]
    fn test_existing_reasoning_part_is_replaced_not_duplicated() {
        let mut rec = ReasoningReconciler::new();
        let mut msg = Message::assistant("");
        msg.set_reasoning_text("placeholder");
        let mut messages = vec![msg];

        rec.apply(delta("real reasoning"), &mut messages);

        assert_eq!(reasoning_part_count(&messages[0]), 1);
        assert_eq!(messages[0].reasoning_text(), Some("real reasoning"));
    }

    #[test]
    fn test_full_interleaving_converges_on_total_text() {
        // start, delta; assistant appears; delta, end. The classic race.
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::user("question")];

        rec.apply(ReasoningEvent::Start, &mut messages);
        rec.apply(delta("thinking"), &mut messages);
        messages.push(Message::assistant(""));
        rec.on_messages_changed(&mut messages);
        rec.apply(delta("thinking harder"), &mut messages);
        rec.apply(end(1.25, "thinking harder, done"), &mut messages);

        let msg = &messages[1];
        assert_eq!(reasoning_part_count(msg), 1);
        assert_eq!(msg.reasoning_text(), Some("thinking harder, done"));
        assert_eq!(msg.reasoning.as_deref(), Some("thinking harder, done"));
    }

    #[test]
    fn test_no_assistant_ever_appears_leaves_list_untouched() {
        let mut rec = ReasoningReconciler::new();
        let mut messages = vec![Message::user("question")];
        let before = messages.clone();

        rec.apply(ReasoningEvent::Start, &mut messages);
        rec.apply(delta("nowhere to go"), &mut messages);
        rec.apply(end(0.5, "nowhere to go"), &mut messages);

        assert_eq!(messages, before);
        assert!(rec.buffer().pending);
    }
}
