//! Attempt tracking for message regeneration.
//!
//! Regenerating an assistant message never discards what it produced
//! before: the slot in the list wraps its history into `attempts` (oldest
//! first) and keeps pointing at the currently visible one.

use shared::message::{Message, Role};

/// Remove every message strictly after `message_id`. Returns false when the
/// id is not in the list.
pub fn truncate_after(messages: &mut Vec<Message>, message_id: &str) -> bool {
    match messages.iter().position(|m| m.id == message_id) {
        Some(index) => {
            messages.truncate(index + 1);
            true
        }
        None => false,
    }
}

/// Capture the pre-regeneration state as attempt 0. Only the first
/// regeneration seeds; later ones find the history already in place.
pub fn seed_attempts(message: &mut Message) {
    if message.attempts.is_empty() {
        let mut snapshot = message.clone();
        snapshot.attempts = Vec::new();
        message.attempts.push(snapshot);
    }
}

/// Fold a freshly generated message into the slot: it becomes the newest
/// attempt and the visible state. Call [`seed_attempts`] before the
/// regeneration so the original is attempt 0.
pub fn record_attempt(slot: &mut Message, fresh: Message) {
    let mut snapshot = fresh.clone();
    snapshot.attempts = Vec::new();

    let mut attempts = std::mem::take(&mut slot.attempts);
    attempts.push(snapshot);

    *slot = fresh;
    slot.attempts = attempts;
}

/// Point the slot at a stored attempt without losing the others. Returns
/// false for an out-of-range index.
pub fn select_attempt(message: &mut Message, index: usize) -> bool {
    let Some(chosen) = message.attempts.get(index).cloned() else {
        return false;
    };
    let attempts = std::mem::take(&mut message.attempts);
    *message = chosen;
    message.attempts = attempts;
    true
}

/// Index of the closest `user` message at or before `message_id`; the turn
/// a regeneration re-issues from.
pub fn preceding_user_index(messages: &[Message], message_id: &str) -> Option<usize> {
    let slot = messages.iter().position(|m| m.id == message_id)?;
    messages[..=slot].iter().rposition(|m| m.role == Role::User)
}

/// Move the reply a regeneration appended after the slot into the slot's
/// attempt history. Returns false when either side is missing.
pub fn fold_fresh_reply(messages: &mut Vec<Message>, slot_id: &str) -> bool {
    let Some(slot_index) = messages.iter().position(|m| m.id == slot_id) else {
        return false;
    };
    let Some(offset) = messages[slot_index + 1..]
        .iter()
        .rposition(|m| m.is_assistant())
    else {
        return false;
    };
    let fresh = messages.remove(slot_index + 1 + offset);
    record_attempt(&mut messages[slot_index], fresh);
    true
}
