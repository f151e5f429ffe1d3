//! Fan-out of reasoning events to interested parties.

use std::sync::mpsc::{channel, Receiver, Sender};

use parking_lot::Mutex;

use shared::stream::ReasoningEvent;

/// Broadcasts every published [`ReasoningEvent`] to all live
/// subscribers. No backpressure: subscribers poll their receiver, and a
/// dropped receiver is pruned on the next publish.
#[derive(Default)]
pub struct ReasoningEventSource {
    subscribers: Mutex<Vec<Sender<ReasoningEvent>>>,
}

impl ReasoningEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ReasoningEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: ReasoningEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
