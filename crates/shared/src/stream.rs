//! Streaming status and reasoning event types.

use serde::{Deserialize, Serialize};

/// Lifecycle of the transport's current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportStatus {
    Idle,
    /// Request sent, nothing received yet
    Submitted,
    /// Tokens are arriving
    Streaming,
    /// Response complete
    Ready,
    Error,
}

impl TransportStatus {
    /// True while a response is being produced.
    pub fn is_busy(&self) -> bool {
        matches!(self, TransportStatus::Submitted | TransportStatus::Streaming)
    }
}

/// A reasoning stream event from the model backend.
///
/// Delta events carry the full accumulated text so far, not an incremental
/// diff; that contract is what makes replayed delivery safe to merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReasoningEvent {
    #[serde(rename = "reasoning-start")]
    Start,
    #[serde(rename = "reasoning-delta")]
    Delta { text: String },
    #[serde(rename = "reasoning-end")]
    End {
        #[serde(default)]
        duration_secs: f64,
        #[serde(rename = "text")]
        total_text: String,
    },
}

/// Reasoning text that arrived before any assistant message could hold it.
///
/// Lives inside the reconciler; `pending` flips false exactly once, when the
/// contents flush onto a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningBuffer {
    pub text: String,
    pub pending: bool,
    pub duration_secs: Option<f64>,
}

impl ReasoningBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold text until a target message appears. A recorded duration means
    /// the stream already ended while we were still waiting.
    pub fn store(&mut self, text: &str, duration_secs: Option<f64>) {
        self.text = text.to_string();
        self.pending = true;
        if duration_secs.is_some() {
            self.duration_secs = duration_secs;
        }
    }

    /// Take the buffered text for flushing. Returns `None` unless pending,
    /// and leaves the buffer empty either way, so a double flush is
    /// impossible.
    pub fn take(&mut self) -> Option<(String, Option<f64>)> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        Some((std::mem::take(&mut self.text), self.duration_secs.take()))
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.pending = false;
        self.duration_secs = None;
    }
}
