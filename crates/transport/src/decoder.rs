//! Incremental decoder for the reasoning side-channel.
//!
//! The backend streams SSE-framed JSON events. Chunks arrive at
//! arbitrary byte boundaries, so partial frames are buffered until the
//! `\n\n` terminator shows up.

use shared::stream::ReasoningEvent;
use tracing::debug;

pub struct ReasoningFrameDecoder {
    partial: String,
}

impl Default for ReasoningFrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningFrameDecoder {
    pub fn new() -> Self {
        Self {
            partial: String::new(),
        }
    }

    /// Feed raw bytes from the response body. Returns every reasoning
    /// event completed by this chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ReasoningEvent> {
        self.partial.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(boundary) = self.partial.find("\n\n") {
            let frame: String = self.partial.drain(..boundary + 2).collect();
            if let Some(event) = Self::parse_frame(&frame) {
                events.push(event);
            }
        }
        events
    }

    fn parse_frame(frame: &str) -> Option<ReasoningEvent> {
        let mut data_lines: Vec<&str> = Vec::new();
        for line in frame.lines() {
            if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.trim_start_matches(' '));
            }
            // event:, id:, retry: and comment lines carry nothing we need
        }

        if data_lines.is_empty() {
            return None;
        }
        let data = data_lines.join("\n");
        if data == "[DONE]" {
            return None;
        }

        match serde_json::from_str(&data) {
            Ok(event) => Some(event),
            Err(err) => {
                debug!("Skipping unrecognized stream frame: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_reasoning_events() {
        let mut decoder = ReasoningFrameDecoder::new();
        let events = decoder.feed(
            b"data: {\"type\":\"reasoning-start\"}\n\n\
              data: {\"type\":\"reasoning-delta\",\"text\":\"First\"}\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ReasoningEvent::Start);
        assert_eq!(
            events[1],
            ReasoningEvent::Delta {
                text: "First".into()
            }
        );
    }

    #[test]
    fn test_buffers_partial_frame_across_chunks() {
        let mut decoder = ReasoningFrameDecoder::new();
        assert!(decoder
            .feed(b"data: {\"type\":\"reasoning-delta\",\"te")
            .is_empty());
        let events = decoder.feed(b"xt\":\"split frame\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            ReasoningEvent::Delta {
                text: "split frame".into()
            }
        );
    }

    #[test]
    fn test_skips_unknown_event_types() {
        let mut decoder = ReasoningFrameDecoder::new();
        let events = decoder.feed(
            b"data: {\"type\":\"text-delta\",\"text\":\"visible tokens\"}\n\n\
              data: {\"type\":\"reasoning-end\",\"duration_secs\":2.0,\"text\":\"all done\"}\n\n",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            ReasoningEvent::End {
                duration_secs: 2.0,
                total_text: "all done".into()
            }
        );
    }

    #[test]
    fn test_skips_done_sentinel_and_comments() {
        let mut decoder = ReasoningFrameDecoder::new();
        let events = decoder.feed(
            b": keep-alive\n\n\
              data: [DONE]\n\n\
              data: {\"type\":\"reasoning-start\"}\n\n",
        );
        assert_eq!(events, vec![ReasoningEvent::Start]);
    }

    #[test]
    fn test_one_chunk_many_frames() {
        let mut decoder = ReasoningFrameDecoder::new();
        let mut wire = String::new();
        for i in 0..3 {
            wire.push_str(&format!(
                "data: {{\"type\":\"reasoning-delta\",\"text\":\"step {i}\"}}\n\n"
            ));
        }
        let events = decoder.feed(wire.as_bytes());
        assert_eq!(events.len(), 3);
    }
}
