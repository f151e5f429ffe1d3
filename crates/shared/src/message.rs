//! Chat message model shared across the workspace.
//!
//! A message's `content` is the source of truth for its rendered text once
//! streaming ends; `parts` carries the typed fragments the renderer walks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A file carried alongside a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub id: String,
    pub message_id: String,
    pub file_name: String,
    pub media_type: String,
    /// Base64 payload. `None` when only the reference is resident; vision
    /// models need the bytes, so regeneration re-fetches them from storage.
    pub data: Option<String>,
}

/// One typed fragment of a message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
    },
    FileAttachments {
        attachments: Vec<FileAttachment>,
    },
    ArtifactReferences {
        artifact_ids: Vec<String>,
    },
}

/// A chat message with typed parts.
///
/// `attempts` holds alternate full snapshots produced by regeneration,
/// oldest first; the visible fields always mirror the current attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    /// Mirror of the final reasoning text, set once a reasoning stream ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<Message>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            parts: vec![MessagePart::Text {
                text: content.clone(),
            }],
            content,
            reasoning: None,
            created_at: Utc::now(),
            attempts: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_part(mut self, part: MessagePart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Text of the reasoning part, if one exists.
    pub fn reasoning_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            MessagePart::Reasoning { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Upsert the reasoning part's text, preserving any recorded duration.
    ///
    /// Messages carry at most one reasoning part; when none exists yet it is
    /// prepended so reasoning renders above the answer text.
    pub fn set_reasoning_text(&mut self, text: &str) {
        for part in &mut self.parts {
            if let MessagePart::Reasoning { text: existing, .. } = part {
                *existing = text.to_string();
                return;
            }
        }
        self.parts.insert(
            0,
            MessagePart::Reasoning {
                text: text.to_string(),
                duration_secs: None,
            },
        );
    }

    /// Record the final reasoning text: part, duration, and the top-level
    /// mirror all move together.
    pub fn finish_reasoning(&mut self, total_text: &str, duration_secs: Option<f64>) {
        self.set_reasoning_text(total_text);
        for part in &mut self.parts {
            if let MessagePart::Reasoning {
                duration_secs: slot,
                ..
            } = part
            {
                *slot = duration_secs;
                break;
            }
        }
        self.reasoning = Some(total_text.to_string());
    }

    /// Drop the reasoning part, if any. Used when a placeholder never got
    /// replaced by real content.
    pub fn remove_reasoning_part(&mut self) {
        self.parts
            .retain(|part| !matches!(part, MessagePart::Reasoning { .. }));
    }

    /// Make the text part converge back to `content` after an edit.
    pub fn sync_text_part(&mut self) {
        let content = self.content.clone();
        for part in &mut self.parts {
            if let MessagePart::Text { text } = part {
                *text = content;
                return;
            }
        }
        self.parts.push(MessagePart::Text { text: content });
    }

    /// Attachments referenced by this message's parts.
    pub fn attachments(&self) -> Vec<&FileAttachment> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::FileAttachments { attachments } => Some(attachments.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_has_matching_text_part() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello");
        assert_eq!(
            msg.parts,
            vec![MessagePart::Text {
                text: "hello".into()
            }]
        );
    }

    #[test]
    fn test_set_reasoning_text_prepends_once() {
        let mut msg = Message::assistant("answer");
        msg.set_reasoning_text("step one");
        msg.set_reasoning_text("step one, step two");

        let reasoning_parts = msg
            .parts
            .iter()
            .filter(|p| matches!(p, MessagePart::Reasoning { .. }))
            .count();
        assert_eq!(reasoning_parts, 1);
        assert_eq!(msg.reasoning_text(), Some("step one, step two"));
        // Reasoning sits before the answer text
        assert!(matches!(msg.parts[0], MessagePart::Reasoning { .. }));
    }

    #[test]
    fn test_finish_reasoning_sets_mirror_and_duration() {
        let mut msg = Message::assistant("answer");
        msg.set_reasoning_text("partial");
        msg.finish_reasoning("full trace", Some(2.5));

        assert_eq!(msg.reasoning.as_deref(), Some("full trace"));
        match &msg.parts[0] {
            MessagePart::Reasoning {
                text,
                duration_secs,
            } => {
                assert_eq!(text, "full trace");
                assert_eq!(*duration_secs, Some(2.5));
            }
            other => panic!("expected reasoning part, got {:?}", other),
        }
    }

    #[test]
    fn test_sync_text_part_after_content_edit() {
        let mut msg = Message::assistant("original");
        msg.set_reasoning_text("why");
        msg.content = "rewritten".to_string();
        msg.sync_text_part();

        let text = msg.parts.iter().find_map(|p| match p {
            MessagePart::Text { text } => Some(text.as_str()),
            _ => None,
        });
        assert_eq!(text, Some("rewritten"));
    }

    #[test]
    fn test_serde_round_trip_skips_empty_attempts() {
        let msg = Message::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("attempts").is_none());
        assert!(json.get("reasoning").is_none());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_part_tagging() {
        let part = MessagePart::Reasoning {
            text: "chain".into(),
            duration_secs: Some(1.0),
        };
        let json = serde_json::to_string(&part).unwrap();
        assert!(json.contains("\"type\":\"reasoning\""));
    }
}
