//! Storage and rewrite collaborator contracts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::FileAttachment;

/// Storage failures surfaced to the engine
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Message not found: {message_id}")]
    NotFound { message_id: String },

    #[error("Stored payload for {message_id} is not valid: {reason}")]
    Corrupt { message_id: String, reason: String },

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Persistence collaborator for message content and attachments.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist new content for a message, keeping its text part in sync.
    async fn update_message_content(&self, message_id: &str, content: &str)
        -> Result<(), StoreError>;

    async fn get_message_content(&self, message_id: &str) -> Result<String, StoreError>;

    async fn get_file_attachments_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Vec<FileAttachment>, StoreError>;
}

/// What kind of rewrite to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteKind {
    Rephrase,
    Translate,
}

/// AI rewrite collaborator. Returns `None` when the model produced no
/// actionable result for the given text.
#[async_trait]
pub trait RewriteAction: Send + Sync {
    async fn rewrite(
        &self,
        kind: RewriteKind,
        text: &str,
        target_language: Option<&str>,
    ) -> anyhow::Result<Option<String>>;
}
