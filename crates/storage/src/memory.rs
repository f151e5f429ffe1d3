//! In-memory message store.

use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::RwLock;

use shared::message::{FileAttachment, Message};
use shared::store::{MessageStore, StoreError};

/// Process-local [`MessageStore`] backed by hash maps. Hosts without a
/// configured database use it, and most engine tests run against it.
#[derive(Default)]
pub struct MemoryMessageStore {
    contents: RwLock<HashMap<String, String>>,
    attachments: RwLock<HashMap<String, Vec<FileAttachment>>>,
    broken_attachments: RwLock<HashSet<String>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a message's content and any attachments it
    /// already carries.
    pub fn insert(&self, message: &Message) {
        self.contents
            .write()
            .insert(message.id.clone(), message.content.clone());
        let attached: Vec<FileAttachment> =
            message.attachments().into_iter().cloned().collect();
        if !attached.is_empty() {
            self.attachments.write().insert(message.id.clone(), attached);
        }
    }

    pub fn insert_attachment(&self, attachment: FileAttachment) {
        self.attachments
            .write()
            .entry(attachment.message_id.clone())
            .or_default()
            .push(attachment);
    }

    /// Make attachment lookups for one message fail, simulating a
    /// backend outage.
    pub fn fail_attachments_for(&self, message_id: &str) {
        self.broken_attachments.write().insert(message_id.to_string());
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn update_message_content(
        &self,
        message_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut contents = self.contents.write();
        match contents.get_mut(message_id) {
            Some(stored) => {
                *stored = content.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                message_id: message_id.to_string(),
            }),
        }
    }

    async fn get_message_content(&self, message_id: &str) -> Result<String, StoreError> {
        self.contents
            .read()
            .get(message_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                message_id: message_id.to_string(),
            })
    }

    async fn get_file_attachments_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Vec<FileAttachment>, StoreError> {
        if self.broken_attachments.read().contains(message_id) {
            return Err(StoreError::Backend(anyhow!(
                "attachment lookup failed for {message_id}"
            )));
        }
        Ok(self
            .attachments
            .read()
            .get(message_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get_content() {
        let store = MemoryMessageStore::new();
        let message = Message::user("hello there");
        store.insert(&message);

        let content = store.get_message_content(&message.id).await.unwrap();
        assert_eq!(content, "hello there");
    }

    #[tokio::test]
    async fn test_update_missing_message_is_not_found() {
        let store = MemoryMessageStore::new();
        let err = store
            .update_message_content("nope", "new text")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_attachments_default_to_empty() {
        let store = MemoryMessageStore::new();
        let message = Message::user("no files");
        store.insert(&message);

        let files = store
            .get_file_attachments_by_message_id(&message.id)
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_attachment_failure_injection() {
        let store = MemoryMessageStore::new();
        store.insert_attachment(FileAttachment {
            id: "f1".into(),
            message_id: "m1".into(),
            file_name: "notes.txt".into(),
            media_type: "text/plain".into(),
            data: Some("aGk=".into()),
        });

        let files = store.get_file_attachments_by_message_id("m1").await.unwrap();
        assert_eq!(files.len(), 1);

        store.fail_attachments_for("m1");
        let err = store.get_file_attachments_by_message_id("m1").await;
        assert!(err.is_err());
    }
}
