//! Transport contract between the engine and a chat backend.
//!
//! The transport owns the canonical message list and is the only writer of
//! message identity; the engine applies patches through `update`.

use crate::message::{FileAttachment, Message};
use crate::stream::TransportStatus;

/// Options for appending a new user message
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    pub attachments: Vec<FileAttachment>,
}

/// Options for re-issuing the current thread
#[derive(Debug, Clone, Default)]
pub struct ReloadOptions {
    /// Attachment bytes resupplied to the request; vision models need the
    /// payload, not just references.
    pub attachments: Vec<FileAttachment>,
}

/// Handle to the chat transport.
pub trait ChatTransport: Send + Sync {
    fn status(&self) -> TransportStatus;

    /// Clone of the current message list.
    fn snapshot(&self) -> Vec<Message>;

    /// Read-modify-write access to the live message list. All engine
    /// mutations go through here so interleaved callbacks never clobber
    /// each other with a stale cached copy.
    fn update(&self, f: &mut dyn FnMut(&mut Vec<Message>));

    /// Append a message and submit it to the backend.
    fn append(&self, message: Message, options: AppendOptions) -> anyhow::Result<()>;

    /// Re-issue the request for the thread as it currently stands.
    fn reload(&self, options: ReloadOptions) -> anyhow::Result<()>;

    /// Cancel the in-flight request, if any.
    fn stop(&self);
}
