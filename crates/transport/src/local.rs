//! In-process reference transport.
//!
//! Owns the canonical message list behind a lock and hands out clones,
//! like the remote transports do, so engine code built against it
//! carries over unchanged. Replies are scripted, which lets hosts and
//! tests walk the submitted → streaming → ready lifecycle by hand.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use shared::message::Message;
use shared::stream::TransportStatus;
use shared::transport::{AppendOptions, ChatTransport, ReloadOptions};

pub struct LocalChatTransport {
    messages: RwLock<Vec<Message>>,
    status: RwLock<TransportStatus>,
    scripted: Mutex<VecDeque<String>>,
    stop_count: AtomicUsize,
    append_log: Mutex<Vec<AppendOptions>>,
    reload_log: Mutex<Vec<ReloadOptions>>,
}

impl Default for LocalChatTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChatTransport {
    pub fn new() -> Self {
        Self::with_messages(Vec::new())
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: RwLock::new(messages),
            status: RwLock::new(TransportStatus::Idle),
            scripted: Mutex::new(VecDeque::new()),
            stop_count: AtomicUsize::new(0),
            append_log: Mutex::new(Vec::new()),
            reload_log: Mutex::new(Vec::new()),
        }
    }

    /// Queue the next assistant reply.
    pub fn enqueue_assistant(&self, text: impl Into<String>) {
        self.scripted.lock().push_back(text.into());
    }

    /// Complete the in-flight request with the next scripted reply.
    /// Returns false when nothing is queued.
    pub fn deliver_next(&self) -> bool {
        let Some(text) = self.scripted.lock().pop_front() else {
            return false;
        };
        self.messages.write().push(Message::assistant(text));
        *self.status.write() = TransportStatus::Ready;
        true
    }

    pub fn set_status(&self, status: TransportStatus) {
        *self.status.write() = status;
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }

    /// Options recorded from every `append` call, oldest first.
    pub fn append_log(&self) -> Vec<AppendOptions> {
        self.append_log.lock().clone()
    }

    /// Options recorded from every `reload` call, oldest first.
    pub fn reload_log(&self) -> Vec<ReloadOptions> {
        self.reload_log.lock().clone()
    }
}

impl ChatTransport for LocalChatTransport {
    fn status(&self) -> TransportStatus {
        *self.status.read()
    }

    fn snapshot(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    fn update(&self, f: &mut dyn FnMut(&mut Vec<Message>)) {
        f(&mut self.messages.write());
    }

    fn append(&self, message: Message, options: AppendOptions) -> anyhow::Result<()> {
        self.append_log.lock().push(options);
        self.messages.write().push(message);
        *self.status.write() = TransportStatus::Submitted;
        Ok(())
    }

    fn reload(&self, options: ReloadOptions) -> anyhow::Result<()> {
        self.reload_log.lock().push(options);
        *self.status.write() = TransportStatus::Submitted;
        Ok(())
    }

    fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        *self.status.write() = TransportStatus::Ready;
    }
}
