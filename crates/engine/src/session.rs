//! Session façade wiring the reconciliation engine to its collaborators.
//!
//! Hosts own the event loop: they forward reasoning events (or hand over
//! a subscription for `poll` to drain), call `poll` every tick, and
//! drive rephrase and regeneration from user actions. Failures surface
//! as notices here; the reconciliation paths themselves have a defined
//! fallback for every branch and never error.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use shared::capabilities::ModelCapabilities;
use shared::message::{FileAttachment, Message, MessagePart, Role};
use shared::notice::{Notice, NoticeSink};
use shared::store::{MessageStore, RewriteAction};
use shared::stream::{ReasoningEvent, TransportStatus};
use shared::transport::{AppendOptions, ChatTransport, ReloadOptions};

use crate::attempts;
use crate::gate::{OpGate, OpPermit};
use crate::placeholder::PlaceholderManager;
use crate::reconciler::ReasoningReconciler;
use crate::rephrase::RephraseApplicator;

pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn MessageStore>,
    capabilities: Arc<dyn ModelCapabilities>,
    rephrase: RephraseApplicator,
    reconciler: Mutex<ReasoningReconciler>,
    placeholder: PlaceholderManager,
    gate: OpGate,
    notices: NoticeSink,
    model_id: RwLock<String>,
    /// Slot id of an assistant regeneration whose fresh reply has not
    /// been folded into the attempt history yet.
    pending_regeneration: RwLock<Option<String>>,
    reasoning_rx: Mutex<Option<Receiver<ReasoningEvent>>>,
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn MessageStore>,
        rewrite: Arc<dyn RewriteAction>,
        capabilities: Arc<dyn ModelCapabilities>,
        model_id: impl Into<String>,
        notices: NoticeSink,
    ) -> Self {
        let rephrase = RephraseApplicator::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            rewrite,
            notices.clone(),
        );
        Self {
            transport,
            store,
            capabilities,
            rephrase,
            reconciler: Mutex::new(ReasoningReconciler::new()),
            placeholder: PlaceholderManager,
            gate: OpGate::new(),
            notices,
            model_id: RwLock::new(model_id.into()),
            pending_regeneration: RwLock::new(None),
            reasoning_rx: Mutex::new(None),
        }
    }

    /// Hand over the receiving end of a reasoning subscription; `poll`
    /// drains it each tick.
    pub fn set_reasoning_events(&self, rx: Receiver<ReasoningEvent>) {
        *self.reasoning_rx.lock() = Some(rx);
    }

    pub fn set_model(&self, model_id: impl Into<String>) {
        *self.model_id.write() = model_id.into();
    }

    pub fn model(&self) -> String {
        self.model_id.read().clone()
    }

    /// Clone of the current thread.
    pub fn messages(&self) -> Vec<Message> {
        self.transport.snapshot()
    }

    pub fn rephrase(&self) -> &RephraseApplicator {
        &self.rephrase
    }

    /// Append a user message, attaching the given files, and submit it.
    pub fn send(
        &self,
        text: impl Into<String>,
        mut attachments: Vec<FileAttachment>,
    ) -> anyhow::Result<()> {
        let mut message = Message::user(text);
        for attachment in &mut attachments {
            attachment.message_id = message.id.clone();
        }
        if !attachments.is_empty() {
            message = message.with_part(MessagePart::FileAttachments {
                attachments: attachments.clone(),
            });
        }
        self.transport.append(message, AppendOptions { attachments })
    }

    /// Feed one reasoning event through the reducer, inside the
    /// transport's read-modify-write setter.
    pub fn handle_reasoning_event(&self, event: ReasoningEvent) {
        let mut reconciler = self.reconciler.lock();
        self.transport.update(&mut |messages| {
            reconciler.apply(event.clone(), messages);
        });
    }

    /// Host-driven tick. Drains subscribed reasoning events, flushes any
    /// buffered reasoning onto a newly appeared assistant message, syncs
    /// the thinking placeholder, and settles finished regenerations.
    /// Idempotent; safe to call every frame.
    pub fn poll(&self) {
        let drained: Vec<ReasoningEvent> = {
            let guard = self.reasoning_rx.lock();
            guard
                .as_ref()
                .map(|rx| rx.try_iter().collect())
                .unwrap_or_default()
        };
        for event in drained {
            self.handle_reasoning_event(event);
        }

        let status = self.transport.status();
        let thinking = {
            let model = self.model_id.read();
            self.capabilities.supports_thinking(&model)
        };
        {
            let mut reconciler = self.reconciler.lock();
            self.transport.update(&mut |messages| {
                reconciler.on_messages_changed(messages);
                self.placeholder.sync(status, thinking, messages);
            });
        }

        match status {
            TransportStatus::Ready => self.fold_finished_regeneration(),
            TransportStatus::Error => self.abandon_regeneration(),
            _ => {}
        }
    }

    /// Re-run the model for a message. A `user` message drops everything
    /// after it and re-issues the thread; an `assistant` message keeps
    /// its slot and gains the fresh reply as a new attempt once `poll`
    /// sees the request complete.
    pub async fn regenerate(&self, message_id: &str) -> bool {
        let Some(_permit) = self.acquire_regeneration() else {
            return false;
        };

        if self.transport.status().is_busy() {
            self.transport.stop();
        }
        *self.pending_regeneration.write() = None;
        self.reconciler.lock().release_withheld();

        let snapshot = self.transport.snapshot();
        let Some(slot) = snapshot.iter().find(|m| m.id == message_id) else {
            debug!(message_id, "regenerate target is no longer in the list");
            return false;
        };

        let options = match slot.role {
            Role::User => {
                let attachments = self.fetch_attachments(message_id).await;
                self.transport.update(&mut |messages| {
                    attempts::truncate_after(messages, message_id);
                });
                ReloadOptions { attachments }
            }
            Role::Assistant => {
                let attachments = match attempts::preceding_user_index(&snapshot, message_id) {
                    Some(user_index) => {
                        let user_id = snapshot[user_index].id.clone();
                        self.fetch_attachments(&user_id).await
                    }
                    None => Vec::new(),
                };
                self.transport.update(&mut |messages| {
                    if let Some(slot) = messages.iter_mut().find(|m| m.id == message_id) {
                        attempts::seed_attempts(slot);
                    }
                    attempts::truncate_after(messages, message_id);
                });
                *self.pending_regeneration.write() = Some(message_id.to_string());
                // Reasoning that streams in from here on belongs to the
                // fresh reply, not the kept slot.
                self.reconciler.lock().withhold_from(message_id);
                ReloadOptions { attachments }
            }
            Role::System => {
                debug!(message_id, "system messages do not regenerate");
                return false;
            }
        };

        match self.transport.reload(options) {
            Ok(()) => true,
            Err(err) => {
                *self.pending_regeneration.write() = None;
                self.reconciler.lock().release_withheld();
                self.notices.push(
                    Notice::error("Regeneration failed").with_detail(err.to_string()),
                );
                false
            }
        }
    }

    /// Point a regenerated message at one of its stored attempts.
    pub fn select_attempt(&self, message_id: &str, index: usize) -> bool {
        let mut switched = false;
        self.transport.update(&mut |messages| {
            if let Some(slot) = messages.iter_mut().find(|m| m.id == message_id) {
                switched = attempts::select_attempt(slot, index);
            }
        });
        switched
    }

    /// Cancel the in-flight request.
    pub fn stop(&self) {
        self.transport.stop();
    }

    /// The gate serializes regenerations. When a prior one still holds
    /// it, its request is stopped and the gate tried once more; a second
    /// failure means the caller lost the race outright.
    fn acquire_regeneration(&self) -> Option<OpPermit> {
        if let Some(permit) = self.gate.try_acquire() {
            return Some(permit);
        }
        self.transport.stop();
        match self.gate.try_acquire() {
            Some(permit) => Some(permit),
            None => {
                self.notices
                    .push(Notice::warning("Regeneration already in progress"));
                None
            }
        }
    }

    /// Attachment bytes for a regenerated request. A storage failure is
    /// logged and the regeneration proceeds without that content.
    async fn fetch_attachments(&self, message_id: &str) -> Vec<FileAttachment> {
        match self.store.get_file_attachments_by_message_id(message_id).await {
            Ok(attachments) => attachments,
            Err(err) => {
                tracing::warn!(message_id, %err, "could not re-fetch attachments");
                Vec::new()
            }
        }
    }

    fn fold_finished_regeneration(&self) {
        let slot_id = self.pending_regeneration.read().clone();
        let Some(slot_id) = slot_id else {
            return;
        };

        let mut folded = false;
        self.transport.update(&mut |messages| {
            folded = attempts::fold_fresh_reply(messages, &slot_id);
        });
        if !folded {
            debug!(slot = %slot_id, "request finished with no fresh reply to fold");
        }
        *self.pending_regeneration.write() = None;
        self.reconciler.lock().release_withheld();
    }

    fn abandon_regeneration(&self) {
        if self.pending_regeneration.write().take().is_some() {
            self.reconciler.lock().release_withheld();
            self.notices.push(
                Notice::error("Regeneration failed")
                    .with_detail("The request ended in an error before a reply arrived"),
            );
        }
    }
}
