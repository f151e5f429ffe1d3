//! Selection-scoped rephrasing of persisted message content.
//!
//! The round trip is: capture selection → request rewrite → replace in the
//! visible document for instant feedback → locate the span in the
//! authoritative content → persist → verify → patch the in-memory list.
//! The selection is snapshotted up front; nothing trusts the live selection
//! after an await.

use std::sync::Arc;

use futures::future::{AbortHandle, Abortable};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use shared::notice::{Notice, NoticeSink};
use shared::store::{MessageStore, RewriteAction, RewriteKind};
use shared::transport::ChatTransport;

use crate::locator::{self, MatchStrategy};

/// Plans scoring below this similarity get a review warning.
const LOW_CONFIDENCE: f64 = 0.8;

/// A byte span in the rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRange {
    pub start: usize,
    pub end: usize,
}

/// Selection captured at action time. The range is a detached copy; live
/// selections are invalidated by any intervening re-render.
#[derive(Debug, Clone)]
pub struct SelectionSnapshot {
    pub message_id: String,
    pub text: String,
    pub range: DocRange,
}

/// Document surface the applicator writes into for instant feedback. Real
/// hosts back this with their rendered view.
pub trait DocumentView {
    /// Re-install a previously captured range as the live selection.
    fn install_selection(&mut self, range: &DocRange);

    /// Replace the text covered by `range`.
    fn replace_span(&mut self, range: &DocRange, text: &str);
}

/// Plain-string document model, used by tests and headless hosts.
#[derive(Debug, Clone)]
pub struct BufferView {
    text: String,
    selection: Option<DocRange>,
}

impl BufferView {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selection: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn selection(&self) -> Option<&DocRange> {
        self.selection.as_ref()
    }
}

impl DocumentView for BufferView {
    fn install_selection(&mut self, range: &DocRange) {
        self.selection = Some(range.clone());
    }

    fn replace_span(&mut self, range: &DocRange, text: &str) {
        if range.start <= range.end
            && range.end <= self.text.len()
            && self.text.is_char_boundary(range.start)
            && self.text.is_char_boundary(range.end)
        {
            self.text.replace_range(range.start..range.end, text);
        }
    }
}

/// Where a rephrase operation currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RephrasePhase {
    Idle,
    Selecting,
    AwaitingResult,
    Replacing,
    Persisting,
    Verifying,
    Done,
    Rejected,
    Failed,
}

#[derive(Debug)]
struct RephraseOperation {
    id: Uuid,
    message_id: String,
    original_text: String,
    range: DocRange,
    kind: RewriteKind,
    target_language: Option<String>,
    phase: RephrasePhase,
    proposal: Option<String>,
    abort: Option<AbortHandle>,
}

/// Drives a single rephrase operation at a time against the transport,
/// storage, and rewrite collaborators.
pub struct RephraseApplicator {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn MessageStore>,
    rewrite: Arc<dyn RewriteAction>,
    notices: NoticeSink,
    op: RwLock<Option<RephraseOperation>>,
}

impl RephraseApplicator {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn MessageStore>,
        rewrite: Arc<dyn RewriteAction>,
        notices: NoticeSink,
    ) -> Self {
        Self {
            transport,
            store,
            rewrite,
            notices,
            op: RwLock::new(None),
        }
    }

    /// Start a new operation from a captured selection, replacing (and
    /// aborting) any previous one.
    pub fn begin(
        &self,
        selection: SelectionSnapshot,
        kind: RewriteKind,
        target_language: Option<String>,
    ) {
        let mut guard = self.op.write();
        if let Some(previous) = guard.take() {
            if let Some(handle) = previous.abort {
                handle.abort();
            }
        }
        let op = RephraseOperation {
            id: Uuid::new_v4(),
            message_id: selection.message_id,
            original_text: selection.text,
            range: selection.range,
            kind,
            target_language,
            phase: RephrasePhase::Selecting,
            proposal: None,
            abort: None,
        };
        debug!(op = %op.id, message_id = %op.message_id, "rephrase selection captured");
        *guard = Some(op);
    }

    /// Invoke the rewrite collaborator. Returns the proposed text, or
    /// `None` on failure or rejection (the phase says which).
    pub async fn request(&self) -> Option<String> {
        let op_id = {
            let mut guard = self.op.write();
            let op = guard.as_mut()?;
            if op.phase != RephrasePhase::Selecting {
                return None;
            }
            op.phase = RephrasePhase::AwaitingResult;
            op.id
        };
        self.run_rewrite(op_id).await
    }

    /// Re-invoke the rewrite with the same original text after a reject or
    /// failure.
    pub async fn retry(&self) -> Option<String> {
        let op_id = {
            let mut guard = self.op.write();
            let op = guard.as_mut()?;
            if !matches!(op.phase, RephrasePhase::Rejected | RephrasePhase::Failed) {
                return None;
            }
            op.phase = RephrasePhase::AwaitingResult;
            op.proposal = None;
            op.id
        };
        self.run_rewrite(op_id).await
    }

    /// Discard the operation. Only honored before the document replacement
    /// starts; from then on the operation runs to `Done` or `Failed`.
    pub fn reject(&self) {
        let mut guard = self.op.write();
        let Some(op) = guard.as_mut() else {
            return;
        };
        match op.phase {
            RephrasePhase::Selecting | RephrasePhase::AwaitingResult => {
                if let Some(handle) = op.abort.take() {
                    handle.abort();
                }
                debug!(op = %op.id, "rephrase rejected");
                op.phase = RephrasePhase::Rejected;
            }
            _ => {}
        }
    }

    /// Accept the proposal: replace in the view, persist through storage,
    /// verify the write, then patch the in-memory list. Returns true when
    /// the operation reached `Done`.
    pub async fn accept(&self, view: &mut (dyn DocumentView + Send)) -> bool {
        let (op_id, message_id, original, replacement, range) = {
            let mut guard = self.op.write();
            let Some(op) = guard.as_mut() else {
                return false;
            };
            if op.phase != RephrasePhase::AwaitingResult {
                return false;
            }
            let Some(proposal) = op.proposal.clone() else {
                return false;
            };
            op.phase = RephrasePhase::Replacing;
            (
                op.id,
                op.message_id.clone(),
                op.original_text.clone(),
                proposal,
                op.range.clone(),
            )
        };

        // Instant visual feedback; persistence follows.
        view.install_selection(&range);
        view.replace_span(&range, &replacement);

        self.set_phase(op_id, RephrasePhase::Persisting);
        let content = self
            .transport
            .snapshot()
            .into_iter()
            .find(|m| m.id == message_id)
            .map(|m| m.content);
        let Some(content) = content else {
            self.fail(op_id, "Message no longer exists", None::<String>);
            return false;
        };

        let plan = locator::locate(&original, &content);
        match &plan.strategy {
            MatchStrategy::AppendMarker => {
                self.notices.push(Notice::warning(
                    "Selection not found in the message; appended the rephrased text instead",
                ));
            }
            _ if plan.needs_review || plan.confidence < LOW_CONFIDENCE => {
                self.notices.push(
                    Notice::warning("Rephrase applied with low confidence")
                        .with_detail("The selection no longer matched exactly; check the result"),
                );
            }
            _ => {}
        }
        let new_content = locator::apply(&plan, &content, &replacement);

        if let Err(err) = self
            .store
            .update_message_content(&message_id, &new_content)
            .await
        {
            self.fail(
                op_id,
                "Could not save the rephrased text",
                Some(format!("{err}")),
            );
            return false;
        }

        self.set_phase(op_id, RephrasePhase::Verifying);
        match self.store.get_message_content(&message_id).await {
            Ok(stored) if stored == new_content => {}
            Ok(_) => {
                warn!(%message_id, "stored content differs from what was just written");
                self.notices.push(
                    Notice::warning("Saved text differs from what was written")
                        .with_detail("The message may have been edited elsewhere"),
                );
            }
            Err(err) => {
                warn!(%message_id, %err, "could not read content back for verification");
                self.notices
                    .push(Notice::warning("Could not verify the saved text"));
            }
        }

        self.transport.update(&mut |messages| {
            if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
                message.content = new_content.clone();
                message.sync_text_part();
            }
        });

        self.set_phase(op_id, RephrasePhase::Done);
        true
    }

    pub fn phase(&self) -> RephrasePhase {
        self.op
            .read()
            .as_ref()
            .map(|op| op.phase)
            .unwrap_or(RephrasePhase::Idle)
    }

    /// The proposed replacement once the rewrite has come back.
    pub fn proposal(&self) -> Option<String> {
        self.op.read().as_ref().and_then(|op| op.proposal.clone())
    }

    async fn run_rewrite(&self, op_id: Uuid) -> Option<String> {
        let (kind, text, language, registration) = {
            let mut guard = self.op.write();
            let op = guard.as_mut().filter(|op| op.id == op_id)?;
            let (handle, registration) = AbortHandle::new_pair();
            op.abort = Some(handle);
            (
                op.kind,
                op.original_text.clone(),
                op.target_language.clone(),
                registration,
            )
        };

        let call = self.rewrite.rewrite(kind, &text, language.as_deref());
        let outcome = Abortable::new(call, registration).await;

        // A begin() may have swapped in a new operation while the call was
        // in flight; a stale result must not touch it.
        let mut guard = self.op.write();
        let op = guard.as_mut().filter(|op| op.id == op_id)?;
        op.abort = None;
        match outcome {
            Ok(Ok(Some(proposal))) => {
                debug!(op = %op.id, "rewrite result received");
                op.proposal = Some(proposal.clone());
                Some(proposal)
            }
            Ok(Ok(None)) => {
                op.phase = RephrasePhase::Failed;
                self.notices
                    .push(Notice::error("The rewrite produced no usable result"));
                None
            }
            Ok(Err(err)) => {
                op.phase = RephrasePhase::Failed;
                self.notices
                    .push(Notice::error("Rephrase failed").with_detail(format!("{err:#}")));
                None
            }
            // Rejection already moved the phase; nothing else to unwind.
            Err(futures::future::Aborted) => None,
        }
    }

    /// Phase writes are keyed to the operation they belong to; a newer
    /// `begin` must not pick up a predecessor's transitions.
    fn set_phase(&self, op_id: Uuid, phase: RephrasePhase) {
        if let Some(op) = self.op.write().as_mut().filter(|op| op.id == op_id) {
            op.phase = phase;
        }
    }

    // The notice is not keyed: the failure it reports happened even when
    // the operation has since been replaced.
    fn fail(&self, op_id: Uuid, title: &str, detail: Option<String>) {
        self.set_phase(op_id, RephrasePhase::Failed);
        let mut notice = Notice::error(title);
        if let Some(detail) = detail {
            notice = notice.with_detail(detail);
        }
        self.notices.push(notice);
    }
}
