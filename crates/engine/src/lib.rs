//! Chat reconciliation engine.
//!
//! This crate owns the client-side state machinery of a streaming chat:
//! - Merge out-of-order reasoning stream events into the message list
//! - Show and retire the transient "thinking" placeholder
//! - Locate selected text inside drifted message content
//! - Drive rephrase operations from selection through verified persistence
//! - Track regeneration attempts without discarding earlier replies
//!
//! Everything here is collaborator-driven: transports, storage, and the
//! rewrite model are trait objects supplied by the host.

pub mod attempts;
pub mod gate;
pub mod locator;
pub mod placeholder;
pub mod reconciler;
pub mod rephrase;
pub mod session;

pub use locator::{MatchStrategy, TextPlan};
pub use reconciler::{ReasoningReconciler, ReconcileOutcome};
pub use rephrase::{RephraseApplicator, RephrasePhase, SelectionSnapshot};
pub use session::ChatSession;
