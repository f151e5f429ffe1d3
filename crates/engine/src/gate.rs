//! Mutual-exclusion gate for operations that must not overlap.
//!
//! Owned and injected per session rather than held as process-wide state,
//! so independent sessions (and tests) never contend with each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Gate with `try_acquire`/release-on-drop semantics.
#[derive(Debug, Default)]
pub struct OpGate {
    busy: Arc<AtomicBool>,
}

/// Proof of exclusive access; dropping it releases the gate.
#[derive(Debug)]
pub struct OpPermit {
    busy: Arc<AtomicBool>,
}

impl OpGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate if nobody holds it.
    pub fn try_acquire(&self) -> Option<OpPermit> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(OpPermit {
                busy: Arc::clone(&self.busy),
            })
        } else {
            None
        }
    }

    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for OpPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
