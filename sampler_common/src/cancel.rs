//! Cooperative cancellation (spec.md §9: "the executor must not rely on
//! exceptions propagating through a call stack; model cancellation as an
//! observable flag plus checkpoints").

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const NONE: u8 = 0;
const USER: u8 = 1;

/// Why a job was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `stop()` was called by the API/UI layer.
    User,
}

impl CancelReason {
    fn to_tag(self) -> u8 {
        match self {
            CancelReason::User => USER,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            USER => Some(CancelReason::User),
            _ => None,
        }
    }
}

/// A shared, cloneable cancellation flag. Clones observe the same
/// underlying state — the Execution Controller holds one clone and sets
/// it from the request context; the Pipetting Executor holds another and
/// polls it from the job context at the checkpoints enumerated in
/// spec.md §5.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
}

impl CancellationToken {
    /// Construct a fresh, uncancelled token.
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(NONE)),
        }
    }

    /// Request cancellation for `reason`. Idempotent: once set, a second
    /// call is a no-op (the first reason wins).
    pub fn cancel(&self, reason: CancelReason) {
        let _ = self
            .state
            .compare_exchange(NONE, reason.to_tag(), Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) != NONE
    }

    /// The reason cancellation was requested, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        CancelReason::from_tag(self.state.load(Ordering::SeqCst))
    }

    /// Reset to the uncancelled state, for reuse across jobs.
    pub fn reset(&self) {
        self.state.store(NONE, Ordering::SeqCst);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);
    }

    #[test]
    fn cancel_is_observed_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel(CancelReason::User);
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::User));
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel(CancelReason::User);
        token.cancel(CancelReason::User);
        assert_eq!(token.reason(), Some(CancelReason::User));
    }

    #[test]
    fn reset_allows_reuse() {
        let token = CancellationToken::new();
        token.cancel(CancelReason::User);
        token.reset();
        assert!(!token.is_cancelled());
    }
}
