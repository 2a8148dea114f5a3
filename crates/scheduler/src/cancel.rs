//! Cancellation token for render jobs
//!
//! Running jobs are cancelled cooperatively: the worker checks the token
//! between pages and stops early once it has been cancelled.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative job cancellation
///
/// The worker checks `is_cancelled()` once before and once after rendering
/// each page. Clones share the same underlying cancellation state via Arc,
/// so the interactive thread keeps one clone and the worker the other.
///
/// # Example
///
/// ```
/// use pageview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// // In the worker thread:
/// // for page in pages {
/// //     if worker_token.is_cancelled() {
/// //         return; // Stop before the next page
/// //     }
/// //     // ... render page ...
/// // }
///
/// // On the interactive thread, when the surface is torn down:
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    ///
    /// The token starts in a non-cancelled state.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token
    ///
    /// All clones of this token will also observe the cancellation.
    /// Calling it more than once has no further effect.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if this token has been cancelled
    ///
    /// Returns `true` if `cancel()` has been called on this token or any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
