//! Cooperative cancellation (spec §4.5 "Cancellation", §5).
//!
//! Every session holds one [`CancelToken`]; `stop(session)` sets it. The
//! engine loop and any action awaiting a suspension point (bridge future,
//! LLM call, timer) checks it, the way spec §5 requires: "No action may hold
//! the engine loop while doing blocking I/O without an abort-on-cancel
//! mechanism."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cheaply-cloneable handle; every clone observes the same cancellation.
///
/// ```
/// # tokio_test::block_on(async {
/// use fsm_rt_core::cancel::CancelToken;
///
/// let token = CancelToken::new();
/// assert!(!token.is_cancelled());
/// token.cancel();
/// token.cancelled().await; // resolves immediately once cancelled
/// assert!(token.is_cancelled());
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the token. Idempotent; wakes every pending [`Self::cancelled`].
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled. Safe to await repeatedly and
    /// from multiple clones concurrently.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}
