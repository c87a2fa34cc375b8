//! A minimal cancellation context threaded from the scheduler down through
//! the executor, service calls, and provider calls (spec.md §5, §9 "Context
//! propagation").
//!
//! Suspension points (HTTP calls, LLM calls, jitter sleeps, tick waits) race
//! [`CancellationToken::cancelled`] against their own work with
//! `tokio::select!` so a cancellation aborts them promptly instead of being
//! polled for.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cheaply cloneable cancellation signal with no parent/child hierarchy.
///
/// Burrow's call graph is a single fan-out tree per routine run, so one flat
/// token per run is sufficient; there is no need for the tree of linked
/// tokens a multi-tenant scheduler would require.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled; otherwise waits for `cancel`.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        // `Notify::notified` must be constructed before we re-check the flag
        // to avoid missing a `cancel()` that happens between the check above
        // and the await below.
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_immediately_after_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("cancelled() must not block once cancel() was called");
    }

    #[tokio::test]
    async fn cancelled_waits_until_cancel_is_called() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        token.cancel();
        tokio::time::timeout(Duration::from_millis(50), handle)
            .await
            .expect("task must finish shortly after cancel()")
            .unwrap();
    }

    #[test]
    fn is_cancelled_reflects_state() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
