//! Per-run cancellation signal.
//!
//! There is no rollback: canceling a run stops new work at the next
//! observation point (worker enqueue, commit-retry wait) and surfaces as
//! [`IndexError::Canceled`](crate::IndexError::Canceled); batches already
//! committed to the backend stay committed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cancellation token shared between a run and its controller.
///
/// Cloning is cheap; all clones observe the same signal. Once canceled, a
/// token stays canceled.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    canceled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Create a token in the not-canceled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation has been signaled.
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Wait until cancellation is signaled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register with the notify before checking the flag, so a cancel
        // landing between the check and the await still wakes us.
        notified.as_mut().enable();
        if self.is_canceled() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_releases_waiters() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released")
            .expect("waiter task");
        assert!(token.is_canceled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_canceled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_racing_wait_never_hangs() {
        for _ in 0..500 {
            let token = CancelToken::new();
            let waiter = {
                let token = token.clone();
                tokio::spawn(async move { token.cancelled().await })
            };
            let canceler = {
                let token = token.clone();
                tokio::spawn(async move { token.cancel() })
            };

            tokio::time::timeout(Duration::from_secs(5), waiter)
                .await
                .expect("waiter released")
                .expect("waiter task");
            canceler.await.expect("canceler task");
        }
    }
}
