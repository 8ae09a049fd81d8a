//! Cooperative cancellation for queued requests

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Cancellation signal shared between a caller and the engine
///
/// Cancelling only affects a request that is still waiting for a worker
/// slot. Once a sandbox is provisioned the job runs to its deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    token: CancellationToken,
}

impl CancelToken {
    /// Create an uncancelled token
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation; wakes every waiter
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether `cancel` has been called
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once the token is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Token cancelled together with this one, but not the other way round
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }
}

impl From<CancellationToken> for CancelToken {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        assert!(!token.is_cancelled());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn parent_cancels_child_only_downward() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn wraps_an_external_token() {
        let external = CancellationToken::new();
        let token = CancelToken::from(external.clone());
        external.cancel();
        assert!(token.is_cancelled());
    }
}
