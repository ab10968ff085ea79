//! Cooperative, one-way cancellation shared across a workflow run.
//!
//! A [`CancellationSource`] owns the right to cancel; [`CancellationToken`] is
//! the read-only view handed to steps. Both wrap
//! `tokio_util::sync::CancellationToken`, so cancelling is idempotent and
//! monotonic, and clones share the same flag.

/// Owner side of a run's cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationSource {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A read-only token observing this source.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            inner: self.inner.clone(),
        }
    }

    /// Flip the signal. Calling it again is a no-op.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

/// Read-only view of a [`CancellationSource`].
///
/// Steps poll [`is_cancelled`](Self::is_cancelled) at their own boundaries, or
/// await [`cancelled`](Self::cancelled) inside a `select!`, to stop real work.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the owning source is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}
