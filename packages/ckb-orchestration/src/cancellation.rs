//! Per-request cancellation: a `tokio_util` token carrying an optional
//! deadline, threaded into every external call and long loop a query makes.
//!
//! A root token is created per client request (`RequestContext::new_root`)
//! and cloned into sub-calls; cancelling the root cancels every clone.
//! Cancellation is idempotent — cancelling an already-cancelled token is a
//! no-op, matching `tokio_util::sync::CancellationToken`'s own semantics.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{CkbError, Result};

/// Cancellation plus an optional deadline for one client request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A fresh root context with no deadline.
    pub fn new_root() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A fresh root context that is considered timed out `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A child context sharing this one's cancellation (cancelling the
    /// parent cancels every child) but free to carry its own, tighter
    /// deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails fast with `Timeout`/cancellation-as-`Timeout` if this context
    /// has already expired. Callers check this at the top of every
    /// suspension point (§5: "spawning an external indexer, reading its
    /// output, issuing a SQL query").
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(CkbError::timeout("request was cancelled"));
        }
        if self.is_timed_out() {
            return Err(CkbError::timeout("request deadline exceeded"));
        }
        Ok(())
    }

    /// Races `fut` against cancellation/deadline, returning whichever
    /// resolves first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        self.check()?;
        let remaining = self.deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let cancelled = self.token.cancelled();

        tokio::select! {
            biased;
            _ = cancelled => Err(CkbError::timeout("request was cancelled")),
            result = async {
                match remaining {
                    Some(dur) => tokio::time::timeout(dur, fut)
                        .await
                        .map_err(|_| CkbError::timeout("request deadline exceeded"))
                        .and_then(|r| r),
                    None => fut.await,
                }
            } => result,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_context_is_not_cancelled_or_timed_out() {
        let ctx = RequestContext::new_root();
        assert!(!ctx.is_cancelled());
        assert!(!ctx.is_timed_out());
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn cancelling_root_cancels_children() {
        let root = RequestContext::new_root();
        let child = root.child();
        root.cancel();
        assert!(child.is_cancelled());
        assert!(child.check().is_err());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let ctx = RequestContext::new_root();
        ctx.cancel();
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn expired_deadline_is_timed_out() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(ctx.is_timed_out());
        assert!(ctx.check().is_err());
    }

    #[tokio::test]
    async fn run_returns_inner_result_when_uncancelled() {
        let ctx = RequestContext::new_root();
        let result = ctx.run(async { Ok::<_, CkbError>(42) }).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn run_times_out_before_future_completes() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(5));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, CkbError>(1)
            })
            .await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind, ckb_core::errors::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn run_is_interrupted_by_cancellation() {
        let ctx = RequestContext::new_root();
        let ctx_clone = ctx.clone();
        let handle = tokio::spawn(async move {
            ctx_clone
                .run(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, CkbError>(1)
                })
                .await
        });
        tokio::task::yield_now().await;
        ctx.cancel();
        let result = handle.await.unwrap();
        assert!(result.is_err());
    }
}
