//! External-adapter trait seams.
//!
//! spec.md scopes the JSON-RPC transport loop and the process-spawn
//! adapters that invoke external indexer binaries as "external collaborators,
//! interface-only" (§1). These traits are exactly that seam: the orchestrator
//! depends on them, nothing here spawns a process or speaks JSON-RPC.

use async_trait::async_trait;

use ckb_core::delta::EntitySnapshot;

use crate::cancellation::RequestContext;
use crate::error::Result;

/// One external indexer invocation (e.g. an LSP client, a SCIP CLI wrapper,
/// a language-specific analyzer binary). Implementations own the
/// process-spawn plumbing; this crate only calls through the trait.
#[async_trait]
pub trait IndexerBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Re-index the repository at `repo_root`, honoring `ctx`'s deadline —
    /// implementations should race their subprocess against
    /// `ctx.is_cancelled()`/the deadline and terminate it on expiry (§5:
    /// "terminated and their partial output discarded").
    async fn reindex(&self, repo_root: &str, ctx: &RequestContext) -> Result<EntitySnapshot>;

    /// Default per-backend timeout when the caller doesn't override one
    /// (§5: "default 5000 ms for source-control queries").
    fn default_timeout_ms(&self) -> u64 {
        5_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverRespondsBackend;

    #[async_trait]
    impl IndexerBackend for NeverRespondsBackend {
        fn name(&self) -> &str {
            "never-responds"
        }

        async fn reindex(&self, _repo_root: &str, ctx: &RequestContext) -> Result<EntitySnapshot> {
            ctx.run(async {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(EntitySnapshot::default())
            })
            .await
        }
    }

    #[tokio::test]
    async fn reindex_respects_deadline() {
        let backend = NeverRespondsBackend;
        let ctx = RequestContext::with_timeout(std::time::Duration::from_millis(5));
        let result = backend.reindex("repo", &ctx).await;
        assert!(result.is_err());
    }
}
