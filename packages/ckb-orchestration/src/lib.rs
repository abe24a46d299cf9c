//! ckb-orchestration — query routing, cancellation, caching, and response
//! shaping for the Codebase Knowledge Backend.
//!
//! Sits above `ckb-storage` (the persisted symbol graph) and `ckb-core` (the
//! pure impact/shaping algorithms), wiring them together behind
//! [`orchestrator::QueryOrchestrator`]. The transport that carries queries in
//! and responses out (JSON-RPC over stdio, an HTTP surface, whatever the
//! embedding host chooses) and the external indexer processes that populate
//! the symbol graph are out of scope here — [`backends::IndexerBackend`] is
//! the seam, not an implementation.

pub mod backends;
pub mod cache;
pub mod cancellation;
pub mod envelope;
pub mod error;
pub mod orchestrator;

pub use backends::IndexerBackend;
pub use cache::SnapshotCache;
pub use cancellation::RequestContext;
pub use error::{CkbError, ErrorKind, Result};
pub use orchestrator::{check_index_freshness, QueryOrchestrator};
