//! Storage port: the interface infrastructure adapters implement.
//!
//! HEXAGONAL ARCHITECTURE — the domain defines the interface, infrastructure
//! (the SQLite adapter) implements it. Core algorithms elsewhere depend only
//! on this trait, never on `rusqlite` directly.

use async_trait::async_trait;

use super::models::{CallEdge, Delta, FileRecord, Reference, Symbol};
use crate::Result;

/// The persisted symbol graph: the exclusive owner of all entities.
///
/// Read methods return value copies. Mutation happens only through
/// `apply_delta`, which is atomic: either the new snapshot id becomes
/// current or nothing changes.
#[async_trait]
pub trait SymbolGraph: Send + Sync {
    /// The snapshot id currently current, or `""` if the graph is empty
    /// (no ingestion has happened yet).
    async fn current_snapshot_id(&self) -> Result<String>;

    async fn get_symbol(&self, id: &str) -> Result<Option<Symbol>>;
    async fn list_symbols(&self) -> Result<Vec<Symbol>>;
    async fn list_references(&self) -> Result<Vec<Reference>>;
    async fn list_call_edges(&self) -> Result<Vec<CallEdge>>;
    async fn list_files(&self) -> Result<Vec<FileRecord>>;

    /// References whose `to_symbol_id` is the given symbol.
    async fn references_to(&self, symbol_id: &str) -> Result<Vec<Reference>>;

    /// Call edges whose `callee_id` is the given symbol (direct callers).
    async fn callers_of(&self, symbol_id: &str) -> Result<Vec<CallEdge>>;

    /// Apply a validated delta under the single-writer lock. Atomic.
    async fn apply_delta(&self, delta: &Delta) -> Result<()>;
}
