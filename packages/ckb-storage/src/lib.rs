//! ckb-storage — the persisted symbol graph.
//!
//! Owns every persisted entity (`Symbol`, `Reference`, `CallEdge`,
//! `FileRecord`) exclusively; callers always get value copies. The only
//! mutation path is `SymbolGraph::apply_delta`, which is atomic.

pub mod domain;
pub mod error;

#[cfg(feature = "sqlite")]
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    AddDelete, AddModDelete, CallEdge, Delta, DeltaSections, DeltaStats, FileRecord, Reference,
    ReferenceKind, SnapshotId, Symbol, SymbolGraph, SymbolKind,
};

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteSymbolGraph;
