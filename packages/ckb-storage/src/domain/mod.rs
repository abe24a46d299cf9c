//! Domain layer — entity models and the storage port they flow through.
//!
//! HEXAGONAL ARCHITECTURE:
//! - No external dependencies beyond serde (models are pure data).
//! - `ports` defines the interface; `infrastructure::sqlite` implements it.

pub mod models;
pub mod ports;

pub use models::{
    AddDelete, AddModDelete, CallEdge, Delta, DeltaSections, DeltaStats, FileRecord, Reference,
    ReferenceKind, SnapshotId, Symbol, SymbolKind,
};
pub use ports::SymbolGraph;
