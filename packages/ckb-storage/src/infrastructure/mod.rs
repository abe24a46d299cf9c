//! Infrastructure layer — storage adapters implementing `domain::ports::SymbolGraph`.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSymbolGraph;
