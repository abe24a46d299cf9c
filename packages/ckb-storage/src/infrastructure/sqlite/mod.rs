//! SQLite adapter implementing `SymbolGraph`, backed by `<repoRoot>/.ckb/ckb.db`.
//!
//! Reads open a short-lived connection per call (SQLite's WAL mode allows
//! concurrent readers alongside a writer). Writes serialize through
//! `writer_lock`, a process-scoped mutex held for the duration of a single
//! `apply_delta` call — the only coordination point the concurrency model requires.

mod schema;
mod store;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::domain::models::{CallEdge, Delta, FileRecord, Reference, Symbol};
use crate::domain::ports::SymbolGraph;
use crate::error::StorageError;
use crate::Result;

pub struct SqliteSymbolGraph {
    path: PathBuf,
    writer_lock: Mutex<()>,
}

impl SqliteSymbolGraph {
    /// Open (creating if absent) the database at `path`, running schema
    /// migration and pragma setup once up front.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        schema::configure_connection(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self {
            path,
            writer_lock: Mutex::new(()),
        })
    }

    /// An in-memory database, for tests. Uses a named shared-cache database
    /// so the short-lived connections opened per call all see the same data.
    pub fn open_in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = PathBuf::from(format!("file:ckb-mem-{id}?mode=memory&cache=shared"));

        // Keep one connection open for the struct's lifetime: a shared-cache
        // in-memory database is freed once its last connection closes.
        let keepalive = Connection::open(&path)?;
        schema::configure_connection(&keepalive)?;
        schema::migrate(&keepalive)?;
        std::mem::forget(keepalive);

        Ok(Self {
            path,
            writer_lock: Mutex::new(()),
        })
    }

    fn open_conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        schema::configure_connection(&conn)?;
        Ok(conn)
    }
}

#[async_trait]
impl SymbolGraph for SqliteSymbolGraph {
    async fn current_snapshot_id(&self) -> Result<String> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            schema::configure_connection(&conn)?;
            store::current_snapshot_id(&conn)
        })
        .await
        .map_err(blocking_panicked)?
    }

    async fn get_symbol(&self, id: &str) -> Result<Option<Symbol>> {
        let conn = self.open_conn()?;
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stmt = conn.prepare(
                "SELECT id, name, kind, file_id, line, column_no, language, signature, documentation, modifiers
                 FROM symbols WHERE id = ?1",
            )?;
            let result = stmt
                .query_row([&id], store::row_to_symbol)
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok::<_, StorageError>(result)
        })
        .await
        .map_err(blocking_panicked)?
    }

    async fn list_symbols(&self) -> Result<Vec<Symbol>> {
        let conn = self.open_conn()?;
        tokio::task::spawn_blocking(move || {
            let mut stmt = conn.prepare(
                "SELECT id, name, kind, file_id, line, column_no, language, signature, documentation, modifiers
                 FROM symbols ORDER BY id",
            )?;
            let rows = stmt.query_map([], store::row_to_symbol)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, StorageError>(out)
        })
        .await
        .map_err(blocking_panicked)?
    }

    async fn list_references(&self) -> Result<Vec<Reference>> {
        let conn = self.open_conn()?;
        tokio::task::spawn_blocking(move || {
            let mut stmt = conn.prepare(
                "SELECT from_file_id, line, column_no, to_symbol_id, kind, language
                 FROM refs ORDER BY from_file_id, line, column_no, to_symbol_id",
            )?;
            let rows = stmt.query_map([], store::row_to_reference)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, StorageError>(out)
        })
        .await
        .map_err(blocking_panicked)?
    }

    async fn list_call_edges(&self) -> Result<Vec<CallEdge>> {
        let conn = self.open_conn()?;
        tokio::task::spawn_blocking(move || {
            let mut stmt = conn.prepare(
                "SELECT caller_file_id, call_line, call_column, caller_id, callee_id, language
                 FROM callgraph ORDER BY caller_file_id, call_line, call_column, callee_id",
            )?;
            let rows = stmt.query_map([], store::row_to_call_edge)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, StorageError>(out)
        })
        .await
        .map_err(blocking_panicked)?
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let conn = self.open_conn()?;
        tokio::task::spawn_blocking(move || {
            let mut stmt = conn.prepare("SELECT id, path, language FROM files ORDER BY id")?;
            let rows = stmt.query_map([], store::row_to_file)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, StorageError>(out)
        })
        .await
        .map_err(blocking_panicked)?
    }

    async fn references_to(&self, symbol_id: &str) -> Result<Vec<Reference>> {
        let conn = self.open_conn()?;
        let symbol_id = symbol_id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stmt = conn.prepare(
                "SELECT from_file_id, line, column_no, to_symbol_id, kind, language
                 FROM refs WHERE to_symbol_id = ?1",
            )?;
            let rows = stmt.query_map([&symbol_id], store::row_to_reference)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, StorageError>(out)
        })
        .await
        .map_err(blocking_panicked)?
    }

    async fn callers_of(&self, symbol_id: &str) -> Result<Vec<CallEdge>> {
        let conn = self.open_conn()?;
        let symbol_id = symbol_id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stmt = conn.prepare(
                "SELECT caller_file_id, call_line, call_column, caller_id, callee_id, language
                 FROM callgraph WHERE callee_id = ?1",
            )?;
            let rows = stmt.query_map([&symbol_id], store::row_to_call_edge)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, StorageError>(out)
        })
        .await
        .map_err(blocking_panicked)?
    }

    async fn apply_delta(&self, delta: &Delta) -> Result<()> {
        let _guard = self.writer_lock.lock().await;
        let path = self.path.clone();
        let delta = delta.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)?;
            schema::configure_connection(&conn)?;
            store::apply(&mut conn, &delta)
        })
        .await
        .map_err(blocking_panicked)?
    }
}

fn blocking_panicked(e: tokio::task::JoinError) -> StorageError {
    StorageError::transaction(format!("blocking task panicked: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AddModDelete, DeltaSections, DeltaStats};
    use crate::domain::SymbolKind;

    fn sample_symbol(id: &str, line: u32) -> Symbol {
        Symbol {
            id: id.into(),
            name: "foo".into(),
            kind: SymbolKind::Function,
            file_id: "m.rs".into(),
            line,
            column: 0,
            language: "rust".into(),
            signature: None,
            documentation: None,
            modifiers: vec![],
            declared_hash: None,
        }
    }

    fn sample_file() -> FileRecord {
        FileRecord { id: "m.rs".into(), path: "src/m.rs".into(), language: "rust".into(), declared_hash: None }
    }

    #[tokio::test]
    async fn apply_delta_is_visible_and_atomic() {
        let graph = SqliteSymbolGraph::open_in_memory().unwrap();
        assert_eq!(graph.current_snapshot_id().await.unwrap(), "");

        let delta = Delta {
            schema_version: 1,
            base_snapshot_id: String::new(),
            new_snapshot_id: "sha256:first".into(),
            commit: "c1".into(),
            timestamp: 1,
            deltas: DeltaSections {
                symbols: AddModDelete {
                    added: vec![sample_symbol("s1", 10)],
                    modified: vec![],
                    deleted: vec![],
                },
                files: AddModDelete { added: vec![sample_file()], ..Default::default() },
                ..Default::default()
            },
            stats: DeltaStats::default(),
        };

        graph.apply_delta(&delta).await.unwrap();
        assert_eq!(graph.current_snapshot_id().await.unwrap(), "sha256:first");
        let sym = graph.get_symbol("s1").await.unwrap().unwrap();
        assert_eq!(sym.line, 10);
    }

    /// A delta that introduces a file and a symbol referencing it together
    /// (the initial-import case) must not trip the `symbols.file_id` foreign
    /// key — files are upserted before symbols within `apply`.
    #[tokio::test]
    async fn initial_import_adds_file_and_its_symbol_in_one_delta() {
        let graph = SqliteSymbolGraph::open_in_memory().unwrap();

        let delta = Delta {
            schema_version: 1,
            base_snapshot_id: String::new(),
            new_snapshot_id: "sha256:first".into(),
            commit: "c1".into(),
            timestamp: 1,
            deltas: DeltaSections {
                symbols: AddModDelete { added: vec![sample_symbol("s1", 10)], ..Default::default() },
                files: AddModDelete { added: vec![sample_file()], ..Default::default() },
                ..Default::default()
            },
            stats: DeltaStats::default(),
        };

        graph.apply_delta(&delta).await.unwrap();
        assert_eq!(graph.list_files().await.unwrap().len(), 1);
        assert_eq!(graph.get_symbol("s1").await.unwrap().unwrap().file_id, "m.rs");
    }

    /// A delta that deletes a file and its last remaining symbol together
    /// must delete the symbol before the file, for the same FK reason.
    #[tokio::test]
    async fn delta_removes_file_and_its_symbol_together() {
        let graph = SqliteSymbolGraph::open_in_memory().unwrap();
        let add = Delta {
            schema_version: 1,
            base_snapshot_id: String::new(),
            new_snapshot_id: "sha256:a".into(),
            commit: "c1".into(),
            timestamp: 1,
            deltas: DeltaSections {
                symbols: AddModDelete { added: vec![sample_symbol("s1", 10)], ..Default::default() },
                files: AddModDelete { added: vec![sample_file()], ..Default::default() },
                ..Default::default()
            },
            stats: DeltaStats::default(),
        };
        graph.apply_delta(&add).await.unwrap();

        let remove = Delta {
            schema_version: 1,
            base_snapshot_id: "sha256:a".into(),
            new_snapshot_id: "sha256:b".into(),
            commit: "c2".into(),
            timestamp: 2,
            deltas: DeltaSections {
                symbols: AddModDelete { deleted: vec!["s1".into()], ..Default::default() },
                files: AddModDelete { deleted: vec!["m.rs".into()], ..Default::default() },
                ..Default::default()
            },
            stats: DeltaStats::default(),
        };
        graph.apply_delta(&remove).await.unwrap();

        assert!(graph.get_symbol("s1").await.unwrap().is_none());
        assert!(graph.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn modification_replaces_existing_symbol() {
        let graph = SqliteSymbolGraph::open_in_memory().unwrap();
        let add = Delta {
            schema_version: 1,
            base_snapshot_id: String::new(),
            new_snapshot_id: "sha256:a".into(),
            commit: "c1".into(),
            timestamp: 1,
            deltas: DeltaSections {
                symbols: AddModDelete {
                    added: vec![sample_symbol("s1", 10)],
                    ..Default::default()
                },
                files: AddModDelete { added: vec![sample_file()], ..Default::default() },
                ..Default::default()
            },
            stats: DeltaStats::default(),
        };
        graph.apply_delta(&add).await.unwrap();

        let modify = Delta {
            schema_version: 1,
            base_snapshot_id: "sha256:a".into(),
            new_snapshot_id: "sha256:b".into(),
            commit: "c2".into(),
            timestamp: 2,
            deltas: DeltaSections {
                symbols: AddModDelete {
                    modified: vec![sample_symbol("s1", 11)],
                    ..Default::default()
                },
                ..Default::default()
            },
            stats: DeltaStats::default(),
        };
        graph.apply_delta(&modify).await.unwrap();

        let sym = graph.get_symbol("s1").await.unwrap().unwrap();
        assert_eq!(sym.line, 11);
        assert_eq!(graph.list_symbols().await.unwrap().len(), 1);
    }
}
