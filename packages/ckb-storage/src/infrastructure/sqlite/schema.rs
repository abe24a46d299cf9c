//! Schema migration and pragma setup for the embedded SQLite store.
//!
//! A single fixed schema version: no migration framework, since the spec
//! defines one schema and missing tables are legal (treated as empty).

use rusqlite::Connection;

use crate::Result;

pub(super) fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // cache_size is in KiB when negative: -65536 KiB == 64 MiB.
    conn.pragma_update(None, "cache_size", -65536i64)?;
    // mmap_size is in bytes: 256 MiB.
    conn.pragma_update(None, "mmap_size", 268_435_456i64)?;
    Ok(())
}

pub(super) fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            language TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS symbols (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            file_id TEXT NOT NULL,
            line INTEGER NOT NULL,
            column_no INTEGER NOT NULL DEFAULT 0,
            language TEXT NOT NULL,
            signature TEXT,
            documentation TEXT,
            modifiers TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY (file_id) REFERENCES files(id)
        );
        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id);

        CREATE TABLE IF NOT EXISTS refs (
            from_file_id TEXT NOT NULL,
            line INTEGER NOT NULL,
            column_no INTEGER NOT NULL,
            to_symbol_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            language TEXT NOT NULL,
            PRIMARY KEY (from_file_id, line, column_no, to_symbol_id)
        );
        CREATE INDEX IF NOT EXISTS idx_refs_target ON refs(to_symbol_id);

        CREATE TABLE IF NOT EXISTS callgraph (
            caller_file_id TEXT NOT NULL,
            call_line INTEGER NOT NULL,
            call_column INTEGER NOT NULL,
            caller_id TEXT NOT NULL,
            callee_id TEXT NOT NULL,
            language TEXT NOT NULL,
            PRIMARY KEY (caller_file_id, call_line, call_column, callee_id)
        );
        CREATE INDEX IF NOT EXISTS idx_callgraph_callee ON callgraph(callee_id);

        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}
