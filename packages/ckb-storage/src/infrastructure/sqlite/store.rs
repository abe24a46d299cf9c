//! Delta application against the SQLite-backed symbol graph.

use rusqlite::{params, Connection};

use crate::domain::models::{AddDelete, AddModDelete, CallEdge, Delta, FileRecord, Reference, Symbol};
use crate::domain::ReferenceKind;
use crate::Result;

const CURRENT_SNAPSHOT_KEY: &str = "current_snapshot_id";

pub(super) fn current_snapshot_id(conn: &Connection) -> Result<String> {
    let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
    let value: Option<String> = stmt
        .query_row(params![CURRENT_SNAPSHOT_KEY], |row| row.get(0))
        .ok();
    Ok(value.unwrap_or_default())
}

fn set_current_snapshot(conn: &Connection, snapshot_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO meta(key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![CURRENT_SNAPSHOT_KEY, snapshot_id],
    )?;
    Ok(())
}

fn insert_symbol(conn: &Connection, s: &Symbol) -> Result<()> {
    let modifiers = serde_json::to_string(&s.modifiers)?;
    conn.execute(
        "INSERT INTO symbols (id, name, kind, file_id, line, column_no, language, signature, documentation, modifiers)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name, kind = excluded.kind, file_id = excluded.file_id,
            line = excluded.line, column_no = excluded.column_no, language = excluded.language,
            signature = excluded.signature, documentation = excluded.documentation,
            modifiers = excluded.modifiers",
        params![
            s.id,
            s.name,
            s.kind.as_str(),
            s.file_id,
            s.line,
            s.column,
            s.language,
            s.signature,
            s.documentation,
            modifiers
        ],
    )?;
    Ok(())
}

fn insert_file(conn: &Connection, f: &FileRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO files (id, path, language) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET path = excluded.path, language = excluded.language",
        params![f.id, f.path, f.language],
    )?;
    Ok(())
}

fn insert_reference(conn: &Connection, r: &Reference) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO refs (from_file_id, line, column_no, to_symbol_id, kind, language)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![r.from_file_id, r.line, r.column, r.to_symbol_id, r.kind.as_str(), r.language],
    )?;
    Ok(())
}

fn delete_reference_by_key(conn: &Connection, key: &str) -> Result<()> {
    let parts: Vec<&str> = key.splitn(4, ':').collect();
    if parts.len() != 4 {
        return Ok(());
    }
    conn.execute(
        "DELETE FROM refs WHERE from_file_id = ?1 AND line = ?2 AND column_no = ?3 AND to_symbol_id = ?4",
        params![parts[0], parts[1].parse::<i64>().unwrap_or(-1), parts[2].parse::<i64>().unwrap_or(-1), parts[3]],
    )?;
    Ok(())
}

fn insert_call_edge(conn: &Connection, e: &CallEdge) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO callgraph (caller_file_id, call_line, call_column, caller_id, callee_id, language)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![e.caller_file_id, e.call_line, e.call_column, e.caller_id, e.callee_id, e.language],
    )?;
    Ok(())
}

fn delete_call_edge_by_key(conn: &Connection, key: &str) -> Result<()> {
    let parts: Vec<&str> = key.splitn(4, ':').collect();
    if parts.len() != 4 {
        return Ok(());
    }
    conn.execute(
        "DELETE FROM callgraph WHERE caller_file_id = ?1 AND call_line = ?2 AND call_column = ?3 AND callee_id = ?4",
        params![parts[0], parts[1].parse::<i64>().unwrap_or(-1), parts[2].parse::<i64>().unwrap_or(-1), parts[3]],
    )?;
    Ok(())
}

pub(super) fn apply(conn: &mut Connection, delta: &Delta) -> Result<()> {
    let tx = conn.transaction()?;

    // Files are upserted before symbols (symbols.file_id is a foreign key
    // into files) and their deletions applied after symbols are deleted, so
    // a delta that adds/removes a file and its symbols together never trips
    // the foreign-key constraint mid-transaction.
    upsert_files(&tx, &delta.deltas.files)?;
    apply_symbols(&tx, &delta.deltas.symbols)?;
    delete_files(&tx, &delta.deltas.files)?;
    apply_refs(&tx, &delta.deltas.refs)?;
    apply_call_edges(&tx, &delta.deltas.call_graph)?;
    set_current_snapshot(&tx, &delta.new_snapshot_id)?;

    tx.commit()?;
    Ok(())
}

fn apply_symbols(conn: &Connection, bucket: &AddModDelete<Symbol>) -> Result<()> {
    for s in bucket.added.iter().chain(bucket.modified.iter()) {
        insert_symbol(conn, s)?;
    }
    for id in &bucket.deleted {
        conn.execute("DELETE FROM symbols WHERE id = ?1", params![id])?;
    }
    Ok(())
}

fn upsert_files(conn: &Connection, bucket: &AddModDelete<FileRecord>) -> Result<()> {
    for f in bucket.added.iter().chain(bucket.modified.iter()) {
        insert_file(conn, f)?;
    }
    Ok(())
}

fn delete_files(conn: &Connection, bucket: &AddModDelete<FileRecord>) -> Result<()> {
    for id in &bucket.deleted {
        conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
    }
    Ok(())
}

fn apply_refs(conn: &Connection, bucket: &AddDelete<Reference>) -> Result<()> {
    for r in &bucket.added {
        insert_reference(conn, r)?;
    }
    for key in &bucket.deleted {
        delete_reference_by_key(conn, key)?;
    }
    Ok(())
}

fn apply_call_edges(conn: &Connection, bucket: &AddDelete<CallEdge>) -> Result<()> {
    for e in &bucket.added {
        insert_call_edge(conn, e)?;
    }
    for key in &bucket.deleted {
        delete_call_edge_by_key(conn, key)?;
    }
    Ok(())
}

pub(super) fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
    let kind_str: String = row.get("kind")?;
    let modifiers_json: String = row.get("modifiers")?;
    Ok(Symbol {
        id: row.get("id")?,
        name: row.get("name")?,
        kind: crate::domain::SymbolKind::from_str(&kind_str).unwrap_or(crate::domain::SymbolKind::Variable),
        file_id: row.get("file_id")?,
        line: row.get("line")?,
        column: row.get("column_no")?,
        language: row.get("language")?,
        signature: row.get("signature")?,
        documentation: row.get("documentation")?,
        modifiers: serde_json::from_str(&modifiers_json).unwrap_or_default(),
        declared_hash: None,
    })
}

pub(super) fn row_to_reference(row: &rusqlite::Row) -> rusqlite::Result<Reference> {
    let kind_str: String = row.get("kind")?;
    Ok(Reference {
        from_file_id: row.get("from_file_id")?,
        line: row.get("line")?,
        column: row.get("column_no")?,
        to_symbol_id: row.get("to_symbol_id")?,
        kind: ReferenceKind::from_str(&kind_str).unwrap_or(ReferenceKind::Read),
        language: row.get("language")?,
    })
}

pub(super) fn row_to_call_edge(row: &rusqlite::Row) -> rusqlite::Result<CallEdge> {
    Ok(CallEdge {
        caller_file_id: row.get("caller_file_id")?,
        call_line: row.get("call_line")?,
        call_column: row.get("call_column")?,
        caller_id: row.get("caller_id")?,
        callee_id: row.get("callee_id")?,
        language: row.get("language")?,
    })
}

pub(super) fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get("id")?,
        path: row.get("path")?,
        language: row.get("language")?,
        declared_hash: None,
    })
}
