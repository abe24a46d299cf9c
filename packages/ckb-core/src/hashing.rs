//! Canonical, deterministic hashing for entities, deltas, and snapshots.
//!
//! Every hash in this module is built the same way: fields are encoded with
//! a length prefix (`"{byteLength}:{valueBytes}"`) before being concatenated
//! and fed to SHA-256, so that e.g. `("ab", "c")` and `("a", "bc")` never
//! collide the way naive string concatenation would.

use sha2::{Digest, Sha256};

use ckb_storage::{CallEdge, FileRecord, Reference, Symbol};

/// `sha256("")`, used as the canonical "nothing changed here" hash.
pub const SHA256_EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85";

/// Accumulates length-prefixed fields into a single SHA-256 digest.
#[derive(Default)]
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha256::new() }
    }

    /// Feed one field, length-prefixed so field boundaries are unambiguous.
    pub fn field(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        let bytes = value.as_ref();
        self.inner.update(bytes.len().to_string().as_bytes());
        self.inner.update(b":");
        self.inner.update(bytes);
        self
    }

    /// Feed an already-length-prefixed raw tag (e.g. bucket prefixes like
    /// `"sa:"`) without the additional length-prefix wrapping `field` does.
    pub fn raw(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        self.inner.update(value.as_ref());
        self
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}

fn opt_field(h: &mut Hasher, value: &Option<String>) {
    h.field(value.as_deref().unwrap_or(""));
}

/// Canonical hash of a `Symbol`. Deliberately excludes `column` and
/// `modifiers`: column shifts are not semantically meaningful renames, and
/// modifiers are an open vocabulary that should not cause spurious diffs.
pub fn hash_symbol(s: &Symbol) -> String {
    let mut h = Hasher::new();
    h.field(&s.id)
        .field(&s.name)
        .field(s.kind.as_str())
        .field(&s.file_id)
        .field(s.line.to_string())
        .field(&s.language);
    opt_field(&mut h, &s.signature);
    opt_field(&mut h, &s.documentation);
    h.finish()
}

pub fn hash_reference(r: &Reference) -> String {
    Hasher::new()
        .field(&r.from_file_id)
        .field(r.line.to_string())
        .field(r.column.to_string())
        .field(&r.to_symbol_id)
        .field(r.kind.as_str())
        .field(&r.language)
        .finish()
}

pub fn hash_call_edge(e: &CallEdge) -> String {
    Hasher::new()
        .field(&e.caller_file_id)
        .field(e.call_line.to_string())
        .field(e.call_column.to_string())
        .field(&e.callee_id)
        .field(&e.caller_id)
        .field(&e.language)
        .finish()
}

pub fn hash_file(f: &FileRecord) -> String {
    Hasher::new().field(&f.id).field(&f.path).field(&f.language).finish()
}

/// Overall hash of a delta's sections: every bucket sorted by id/composite
/// key, tagged so additions can never collide with deletions of the same
/// entity, then fed through one `Hasher`.
pub fn hash_delta_sections(sections: &ckb_storage::DeltaSections) -> String {
    let mut h = Hasher::new();

    let mut symbols_added: Vec<&Symbol> = sections.symbols.added.iter().collect();
    symbols_added.sort_by(|a, b| a.id.cmp(&b.id));
    for s in symbols_added {
        h.raw("sa:").field(&s.id).field(hash_symbol(s));
    }

    let mut symbols_modified: Vec<&Symbol> = sections.symbols.modified.iter().collect();
    symbols_modified.sort_by(|a, b| a.id.cmp(&b.id));
    for s in symbols_modified {
        h.raw("sm:").field(&s.id).field(hash_symbol(s));
    }

    let mut symbols_deleted: Vec<&String> = sections.symbols.deleted.iter().collect();
    symbols_deleted.sort();
    for id in symbols_deleted {
        h.raw("sd:").field(id);
    }

    let mut refs_added: Vec<&Reference> = sections.refs.added.iter().collect();
    refs_added.sort_by(|a, b| a.composite_key().cmp(&b.composite_key()));
    for r in refs_added {
        h.raw("ra:").field(r.composite_key()).field(hash_reference(r));
    }

    let mut refs_deleted: Vec<&String> = sections.refs.deleted.iter().collect();
    refs_deleted.sort();
    for key in refs_deleted {
        h.raw("rd:").field(key);
    }

    let mut calls_added: Vec<&CallEdge> = sections.call_graph.added.iter().collect();
    calls_added.sort_by(|a, b| a.composite_key().cmp(&b.composite_key()));
    for e in calls_added {
        h.raw("ca:").field(e.composite_key()).field(hash_call_edge(e));
    }

    let mut calls_deleted: Vec<&String> = sections.call_graph.deleted.iter().collect();
    calls_deleted.sort();
    for key in calls_deleted {
        h.raw("cd:").field(key);
    }

    let mut files_added: Vec<&FileRecord> = sections.files.added.iter().collect();
    files_added.sort_by(|a, b| a.id.cmp(&b.id));
    for f in files_added {
        h.raw("fa:").field(&f.id).field(hash_file(f));
    }

    let mut files_modified: Vec<&FileRecord> = sections.files.modified.iter().collect();
    files_modified.sort_by(|a, b| a.id.cmp(&b.id));
    for f in files_modified {
        h.raw("fm:").field(&f.id).field(hash_file(f));
    }

    let mut files_deleted: Vec<&String> = sections.files.deleted.iter().collect();
    files_deleted.sort();
    for id in files_deleted {
        h.raw("fd:").field(id);
    }

    h.finish()
}

/// Compute a snapshot id from the full resulting entity sets (post-apply),
/// not from a delta: `"sha256:<hex>"`, so it is visibly distinguishable from
/// a bare entity or delta hash in logs and wire payloads.
pub fn compute_snapshot_id(
    symbols: &[Symbol],
    refs: &[Reference],
    call_edges: &[CallEdge],
    files: &[FileRecord],
) -> String {
    let mut h = Hasher::new();

    let mut symbols: Vec<&Symbol> = symbols.iter().collect();
    symbols.sort_by(|a, b| a.id.cmp(&b.id));
    for s in symbols {
        h.raw("s:").field(&s.id).field(hash_symbol(s));
    }

    let mut refs: Vec<&Reference> = refs.iter().collect();
    refs.sort_by(|a, b| a.composite_key().cmp(&b.composite_key()));
    for r in refs {
        h.raw("r:").field(r.composite_key()).field(hash_reference(r));
    }

    let mut call_edges: Vec<&CallEdge> = call_edges.iter().collect();
    call_edges.sort_by(|a, b| a.composite_key().cmp(&b.composite_key()));
    for e in call_edges {
        h.raw("c:").field(e.composite_key()).field(hash_call_edge(e));
    }

    let mut files: Vec<&FileRecord> = files.iter().collect();
    files.sort_by(|a, b| a.id.cmp(&b.id));
    for f in files {
        h.raw("f:").field(&f.id).field(hash_file(f));
    }

    format!("sha256:{}", h.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ckb_storage::SymbolKind;

    fn sample_symbol(id: &str) -> Symbol {
        Symbol {
            id: id.into(),
            name: "foo".into(),
            kind: SymbolKind::Function,
            file_id: "f1".into(),
            line: 1,
            column: 0,
            language: "rust".into(),
            signature: None,
            documentation: None,
            modifiers: vec![],
            declared_hash: None,
        }
    }

    #[test]
    fn field_boundaries_do_not_collide() {
        let a = Hasher::new().field("ab").field("c").finish();
        let b = Hasher::new().field("a").field("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn symbol_hash_ignores_column_and_modifiers() {
        let mut s1 = sample_symbol("s1");
        let mut s2 = sample_symbol("s1");
        s1.column = 4;
        s2.column = 99;
        s1.modifiers = vec!["static".into()];
        assert_eq!(hash_symbol(&s1), hash_symbol(&s2));
    }

    #[test]
    fn symbol_hash_changes_with_name() {
        let s1 = sample_symbol("s1");
        let mut s2 = sample_symbol("s1");
        s2.name = "bar".into();
        assert_ne!(hash_symbol(&s1), hash_symbol(&s2));
    }

    #[test]
    fn delta_sections_hash_is_order_independent() {
        let sections_a = ckb_storage::DeltaSections {
            symbols: ckb_storage::AddModDelete {
                added: vec![sample_symbol("s1"), sample_symbol("s2")],
                ..Default::default()
            },
            ..Default::default()
        };
        let sections_b = ckb_storage::DeltaSections {
            symbols: ckb_storage::AddModDelete {
                added: vec![sample_symbol("s2"), sample_symbol("s1")],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(hash_delta_sections(&sections_a), hash_delta_sections(&sections_b));
    }

    #[test]
    fn snapshot_id_is_prefixed() {
        let id = compute_snapshot_id(&[], &[], &[], &[]);
        assert!(id.starts_with("sha256:"));
    }
}
