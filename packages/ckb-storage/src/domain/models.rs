//! Symbol graph entity models.
//!
//! These types are the persisted vocabulary the SymbolGraph owns exclusively;
//! queries receive value copies (`Clone`), never references into storage.

use serde::{Deserialize, Serialize};

/// Closed set of symbol kinds a source indexer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Function,
    Method,
    Property,
    Field,
    Variable,
    Constant,
    Type,
    Enum,
    EnumMember,
    Namespace,
    Module,
    Package,
    Struct,
    Constructor,
    Operator,
    TypeParameter,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Field => "field",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Type => "type",
            SymbolKind::Enum => "enum",
            SymbolKind::EnumMember => "enum_member",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Module => "module",
            SymbolKind::Package => "package",
            SymbolKind::Struct => "struct",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Operator => "operator",
            SymbolKind::TypeParameter => "type_parameter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "class" => SymbolKind::Class,
            "interface" => SymbolKind::Interface,
            "function" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "property" => SymbolKind::Property,
            "field" => SymbolKind::Field,
            "variable" => SymbolKind::Variable,
            "constant" => SymbolKind::Constant,
            "type" => SymbolKind::Type,
            "enum" => SymbolKind::Enum,
            "enum_member" => SymbolKind::EnumMember,
            "namespace" => SymbolKind::Namespace,
            "module" => SymbolKind::Module,
            "package" => SymbolKind::Package,
            "struct" => SymbolKind::Struct,
            "constructor" => SymbolKind::Constructor,
            "operator" => SymbolKind::Operator,
            "type_parameter" => SymbolKind::TypeParameter,
            _ => return None,
        })
    }
}

/// A stable, indexer-assigned symbol identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file_id: String,
    pub line: u32,
    pub column: u32,
    pub language: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    /// Sender-claimed canonical hash for this symbol, carried only on the
    /// wire `Delta` payload a validator checks before apply (§4.4 rule 5).
    /// Not part of the canonical hash schema itself (excluded from
    /// `hashing::hash_symbol`'s field order) and never persisted by the
    /// `SymbolGraph` — an absent or empty value means "not claimed" and the
    /// spot check passes vacuously.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_hash: Option<String>,
}

/// Closed set of reference kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Call,
    Read,
    Write,
    Type,
    Implements,
    Extends,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Call => "call",
            ReferenceKind::Read => "read",
            ReferenceKind::Write => "write",
            ReferenceKind::Type => "type",
            ReferenceKind::Implements => "implements",
            ReferenceKind::Extends => "extends",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "call" => ReferenceKind::Call,
            "read" => ReferenceKind::Read,
            "write" => ReferenceKind::Write,
            "type" => ReferenceKind::Type,
            "implements" => ReferenceKind::Implements,
            "extends" => ReferenceKind::Extends,
            _ => return None,
        })
    }
}

/// A use-site of a symbol. Identity is positional: `{fromFileId}:{line}:{column}:{toSymbolId}`.
///
/// There is no "modified" path for references: any positional change is a
/// delete-then-add. Identity is positional by design, not a limitation to be
/// worked around here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub from_file_id: String,
    pub line: u32,
    pub column: u32,
    pub to_symbol_id: String,
    pub kind: ReferenceKind,
    pub language: String,
}

impl Reference {
    /// Composite ingestion-level identity key.
    pub fn composite_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.from_file_id, self.line, self.column, self.to_symbol_id
        )
    }
}

/// A call-site edge. The *caller* site (not the callee site) is the identity,
/// so repeated calls to the same callee from distinct sites dedup correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller_file_id: String,
    pub call_line: u32,
    pub call_column: u32,
    pub caller_id: String,
    pub callee_id: String,
    pub language: String,
}

impl CallEdge {
    pub fn composite_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.caller_file_id, self.call_line, self.call_column, self.callee_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub path: String,
    pub language: String,
    /// Sender-claimed canonical hash, wire-only — see `Symbol::declared_hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_hash: Option<String>,
}

/// Opaque content-addressed snapshot identifier, `"sha256:<hex>"`.
pub type SnapshotId = String;

// ═══════════════════════════════════════════════════════════════════════
// Delta wire schema
// ═══════════════════════════════════════════════════════════════════════

/// `added`/`modified`/`deleted` bucket for entities that support replacing
/// modification (symbols, files). `deleted` holds bare ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AddModDelete<T> {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified: Vec<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
}

impl<T> AddModDelete<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// `added`/`deleted` bucket for entities with positional-only identity
/// (references, call edges) — no modification semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AddDelete<T> {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
}

impl<T> AddDelete<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeltaSections {
    pub symbols: AddModDelete<Symbol>,
    pub refs: AddDelete<Reference>,
    #[serde(rename = "callgraph")]
    pub call_graph: AddDelete<CallEdge>,
    pub files: AddModDelete<FileRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeltaStats {
    pub total_added: u64,
    pub total_modified: u64,
    pub total_deleted: u64,
    pub symbols_added: u64,
    pub symbols_modified: u64,
    pub symbols_deleted: u64,
    pub refs_added: u64,
    pub refs_deleted: u64,
    pub call_edges_added: u64,
    pub call_edges_deleted: u64,
    pub files_added: u64,
    pub files_modified: u64,
    pub files_deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(rename = "delta_schema_version")]
    pub schema_version: u32,
    #[serde(rename = "base_snapshot_id")]
    pub base_snapshot_id: String,
    #[serde(rename = "new_snapshot_id")]
    pub new_snapshot_id: String,
    pub commit: String,
    pub timestamp: i64,
    pub deltas: DeltaSections,
    pub stats: DeltaStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_composite_key_matches_spec_format() {
        let r = Reference {
            from_file_id: "f1".into(),
            line: 10,
            column: 4,
            to_symbol_id: "s1".into(),
            kind: ReferenceKind::Call,
            language: "rust".into(),
        };
        assert_eq!(r.composite_key(), "f1:10:4:s1");
    }

    #[test]
    fn call_edge_composite_key_uses_caller_site() {
        let e = CallEdge {
            caller_file_id: "f1".into(),
            call_line: 20,
            call_column: 8,
            caller_id: "caller".into(),
            callee_id: "callee".into(),
            language: "rust".into(),
        };
        assert_eq!(e.composite_key(), "f1:20:8:callee");
    }

    #[test]
    fn delta_round_trips_through_json() {
        let delta = Delta {
            schema_version: 1,
            base_snapshot_id: String::new(),
            new_snapshot_id: "sha256:abc".into(),
            commit: "deadbeef".into(),
            timestamp: 1000,
            deltas: DeltaSections::default(),
            stats: DeltaStats::default(),
        };
        let json = serde_json::to_string(&delta).unwrap();
        let back: Delta = serde_json::from_str(&json).unwrap();
        assert_eq!(delta, back);
    }

    #[test]
    fn empty_buckets_omitted_from_serialization() {
        let delta = Delta {
            schema_version: 1,
            base_snapshot_id: String::new(),
            new_snapshot_id: "sha256:abc".into(),
            commit: "c".into(),
            timestamp: 1,
            deltas: DeltaSections::default(),
            stats: DeltaStats::default(),
        };
        let json = serde_json::to_value(&delta).unwrap();
        assert!(json["deltas"]["symbols"].get("added").is_none());
    }
}
