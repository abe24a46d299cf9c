//! Response envelopes: one concrete type per query kind (§9 "Dynamic result
//! payloads" — a systems implementation should introduce a concrete response
//! envelope per query kind rather than a loosely-typed map), all sharing the
//! same four-field shape every client response carries (§7): the data, a
//! nullable truncation, a completeness signal, and a drilldown list.

use serde::{Deserialize, Serialize};

use ckb_core::shaping::{CompletenessInfo, DrilldownSuggestion, TruncationInfo};
use ckb_storage::{CallEdge, Symbol};

/// The shape every client-visible response shares, generic over its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse<T> {
    pub data: T,
    pub truncation: Option<TruncationInfo>,
    pub completeness: CompletenessInfo,
    pub drilldowns: Vec<DrilldownSuggestion>,
}

impl<T> QueryResponse<T> {
    pub fn new(data: T, completeness: CompletenessInfo) -> Self {
        Self {
            data,
            truncation: None,
            completeness,
            drilldowns: Vec::new(),
        }
    }

    pub fn with_truncation(mut self, truncation: Option<TruncationInfo>) -> Self {
        self.truncation = truncation;
        self
    }

    pub fn with_drilldowns(mut self, drilldowns: Vec<DrilldownSuggestion>) -> Self {
        self.drilldowns = drilldowns;
        self
    }
}

pub type SymbolResponse = QueryResponse<Option<Symbol>>;
pub type ReferencesResponse = QueryResponse<Vec<ckb_storage::Reference>>;
pub type BatchGetResponse = QueryResponse<Vec<Option<Symbol>>>;

/// `getCallGraph(symbolId, direction, depth)` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallGraphDirection {
    Callers,
    Callees,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallGraphResult {
    pub symbol_id: String,
    pub callers: Vec<CallEdge>,
    pub callees: Vec<CallEdge>,
}

pub type CallGraphResponse = QueryResponse<CallGraphResult>;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub query: String,
    pub matches: Vec<Symbol>,
}

pub type BatchSearchResponse = QueryResponse<Vec<SearchResult>>;

/// `explore(target, depth, focus)` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploreDepth {
    Shallow,
    Standard,
    Deep,
}

impl ExploreDepth {
    /// Translates to a transitive-caller depth for the impact analyzer:
    /// shallow stops at direct refs, standard/deep widen the traversal.
    pub fn max_caller_depth(self) -> i32 {
        match self {
            ExploreDepth::Shallow => 1,
            ExploreDepth::Standard => 2,
            ExploreDepth::Deep => ckb_core::impact::MAX_DEPTH as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploreFocus {
    Structure,
    Dependencies,
    Changes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExploreResult {
    pub symbol: Symbol,
    pub references: Vec<ckb_storage::Reference>,
    pub call_graph: Option<CallGraphResult>,
}

pub type ExploreResponse = QueryResponse<ExploreResult>;

/// `understand(query, includeReferences, includeCallGraph, maxReferences)` (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct UnderstandResult {
    pub matches: Vec<Symbol>,
    pub references: Vec<ckb_storage::Reference>,
    pub call_graph: Option<CallGraphResult>,
}

pub type UnderstandResponse = QueryResponse<UnderstandResult>;

/// `prepareChange(target, changeType)` (§6). `changeType` here is the
/// user-facing edit kind, distinct from `ckb_core::impact::ChangeType`
/// (the breaking-change classification axis) — `PrepareChangeKind::into`
/// maps one onto the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrepareChangeKind {
    Modify,
    Rename,
    Delete,
    Extract,
}

impl From<PrepareChangeKind> for ckb_core::impact::ChangeType {
    fn from(kind: PrepareChangeKind) -> Self {
        match kind {
            PrepareChangeKind::Modify => ckb_core::impact::ChangeType::SignatureChanged,
            PrepareChangeKind::Rename => ckb_core::impact::ChangeType::Renamed,
            PrepareChangeKind::Delete => ckb_core::impact::ChangeType::Removed,
            // Extraction relocates a symbol's body; every existing call site
            // needs updating the same way a signature change would.
            PrepareChangeKind::Extract => ckb_core::impact::ChangeType::SignatureChanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrepareChangeResult {
    pub target: Symbol,
    pub change_kind: PrepareChangeKind,
    pub impact: ckb_core::impact::ImpactResult,
    pub breaking_ref_count: usize,
}

pub type PrepareChangeResponse = QueryResponse<PrepareChangeResult>;
