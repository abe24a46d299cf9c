//! Response shaping: deduplication, budget-bound truncation, drilldown
//! suggestion generation, and completeness-score merging for multi-source
//! query results.

use std::collections::HashMap;

use crate::config::ResponseBudget;

/// Anything with a natural dedup identity — positional for refs/call edges,
/// id-based for symbols, modules, and impact items.
pub trait Keyed {
    fn dedup_key(&self) -> String;
}

impl Keyed for ckb_storage::Reference {
    /// Positional identity. The schema tracks references as single points
    /// (`line`, `column`), not ranges, so `startLine == endLine` and
    /// `startCol == endCol` collapse into `composite_key()`'s
    /// `fromFileId:line:column:toSymbolId` — a strict refinement of the
    /// location-only key, since a point can only target one symbol anyway.
    fn dedup_key(&self) -> String {
        self.composite_key()
    }
}

impl Keyed for ckb_storage::CallEdge {
    fn dedup_key(&self) -> String {
        self.composite_key()
    }
}

impl Keyed for ckb_storage::Symbol {
    fn dedup_key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for crate::impact::ImpactItem {
    fn dedup_key(&self) -> String {
        self.target_id.clone()
    }
}

/// Deduplicates a sequence by `dedup_key`, keeping the first occurrence and
/// preserving input order. Idempotent: running it twice is the same as
/// running it once.
pub struct Deduplicator;

impl Deduplicator {
    pub fn dedupe<T: Keyed + Clone>(items: Vec<T>) -> Vec<T> {
        let mut seen = std::collections::HashSet::new();
        items
            .into_iter()
            .filter(|item| seen.insert(item.dedup_key()))
            .collect()
    }
}

/// Closed set of reasons a result set was cut short (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationReason {
    MaxModules,
    MaxSymbols,
    MaxItems,
    MaxRefs,
    Timeout,
    BudgetExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruncationInfo {
    pub reason: TruncationReason,
    pub original_count: usize,
    pub returned_count: usize,
    pub dropped_count: usize,
}

pub struct Compressor;

impl Compressor {
    /// Truncate `items` to at most `budget` entries. Returns `None` for the
    /// truncation info when nothing was dropped. Callers pre-sort by
    /// priority; this is O(1) past that sort.
    pub fn truncate<T>(
        items: Vec<T>,
        budget: usize,
        reason: TruncationReason,
    ) -> (Vec<T>, Option<TruncationInfo>) {
        let original_count = items.len();
        if original_count <= budget {
            return (items, None);
        }
        let mut items = items;
        items.truncate(budget);
        let info = TruncationInfo {
            reason,
            original_count,
            returned_count: budget,
            dropped_count: original_count.saturating_sub(budget),
        };
        (items, Some(info))
    }
}

/// Closed set of reasons a result's completeness fell short of a full scan
/// (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletenessReason {
    FullBackend,
    BestEffortLsp,
    WorkspaceNotReady,
    TimedOut,
    Truncated,
    SingleFileOnly,
    NoBackendAvailable,
    IndexStale,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessInfo {
    pub score: f64,
    pub reason: CompletenessReason,
    pub details: HashMap<String, String>,
}

impl CompletenessInfo {
    pub fn is_complete(&self) -> bool {
        self.score >= 0.95
    }

    pub fn is_best_effort(&self) -> bool {
        (0.5..0.95).contains(&self.score)
    }
}

pub struct CompletenessMerger;

impl CompletenessMerger {
    const CONFIDENT_THRESHOLD: f64 = 0.95;

    /// Merge per-source completeness info. Any single source scoring
    /// `>= 0.95` wins outright, since a confident source outweighs
    /// uncertainty elsewhere; otherwise the arithmetic mean is returned,
    /// tagged with the highest-scoring source's reason plus a "merged" note.
    pub fn merge(sources: &[CompletenessInfo]) -> CompletenessInfo {
        if sources.is_empty() {
            return CompletenessInfo {
                score: 0.0,
                reason: CompletenessReason::NoBackendAvailable,
                details: HashMap::new(),
            };
        }

        if let Some(confident) = sources.iter().find(|s| s.score >= Self::CONFIDENT_THRESHOLD) {
            return confident.clone();
        }

        let mean = sources.iter().map(|s| s.score).sum::<f64>() / sources.len() as f64;
        let best = sources
            .iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap();

        let mut details = best.details.clone();
        details.insert("merged".to_string(), "true".to_string());

        CompletenessInfo { score: mean, reason: best.reason, details }
    }
}

/// Whether the current snapshot is stale against the workspace's HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexFreshness {
    pub stale_against_head: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopModule<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

/// Everything the drilldown rules need to know about the response they're
/// attached to (§4.11).
pub struct DrilldownContext<'a> {
    pub truncation_reason: Option<TruncationReason>,
    pub completeness: CompletenessInfo,
    pub index_freshness: IndexFreshness,
    pub symbol_id: Option<&'a str>,
    pub top_module: Option<TopModule<'a>>,
    pub workspace_ready: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrilldownSuggestion {
    pub label: String,
    pub query: String,
    pub relevance: f64,
}

pub struct DrilldownGenerator;

impl DrilldownGenerator {
    /// Run 8 independently-firing rules against `ctx`, concatenate, sort by
    /// relevance descending, then truncate to `budget.max_drilldowns`.
    pub fn generate(ctx: &DrilldownContext, budget: &ResponseBudget) -> Vec<DrilldownSuggestion> {
        let mut suggestions = Vec::new();

        if ctx.truncation_reason == Some(TruncationReason::MaxModules) {
            if let Some(top) = ctx.top_module {
                suggestions.push(DrilldownSuggestion {
                    label: format!("Explore top module: {}", top.name),
                    query: format!("getModuleOverview {}", top.id),
                    relevance: 0.90,
                });
            }
        }

        if ctx.truncation_reason == Some(TruncationReason::MaxItems) {
            if let (Some(symbol_id), Some(top)) = (ctx.symbol_id, ctx.top_module) {
                suggestions.push(DrilldownSuggestion {
                    label: "Scope to specific module".into(),
                    query: format!("findReferences {symbol_id} --scope={}", top.id),
                    relevance: 0.85,
                });
            }
        }

        if ctx.truncation_reason == Some(TruncationReason::MaxRefs) {
            if let Some(symbol_id) = ctx.symbol_id {
                suggestions.push(DrilldownSuggestion {
                    label: "Get first page of references".into(),
                    query: format!("findReferences {symbol_id} --limit=100"),
                    relevance: 0.80,
                });
            }
        }

        if ctx.truncation_reason == Some(TruncationReason::Timeout) {
            if let Some(symbol_id) = ctx.symbol_id {
                suggestions.push(DrilldownSuggestion {
                    label: "Retry with faster backend".into(),
                    query: format!("findReferences {symbol_id} --backend=scip"),
                    relevance: 0.75,
                });
            }
        }

        if !ctx.workspace_ready {
            if let Some(symbol_id) = ctx.symbol_id {
                suggestions.push(DrilldownSuggestion {
                    label: "Retry after warmup".into(),
                    query: format!("findReferences {symbol_id} --wait-for-ready"),
                    relevance: 0.80,
                });
            }
        }

        if ctx.completeness.is_best_effort() {
            suggestions.push(DrilldownSuggestion {
                label: "Check workspace status".into(),
                query: "getStatus".into(),
                relevance: 0.70,
            });
        }

        if ctx.completeness.score < 0.8 {
            if let Some(symbol_id) = ctx.symbol_id {
                suggestions.push(DrilldownSuggestion {
                    label: "Get maximum results (slower)".into(),
                    query: format!("findReferences {symbol_id} --merge=union"),
                    relevance: 0.65,
                });
            }
        }

        if ctx.index_freshness.stale_against_head {
            suggestions.push(DrilldownSuggestion {
                label: "Regenerate index".into(),
                query: "doctor --check=index".into(),
                relevance: 0.60,
            });
        }

        suggestions.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(std::cmp::Ordering::Equal));
        suggestions.truncate(budget.max_drilldowns);
        suggestions
    }
}
