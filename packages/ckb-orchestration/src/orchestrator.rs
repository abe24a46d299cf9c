//! The `QueryOrchestrator`: routes queries to the symbol graph, merges their
//! results with `ckb_core`'s impact/shaping algorithms, and returns one of
//! the typed envelopes in [`crate::envelope`].
//!
//! Two adapters live here rather than in `ckb-core` because they need an
//! async `SymbolGraph` fetch to build: `PathModuleResolver` (derives a
//! module id from a file's directory, per `ckb_core::impact::ModuleResolver`'s
//! doc comment on why modules aren't a stored field) and `GraphCallerProvider`
//! (a breadth-first walk over `callers_of` that satisfies
//! `TransitiveCallerProvider`). Both are plain synchronous structs built once
//! per query from data already fetched; `ckb-core`'s algorithms stay ignorant
//! of storage and async entirely.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use ckb_core::config::{BackendLimits, ResponseBudget};
use ckb_core::impact::{
    is_breaking_change, ChangeType, DerivationRef, DirectRef, ImpactAnalyzer, ModuleResolver,
    TransitiveCallerProvider,
};
use ckb_core::shaping::{
    Compressor, CompletenessInfo, CompletenessMerger, CompletenessReason, Deduplicator,
    DrilldownContext, DrilldownGenerator, IndexFreshness, TopModule, TruncationReason,
};
use ckb_storage::{CallEdge, FileRecord, Reference, Symbol, SymbolGraph};

use crate::cache::SnapshotCache;
use crate::cancellation::RequestContext;
use crate::envelope::{
    BatchGetResponse, BatchSearchResponse, CallGraphDirection, CallGraphResponse,
    CallGraphResult, ExploreDepth, ExploreFocus, ExploreResponse, ExploreResult,
    PrepareChangeKind, PrepareChangeResponse, PrepareChangeResult, QueryResponse,
    ReferencesResponse, SearchResult, SymbolResponse, UnderstandResponse, UnderstandResult,
};
use crate::error::{CkbError, Result};

/// Derives a file's module id from its directory, the convention `ckb-core`'s
/// `ModuleResolver` trait expects an adapter to supply.
struct PathModuleResolver {
    file_to_path: HashMap<String, String>,
}

impl PathModuleResolver {
    fn build(files: &[FileRecord]) -> Self {
        let file_to_path = files.iter().map(|f| (f.id.clone(), f.path.clone())).collect();
        Self { file_to_path }
    }

    fn module_name_of_path(path: &str) -> String {
        match path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => "<root>".to_string(),
        }
    }
}

impl ModuleResolver for PathModuleResolver {
    fn module_of_file(&self, file_id: &str) -> String {
        match self.file_to_path.get(file_id) {
            Some(path) => Self::module_name_of_path(path),
            None => file_id.to_string(),
        }
    }
}

/// Breadth-first transitive-caller closure over the call graph, capped at
/// `MAX_DEPTH` and deduped to the minimum distance per id, exactly what
/// `TransitiveCallerProvider`'s contract asks the supplier for.
struct GraphCallerProvider {
    distances: HashMap<String, u32>,
    symbols_by_id: HashMap<String, Symbol>,
    module_resolver: PathModuleResolver,
}

impl GraphCallerProvider {
    async fn build(
        graph: &dyn SymbolGraph,
        symbol_id: &str,
        max_depth: u32,
        module_resolver: PathModuleResolver,
        symbols_by_id: HashMap<String, Symbol>,
    ) -> Result<Self> {
        let mut distances: HashMap<String, u32> = HashMap::new();
        let mut frontier: VecDeque<(String, u32)> = VecDeque::new();
        frontier.push_back((symbol_id.to_string(), 0));
        let mut visited: HashSet<String> = HashSet::from([symbol_id.to_string()]);

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let callers = graph.callers_of(&current).await.map_err(CkbError::from)?;
            for edge in callers {
                let caller_depth = depth + 1;
                if !visited.insert(edge.caller_id.clone()) {
                    continue;
                }
                distances
                    .entry(edge.caller_id.clone())
                    .and_modify(|d| *d = (*d).min(caller_depth))
                    .or_insert(caller_depth);
                frontier.push_back((edge.caller_id, caller_depth));
            }
        }

        Ok(Self { distances, symbols_by_id, module_resolver })
    }
}

impl TransitiveCallerProvider for GraphCallerProvider {
    fn get_transitive_callers(&self, _symbol_id: &str, max_depth: u32) -> HashMap<String, u32> {
        self.distances
            .iter()
            .filter(|(_, &depth)| depth <= max_depth)
            .map(|(id, &depth)| (id.clone(), depth))
            .collect()
    }

    fn symbol_name(&self, symbol_id: &str) -> Option<String> {
        self.symbols_by_id.get(symbol_id).map(|s| s.name.clone())
    }

    fn module_of(&self, symbol_id: &str) -> Option<(String, String)> {
        let symbol = self.symbols_by_id.get(symbol_id)?;
        let module_id = self.module_resolver.module_of_file(&symbol.file_id);
        Some((module_id.clone(), module_id))
    }
}

/// Routes `getSymbol`/`findReferences`/`getCallGraph`/`batchGet`/
/// `batchSearch`/`explore`/`understand`/`prepareChange` against a
/// `SymbolGraph`, shaping every result through the budget/impact pipeline.
pub struct QueryOrchestrator {
    graph: Arc<dyn SymbolGraph>,
    budget: ResponseBudget,
    limits: BackendLimits,
    explore_cache: SnapshotCache<ExploreResult>,
}

impl QueryOrchestrator {
    pub fn new(graph: Arc<dyn SymbolGraph>, budget: ResponseBudget, limits: BackendLimits) -> Self {
        Self { graph, budget, limits, explore_cache: SnapshotCache::new() }
    }

    fn full_completeness() -> CompletenessInfo {
        CompletenessInfo {
            score: 1.0,
            reason: CompletenessReason::FullBackend,
            details: HashMap::new(),
        }
    }

    fn truncated_completeness(reason: &str) -> CompletenessInfo {
        let mut details = HashMap::new();
        details.insert("truncated_set".to_string(), reason.to_string());
        CompletenessInfo { score: 0.75, reason: CompletenessReason::Truncated, details }
    }

    /// `getSymbol`.
    pub async fn get_symbol(&self, ctx: &RequestContext, id: &str) -> Result<SymbolResponse> {
        let symbol = ctx.run(async { self.graph.get_symbol(id).await.map_err(CkbError::from) }).await?;
        Ok(QueryResponse::new(symbol, Self::full_completeness()))
    }

    /// `findReferences`. `current_repo_state_id`/`last_ingested_repo_state_id`
    /// feed `check_index_freshness` so a stale-against-head drilldown can
    /// actually fire (§4.11) — the caller (the transport host, which owns
    /// the working tree and the last-applied delta's provenance) supplies
    /// both; neither is known to `ckb-storage`'s `SymbolGraph`.
    pub async fn find_references(
        &self,
        ctx: &RequestContext,
        current_repo_state_id: &str,
        last_ingested_repo_state_id: &str,
        symbol_id: &str,
    ) -> Result<ReferencesResponse> {
        let refs = ctx
            .run(async { self.graph.references_to(symbol_id).await.map_err(CkbError::from) })
            .await?;
        let refs = Deduplicator::dedupe(refs);
        let (refs, truncation) =
            Compressor::truncate(refs, self.limits.max_refs_per_query, TruncationReason::MaxRefs);

        let completeness = if truncation.is_some() {
            Self::truncated_completeness("references")
        } else {
            Self::full_completeness()
        };

        let drilldown_ctx = DrilldownContext {
            truncation_reason: truncation.map(|t| t.reason),
            completeness: completeness.clone(),
            index_freshness: check_index_freshness(current_repo_state_id, last_ingested_repo_state_id),
            symbol_id: Some(symbol_id),
            top_module: None,
            workspace_ready: true,
        };
        let drilldowns = DrilldownGenerator::generate(&drilldown_ctx, &self.budget);

        Ok(QueryResponse::new(refs, completeness).with_truncation(truncation).with_drilldowns(drilldowns))
    }

    /// `getCallGraph(symbolId, direction, depth)`.
    pub async fn get_call_graph(
        &self,
        ctx: &RequestContext,
        symbol_id: &str,
        direction: CallGraphDirection,
        _depth: u32,
    ) -> Result<CallGraphResponse> {
        ctx.check()?;
        let callers = if matches!(direction, CallGraphDirection::Callers | CallGraphDirection::Both) {
            self.graph.callers_of(symbol_id).await.map_err(CkbError::from)?
        } else {
            Vec::new()
        };
        let callees = if matches!(direction, CallGraphDirection::Callees | CallGraphDirection::Both) {
            self.callees_of(symbol_id).await?
        } else {
            Vec::new()
        };

        let result = CallGraphResult { symbol_id: symbol_id.to_string(), callers, callees };
        Ok(QueryResponse::new(result, Self::full_completeness()))
    }

    /// `ports::SymbolGraph` only exposes `callers_of` directly; callees are
    /// every edge whose `caller_id` is this symbol, found by scanning the
    /// call graph. Acceptable for the scale this backend targets; a
    /// dedicated index would replace this with an O(1) lookup.
    async fn callees_of(&self, symbol_id: &str) -> Result<Vec<CallEdge>> {
        let all = self.graph.list_call_edges().await.map_err(CkbError::from)?;
        Ok(all.into_iter().filter(|e| e.caller_id == symbol_id).collect())
    }

    /// `batchGet(ids)`.
    pub async fn batch_get(&self, ctx: &RequestContext, ids: &[String]) -> Result<BatchGetResponse> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            ctx.check()?;
            let symbol = self.graph.get_symbol(id).await.map_err(CkbError::from)?;
            results.push(symbol);
        }
        Ok(QueryResponse::new(results, Self::full_completeness()))
    }

    /// `batchSearch(queries)`: case-insensitive substring match over symbol
    /// names, capped at `max_symbols_per_search` per query.
    pub async fn batch_search(&self, ctx: &RequestContext, queries: &[String]) -> Result<BatchSearchResponse> {
        let all_symbols = ctx.run(async { self.graph.list_symbols().await.map_err(CkbError::from) }).await?;

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            ctx.check()?;
            let needle = query.to_lowercase();
            let matches: Vec<Symbol> = all_symbols
                .iter()
                .filter(|s| s.name.to_lowercase().contains(&needle))
                .take(self.limits.max_symbols_per_search)
                .cloned()
                .collect();
            results.push(SearchResult { query: query.clone(), matches });
        }

        Ok(QueryResponse::new(results, Self::full_completeness()))
    }

    /// Resolves direct references into `DirectRef`s ready for
    /// `ImpactAnalyzer::analyze`, approximating the enclosing symbol at each
    /// use-site by its containing file (storage exposes no "symbol at
    /// location" query; a real ingestion adapter, like `DiffMapper`'s
    /// `SymbolIndex`, would resolve this precisely).
    fn build_direct_refs(
        refs: &[Reference],
        resolver: &PathModuleResolver,
        files_by_id: &HashMap<String, FileRecord>,
    ) -> Vec<DirectRef> {
        refs.iter()
            .map(|r| {
                let module_id = resolver.module_of_file(&r.from_file_id);
                let is_test = files_by_id
                    .get(&r.from_file_id)
                    .map(|f| f.path.contains("test"))
                    .unwrap_or(false);
                DirectRef {
                    reference: r.clone(),
                    is_test,
                    referencing_symbol_id: r.from_file_id.clone(),
                    referencing_symbol_name: r.from_file_id.clone(),
                    module_id: module_id.clone(),
                    module_name: module_id,
                }
            })
            .collect()
    }

    fn module_refs_of(refs: &[Reference], resolver: &PathModuleResolver) -> Vec<DerivationRef> {
        refs.iter()
            .map(|r| DerivationRef { from_module: resolver.module_of_file(&r.from_file_id) })
            .collect()
    }

    /// Fetches everything `ImpactAnalyzer::analyze` needs for `symbol` and
    /// runs it, returning the raw references and resolver alongside so
    /// callers (like `prepare_change`) can derive further per-reference
    /// facts (e.g. breaking-change classification) without re-fetching.
    async fn analyze_impact(
        &self,
        ctx: &RequestContext,
        symbol: &Symbol,
        max_depth: i32,
    ) -> Result<(ckb_core::impact::ImpactResult, Vec<Reference>, PathModuleResolver)> {
        let (refs, files, symbols) = ctx
            .run(async {
                let refs = self.graph.references_to(&symbol.id).await.map_err(CkbError::from)?;
                let files = self.graph.list_files().await.map_err(CkbError::from)?;
                let symbols = self.graph.list_symbols().await.map_err(CkbError::from)?;
                Ok((refs, files, symbols))
            })
            .await?;

        let files_by_id: HashMap<String, FileRecord> = files.iter().map(|f| (f.id.clone(), f.clone())).collect();
        let resolver = PathModuleResolver::build(&files);
        let direct_refs = Self::build_direct_refs(&refs, &resolver, &files_by_id);
        let module_refs = Self::module_refs_of(&refs, &resolver);

        let symbols_by_id: HashMap<String, Symbol> = symbols.into_iter().map(|s| (s.id.clone(), s)).collect();
        let caller_resolver = PathModuleResolver::build(&files);
        let provider = ctx
            .run(GraphCallerProvider::build(
                self.graph.as_ref(),
                &symbol.id,
                ckb_core::impact::MAX_DEPTH,
                caller_resolver,
                symbols_by_id,
            ))
            .await?;

        let impact =
            ImpactAnalyzer::analyze(symbol, &direct_refs, &module_refs, &resolver, Some(&provider), max_depth);
        Ok((impact, refs, resolver))
    }

    /// `explore(target, depth, focus)`. `focus` narrows which of
    /// references/call-graph accompany the symbol; `structure` omits both.
    ///
    /// `repo_state_id` is the caller's current `RepoState::repo_state_id`
    /// (§3's universal cache key, computed by `ckb_core::repo_state` from
    /// the live working tree — this crate never touches the filesystem
    /// itself) and is folded into the cache key alongside the query shape,
    /// so an edited-but-not-yet-reingested working tree never gets served a
    /// result cached under its prior state. `last_ingested_repo_state_id` is
    /// the repo state the backing `SymbolGraph` was last ingested against;
    /// the two are compared via `check_index_freshness` to populate the
    /// `explore` drilldown's stale-against-head signal (§4.11).
    pub async fn explore(
        &self,
        ctx: &RequestContext,
        repo_state_id: &str,
        last_ingested_repo_state_id: &str,
        target: &str,
        depth: ExploreDepth,
        focus: ExploreFocus,
    ) -> Result<ExploreResponse> {
        let cache_key = format!("{repo_state_id}:explore:{target}:{depth:?}:{focus:?}");
        let current_snapshot = self.graph.current_snapshot_id().await.map_err(CkbError::from)?;
        if let Some(cached) = self.explore_cache.get(&cache_key, &current_snapshot) {
            return Ok(QueryResponse::new(cached, Self::full_completeness()));
        }

        let symbol = self
            .graph
            .get_symbol(target)
            .await
            .map_err(CkbError::from)?
            .ok_or_else(|| CkbError::symbol_not_found(target))?;

        let references = if matches!(focus, ExploreFocus::Dependencies | ExploreFocus::Changes) {
            ctx.run(async { self.graph.references_to(&symbol.id).await.map_err(CkbError::from) }).await?
        } else {
            Vec::new()
        };

        let call_graph = if matches!(focus, ExploreFocus::Dependencies) {
            let callers = ctx.run(async { self.graph.callers_of(&symbol.id).await.map_err(CkbError::from) }).await?;
            let callees = self.callees_of(&symbol.id).await?;
            Some(CallGraphResult { symbol_id: symbol.id.clone(), callers, callees })
        } else {
            None
        };

        let (references, truncation) = Compressor::truncate(
            Deduplicator::dedupe(references),
            self.limits.max_refs_per_query,
            TruncationReason::MaxRefs,
        );

        let result = ExploreResult { symbol, references, call_graph };
        let completeness = if truncation.is_some() {
            Self::truncated_completeness("explore")
        } else {
            Self::full_completeness()
        };

        let drilldown_ctx = DrilldownContext {
            truncation_reason: truncation.map(|t| t.reason),
            completeness: completeness.clone(),
            index_freshness: check_index_freshness(repo_state_id, last_ingested_repo_state_id),
            symbol_id: Some(target),
            top_module: None,
            workspace_ready: true,
        };
        let drilldowns = DrilldownGenerator::generate(&drilldown_ctx, &self.budget);

        self.explore_cache.insert(cache_key, current_snapshot, result.clone());

        Ok(QueryResponse::new(result, completeness).with_truncation(truncation).with_drilldowns(drilldowns))
    }

    /// `understand(query, includeReferences, includeCallGraph, maxReferences)`.
    pub async fn understand(
        &self,
        ctx: &RequestContext,
        query: &str,
        include_references: bool,
        include_call_graph: bool,
        max_references: usize,
    ) -> Result<UnderstandResponse> {
        let all_symbols = ctx.run(async { self.graph.list_symbols().await.map_err(CkbError::from) }).await?;
        let needle = query.to_lowercase();
        let matches: Vec<Symbol> = all_symbols
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&needle))
            .take(self.budget.max_symbols_per_module)
            .cloned()
            .collect();

        let mut references = Vec::new();
        let mut call_graph = None;
        if let Some(primary) = matches.first() {
            if include_references {
                let found =
                    ctx.run(async { self.graph.references_to(&primary.id).await.map_err(CkbError::from) }).await?;
                references = Deduplicator::dedupe(found);
                references.truncate(max_references.max(1));
            }
            if include_call_graph {
                let callers =
                    ctx.run(async { self.graph.callers_of(&primary.id).await.map_err(CkbError::from) }).await?;
                let callees = self.callees_of(&primary.id).await?;
                call_graph = Some(CallGraphResult { symbol_id: primary.id.clone(), callers, callees });
            }
        }

        let completeness = if matches.is_empty() {
            CompletenessInfo { score: 0.0, reason: CompletenessReason::NoBackendAvailable, details: HashMap::new() }
        } else {
            Self::full_completeness()
        };

        let result = UnderstandResult { matches, references, call_graph };
        Ok(QueryResponse::new(result, completeness))
    }

    /// `prepareChange(target, changeType)`. See [`Self::find_references`] for
    /// what `current_repo_state_id`/`last_ingested_repo_state_id` feed.
    pub async fn prepare_change(
        &self,
        ctx: &RequestContext,
        current_repo_state_id: &str,
        last_ingested_repo_state_id: &str,
        target: &str,
        change_kind: PrepareChangeKind,
    ) -> Result<PrepareChangeResponse> {
        let symbol = self
            .graph
            .get_symbol(target)
            .await
            .map_err(CkbError::from)?
            .ok_or_else(|| CkbError::symbol_not_found(target))?;

        let change_type: ChangeType = change_kind.into();
        let (mut impact, refs, resolver) =
            self.analyze_impact(ctx, &symbol, ckb_core::impact::MAX_DEPTH as i32).await?;

        let symbol_module = resolver.module_of_file(&symbol.file_id);
        let breaking_ref_count = refs
            .iter()
            .filter(|r| {
                let cross_module = resolver.module_of_file(&r.from_file_id) != symbol_module;
                is_breaking_change(r.kind, cross_module, change_type)
            })
            .count();

        // §4.10 names ImpactItem as one of the dedup-key'd entity types and
        // `maxImpactItems` as a budget the Compressor enforces, the same way
        // `find_references`/`explore` bound their reference lists.
        let (items, items_truncation) = Compressor::truncate(
            Deduplicator::dedupe(impact.items),
            self.budget.max_impact_items,
            TruncationReason::MaxItems,
        );
        impact.items = items;

        let (truncation_reason, top_module) = if impact.module_summaries.len() > self.budget.max_modules {
            let top = impact.module_summaries.first();
            (
                Some(TruncationReason::MaxModules),
                top.map(|m| (m.module_id.clone(), m.module_name.clone())),
            )
        } else if items_truncation.is_some() {
            (Some(TruncationReason::MaxItems), None)
        } else {
            (None, None)
        };

        let completeness = if truncation_reason.is_some() {
            Self::truncated_completeness("impact-items")
        } else {
            Self::full_completeness()
        };
        let drilldown_ctx = DrilldownContext {
            truncation_reason,
            completeness: completeness.clone(),
            index_freshness: check_index_freshness(current_repo_state_id, last_ingested_repo_state_id),
            symbol_id: Some(target),
            top_module: top_module.as_ref().map(|(id, name)| TopModule { id, name }),
            workspace_ready: true,
        };
        let drilldowns = DrilldownGenerator::generate(&drilldown_ctx, &self.budget);

        let result = PrepareChangeResult { target: symbol, change_kind, impact, breaking_ref_count };
        Ok(QueryResponse::new(result, completeness).with_truncation(items_truncation).with_drilldowns(drilldowns))
    }

    /// Merges completeness signals from more than one backend for a single
    /// logical query (§3): a confident source wins outright, else the mean.
    /// Exposed for callers that fan a query out across multiple indexers.
    pub fn merge_completeness(sources: &[CompletenessInfo]) -> CompletenessInfo {
        CompletenessMerger::merge(sources)
    }
}

/// Pure utility for comparing a workspace's current repo-state fingerprint
/// against the last one the symbol graph ingested, used to populate
/// `IndexFreshness` ahead of a query (kept standalone since the comparison
/// crosses the `ckb_core::repo_state`/`SymbolGraph` boundary, neither of
/// which knows about the other).
pub fn check_index_freshness(current_repo_state_id: &str, last_ingested_repo_state_id: &str) -> IndexFreshness {
    IndexFreshness { stale_against_head: current_repo_state_id != last_ingested_repo_state_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ckb_storage::{AddDelete, AddModDelete, Delta, DeltaSections, DeltaStats, SqliteSymbolGraph, SymbolKind};

    async fn seeded_graph() -> Arc<dyn SymbolGraph> {
        let graph = SqliteSymbolGraph::open_in_memory().expect("open in-memory graph");

        let file = FileRecord { id: "f1".into(), path: "src/lib.rs".into(), language: "rust".into(), declared_hash: None };
        let callee = Symbol {
            id: "s1".into(),
            name: "do_work".into(),
            kind: SymbolKind::Function,
            file_id: "f1".into(),
            line: 10,
            column: 0,
            language: "rust".into(),
            signature: None,
            documentation: None,
            modifiers: vec!["pub".into()],
            declared_hash: None,
        };
        let caller = Symbol {
            id: "s2".into(),
            name: "main".into(),
            kind: SymbolKind::Function,
            file_id: "f1".into(),
            line: 1,
            column: 0,
            language: "rust".into(),
            signature: None,
            documentation: None,
            modifiers: vec![],
            declared_hash: None,
        };
        let reference = Reference {
            from_file_id: "f1".into(),
            line: 2,
            column: 4,
            to_symbol_id: "s1".into(),
            kind: ckb_storage::ReferenceKind::Call,
            language: "rust".into(),
        };
        let call_edge = CallEdge {
            caller_file_id: "f1".into(),
            call_line: 2,
            call_column: 4,
            caller_id: "s2".into(),
            callee_id: "s1".into(),
            language: "rust".into(),
        };

        let delta = Delta {
            schema_version: 1,
            base_snapshot_id: ckb_core::hashing::SHA256_EMPTY.to_string(),
            new_snapshot_id: "sha256:seed".to_string(),
            commit: "c1".to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            deltas: DeltaSections {
                symbols: AddModDelete { added: vec![callee, caller], modified: vec![], deleted: vec![] },
                refs: AddDelete { added: vec![reference], deleted: vec![] },
                call_graph: AddDelete { added: vec![call_edge], deleted: vec![] },
                files: AddModDelete { added: vec![file], modified: vec![], deleted: vec![] },
            },
            stats: DeltaStats {
                total_added: 4,
                symbols_added: 2,
                refs_added: 1,
                call_edges_added: 1,
                files_added: 1,
                ..Default::default()
            },
        };

        graph.apply_delta(&delta).await.expect("seed delta applies");
        Arc::new(graph)
    }

    /// A callee `s1` with `caller_count` distinct single-reference callers,
    /// for exercising budget truncation over `ImpactResult::items`.
    async fn graph_with_many_callers(caller_count: u32) -> Arc<dyn SymbolGraph> {
        let graph = SqliteSymbolGraph::open_in_memory().expect("open in-memory graph");

        let file = FileRecord { id: "f1".into(), path: "src/lib.rs".into(), language: "rust".into(), declared_hash: None };
        let callee = Symbol {
            id: "s1".into(),
            name: "do_work".into(),
            kind: SymbolKind::Function,
            file_id: "f1".into(),
            line: 10,
            column: 0,
            language: "rust".into(),
            signature: None,
            documentation: None,
            modifiers: vec!["pub".into()],
            declared_hash: None,
        };

        let refs: Vec<Reference> = (0..caller_count)
            .map(|i| Reference {
                from_file_id: "f1".into(),
                line: 100 + i,
                column: 0,
                to_symbol_id: "s1".into(),
                kind: ckb_storage::ReferenceKind::Call,
                language: "rust".into(),
            })
            .collect();

        let delta = Delta {
            schema_version: 1,
            base_snapshot_id: ckb_core::hashing::SHA256_EMPTY.to_string(),
            new_snapshot_id: "sha256:seed-many".to_string(),
            commit: "c1".to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            deltas: DeltaSections {
                symbols: AddModDelete { added: vec![callee], modified: vec![], deleted: vec![] },
                refs: AddDelete { added: refs, deleted: vec![] },
                call_graph: AddDelete { added: vec![], deleted: vec![] },
                files: AddModDelete { added: vec![file], modified: vec![], deleted: vec![] },
            },
            stats: DeltaStats {
                total_added: 2 + caller_count as u64,
                symbols_added: 1,
                refs_added: caller_count as u64,
                files_added: 1,
                ..Default::default()
            },
        };

        graph.apply_delta(&delta).await.expect("seed delta applies");
        Arc::new(graph)
    }

    #[tokio::test]
    async fn get_symbol_returns_seeded_symbol() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let response = orchestrator.get_symbol(&ctx, "s1").await.unwrap();
        assert_eq!(response.data.unwrap().name, "do_work");
    }

    #[tokio::test]
    async fn find_references_dedupes_and_reports_no_truncation_under_budget() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let response = orchestrator.find_references(&ctx, "sha256:repo1", "sha256:repo1", "s1").await.unwrap();
        assert_eq!(response.data.len(), 1);
        assert!(response.truncation.is_none());
    }

    #[tokio::test]
    async fn find_references_flags_stale_index_drilldown_when_repo_state_diverges() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let response = orchestrator
            .find_references(&ctx, "sha256:current", "sha256:stale", "s1")
            .await
            .unwrap();
        assert!(response.drilldowns.iter().any(|d| d.query == "doctor --check=index"));
    }

    #[tokio::test]
    async fn get_call_graph_reports_callers_and_callees() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let response = orchestrator
            .get_call_graph(&ctx, "s1", CallGraphDirection::Callers, 1)
            .await
            .unwrap();
        assert_eq!(response.data.callers.len(), 1);
        assert_eq!(response.data.callers[0].caller_id, "s2");
    }

    #[tokio::test]
    async fn batch_get_preserves_order_and_misses() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let ids = vec!["s1".to_string(), "missing".to_string()];
        let response = orchestrator.batch_get(&ctx, &ids).await.unwrap();
        assert!(response.data[0].is_some());
        assert!(response.data[1].is_none());
    }

    #[tokio::test]
    async fn batch_search_matches_substrings_case_insensitively() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let queries = vec!["WORK".to_string()];
        let response = orchestrator.batch_search(&ctx, &queries).await.unwrap();
        assert_eq!(response.data[0].matches.len(), 1);
        assert_eq!(response.data[0].matches[0].id, "s1");
    }

    #[tokio::test]
    async fn explore_with_dependencies_focus_includes_call_graph() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let response = orchestrator
            .explore(&ctx, "sha256:repo1", "sha256:repo1", "s1", ExploreDepth::Standard, ExploreFocus::Dependencies)
            .await
            .unwrap();
        assert!(response.data.call_graph.is_some());
        assert_eq!(response.data.call_graph.unwrap().callers.len(), 1);
    }

    #[tokio::test]
    async fn explore_is_served_from_cache_on_repeat_call() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let first = orchestrator
            .explore(&ctx, "sha256:repo1", "sha256:repo1", "s1", ExploreDepth::Shallow, ExploreFocus::Structure)
            .await
            .unwrap();
        let second = orchestrator
            .explore(&ctx, "sha256:repo1", "sha256:repo1", "s1", ExploreDepth::Shallow, ExploreFocus::Structure)
            .await
            .unwrap();
        assert_eq!(first.data.symbol.id, second.data.symbol.id);
    }

    #[tokio::test]
    async fn explore_misses_cache_when_repo_state_id_changes() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        orchestrator
            .explore(&ctx, "sha256:repo1", "sha256:repo1", "s1", ExploreDepth::Shallow, ExploreFocus::Structure)
            .await
            .unwrap();
        assert_eq!(orchestrator.explore_cache.len(), 1);
        orchestrator
            .explore(&ctx, "sha256:repo2", "sha256:repo1", "s1", ExploreDepth::Shallow, ExploreFocus::Structure)
            .await
            .unwrap();
        // A distinct repo_state_id is a distinct cache key, not a reuse of
        // the prior entry — the working tree may have changed even though
        // the backing symbol graph's ingested snapshot hasn't.
        assert_eq!(orchestrator.explore_cache.len(), 2);
    }

    #[tokio::test]
    async fn understand_returns_no_backend_available_when_nothing_matches() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let response = orchestrator.understand(&ctx, "nonexistent_xyz", true, true, 10).await.unwrap();
        assert!(response.data.matches.is_empty());
        assert_eq!(response.completeness.reason, CompletenessReason::NoBackendAvailable);
    }

    #[tokio::test]
    async fn prepare_change_rename_counts_every_reference_as_breaking() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        let response = orchestrator.prepare_change(&ctx, "sha256:repo1", "sha256:repo1", "s1", PrepareChangeKind::Rename).await.unwrap();
        assert_eq!(response.data.target.id, "s1");
        assert_eq!(response.data.breaking_ref_count, 1);
    }

    #[tokio::test]
    async fn prepare_change_truncates_impact_items_to_the_configured_budget() {
        let graph = graph_with_many_callers(10).await;
        let budget = ResponseBudget { max_impact_items: 3, ..ResponseBudget::default() };
        let orchestrator = QueryOrchestrator::new(graph, budget, BackendLimits::default());
        let ctx = RequestContext::new_root();
        let response = orchestrator.prepare_change(&ctx, "sha256:repo1", "sha256:repo1", "s1", PrepareChangeKind::Modify).await.unwrap();

        assert_eq!(response.data.impact.items.len(), 3);
        let truncation = response.truncation.expect("impact items beyond budget must report truncation");
        assert_eq!(truncation.reason, TruncationReason::MaxItems);
        assert_eq!(truncation.original_count, 10);
        assert_eq!(truncation.returned_count, 3);
        assert_eq!(truncation.dropped_count, 7);
    }

    #[tokio::test]
    async fn get_symbol_fails_fast_on_cancelled_context() {
        let graph = seeded_graph().await;
        let orchestrator = QueryOrchestrator::new(graph, ResponseBudget::default(), BackendLimits::default());
        let ctx = RequestContext::new_root();
        ctx.cancel();
        let result = orchestrator.get_symbol(&ctx, "s1").await;
        assert!(result.is_err());
    }

    #[test]
    fn check_index_freshness_flags_mismatch() {
        let fresh = check_index_freshness("sha256:a", "sha256:a");
        assert!(!fresh.stale_against_head);
        let stale = check_index_freshness("sha256:a", "sha256:b");
        assert!(stale.stale_against_head);
    }
}
