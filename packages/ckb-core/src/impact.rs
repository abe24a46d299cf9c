//! Visibility derivation, reference classification, weighted risk scoring,
//! and the impact analysis pipeline that ties them together over a symbol
//! graph's call/reference edges.

use std::collections::HashMap;

use ckb_storage::{Reference, ReferenceKind, Symbol, SymbolKind};

// ═══════════════════════════════════════════════════════════════════════
// Visibility (§4.6)
// ═══════════════════════════════════════════════════════════════════════

/// Closed set of visibility levels a symbol can be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Visibility {
    Unknown,
    Private,
    Internal,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityResult {
    pub visibility: Visibility,
    pub confidence: f64,
    pub source: &'static str,
}

/// Resolves which module a file belongs to. Modules are not a field on
/// `FileRecord`/`Symbol` in the persisted schema (§3) — they're derived from
/// path structure by whatever ingestion adapter owns that convention per
/// language/toolchain, hence this seam rather than a bare `moduleId` field.
pub trait ModuleResolver {
    fn module_of_file(&self, file_id: &str) -> String;
}

/// A use-site of the symbol being derived, reduced to what the cascade
/// needs: which module it came from.
pub struct DerivationRef {
    pub from_module: String,
}

pub struct VisibilityDeriver;

impl VisibilityDeriver {
    /// Strict first-match cascade over 6 strategies (§4.6); falls through to
    /// `unknown` with confidence 0 if nothing matches.
    pub fn derive(
        symbol: &Symbol,
        refs: &[DerivationRef],
        resolver: &impl ModuleResolver,
    ) -> VisibilityResult {
        // 1. Explicit modifier.
        if let Some(v) = visibility_from_modifier(symbol) {
            return VisibilityResult {
                visibility: v,
                confidence: 0.95,
                source: "static-modifier",
            };
        }

        // 2 & 3. Reference-based: cross-module usage implies public; only
        // same-module usage implies internal. Only applies when there is at
        // least one reference to weigh.
        if !refs.is_empty() {
            let symbol_module = resolver.module_of_file(&symbol.file_id);
            let any_cross_module = refs.iter().any(|r| r.from_module != symbol_module);
            if any_cross_module {
                return VisibilityResult {
                    visibility: Visibility::Public,
                    confidence: 0.90,
                    source: "ref-analysis",
                };
            }
            return VisibilityResult {
                visibility: Visibility::Internal,
                confidence: 0.70,
                source: "ref-analysis",
            };
        }

        // 4. `__name` (not ending in `__`, i.e. not dunder-style) is private.
        if symbol.name.starts_with("__") && !symbol.name.ends_with("__") {
            return VisibilityResult {
                visibility: Visibility::Private,
                confidence: 0.70,
                source: "naming",
            };
        }

        // 5. `_name` or `#name`.
        if symbol.name.starts_with('_') || symbol.name.starts_with('#') {
            return VisibilityResult {
                visibility: Visibility::Private,
                confidence: 0.60,
                source: "naming",
            };
        }

        // 6. Leading case, function/type/constant symbols only.
        if matches!(symbol.kind, SymbolKind::Function | SymbolKind::Type | SymbolKind::Constant) {
            if let Some(first) = symbol.name.chars().next() {
                if first.is_uppercase() {
                    return VisibilityResult {
                        visibility: Visibility::Public,
                        confidence: 0.50,
                        source: "naming",
                    };
                }
                if first.is_lowercase() {
                    return VisibilityResult {
                        visibility: Visibility::Internal,
                        confidence: 0.50,
                        source: "naming",
                    };
                }
            }
        }

        VisibilityResult {
            visibility: Visibility::Unknown,
            confidence: 0.0,
            source: "unknown",
        }
    }
}

fn visibility_from_modifier(symbol: &Symbol) -> Option<Visibility> {
    symbol.modifiers.iter().find_map(|m| match m.to_ascii_lowercase().as_str() {
        "public" => Some(Visibility::Public),
        "private" => Some(Visibility::Private),
        "internal" | "protected" | "package" => Some(Visibility::Internal),
        _ => None,
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Reference classification (§4.7)
// ═══════════════════════════════════════════════════════════════════════

/// Closed set of ways a reference can impact the symbol it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactKind {
    TestDependency,
    DirectCaller,
    ImplementsInterface,
    TypeDependency,
    Unknown,
}

pub struct ImpactClassifier;

impl ImpactClassifier {
    /// 8-rule, first-match cascade (§4.7). `is_test` marks a reference
    /// originating from test code, a signal the caller derives from file
    /// path/naming convention upstream of this classifier.
    pub fn classify(r: &Reference, target_kind: SymbolKind, is_test: bool) -> (ImpactKind, f64) {
        if is_test {
            return (ImpactKind::TestDependency, 0.90);
        }
        match r.kind {
            ReferenceKind::Call => (ImpactKind::DirectCaller, 0.95),
            ReferenceKind::Implements => (ImpactKind::ImplementsInterface, 0.95),
            ReferenceKind::Extends => (ImpactKind::DirectCaller, 0.95),
            ReferenceKind::Type => (ImpactKind::TypeDependency, 0.80),
            ReferenceKind::Read | ReferenceKind::Write => {
                if matches!(
                    target_kind,
                    SymbolKind::Property | SymbolKind::Variable | SymbolKind::Constant | SymbolKind::Field
                ) {
                    (ImpactKind::DirectCaller, 0.90)
                } else {
                    (ImpactKind::TypeDependency, 0.80)
                }
            }
        }
    }
}

/// The kind of modification being made to a symbol, for breaking-change
/// analysis. Closed set per §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    SignatureChanged,
    BehaviorChanged,
    VisibilityChanged,
    Renamed,
    Removed,
    Unknown,
}

/// Whether a reference of kind `ref_kind` is affected by a change of
/// `change_type` to the symbol it targets. `cross_module` only matters for
/// `VisibilityChanged`, which affects only refs originating outside the
/// target symbol's own module.
pub fn is_breaking_change(ref_kind: ReferenceKind, cross_module: bool, change_type: ChangeType) -> bool {
    match change_type {
        ChangeType::SignatureChanged => matches!(ref_kind, ReferenceKind::Call | ReferenceKind::Type),
        ChangeType::BehaviorChanged => {
            matches!(ref_kind, ReferenceKind::Call | ReferenceKind::Read | ReferenceKind::Write)
        }
        ChangeType::VisibilityChanged => cross_module,
        ChangeType::Renamed | ChangeType::Removed => true,
        ChangeType::Unknown => true,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Risk scoring (§4.8)
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskFactors {
    pub visibility: f64,
    pub direct_callers: f64,
    pub module_spread: f64,
    pub impact_kind: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskScore {
    pub score: f64,
    pub level: RiskLevel,
    pub factors: RiskFactors,
    pub explanation: String,
}

pub struct RiskScorer;

impl RiskScorer {
    const VISIBILITY_WEIGHT: f64 = 0.30;
    const CALLERS_WEIGHT: f64 = 0.35;
    const MODULE_SPREAD_WEIGHT: f64 = 0.25;
    const IMPACT_KIND_WEIGHT: f64 = 0.10;

    const HIGH_THRESHOLD: f64 = 0.7;
    const MEDIUM_THRESHOLD: f64 = 0.4;

    /// Weighted sum of four normalized factors (§4.8). `direct_caller_count`
    /// is the count of distance-1 direct callers; `distinct_module_count` is
    /// the number of distinct modules the impacts span.
    pub fn score(
        visibility: Visibility,
        direct_caller_count: usize,
        distinct_module_count: usize,
        impacts: &[ImpactItem],
    ) -> RiskScore {
        let visibility_factor = match visibility {
            Visibility::Public => 0.9,
            Visibility::Internal => 0.5,
            Visibility::Private => 0.2,
            Visibility::Unknown => 0.0,
        };

        let direct_callers_factor =
            (((direct_caller_count + 1) as f64).log10() / 21f64.log10()).clamp(0.0, 1.0);

        let module_spread_factor = match distinct_module_count {
            0 => 0.0,
            1 => 0.2,
            m => (((m as f64).log10()) / 10f64.log10()).clamp(0.0, 1.0),
        };

        let impact_kind_factor = if impacts.iter().any(|i| i.kind == ImpactKind::ImplementsInterface) {
            0.9
        } else if impacts.iter().any(|i| i.kind == ImpactKind::DirectCaller) {
            0.7
        } else {
            0.4
        };

        let factors = RiskFactors {
            visibility: visibility_factor,
            direct_callers: direct_callers_factor,
            module_spread: module_spread_factor,
            impact_kind: impact_kind_factor,
        };

        let score = Self::VISIBILITY_WEIGHT * visibility_factor
            + Self::CALLERS_WEIGHT * direct_callers_factor
            + Self::MODULE_SPREAD_WEIGHT * module_spread_factor
            + Self::IMPACT_KIND_WEIGHT * impact_kind_factor;

        let level = if score >= Self::HIGH_THRESHOLD {
            RiskLevel::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let explanation = format!(
            "score {:.2} from visibility={:.2}, direct-callers={:.2} ({} callers), module-spread={:.2} ({} modules), impact-kind={:.2}",
            score,
            visibility_factor,
            direct_callers_factor,
            direct_caller_count,
            module_spread_factor,
            distinct_module_count,
            impact_kind_factor,
        );

        RiskScore { score, level, factors, explanation }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlastRadius {
    pub module_count: usize,
    pub file_count: usize,
    pub unique_caller_count: usize,
    pub risk_level: RiskLevel,
}

// ═══════════════════════════════════════════════════════════════════════
// Impact analysis pipeline (§4.9)
// ═══════════════════════════════════════════════════════════════════════

/// A symbol's use-site resolved enough for impact analysis to classify it
/// and attribute it to a module/location. Produced upstream (by whatever
/// resolves a `Reference`'s enclosing symbol — not this crate's concern,
/// mirroring how `DiffMapper`'s `SymbolIndex` port is supplied externally).
#[derive(Debug, Clone)]
pub struct DirectRef {
    pub reference: Reference,
    pub is_test: bool,
    pub referencing_symbol_id: String,
    pub referencing_symbol_name: String,
    pub module_id: String,
    pub module_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub file_id: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImpactItem {
    pub target_id: String,
    pub name: String,
    pub kind: ImpactKind,
    pub confidence: f64,
    pub module_id: Option<String>,
    pub module_name: Option<String>,
    pub location: Option<Location>,
    pub visibility: Visibility,
    pub distance: u32,
}

/// Caller ids reachable transitively (depth >= 2) through the call graph,
/// keyed by minimum distance. Exact transitive closure of a potentially
/// large graph is out of scope here; the provider supplies it, already
/// capped at `MAX_DEPTH` and deduped to one entry per id (§9).
pub trait TransitiveCallerProvider {
    fn get_transitive_callers(&self, symbol_id: &str, max_depth: u32) -> HashMap<String, u32>;
    fn symbol_name(&self, symbol_id: &str) -> Option<String>;
    fn module_of(&self, symbol_id: &str) -> Option<(String, String)>;
}

pub const MAX_DEPTH: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSummary {
    pub module_id: String,
    pub module_name: String,
    pub count: usize,
    pub max_risk: RiskLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImpactResult {
    pub visibility: VisibilityResult,
    pub items: Vec<ImpactItem>,
    pub module_summaries: Vec<ModuleSummary>,
    pub blast_radius: BlastRadius,
    pub risk: RiskScore,
}

pub struct ImpactAnalyzer;

impl ImpactAnalyzer {
    /// Confidence for a transitive caller found at `depth >= 2`, decaying by
    /// 0.1 per additional hop past the first, floored at 0.5.
    pub fn transitive_confidence(depth: u32) -> f64 {
        (0.85 - 0.1 * (depth as f64 - 2.0)).max(0.5)
    }

    /// `max_depth` is coerced to the default (2) if `<= 0` and clamped to
    /// `MAX_DEPTH` if it exceeds it (§8 boundary behavior).
    pub fn analyze(
        symbol: &Symbol,
        direct_refs: &[DirectRef],
        module_refs: &[DerivationRef],
        resolver: &impl ModuleResolver,
        provider: Option<&impl TransitiveCallerProvider>,
        max_depth: i32,
    ) -> ImpactResult {
        let visibility = VisibilityDeriver::derive(symbol, module_refs, resolver);

        let effective_depth = if max_depth <= 0 { 2 } else { (max_depth as u32).min(MAX_DEPTH) };

        let mut items = Vec::new();
        for dr in direct_refs {
            let (kind, confidence) = ImpactClassifier::classify(&dr.reference, symbol.kind, dr.is_test);
            items.push(ImpactItem {
                target_id: dr.referencing_symbol_id.clone(),
                name: dr.referencing_symbol_name.clone(),
                kind,
                confidence,
                module_id: Some(dr.module_id.clone()),
                module_name: Some(dr.module_name.clone()),
                location: Some(Location {
                    file_id: dr.reference.from_file_id.clone(),
                    line: dr.reference.line,
                    column: dr.reference.column,
                }),
                visibility: visibility.visibility,
                distance: 1,
            });
        }

        if let Some(provider) = provider {
            if effective_depth > 1 {
                let transitive = provider.get_transitive_callers(&symbol.id, effective_depth);
                let seen: std::collections::HashSet<&String> =
                    items.iter().map(|i| &i.target_id).collect();
                for (caller_id, depth) in transitive {
                    if depth < 2 || seen.contains(&caller_id) {
                        continue;
                    }
                    let (module_id, module_name) = provider
                        .module_of(&caller_id)
                        .map(|(id, name)| (Some(id), Some(name)))
                        .unwrap_or((None, None));
                    items.push(ImpactItem {
                        target_id: caller_id.clone(),
                        name: provider.symbol_name(&caller_id).unwrap_or_else(|| caller_id.clone()),
                        kind: ImpactKind::DirectCaller,
                        confidence: Self::transitive_confidence(depth),
                        module_id,
                        module_name,
                        location: None,
                        visibility: visibility.visibility,
                        distance: depth,
                    });
                }
            }
        }

        let risk = Self::score_impacts(visibility.visibility, &items);
        let module_summaries = Self::aggregate_modules(&items);
        let blast_radius = Self::compute_blast_radius(&items, risk.level);

        ImpactResult { visibility, items, module_summaries, blast_radius, risk }
    }

    fn score_impacts(visibility: Visibility, items: &[ImpactItem]) -> RiskScore {
        let direct_caller_count = items.iter().filter(|i| i.distance == 1).count();
        let distinct_modules: std::collections::HashSet<&String> =
            items.iter().filter_map(|i| i.module_id.as_ref()).collect();
        RiskScorer::score(visibility, direct_caller_count, distinct_modules.len(), items)
    }

    /// Group by `moduleId`, counting items and taking the max per-item risk
    /// (§4.9's module-summary-only risk classification), sorted by count
    /// descending then name.
    fn aggregate_modules(items: &[ImpactItem]) -> Vec<ModuleSummary> {
        let mut by_module: HashMap<String, (String, usize, RiskLevel)> = HashMap::new();
        for item in items {
            let Some(module_id) = &item.module_id else { continue };
            let module_name = item.module_name.clone().unwrap_or_else(|| module_id.clone());
            let item_risk = Self::per_item_risk(item);
            let entry = by_module.entry(module_id.clone()).or_insert((module_name, 0, RiskLevel::Low));
            entry.1 += 1;
            entry.2 = entry.2.max(item_risk);
        }
        let mut summaries: Vec<ModuleSummary> = by_module
            .into_iter()
            .map(|(module_id, (module_name, count, max_risk))| ModuleSummary {
                module_id,
                module_name,
                count,
                max_risk,
            })
            .collect();
        summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.module_name.cmp(&b.module_name)));
        summaries
    }

    /// `public & (direct-caller | implements-interface)` → high;
    /// `direct-caller | transitive-caller (distance >= 2)` → medium; else low.
    fn per_item_risk(item: &ImpactItem) -> RiskLevel {
        let is_caller_like = matches!(item.kind, ImpactKind::DirectCaller | ImpactKind::ImplementsInterface);
        if item.visibility == Visibility::Public && is_caller_like {
            RiskLevel::High
        } else if item.kind == ImpactKind::DirectCaller || item.distance >= 2 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// `uniqueCallerCount` lumps direct and transitive callers together
    /// (Open Question in §9, resolved in DESIGN.md: not de-weighted).
    fn compute_blast_radius(items: &[ImpactItem], risk_level: RiskLevel) -> BlastRadius {
        let module_count = items.iter().filter_map(|i| i.module_id.as_ref()).collect::<std::collections::HashSet<_>>().len();
        let file_count = items
            .iter()
            .filter_map(|i| i.location.as_ref())
            .map(|l| &l.file_id)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let unique_caller_count =
            items.iter().map(|i| &i.target_id).collect::<std::collections::HashSet<_>>().len();
        BlastRadius { module_count, file_count, unique_caller_count, risk_level }
    }
}

/// Dedupe affected targets across many changed symbols by `targetId`,
/// retaining the highest confidence seen and merging `lines` (recorded here
/// as locations, since `ImpactItem` carries one location not a list — the
/// merge keeps the first-seen location and unions confidence/locations into
/// the caller-provided accumulator if richer tracking is needed upstream).
pub fn merge_change_set_impacts(per_symbol: Vec<Vec<ImpactItem>>) -> Vec<ImpactItem> {
    let mut by_target: HashMap<String, ImpactItem> = HashMap::new();
    for items in per_symbol {
        for item in items {
            by_target
                .entry(item.target_id.clone())
                .and_modify(|existing| {
                    if item.confidence > existing.confidence {
                        existing.confidence = item.confidence;
                    }
                    if existing.location.is_none() {
                        existing.location = item.location.clone();
                    }
                })
                .or_insert(item);
        }
    }
    let mut merged: Vec<ImpactItem> = by_target.into_values().collect();
    merged.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    merged
}
