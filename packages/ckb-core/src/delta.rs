//! Delta generation and validation: turning two full entity snapshots into
//! an add/modify/delete delta, and checking an incoming delta is internally
//! consistent before it is applied.

use std::collections::HashMap;

use ckb_storage::{
    AddDelete, AddModDelete, CallEdge, Delta, DeltaSections, DeltaStats, FileRecord, Reference,
    Symbol,
};

use crate::errors::{CkbError, Result};
use crate::hashing::{self, compute_snapshot_id};

/// Everything `DeltaGenerator` needs from a freshly re-indexed repository.
/// Implemented by whatever ingests raw indexer output; kept as a trait so
/// the generator can be tested against in-memory fixtures.
pub trait EntitySource {
    fn symbols(&self) -> &[Symbol];
    fn references(&self) -> &[Reference];
    fn call_edges(&self) -> &[CallEdge];
    fn files(&self) -> &[FileRecord];
}

/// Plain in-memory `EntitySource`, for callers that already have the full
/// entity lists (e.g. an indexer adapter, or a test fixture).
#[derive(Debug, Clone, Default)]
pub struct EntitySnapshot {
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
    pub call_edges: Vec<CallEdge>,
    pub files: Vec<FileRecord>,
}

impl EntitySource for EntitySnapshot {
    fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
    fn references(&self) -> &[Reference] {
        &self.references
    }
    fn call_edges(&self) -> &[CallEdge] {
        &self.call_edges
    }
    fn files(&self) -> &[FileRecord] {
        &self.files
    }
}

pub const DELTA_SCHEMA_VERSION: u32 = 1;

/// Diffs a base entity set against a new one and produces a `Delta`.
pub struct DeltaGenerator;

impl DeltaGenerator {
    /// `base_snapshot_id` is the snapshot the `base` source was computed
    /// from (opaque to the generator; just threaded through to the output).
    pub fn generate(
        base_snapshot_id: impl Into<String>,
        base: &impl EntitySource,
        new: &impl EntitySource,
        commit: impl Into<String>,
        timestamp: i64,
    ) -> Delta {
        let symbols = diff_keyed_by_id(base.symbols(), new.symbols(), hashing::hash_symbol);
        let files = diff_keyed_by_id(base.files(), new.files(), hashing::hash_file);
        let refs = diff_positional(base.references(), new.references(), |r| r.composite_key());
        let call_graph =
            diff_positional(base.call_edges(), new.call_edges(), |e| e.composite_key());

        let stats = DeltaStats {
            total_added: (symbols.added.len() + refs.added.len() + call_graph.added.len() + files.added.len())
                as u64,
            total_modified: (symbols.modified.len() + files.modified.len()) as u64,
            total_deleted: (symbols.deleted.len()
                + refs.deleted.len()
                + call_graph.deleted.len()
                + files.deleted.len()) as u64,
            symbols_added: symbols.added.len() as u64,
            symbols_modified: symbols.modified.len() as u64,
            symbols_deleted: symbols.deleted.len() as u64,
            refs_added: refs.added.len() as u64,
            refs_deleted: refs.deleted.len() as u64,
            call_edges_added: call_graph.added.len() as u64,
            call_edges_deleted: call_graph.deleted.len() as u64,
            files_added: files.added.len() as u64,
            files_modified: files.modified.len() as u64,
            files_deleted: files.deleted.len() as u64,
        };

        let deltas = DeltaSections {
            symbols,
            refs,
            call_graph,
            files,
        };

        let new_snapshot_id =
            compute_snapshot_id(new.symbols(), new.references(), new.call_edges(), new.files());

        Delta {
            schema_version: DELTA_SCHEMA_VERSION,
            base_snapshot_id: base_snapshot_id.into(),
            new_snapshot_id,
            commit: commit.into(),
            timestamp,
            deltas,
            stats,
        }
    }
}

fn diff_keyed_by_id<T: Clone>(
    base: &[T],
    new: &[T],
    hash: impl Fn(&T) -> String,
) -> AddModDelete<T>
where
    T: HasId,
{
    let base_by_id: HashMap<&str, &T> = base.iter().map(|t| (t.id(), t)).collect();
    let new_by_id: HashMap<&str, &T> = new.iter().map(|t| (t.id(), t)).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for (id, item) in &new_by_id {
        match base_by_id.get(id) {
            None => added.push((*item).clone()),
            Some(old) => {
                if hash(old) != hash(item) {
                    modified.push((*item).clone());
                }
            }
        }
    }
    added.sort_by(|a, b| a.id().cmp(b.id()));
    modified.sort_by(|a, b| a.id().cmp(b.id()));

    let mut deleted: Vec<String> = base_by_id
        .keys()
        .filter(|id| !new_by_id.contains_key(*id))
        .map(|id| id.to_string())
        .collect();
    deleted.sort();

    AddModDelete {
        added,
        modified,
        deleted,
    }
}

fn diff_positional<T: Clone>(
    base: &[T],
    new: &[T],
    key: impl Fn(&T) -> String,
) -> AddDelete<T> {
    let base_keys: std::collections::HashSet<String> = base.iter().map(&key).collect();
    let new_keyed: HashMap<String, &T> = new.iter().map(|t| (key(t), t)).collect();

    let mut added: Vec<T> = new_keyed
        .iter()
        .filter(|(k, _)| !base_keys.contains(*k))
        .map(|(_, v)| (*v).clone())
        .collect();
    added.sort_by(|a, b| key(a).cmp(&key(b)));

    let new_keys: std::collections::HashSet<String> = new_keyed.keys().cloned().collect();
    let mut deleted: Vec<String> = base_keys.difference(&new_keys).cloned().collect();
    deleted.sort();

    AddDelete { added, deleted }
}

trait HasId {
    fn id(&self) -> &str;
}

impl HasId for Symbol {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for FileRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

/// How strictly `DeltaValidator` treats a spot-check hash mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Any failing check rejects the delta.
    Strict,
    /// Spot-check hash mismatches are logged but do not reject; every other
    /// check still rejects.
    Permissive,
}

/// Source of randomness for the Bernoulli spot-check sampler. Injectable so
/// tests can make sampling deterministic without pulling in a crate just for
/// indices a test wants to control directly.
pub trait RngSource {
    /// Returns a value in `[0.0, 1.0)`.
    fn next_f64(&mut self) -> f64;
}

/// Small deterministic xorshift generator. Not cryptographic: sampling for
/// spot-checks needs reproducibility across validator runs, not unguessability.
pub struct XorshiftRng {
    state: u64,
}

impl XorshiftRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x9E3779B97F4A7C15 } else { seed },
        }
    }
}

impl RngSource for XorshiftRng {
    fn next_f64(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}

pub struct DeltaValidator<'a, R: RngSource> {
    mode: ValidationMode,
    sample_rate: f64,
    rng: &'a mut R,
}

impl<'a, R: RngSource> DeltaValidator<'a, R> {
    pub fn new(mode: ValidationMode, sample_rate: f64, rng: &'a mut R) -> Self {
        Self {
            mode,
            sample_rate,
            rng,
        }
    }

    /// Validate `delta` against the graph's current snapshot id. Checks run
    /// in a fixed order so the first failure is always the most fundamental
    /// one: schema version, then snapshot chain, then stats, then required
    /// fields, then a randomized hash spot-check.
    pub fn validate(&mut self, delta: &Delta, current_snapshot_id: &str) -> Result<()> {
        if delta.schema_version < 1 || delta.schema_version > DELTA_SCHEMA_VERSION {
            return Err(CkbError::unsupported_version(
                delta.schema_version,
                DELTA_SCHEMA_VERSION,
            ));
        }

        if delta.base_snapshot_id != current_snapshot_id {
            return Err(CkbError::snapshot_mismatch(
                delta.base_snapshot_id.clone(),
                current_snapshot_id.to_string(),
            ));
        }

        self.check_stats(delta)?;
        self.check_required_fields(delta)?;
        self.spot_check_hashes(delta)?;

        Ok(())
    }

    fn check_stats(&self, delta: &Delta) -> Result<()> {
        let d = &delta.deltas;
        let recomputed_added =
            d.symbols.added.len() + d.refs.added.len() + d.call_graph.added.len() + d.files.added.len();
        let recomputed_modified = d.symbols.modified.len() + d.files.modified.len();
        let recomputed_deleted = d.symbols.deleted.len()
            + d.refs.deleted.len()
            + d.call_graph.deleted.len()
            + d.files.deleted.len();

        if delta.stats.total_added as usize != recomputed_added
            || delta.stats.total_modified as usize != recomputed_modified
            || delta.stats.total_deleted as usize != recomputed_deleted
        {
            return Err(CkbError::stats_mismatch("total_added/total_modified/total_deleted"));
        }
        Ok(())
    }

    fn check_required_fields(&self, delta: &Delta) -> Result<()> {
        if delta.new_snapshot_id.is_empty() {
            return Err(CkbError::missing_field("new_snapshot_id"));
        }
        if delta.commit.is_empty() {
            return Err(CkbError::missing_field("commit"));
        }
        if delta.timestamp <= 0 {
            return Err(CkbError::missing_field("timestamp"));
        }
        for s in delta.deltas.symbols.added.iter().chain(delta.deltas.symbols.modified.iter()) {
            if s.id.is_empty() {
                return Err(CkbError::missing_field("symbol.id"));
            }
        }
        Ok(())
    }

    /// Randomly sample a subset of added/modified symbols and files and
    /// check each one's sender-declared `declared_hash` (§4.4 rule 5)
    /// against a freshly recomputed canonical hash. An absent or empty
    /// `declared_hash` means the sender made no claim for that entity and
    /// the check passes vacuously, per spec.
    fn spot_check_hashes(&mut self, delta: &Delta) -> Result<()> {
        for s in delta.deltas.symbols.added.iter().chain(delta.deltas.symbols.modified.iter()) {
            if self.rng.next_f64() >= self.sample_rate {
                continue;
            }
            let Some(declared) = s.declared_hash.as_deref().filter(|h| !h.is_empty()) else {
                continue;
            };
            let recomputed = hashing::hash_symbol(s);
            if declared != recomputed {
                let err = CkbError::hash_mismatch(s.id.clone());
                match self.mode {
                    ValidationMode::Strict => return Err(err),
                    ValidationMode::Permissive => {
                        tracing::warn!(symbol_id = %s.id, "spot-check hash mismatch, continuing in permissive mode");
                    }
                }
            }
        }

        for f in delta.deltas.files.added.iter().chain(delta.deltas.files.modified.iter()) {
            if self.rng.next_f64() >= self.sample_rate {
                continue;
            }
            let Some(declared) = f.declared_hash.as_deref().filter(|h| !h.is_empty()) else {
                continue;
            };
            let recomputed = hashing::hash_file(f);
            if declared != recomputed {
                let err = CkbError::hash_mismatch(f.id.clone());
                match self.mode {
                    ValidationMode::Strict => return Err(err),
                    ValidationMode::Permissive => {
                        tracing::warn!(file_id = %f.id, "spot-check hash mismatch, continuing in permissive mode");
                    }
                }
            }
        }

        Ok(())
    }
}
