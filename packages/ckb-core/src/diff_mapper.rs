//! Maps changed lines in a unified diff back onto the symbols they touch.

use ckb_storage::Symbol;

/// How a file changed in the diff, carried through to each symbol it maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeType {
    Added,
    Modified,
    Deleted,
}

/// One line in new-file line numbers touched by a diff hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedLine {
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffHunk {
    pub new_start: u32,
    pub changed_lines: Vec<ChangedLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffFileChange {
    pub path: String,
    pub change_type: FileChangeType,
    pub hunks: Vec<DiffHunk>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedDiff {
    pub files: Vec<DiffFileChange>,
}

/// A use-site of a symbol recorded at a specific line, distinct from its
/// definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub symbol_id: String,
    pub name: String,
    pub is_definition: bool,
}

/// Port onto the current symbol index, queried by `DiffMapper`.
pub trait SymbolIndex {
    fn is_file_indexed(&self, path: &str) -> bool;

    /// Every symbol defined in the given file.
    fn symbol_defs_in_file(&self, path: &str) -> Vec<&Symbol>;

    /// The line range `[startLine, endLine]` (inclusive) a symbol's
    /// definition spans.
    fn symbol_def_range(&self, symbol: &Symbol) -> std::ops::RangeInclusive<u32>;

    /// Occurrences (definition or reference) recorded at `line` in `path`,
    /// independent of whether a symbol definition also covers that line.
    fn occurrences_at(&self, path: &str, line: u32) -> Vec<Occurrence>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedSymbolChange {
    pub symbol_id: String,
    pub name: String,
    pub file: String,
    pub change_type: FileChangeType,
    pub lines: Vec<u32>,
    pub confidence: f64,
    pub hunk_index: usize,
}

pub struct DiffMapper;

impl DiffMapper {
    /// Map every changed line in `diff` to the symbol(s) it falls within
    /// (§4.5), deduping by symbol id — lines unioned and sorted, confidence
    /// the maximum observed, `changeType` the file's — and returning results
    /// ordered by confidence descending, then name ascending.
    pub fn map(diff: &UnifiedDiff, index: &impl SymbolIndex) -> Vec<MappedSymbolChange> {
        let mut by_id: std::collections::HashMap<String, MappedSymbolChange> =
            std::collections::HashMap::new();

        for file in &diff.files {
            if !index.is_file_indexed(&file.path) {
                let change = MappedSymbolChange {
                    symbol_id: format!("file:{}", file.path),
                    name: file.path.clone(),
                    file: file.path.clone(),
                    change_type: file.change_type,
                    lines: vec![],
                    confidence: 0.3,
                    hunk_index: 0,
                };
                merge_in(&mut by_id, change);
                continue;
            }

            let defs = index.symbol_defs_in_file(&file.path);
            for (hunk_idx, hunk) in file.hunks.iter().enumerate() {
                for changed in &hunk.changed_lines {
                    map_changed_line(&defs, index, changed.line, file, hunk_idx, &mut by_id);
                }
            }
        }

        let mut out: Vec<MappedSymbolChange> = by_id.into_values().collect();
        out.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        out
    }
}

fn map_changed_line(
    defs: &[&Symbol],
    index: &impl SymbolIndex,
    line: u32,
    file: &DiffFileChange,
    hunk_idx: usize,
    by_id: &mut std::collections::HashMap<String, MappedSymbolChange>,
) {
    // Rule 1: the changed line falls within a known symbol definition's range.
    let def_matches: Vec<&&Symbol> =
        defs.iter().filter(|s| index.symbol_def_range(s).contains(&line)).collect();
    if !def_matches.is_empty() {
        for s in def_matches {
            let confidence = if s.line == line { 1.0 } else { 0.8 };
            merge_in(
                by_id,
                MappedSymbolChange {
                    symbol_id: s.id.clone(),
                    name: s.name.clone(),
                    file: file.path.clone(),
                    change_type: file.change_type,
                    lines: vec![line],
                    confidence,
                    hunk_index: hunk_idx,
                },
            );
        }
        return;
    }

    // Rule 2: an occurrence (definition or reference) covers this line.
    let occurrences = index.occurrences_at(&file.path, line);
    if !occurrences.is_empty() {
        for occ in occurrences {
            let confidence = if occ.is_definition { 1.0 } else { 0.7 };
            merge_in(
                by_id,
                MappedSymbolChange {
                    symbol_id: occ.symbol_id,
                    name: occ.name,
                    file: file.path.clone(),
                    change_type: file.change_type,
                    lines: vec![line],
                    confidence,
                    hunk_index: hunk_idx,
                },
            );
        }
        return;
    }

    // The file is indexed but no symbol claims this line (blank lines,
    // imports, comments between symbols): no mapping.
}

/// Merge a newly-mapped symbol change into the accumulator: lines unioned
/// and sorted, confidence the maximum observed, `hunkIndex` the lowest seen.
fn merge_in(by_id: &mut std::collections::HashMap<String, MappedSymbolChange>, change: MappedSymbolChange) {
    by_id
        .entry(change.symbol_id.clone())
        .and_modify(|existing| {
            for line in &change.lines {
                if !existing.lines.contains(line) {
                    existing.lines.push(*line);
                }
            }
            existing.lines.sort_unstable();
            if change.confidence > existing.confidence {
                existing.confidence = change.confidence;
            }
            existing.hunk_index = existing.hunk_index.min(change.hunk_index);
        })
        .or_insert(change);
}

/// Minimal unified-diff hunk-header parser, convenience for callers that
/// have raw diff text rather than a pre-parsed `UnifiedDiff`. Only parses
/// `@@ -old_start,old_lines +new_start,new_lines @@` headers and the `+`/`
/// ` lines that follow; does not attempt to validate the diff is well-formed.
pub fn parse_unified_diff(text: &str, path: &str, change_type: FileChangeType) -> UnifiedDiff {
    let mut hunks = Vec::new();
    let mut current: Option<(u32, u32)> = None;
    let mut changed_lines = Vec::new();

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("@@ ") {
            if let Some((start, lines)) = current.take() {
                hunks.push(DiffHunk {
                    new_start: start,
                    changed_lines: std::mem::take(&mut changed_lines),
                });
                let _ = lines;
            }
            if let Some(new_start) = parse_new_start(rest) {
                current = Some((new_start, 0));
            }
            continue;
        }

        if let Some((start, count)) = current {
            if line.starts_with('+') && !line.starts_with("+++") {
                changed_lines.push(ChangedLine { line: start + count });
                current = Some((start, count + 1));
            } else if !line.starts_with('-') {
                current = Some((start, count + 1));
            }
        }
    }

    if let Some((start, _)) = current {
        hunks.push(DiffHunk { new_start: start, changed_lines });
    }

    UnifiedDiff {
        files: vec![DiffFileChange { path: path.to_string(), change_type, hunks }],
    }
}

fn parse_new_start(header_rest: &str) -> Option<u32> {
    let plus_part = header_rest.split(' ').find(|s| s.starts_with('+'))?;
    let digits = plus_part.trim_start_matches('+').split(',').next()?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ckb_storage::SymbolKind;

    struct FakeIndex {
        indexed_files: Vec<String>,
        symbols: Vec<Symbol>,
        occurrences: Vec<(String, u32, Occurrence)>,
    }

    impl SymbolIndex for FakeIndex {
        fn is_file_indexed(&self, path: &str) -> bool {
            self.indexed_files.iter().any(|f| f == path)
        }
        fn symbol_defs_in_file(&self, path: &str) -> Vec<&Symbol> {
            self.symbols.iter().filter(|s| s.file_id == path).collect()
        }
        fn symbol_def_range(&self, symbol: &Symbol) -> std::ops::RangeInclusive<u32> {
            symbol.line..=symbol.line + 9
        }
        fn occurrences_at(&self, path: &str, line: u32) -> Vec<Occurrence> {
            self.occurrences
                .iter()
                .filter(|(p, l, _)| p == path && *l == line)
                .map(|(_, _, occ)| occ.clone())
                .collect()
        }
    }

    fn sym(id: &str, name: &str, file: &str, line: u32) -> Symbol {
        Symbol {
            id: id.into(),
            name: name.into(),
            kind: SymbolKind::Function,
            file_id: file.into(),
            line,
            column: 0,
            language: "rust".into(),
            signature: None,
            documentation: None,
            modifiers: vec![],
            declared_hash: None,
        }
    }

    fn file_change(path: &str, line: u32) -> UnifiedDiff {
        UnifiedDiff {
            files: vec![DiffFileChange {
                path: path.to_string(),
                change_type: FileChangeType::Modified,
                hunks: vec![DiffHunk { new_start: line, changed_lines: vec![ChangedLine { line }] }],
            }],
        }
    }

    #[test]
    fn exact_definition_line_gets_full_confidence() {
        let index = FakeIndex {
            indexed_files: vec!["a.rs".into()],
            symbols: vec![sym("s1", "foo", "a.rs", 10)],
            occurrences: vec![],
        };
        let diff = file_change("a.rs", 10);
        let mapped = DiffMapper::map(&diff, &index);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].confidence, 1.0);
        assert_eq!(mapped[0].symbol_id, "s1");
        assert_eq!(mapped[0].lines, vec![10]);
    }

    #[test]
    fn line_inside_definition_body_gets_08() {
        let index = FakeIndex {
            indexed_files: vec!["a.rs".into()],
            symbols: vec![sym("s1", "foo", "a.rs", 10)],
            occurrences: vec![],
        };
        let diff = file_change("a.rs", 12);
        let mapped = DiffMapper::map(&diff, &index);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].confidence, 0.8);
    }

    #[test]
    fn occurrence_definition_gets_full_confidence() {
        let index = FakeIndex {
            indexed_files: vec!["a.rs".into()],
            symbols: vec![],
            occurrences: vec![(
                "a.rs".into(),
                5,
                Occurrence { symbol_id: "s2".into(), name: "bar".into(), is_definition: true },
            )],
        };
        let diff = file_change("a.rs", 5);
        let mapped = DiffMapper::map(&diff, &index);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].confidence, 1.0);
    }

    #[test]
    fn occurrence_reference_gets_07() {
        let index = FakeIndex {
            indexed_files: vec!["a.rs".into()],
            symbols: vec![],
            occurrences: vec![(
                "a.rs".into(),
                5,
                Occurrence { symbol_id: "s2".into(), name: "bar".into(), is_definition: false },
            )],
        };
        let diff = file_change("a.rs", 5);
        let mapped = DiffMapper::map(&diff, &index);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].confidence, 0.7);
    }

    #[test]
    fn unindexed_file_falls_back_to_low_confidence_stand_in() {
        let index = FakeIndex { indexed_files: vec![], symbols: vec![], occurrences: vec![] };
        let diff = UnifiedDiff {
            files: vec![DiffFileChange {
                path: "unindexed.py".into(),
                change_type: FileChangeType::Added,
                hunks: vec![],
            }],
        };
        let mapped = DiffMapper::map(&diff, &index);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].confidence, 0.3);
        assert_eq!(mapped[0].symbol_id, "file:unindexed.py");
    }

    #[test]
    fn results_ordered_by_confidence_then_name() {
        let index = FakeIndex {
            indexed_files: vec!["a.rs".into()],
            symbols: vec![sym("s1", "zeta", "a.rs", 10), sym("s2", "alpha", "a.rs", 20)],
            occurrences: vec![],
        };
        let diff = UnifiedDiff {
            files: vec![DiffFileChange {
                path: "a.rs".into(),
                change_type: FileChangeType::Modified,
                hunks: vec![DiffHunk {
                    new_start: 10,
                    changed_lines: vec![ChangedLine { line: 10 }, ChangedLine { line: 20 }],
                }],
            }],
        };
        let mapped = DiffMapper::map(&diff, &index);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].name, "alpha");
        assert_eq!(mapped[1].name, "zeta");
    }

    #[test]
    fn lines_are_unioned_and_sorted_across_hunks() {
        let index = FakeIndex {
            indexed_files: vec!["a.rs".into()],
            symbols: vec![sym("s1", "foo", "a.rs", 10)],
            occurrences: vec![],
        };
        let diff = UnifiedDiff {
            files: vec![DiffFileChange {
                path: "a.rs".into(),
                change_type: FileChangeType::Modified,
                hunks: vec![
                    DiffHunk { new_start: 14, changed_lines: vec![ChangedLine { line: 14 }] },
                    DiffHunk { new_start: 11, changed_lines: vec![ChangedLine { line: 11 }] },
                ],
            }],
        };
        let mapped = DiffMapper::map(&diff, &index);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].lines, vec![11, 14]);
    }

    #[test]
    fn parse_unified_diff_smoke_test() {
        let text = "@@ -1,3 +1,4 @@\n line one\n+line two\n line three\n";
        let parsed = parse_unified_diff(text, "a.rs", FileChangeType::Modified);
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].hunks.len(), 1);
        assert_eq!(parsed.files[0].hunks[0].changed_lines.len(), 1);
    }
}
