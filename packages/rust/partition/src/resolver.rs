//! Reference resolver.
//!
//! Scans every unit for include-style and call-style symbolic names and
//! resolves them, case-insensitively, against the stems of known units of the
//! expected kind:
//! - include names resolve only against copybooks
//! - call names resolve only against programs
//!
//! Names with no matching unit produce no edge and are reported as unresolved.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info, instrument};

use docweave_shared::{ReferencePatterns, SourceUnit, UnitKind};

use crate::corpus::Corpus;

// ---------------------------------------------------------------------------
// Graph types
// ---------------------------------------------------------------------------

/// How one unit refers to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Includes,
    Calls,
}

/// A directed "`from` includes/calls `to`" relationship.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ReferenceEdge {
    pub from: String,
    pub to: String,
    pub kind: ReferenceKind,
}

/// Forward and reverse adjacency over unit ids.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    forward: BTreeMap<String, BTreeSet<ReferenceEdge>>,
    reverse: BTreeMap<String, BTreeSet<String>>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge. Returns `false` if the identical edge already existed.
    pub fn add_edge(&mut self, from: &str, to: &str, kind: ReferenceKind) -> bool {
        let edge = ReferenceEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        };
        let inserted = self.forward.entry(from.to_string()).or_default().insert(edge);
        self.reverse
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
        inserted
    }

    /// Outgoing edges of `id`.
    pub fn edges_from<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a ReferenceEdge> + 'a {
        self.forward.get(id).into_iter().flatten()
    }

    /// Distinct units `id` references, in id order.
    pub fn targets<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        let targets: BTreeSet<&'a str> = self.edges_from(id).map(|e| e.to.as_str()).collect();
        targets.into_iter()
    }

    /// Units that reference `id`, in id order.
    pub fn referrers<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.reverse.get(id).into_iter().flatten().map(String::as_str)
    }

    pub fn has_edge(&self, from: &str, to: &str, kind: ReferenceKind) -> bool {
        self.edges_from(from).any(|e| e.to == to && e.kind == kind)
    }

    /// Number of *other* units referencing `id`.
    pub fn in_degree(&self, id: &str) -> usize {
        self.referrers(id).filter(|r| *r != id).count()
    }

    pub fn edges(&self) -> impl Iterator<Item = &ReferenceEdge> {
        self.forward.values().flatten()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Name index
// ---------------------------------------------------------------------------

/// Read-only `normalized name → unit id` lookup, one table per unit kind.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    programs: HashMap<String, String>,
    copybooks: HashMap<String, String>,
}

impl NameIndex {
    /// Index every unit by its upper-cased stem. On a stem collision the
    /// lexicographically first id wins.
    pub fn build(corpus: &Corpus) -> Self {
        let mut index = Self::default();
        for unit in corpus.iter() {
            let table = match unit.kind {
                UnitKind::Program => &mut index.programs,
                UnitKind::Copybook => &mut index.copybooks,
            };
            let stem = unit.stem();
            if let Some(existing) = table.get(&stem) {
                debug!(name = %stem, kept = %existing, ignored = %unit.id, "duplicate unit stem");
                continue;
            }
            table.insert(stem, unit.id.clone());
        }
        index
    }

    pub fn resolve(&self, name: &str, kind: UnitKind) -> Option<&str> {
        let table = match kind {
            UnitKind::Program => &self.programs,
            UnitKind::Copybook => &self.copybooks,
        };
        table.get(&name.to_uppercase()).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Symbolic names found in one unit, before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitSymbols {
    /// Declared program name, if the unit declares one.
    pub program_id: Option<String>,
    /// Include names in first-appearance order, without duplicates.
    pub includes: Vec<String>,
    /// Call names in first-appearance order, without duplicates.
    pub calls: Vec<String>,
}

/// Output of [`build_graph`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub graph: ReferenceGraph,
    /// Names that matched no unit of the expected kind, keyed by upper-cased
    /// name; the value is the first raw spelling seen.
    pub unresolved: BTreeMap<String, String>,
    /// Per-unit symbol inventory, keyed by unit id.
    pub symbols: BTreeMap<String, UnitSymbols>,
}

impl Resolution {
    pub fn symbols_for(&self, id: &str) -> Option<&UnitSymbols> {
        self.symbols.get(id)
    }

    /// Unresolved names as first spelled, ordered case-insensitively.
    pub fn unresolved_names(&self) -> impl Iterator<Item = &str> {
        self.unresolved.values().map(String::as_str)
    }
}

/// Build the reference graph for a corpus. Pure function of its inputs.
#[instrument(skip_all, fields(units = corpus.len()))]
pub fn build_graph(corpus: &Corpus, patterns: &ReferencePatterns) -> Resolution {
    let index = NameIndex::build(corpus);
    let mut resolution = Resolution::default();

    for unit in corpus.iter() {
        let symbols = scan_unit(unit, patterns);

        for name in &symbols.includes {
            link(&mut resolution, &index, unit, name, UnitKind::Copybook);
        }
        for name in &symbols.calls {
            link(&mut resolution, &index, unit, name, UnitKind::Program);
        }

        resolution.symbols.insert(unit.id.clone(), symbols);
    }

    info!(
        edges = resolution.graph.edge_count(),
        unresolved = resolution.unresolved.len(),
        "reference graph built"
    );

    resolution
}

fn link(
    resolution: &mut Resolution,
    index: &NameIndex,
    unit: &SourceUnit,
    name: &str,
    expected: UnitKind,
) {
    let kind = match expected {
        UnitKind::Copybook => ReferenceKind::Includes,
        UnitKind::Program => ReferenceKind::Calls,
    };
    match index.resolve(name, expected) {
        Some(target) => {
            resolution.graph.add_edge(&unit.id, target, kind);
        }
        None => {
            debug!(from = %unit.id, name, kind = ?kind, "unresolved reference");
            resolution
                .unresolved
                .entry(name.to_uppercase())
                .or_insert_with(|| name.to_string());
        }
    }
}

/// Collect the symbolic names in one unit's content.
pub fn scan_unit(unit: &SourceUnit, patterns: &ReferencePatterns) -> UnitSymbols {
    let program_id = match unit.kind {
        UnitKind::Program => patterns
            .program_id
            .captures(&unit.content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        UnitKind::Copybook => None,
    };

    UnitSymbols {
        program_id,
        includes: collect_names(&patterns.include, &unit.content),
        calls: collect_names(&patterns.call, &unit.content),
    }
}

fn collect_names(pattern: &regex::Regex, content: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    pattern
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.to_uppercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(units: &[(&str, &str, UnitKind)]) -> Corpus {
        Corpus::from_units(
            units
                .iter()
                .map(|(id, content, kind)| SourceUnit::new(*id, *content, *kind)),
        )
    }

    #[test]
    fn resolves_calls_and_includes_by_stem() {
        let corpus = corpus(&[
            (
                "MAIN.cbl",
                "PROGRAM-ID. MAIN.\n COPY WS.\n CALL 'SUB' USING X.\n",
                UnitKind::Program,
            ),
            ("SUB.cbl", "PROGRAM-ID. SUB.\n", UnitKind::Program),
            ("WS.cpy", "01 WS-AREA PIC X.\n", UnitKind::Copybook),
        ]);
        let res = build_graph(&corpus, &ReferencePatterns::default());

        assert!(res.graph.has_edge("MAIN.cbl", "SUB.cbl", ReferenceKind::Calls));
        assert!(res.graph.has_edge("MAIN.cbl", "WS.cpy", ReferenceKind::Includes));
        assert_eq!(res.graph.edge_count(), 2);
        assert!(res.unresolved.is_empty());

        let referrers: Vec<_> = res.graph.referrers("SUB.cbl").collect();
        assert_eq!(referrers, vec!["MAIN.cbl"]);
        assert_eq!(res.graph.in_degree("SUB.cbl"), 1);
        assert_eq!(res.graph.in_degree("MAIN.cbl"), 0);
    }

    #[test]
    fn unresolved_call_creates_no_edge() {
        let corpus = corpus(&[(
            "MAIN.cbl",
            "PROGRAM-ID. MAIN.\n CALL 'EXTERNALSVC'.\n",
            UnitKind::Program,
        )]);
        let res = build_graph(&corpus, &ReferencePatterns::default());

        assert_eq!(res.graph.edge_count(), 0);
        assert!(res.unresolved.contains_key("EXTERNALSVC"));
        // The raw name is still part of the unit's inventory.
        let symbols = res.symbols_for("MAIN.cbl").expect("symbols");
        assert_eq!(symbols.calls, vec!["EXTERNALSVC".to_string()]);
    }

    #[test]
    fn names_resolve_only_against_expected_kind() {
        // COPY SUB must not resolve to the program SUB.cbl, and CALL WS must
        // not resolve to the copybook WS.cpy.
        let corpus = corpus(&[
            ("MAIN.cbl", "COPY SUB.\nCALL 'WS'.\n", UnitKind::Program),
            ("SUB.cbl", "", UnitKind::Program),
            ("WS.cpy", "", UnitKind::Copybook),
        ]);
        let res = build_graph(&corpus, &ReferencePatterns::default());

        assert_eq!(res.graph.edge_count(), 0);
        assert!(res.unresolved.contains_key("SUB"));
        assert!(res.unresolved.contains_key("WS"));
    }

    #[test]
    fn repeated_references_collapse_to_one_edge() {
        let corpus = corpus(&[
            (
                "A.cbl",
                "CALL 'B'.\ncall 'b'.\nCALL \"B\" USING Z.\n",
                UnitKind::Program,
            ),
            ("B.cbl", "", UnitKind::Program),
        ]);
        let res = build_graph(&corpus, &ReferencePatterns::default());
        assert_eq!(res.graph.edge_count(), 1);
        assert_eq!(res.symbols_for("A.cbl").map(|s| s.calls.len()), Some(1));
    }

    #[test]
    fn resolution_is_case_insensitive() {
        let corpus = corpus(&[
            ("src/main.cbl", "copy dateutil.\n", UnitKind::Program),
            ("copy/DateUtil.cpy", "", UnitKind::Copybook),
        ]);
        let res = build_graph(&corpus, &ReferencePatterns::default());
        assert!(res.graph.has_edge("src/main.cbl", "copy/DateUtil.cpy", ReferenceKind::Includes));
    }

    #[test]
    fn self_reference_is_not_counted_in_degree() {
        let corpus = corpus(&[("R.cbl", "CALL 'R'.\n", UnitKind::Program)]);
        let res = build_graph(&corpus, &ReferencePatterns::default());
        assert!(res.graph.has_edge("R.cbl", "R.cbl", ReferenceKind::Calls));
        assert_eq!(res.graph.in_degree("R.cbl"), 0);
    }

    #[test]
    fn unresolved_name_is_reported_once_as_first_spelled() {
        let corpus = corpus(&[
            ("A.cbl", "CALL 'extsvc'.\n", UnitKind::Program),
            ("B.cbl", "CALL 'EXTSVC'.\nCALL 'ExtSvc'.\n", UnitKind::Program),
        ]);
        let res = build_graph(&corpus, &ReferencePatterns::default());
        let names: Vec<_> = res.unresolved_names().collect();
        assert_eq!(names, vec!["extsvc"]);
        assert!(res.unresolved.contains_key("EXTSVC"));
    }

    #[test]
    fn hyphenated_data_names_are_not_references() {
        let corpus = corpus(&[
            (
                "MAIN.cbl",
                "PROGRAM-ID. MAIN.\n MOVE 1 TO WS-COPY OF REC.\n ADD 1 TO RETRY-CALL GIVING N.\n",
                UnitKind::Program,
            ),
            ("OF.cpy", "", UnitKind::Copybook),
            ("GIVING.cbl", "", UnitKind::Program),
        ]);
        let res = build_graph(&corpus, &ReferencePatterns::default());

        let symbols = res.symbols_for("MAIN.cbl").expect("symbols");
        assert!(symbols.includes.is_empty());
        assert!(symbols.calls.is_empty());
        assert_eq!(res.graph.edge_count(), 0);
        assert!(res.unresolved.is_empty());
    }

    #[test]
    fn references_at_line_start_still_match() {
        let corpus = corpus(&[
            ("MAIN.cbl", "COPY WS.\nCALL 'SUB'.\n", UnitKind::Program),
            ("SUB.cbl", "", UnitKind::Program),
            ("WS.cpy", "", UnitKind::Copybook),
        ]);
        let res = build_graph(&corpus, &ReferencePatterns::default());
        assert!(res.graph.has_edge("MAIN.cbl", "WS.cpy", ReferenceKind::Includes));
        assert!(res.graph.has_edge("MAIN.cbl", "SUB.cbl", ReferenceKind::Calls));
    }
}
