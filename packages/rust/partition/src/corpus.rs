//! In-memory corpus: every source unit of one partitioning run, keyed by id.

use std::collections::BTreeMap;

use docweave_shared::{SourceUnit, UnitKind};

/// The read-only set of units for one run. Iteration is in lexicographic id order.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    units: BTreeMap<String, SourceUnit>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a corpus from units. A later unit with the same id replaces an earlier one.
    pub fn from_units(units: impl IntoIterator<Item = SourceUnit>) -> Self {
        let mut corpus = Self::new();
        for unit in units {
            corpus.insert(unit);
        }
        corpus
    }

    pub fn insert(&mut self, unit: SourceUnit) {
        self.units.insert(unit.id.clone(), unit);
    }

    pub fn get(&self, id: &str) -> Option<&SourceUnit> {
        self.units.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceUnit> {
        self.units.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Units of one kind, in id order.
    pub fn of_kind(&self, kind: UnitKind) -> impl Iterator<Item = &SourceUnit> {
        self.units.values().filter(move |u| u.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.units.values().map(SourceUnit::size).sum()
    }
}
