//! Chunk packer: greedy, single-pass bin packing of clusters into
//! size-bounded chunks. Units are always placed whole.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use docweave_shared::{Chunk, DocweaveError, Result, SourceUnit};

use crate::cluster::Cluster;
use crate::corpus::Corpus;
use crate::resolver::ReferenceGraph;

/// Final assignment of units to chunks.
#[derive(Debug, Clone, Default)]
pub struct Packing {
    pub chunks: Vec<Chunk>,
    /// Unit id → index of the chunk that owns it.
    pub owner_of: BTreeMap<String, usize>,
}

impl Packing {
    /// Indices of chunks holding a single unit larger than the budget.
    pub fn oversized(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .filter(|c| c.oversized)
            .map(|c| c.index)
            .collect()
    }

    pub fn owner(&self, id: &str) -> Option<usize> {
        self.owner_of.get(id).copied()
    }
}

/// Order units within a cluster: copybooks first, then by descending
/// in-degree, then by id.
pub fn order_units(units: &mut [&SourceUnit], graph: &ReferenceGraph) {
    units.sort_by_cached_key(|u| (u.kind.pack_rank(), Reverse(graph.in_degree(&u.id)), u.id.clone()));
}

/// Pack clusters, in order, into chunks of at most `budget` bytes.
///
/// A unit already placed by an earlier cluster is skipped. A unit larger than
/// the budget gets a chunk of its own, flagged oversized.
#[instrument(skip_all, fields(clusters = clusters.len(), budget))]
pub fn pack(
    corpus: &Corpus,
    graph: &ReferenceGraph,
    clusters: &[Cluster],
    budget: usize,
) -> Result<Packing> {
    if budget == 0 {
        return Err(DocweaveError::validation("chunk budget must be greater than zero"));
    }

    let mut packer = Packer::new(budget);

    for cluster in clusters {
        let mut units: Vec<&SourceUnit> = cluster
            .members
            .iter()
            .filter(|id| !packer.owner_of.contains_key(*id))
            .filter_map(|id| corpus.get(id))
            .collect();
        if units.is_empty() {
            continue;
        }
        order_units(&mut units, graph);

        let cluster_size: usize = units.iter().map(|u| u.size()).sum();
        if cluster_size <= budget {
            if !packer.fits(cluster_size) {
                packer.close();
            }
            for unit in units {
                packer.place(unit);
            }
        } else {
            debug!(root = %cluster.root, size = cluster_size, "cluster exceeds budget, splitting");
            packer.close();
            for unit in units {
                if unit.size() > budget {
                    packer.place_oversized(unit);
                } else {
                    if !packer.fits(unit.size()) {
                        packer.close();
                    }
                    packer.place(unit);
                }
            }
        }
    }

    let packing = packer.finish();
    info!(
        chunks = packing.chunks.len(),
        oversized = packing.oversized().len(),
        "units packed"
    );
    Ok(packing)
}

struct Packer {
    budget: usize,
    chunks: Vec<Chunk>,
    open: Option<Chunk>,
    owner_of: BTreeMap<String, usize>,
}

impl Packer {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            chunks: Vec::new(),
            open: None,
            owner_of: BTreeMap::new(),
        }
    }

    fn next_index(&self) -> usize {
        self.chunks.len() + usize::from(self.open.is_some())
    }

    /// Whether `size` more bytes fit in the open chunk.
    fn fits(&self, size: usize) -> bool {
        self.open
            .as_ref()
            .is_some_and(|c| c.total_size + size <= self.budget)
    }

    fn close(&mut self) {
        if let Some(chunk) = self.open.take() {
            self.chunks.push(chunk);
        }
    }

    fn place(&mut self, unit: &SourceUnit) {
        if self.open.is_none() {
            self.open = Some(Chunk::new(self.next_index()));
        }
        if let Some(chunk) = self.open.as_mut() {
            chunk.units.push(unit.id.clone());
            chunk.total_size += unit.size();
            self.owner_of.insert(unit.id.clone(), chunk.index);
        }
    }

    fn place_oversized(&mut self, unit: &SourceUnit) {
        self.close();
        let mut chunk = Chunk::new(self.next_index());
        chunk.units.push(unit.id.clone());
        chunk.total_size = unit.size();
        chunk.oversized = true;
        warn!(
            unit = %unit.id,
            size = unit.size(),
            budget = self.budget,
            chunk = chunk.index,
            "unit exceeds budget, placed in its own chunk"
        );
        self.owner_of.insert(unit.id.clone(), chunk.index);
        self.chunks.push(chunk);
    }

    fn finish(mut self) -> Packing {
        self.close();
        Packing {
            chunks: self.chunks,
            owner_of: self.owner_of,
        }
    }
}
