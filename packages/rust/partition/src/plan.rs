//! Planning: resolver → clusters → packing → per-chunk context, in one call.

use serde::Serialize;
use tracing::{info, instrument};

use docweave_shared::{Chunk, ChunkContext, ReferencePatterns, Result, RunSettings};

use crate::cluster::{Cluster, DEFAULT_HOPS, build_clusters};
use crate::context::{ChunkPayload, annotate, render_payload};
use crate::corpus::Corpus;
use crate::packer::{Packing, pack};
use crate::resolver::{Resolution, build_graph};

/// Knobs for one planning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Maximum chunk size in bytes of unit content.
    pub budget: usize,
    /// Reference hops followed when growing a cluster.
    pub hops: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            budget: 40_000,
            hops: DEFAULT_HOPS,
        }
    }
}

impl From<&RunSettings> for PlanOptions {
    fn from(settings: &RunSettings) -> Self {
        Self {
            budget: settings.budget,
            hops: settings.cluster_hops,
        }
    }
}

/// The full partition of a corpus.
#[derive(Debug, Clone)]
pub struct Plan {
    pub options: PlanOptions,
    pub resolution: Resolution,
    pub clusters: Vec<Cluster>,
    pub packing: Packing,
    /// One context per chunk, indexed by chunk.
    pub contexts: Vec<ChunkContext>,
}

impl Plan {
    pub fn chunks(&self) -> &[Chunk] {
        &self.packing.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.packing.chunks.is_empty()
    }

    pub fn unresolved(&self) -> Vec<String> {
        self.resolution.unresolved_names().map(str::to_string).collect()
    }

    /// Render every chunk's analyzer payload, in chunk order.
    pub fn payloads(&self, corpus: &Corpus) -> Vec<ChunkPayload> {
        let count = self.packing.chunks.len();
        self.packing
            .chunks
            .iter()
            .zip(&self.contexts)
            .map(|(chunk, context)| {
                render_payload(chunk, context.clone(), corpus, count, &self.packing.owner_of)
            })
            .collect()
    }

    /// Serializable summary, written as `plan.json`.
    pub fn report(&self) -> PlanReport {
        PlanReport {
            budget: self.options.budget,
            hops: self.options.hops,
            unit_count: self.packing.owner_of.len(),
            edge_count: self.resolution.graph.edge_count(),
            clusters: self.clusters.clone(),
            chunks: self
                .packing
                .chunks
                .iter()
                .zip(&self.contexts)
                .map(|(chunk, context)| ChunkReport {
                    chunk: chunk.clone(),
                    external_callers: context.external_callers.iter().cloned().collect(),
                    external_callees: context.external_callees.iter().cloned().collect(),
                })
                .collect(),
            unresolved: self.unresolved(),
            oversized_chunks: self.packing.oversized(),
        }
    }
}

/// One chunk with its cross-boundary references.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub external_callers: Vec<String>,
    pub external_callees: Vec<String>,
}

/// The `plan.json` structure.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub budget: usize,
    pub hops: usize,
    pub unit_count: usize,
    pub edge_count: usize,
    pub clusters: Vec<Cluster>,
    pub chunks: Vec<ChunkReport>,
    pub unresolved: Vec<String>,
    pub oversized_chunks: Vec<usize>,
}

/// Partition a corpus into chunks and annotate each with its context.
#[instrument(skip_all, fields(units = corpus.len(), budget = options.budget, hops = options.hops))]
pub fn plan(corpus: &Corpus, patterns: &ReferencePatterns, options: PlanOptions) -> Result<Plan> {
    let resolution = build_graph(corpus, patterns);
    let clusters = build_clusters(corpus, &resolution.graph, options.hops);
    let packing = pack(corpus, &resolution.graph, &clusters, options.budget)?;

    let contexts = packing
        .chunks
        .iter()
        .map(|chunk| annotate(chunk, &resolution.graph, &packing.owner_of))
        .collect();

    info!(
        chunks = packing.chunks.len(),
        unresolved = resolution.unresolved.len(),
        "plan ready"
    );

    Ok(Plan {
        options,
        resolution,
        clusters,
        packing,
        contexts,
    })
}
