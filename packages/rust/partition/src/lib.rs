//! Corpus partitioning for docweave.
//!
//! Splits a corpus of source units into size-bounded chunks without breaking
//! the references between files:
//! - [`resolver`] builds the reference graph from symbolic names
//! - [`cluster`] groups units around entry-point programs
//! - [`packer`] packs clusters into chunks, never splitting a unit
//! - [`context`] describes each chunk's cross-boundary references
//! - [`plan`] runs the whole sequence

pub mod cluster;
pub mod context;
pub mod corpus;
pub mod packer;
pub mod plan;
pub mod resolver;

pub use cluster::{Cluster, DEFAULT_HOPS, build_clusters, select_roots};
pub use context::{ChunkPayload, annotate, file_header, render_manifest, render_payload};
pub use corpus::Corpus;
pub use packer::{Packing, pack};
pub use plan::{ChunkReport, Plan, PlanOptions, PlanReport, plan};
pub use resolver::{
    NameIndex, ReferenceEdge, ReferenceGraph, ReferenceKind, Resolution, UnitSymbols, build_graph,
};
