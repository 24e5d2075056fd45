//! Cross-chunk context: which units outside a chunk reference into it or are
//! referenced from it, and the text payload handed to an analyzer.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use docweave_shared::{Chunk, ChunkContext, SourceUnit};

use crate::corpus::Corpus;
use crate::resolver::ReferenceGraph;

/// Header line preceding each unit's content in a payload.
pub fn file_header(id: &str) -> String {
    format!("--- FILE: {id} ---")
}

/// Compute the external callers and callees of `chunk`.
///
/// Only units owned by a different chunk are counted; references that stay
/// inside the chunk are visible to the analyzer already.
pub fn annotate(
    chunk: &Chunk,
    graph: &ReferenceGraph,
    owner_of: &BTreeMap<String, usize>,
) -> ChunkContext {
    let elsewhere = |id: &str| owner_of.get(id).is_some_and(|owner| *owner != chunk.index);

    let mut context = ChunkContext {
        chunk: chunk.index,
        ..ChunkContext::default()
    };

    for id in &chunk.units {
        for caller in graph.referrers(id) {
            if elsewhere(caller) {
                context.external_callers.insert(caller.to_string());
            }
        }
        for callee in graph.targets(id) {
            if elsewhere(callee) {
                context.external_callees.insert(callee.to_string());
            }
        }
    }

    context
}

/// Render a context as a short prose manifest.
pub fn render_manifest(
    context: &ChunkContext,
    chunk_count: usize,
    owner_of: &BTreeMap<String, usize>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=== CHUNK CONTEXT: chunk {} of {} ===",
        context.chunk + 1,
        chunk_count
    );

    if context.is_isolated() {
        out.push_str("No references cross this chunk's boundary.\n");
        return out;
    }

    let describe = |id: &String| match owner_of.get(id) {
        Some(owner) => format!("{id} (chunk {})", owner + 1),
        None => id.clone(),
    };

    if !context.external_callers.is_empty() {
        let callers: Vec<String> = context.external_callers.iter().map(describe).collect();
        let _ = writeln!(
            out,
            "Referenced from outside this chunk by: {}",
            callers.join(", ")
        );
    }
    if !context.external_callees.is_empty() {
        let callees: Vec<String> = context.external_callees.iter().map(describe).collect();
        let _ = writeln!(
            out,
            "References units outside this chunk: {}",
            callees.join(", ")
        );
    }
    out.push_str("Their contents are not included; treat them as known but unseen.\n");
    out
}

/// Everything an analyzer receives for one chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkPayload {
    pub chunk: Chunk,
    pub context: ChunkContext,
    /// The chunk's units in payload order.
    #[serde(skip)]
    pub units: Vec<SourceUnit>,
    /// Manifest followed by each unit's header and content.
    #[serde(skip)]
    pub text: String,
}

impl ChunkPayload {
    pub fn index(&self) -> usize {
        self.chunk.index
    }
}

/// Build the payload for one chunk: the manifest, then every unit's content
/// preceded by its file header, in chunk order.
pub fn render_payload(
    chunk: &Chunk,
    context: ChunkContext,
    corpus: &Corpus,
    chunk_count: usize,
    owner_of: &BTreeMap<String, usize>,
) -> ChunkPayload {
    let units: Vec<SourceUnit> = chunk
        .units
        .iter()
        .filter_map(|id| corpus.get(id).cloned())
        .collect();

    let mut text = render_manifest(&context, chunk_count, owner_of);
    for unit in &units {
        text.push('\n');
        text.push_str(&file_header(&unit.id));
        text.push('\n');
        text.push_str(&unit.content);
        if !unit.content.ends_with('\n') {
            text.push('\n');
        }
    }

    ChunkPayload {
        chunk: chunk.clone(),
        context,
        units,
        text,
    }
}

#[cfg(test)]
mod tests {
    use docweave_shared::{ReferencePatterns, UnitKind};

    use super::*;
    use crate::cluster::{DEFAULT_HOPS, build_clusters};
    use crate::packer::pack;
    use crate::resolver::build_graph;

    fn split_corpus() -> Corpus {
        // MAIN alone is larger than half the budget so it splits from SUB/WS.
        Corpus::from_units([
            SourceUnit::new("MAIN.cbl", format!("COPY WS.\nCALL 'SUB'.\n{}", "X".repeat(50)), UnitKind::Program),
            SourceUnit::new("SUB.cbl", "PROGRAM-ID. SUB.\n", UnitKind::Program),
            SourceUnit::new("WS.cpy", "01 WS-REC.\n", UnitKind::Copybook),
        ])
    }

    #[test]
    fn annotate_reports_only_cross_chunk_references() {
        let corpus = split_corpus();
        let res = build_graph(&corpus, &ReferencePatterns::default());
        let clusters = build_clusters(&corpus, &res.graph, DEFAULT_HOPS);
        let packing = pack(&corpus, &res.graph, &clusters, 75).expect("pack");
        assert_eq!(packing.chunks.len(), 2);
        assert_eq!(packing.chunks[0].units, vec!["WS.cpy", "SUB.cbl"]);

        let first = annotate(&packing.chunks[0], &res.graph, &packing.owner_of);
        assert_eq!(first.external_callers.iter().collect::<Vec<_>>(), vec!["MAIN.cbl"]);
        assert!(first.external_callees.is_empty());

        let second = annotate(&packing.chunks[1], &res.graph, &packing.owner_of);
        assert!(second.external_callers.is_empty());
        assert_eq!(
            second.external_callees.iter().collect::<Vec<_>>(),
            vec!["SUB.cbl", "WS.cpy"]
        );
    }

    #[test]
    fn single_chunk_is_isolated() {
        let corpus = split_corpus();
        let res = build_graph(&corpus, &ReferencePatterns::default());
        let clusters = build_clusters(&corpus, &res.graph, DEFAULT_HOPS);
        let packing = pack(&corpus, &res.graph, &clusters, 10_000).expect("pack");

        let context = annotate(&packing.chunks[0], &res.graph, &packing.owner_of);
        assert!(context.is_isolated());
        let manifest = render_manifest(&context, 1, &packing.owner_of);
        assert!(manifest.contains("chunk 1 of 1"));
        assert!(manifest.contains("No references cross"));
    }

    #[test]
    fn payload_has_manifest_then_headed_units_in_order() {
        let corpus = split_corpus();
        let res = build_graph(&corpus, &ReferencePatterns::default());
        let clusters = build_clusters(&corpus, &res.graph, DEFAULT_HOPS);
        let packing = pack(&corpus, &res.graph, &clusters, 75).expect("pack");

        let chunk = &packing.chunks[0];
        let context = annotate(chunk, &res.graph, &packing.owner_of);
        let payload = render_payload(chunk, context, &corpus, packing.chunks.len(), &packing.owner_of);

        let manifest_at = payload.text.find("=== CHUNK CONTEXT").expect("manifest");
        let ws_at = payload.text.find("--- FILE: WS.cpy ---").expect("ws header");
        let sub_at = payload.text.find("--- FILE: SUB.cbl ---").expect("sub header");
        assert!(manifest_at < ws_at && ws_at < sub_at);
        assert!(payload.text.contains("MAIN.cbl (chunk 2)"));
        assert!(!payload.text.contains("--- FILE: MAIN.cbl ---"));
        assert!(payload.text.contains("01 WS-REC."));
        assert_eq!(payload.units.len(), 2);
        assert_eq!(payload.index(), 0);
    }
}
