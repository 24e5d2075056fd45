//! Cluster builder: grows locality-preserving groups of units outward from
//! entry-point programs over a bounded number of reference hops.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, instrument};

use docweave_shared::UnitKind;

use crate::corpus::Corpus;
use crate::resolver::{ReferenceGraph, ReferenceKind};

/// Default closure depth.
pub const DEFAULT_HOPS: usize = 2;

/// A set of units grown from one root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub root: String,
    pub members: BTreeSet<String>,
    /// True for singletons created for units no root reached.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub orphan: bool,
}

impl Cluster {
    fn orphan(id: &str) -> Self {
        Self {
            root: id.to_string(),
            members: BTreeSet::from([id.to_string()]),
            orphan: true,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }
}

/// Program units that no other program calls. When every program is called
/// by something (a cycle), every program is a root.
pub fn select_roots(corpus: &Corpus, graph: &ReferenceGraph) -> Vec<String> {
    let programs: Vec<&str> = corpus
        .of_kind(UnitKind::Program)
        .map(|u| u.id.as_str())
        .collect();

    let called: BTreeSet<&str> = graph
        .edges()
        .filter(|e| e.kind == ReferenceKind::Calls && e.from != e.to)
        .filter(|e| corpus.get(&e.from).is_some_and(|u| u.kind == UnitKind::Program))
        .map(|e| e.to.as_str())
        .collect();

    let roots: Vec<String> = programs
        .iter()
        .filter(|id| !called.contains(*id))
        .map(|id| id.to_string())
        .collect();

    if roots.is_empty() {
        programs.into_iter().map(str::to_string).collect()
    } else {
        roots
    }
}

/// Group every unit into at least one cluster.
///
/// Roots are processed in id order. Each cluster starts from its root and, per
/// hop, adds every unit referenced by any current member. A cluster whose
/// members were all claimed by earlier clusters is discarded. Units reached by
/// no cluster follow as orphan singletons in id order.
#[instrument(skip_all, fields(units = corpus.len(), hops))]
pub fn build_clusters(corpus: &Corpus, graph: &ReferenceGraph, hops: usize) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    let mut claimed: BTreeSet<String> = BTreeSet::new();

    for root in select_roots(corpus, graph) {
        let members = closure(graph, &root, hops);

        if members.iter().all(|m| claimed.contains(m)) {
            debug!(root = %root, "cluster already covered, skipping");
            continue;
        }

        claimed.extend(members.iter().cloned());
        clusters.push(Cluster {
            root,
            members,
            orphan: false,
        });
    }

    let rooted = clusters.len();
    for id in corpus.ids() {
        if !claimed.contains(id) {
            clusters.push(Cluster::orphan(id));
        }
    }

    info!(
        clusters = clusters.len(),
        orphans = clusters.len() - rooted,
        "clusters built"
    );

    clusters
}

/// Bounded closure: the root plus everything reachable within `hops` edges.
fn closure(graph: &ReferenceGraph, root: &str, hops: usize) -> BTreeSet<String> {
    let mut members = BTreeSet::from([root.to_string()]);
    let mut frontier = vec![root.to_string()];

    for _ in 0..hops {
        let mut next = Vec::new();
        for id in &frontier {
            for target in graph.targets(id) {
                if members.insert(target.to_string()) {
                    next.push(target.to_string());
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    members
}
