use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use std::collections::HashSet;

use ugrid_core::{Diagnostics, NetworkGraph};

use super::{CheckKind, CheckOutcome};

/// The graph must be a forest once parallel edges between the same pair of
/// vertices are counted once.
pub fn check_loops(graph: &NetworkGraph) -> CheckOutcome {
    let category = CheckKind::Loops.category();
    let mut diagnostics = Diagnostics::new();
    let mut sets = UnionFind::<usize>::new(graph.node_count());
    let mut pairs = HashSet::new();

    for edge in graph.graph.edge_references() {
        let (a, b) = (edge.source().index(), edge.target().index());
        let element = &edge.weight().element;
        if a == b {
            diagnostics.add_error_with_entity(
                category,
                &format!("{} connects to itself", graph.vertex(edge.source()).name),
                element,
            );
            continue;
        }
        if !pairs.insert((a.min(b), a.max(b))) {
            continue;
        }
        if !sets.union(a, b) {
            diagnostics.add_error_with_entity(
                category,
                &format!(
                    "redundant connection between {} and {} closes a loop",
                    graph.vertex(edge.source()).name,
                    graph.vertex(edge.target()).name
                ),
                element,
            );
        }
    }
    CheckOutcome::from_diagnostics(CheckKind::Loops, diagnostics)
}
