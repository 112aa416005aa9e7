use petgraph::algo::all_simple_paths;
use petgraph::graph::NodeIndex;

use ugrid_core::{Diagnostics, Model, NetworkGraph};

use super::{CheckKind, CheckOutcome};
use crate::upstream::UpstreamIndex;

/// Every load's connecting element is reachable from the root.
pub fn check_loads_connected(model: &Model, upstream: &UpstreamIndex) -> CheckOutcome {
    let category = CheckKind::LoadsConnected.category();
    let mut diagnostics = Diagnostics::new();
    for load in model.loads() {
        if !upstream.is_reachable(&load.connecting_element) {
            diagnostics.add_error_with_entity(
                category,
                &format!(
                    "connecting element {} is not reachable from the source",
                    load.connecting_element
                ),
                &load.name,
            );
        }
    }
    CheckOutcome::from_diagnostics(CheckKind::LoadsConnected, diagnostics)
}

/// Exactly one simple path joins the root and each load's connecting element.
///
/// Parallel wiring between the same two vertices counts as one path.
pub fn check_unique_path(model: &Model, graph: &NetworkGraph) -> CheckOutcome {
    let category = CheckKind::UniquePath.category();
    let mut diagnostics = Diagnostics::new();
    let simple = graph.collapsed();
    let root = graph.root();

    for load in model.loads() {
        let Some(target) = graph.index_of(&load.connecting_element) else {
            diagnostics.add_error_with_entity(
                category,
                &format!("unknown connecting element {}", load.connecting_element),
                &load.name,
            );
            continue;
        };
        if target == root {
            continue;
        }
        let paths = all_simple_paths::<Vec<NodeIndex>, _>(&simple, root, target, 0, None)
            .take(2)
            .count();
        match paths {
            1 => {}
            0 => diagnostics.add_error_with_entity(
                category,
                &format!("no path from the source to {}", load.connecting_element),
                &load.name,
            ),
            _ => diagnostics.add_error_with_entity(
                category,
                &format!(
                    "more than one path from the source to {}",
                    load.connecting_element
                ),
                &load.name,
            ),
        }
    }
    CheckOutcome::from_diagnostics(CheckKind::UniquePath, diagnostics)
}
