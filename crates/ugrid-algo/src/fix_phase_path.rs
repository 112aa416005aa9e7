//! Phase-Path Fixer.
//!
//! The catalog phases of each transformer are taken as ground truth: every
//! line, load and PV system whose upstream transformer is `T` gets its phase
//! set rewritten to `T`'s secondary phases. Topology is never touched, and
//! upstream wiring is never changed to match a transformer.

use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::{debug, info};

use ugrid_core::{
    Element, ElementKind, GridError, GridResult, LinkKind, Model, NetworkGraph, PhaseSet,
};

use crate::upstream::UpstreamIndex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseRewrite {
    pub element: String,
    pub kind: ElementKind,
    pub transformer: String,
    pub from: PhaseSet,
    pub to: PhaseSet,
}

/// Phase relabels needed to line the downstream wiring up with each
/// transformer's secondary.
pub fn plan_phase_fix(model: &Model, graph: &NetworkGraph) -> Vec<PhaseRewrite> {
    let upstream = UpstreamIndex::build(graph);
    let mut rewrites = Vec::new();

    let secondary_for = |name: &str| -> Option<(String, PhaseSet)> {
        let tx_name = upstream.get_upstream_transformer(name).ok()??;
        let tx = model.transformer(tx_name)?;
        Some((tx.name.clone(), tx.secondary_phases()))
    };

    // A line belongs to the transformer above its deeper endpoint.
    for edge in graph.graph.edge_references() {
        let link = edge.weight();
        if link.kind != LinkKind::Line {
            continue;
        }
        let a = &graph.vertex(edge.source()).name;
        let b = &graph.vertex(edge.target()).name;
        let child = match (upstream.depth(a), upstream.depth(b)) {
            (Some(da), Some(db)) if da >= db => a,
            (Some(_), Some(_)) => b,
            _ => continue,
        };
        let (Some(line), Some((transformer, secondary))) =
            (model.line(&link.element), secondary_for(child))
        else {
            continue;
        };
        if line.phases() != secondary {
            rewrites.push(PhaseRewrite {
                element: line.name.clone(),
                kind: ElementKind::Line,
                transformer,
                from: line.phases(),
                to: secondary,
            });
        }
    }

    for load in model.loads() {
        if let Some((transformer, secondary)) = secondary_for(&load.name) {
            if load.phases() != secondary {
                rewrites.push(PhaseRewrite {
                    element: load.name.clone(),
                    kind: ElementKind::Load,
                    transformer,
                    from: load.phases(),
                    to: secondary,
                });
            }
        }
    }

    for pv in model.photovoltaics() {
        if let Some((transformer, secondary)) = secondary_for(&pv.name) {
            if pv.phases != secondary {
                rewrites.push(PhaseRewrite {
                    element: pv.name.clone(),
                    kind: ElementKind::Photovoltaic,
                    transformer,
                    from: pv.phases,
                    to: secondary,
                });
            }
        }
    }
    rewrites
}

pub fn apply_phase_fix(model: &mut Model, rewrites: &[PhaseRewrite]) -> GridResult<()> {
    for rewrite in rewrites {
        debug!(
            "{} {}: {} -> {} (below {})",
            rewrite.kind, rewrite.element, rewrite.from, rewrite.to, rewrite.transformer
        );
        match model.get_mut(&rewrite.element) {
            Some(Element::Line(line)) => line.set_phases(rewrite.to),
            Some(Element::Load(load)) => load.set_phases(rewrite.to),
            Some(Element::Photovoltaic(pv)) => pv.phases = rewrite.to,
            Some(other) => {
                return Err(GridError::Topology(format!(
                    "cannot relabel phases of {} {}",
                    other.kind(),
                    rewrite.element
                )))
            }
            None => return Err(GridError::UnknownElement(rewrite.element.clone())),
        }
    }
    Ok(())
}

/// Plan and apply in one go; returns the rewrites made.
pub fn fix_phase_path(model: &mut Model, graph: &NetworkGraph) -> GridResult<Vec<PhaseRewrite>> {
    let rewrites = plan_phase_fix(model, graph);
    apply_phase_fix(model, &rewrites)?;
    info!("phase path fixer relabelled {} elements", rewrites.len());
    Ok(rewrites)
}
