use petgraph::visit::EdgeRef;
use std::collections::HashSet;

use ugrid_core::{Diagnostics, LinkKind, Model, NetworkGraph, PhaseSet};

use super::{CheckKind, CheckOutcome};
use crate::upstream::{Hop, UpstreamIndex};

/// Lines entering a transformer carry at least its primary phases, lines
/// leaving it carry at least its secondary phases.
///
/// The primary side is the endpoint nearer the source. Transformers with an
/// unreachable endpoint are left to the connectivity checks.
pub fn check_matched_phases(
    model: &Model,
    graph: &NetworkGraph,
    upstream: &UpstreamIndex,
) -> CheckOutcome {
    let category = CheckKind::MatchedPhases.category();
    let mut diagnostics = Diagnostics::new();

    for tx in model.transformers() {
        let (Some(from_depth), Some(to_depth)) =
            (upstream.depth(&tx.from_element), upstream.depth(&tx.to_element))
        else {
            continue;
        };
        let (primary, secondary) = if from_depth <= to_depth {
            (&tx.from_element, &tx.to_element)
        } else {
            (&tx.to_element, &tx.from_element)
        };

        let sides = [
            (primary, tx.primary_phases(), true, "primary"),
            (secondary, tx.secondary_phases(), false, "secondary"),
        ];
        for (vertex, required, incoming, side) in sides {
            let Some(idx) = graph.index_of(vertex) else {
                continue;
            };
            let Some(depth) = upstream.depth(vertex) else {
                continue;
            };
            for edge in graph.graph.edges(idx) {
                let link = edge.weight();
                if link.kind != LinkKind::Line {
                    continue;
                }
                let other = if edge.source() == idx {
                    edge.target()
                } else {
                    edge.source()
                };
                let Some(other_depth) = upstream.depth(&graph.vertex(other).name) else {
                    continue;
                };
                if (other_depth < depth) != incoming {
                    continue;
                }
                let Some(line) = model.line(&link.element) else {
                    continue;
                };
                let carried = line.phases();
                if !carried.is_superset(required) {
                    diagnostics.add_error_with_entity(
                        category,
                        &format!(
                            "line {} carries {} but the {} of {} has {} (missing {})",
                            line.name,
                            carried,
                            side,
                            tx.name,
                            required,
                            carried.missing_from(required)
                        ),
                        &tx.name,
                    );
                }
            }
        }
    }
    CheckOutcome::from_diagnostics(CheckKind::MatchedPhases, diagnostics)
}

/// Along every load's path to the source: lines below the upstream
/// transformer carry exactly its secondary phases, the load uses exactly
/// those phases, and lines above carry at least the primary phases.
///
/// Loads without an upstream transformer only need their path to carry
/// their own phases.
pub fn check_transformer_phase_path(model: &Model, upstream: &UpstreamIndex) -> CheckOutcome {
    let mut audit = LineAudit {
        model,
        reported: HashSet::new(),
        diagnostics: Diagnostics::new(),
    };

    for load in model.loads() {
        let Ok(path) = upstream.path_to_source(&load.name) else {
            continue;
        };
        let phases = load.phases();
        let tx_hop = path
            .iter()
            .position(|hop| hop.kind == LinkKind::Transformer)
            .and_then(|i| model.transformer(&path[i].element).map(|tx| (i, tx)));

        match tx_hop {
            Some((i, tx)) => {
                let secondary = tx.secondary_phases();
                let primary = tx.primary_phases();
                if phases != secondary {
                    audit.diagnostics.add_error_with_entity(
                        CheckKind::TransformerPhasePath.category(),
                        &format!("load uses {} but {} delivers {}", phases, tx.name, secondary),
                        &load.name,
                    );
                }
                let below = format!("{secondary} from {}", tx.name);
                for hop in &path[..i] {
                    audit.line(hop, &below, |p| p == secondary);
                }
                let above = format!("at least {primary} for {}", tx.name);
                for hop in &path[i + 1..] {
                    audit.line(hop, &above, |p| p.is_superset(primary));
                }
            }
            None => {
                let expect = format!("at least {phases} for {}", load.name);
                for hop in &path {
                    audit.line(hop, &expect, |p| p.is_superset(phases));
                }
            }
        }
    }
    CheckOutcome::from_diagnostics(CheckKind::TransformerPhasePath, audit.diagnostics)
}

/// Reports each offending line once, however many loads share it.
struct LineAudit<'m> {
    model: &'m Model,
    reported: HashSet<String>,
    diagnostics: Diagnostics,
}

impl LineAudit<'_> {
    fn line(&mut self, hop: &Hop, expect: &str, accepts: impl Fn(PhaseSet) -> bool) {
        if hop.kind != LinkKind::Line || self.reported.contains(&hop.element) {
            return;
        }
        let Some(line) = self.model.line(&hop.element) else {
            return;
        };
        if !accepts(line.phases()) {
            self.reported.insert(hop.element.clone());
            self.diagnostics.add_error_with_entity(
                CheckKind::TransformerPhasePath.category(),
                &format!("line carries {} where {} is expected", line.phases(), expect),
                &line.name,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ugrid_core::{Line, Load, Phase, PowerSource, PowerTransformer, VoltAmperes, Vars};
    use ugrid_core::{Node, Volts, Watts};

    fn ab() -> PhaseSet {
        [Phase::A, Phase::B].into_iter().collect()
    }

    fn feeder(lv_line: PhaseSet, load_phases: PhaseSet) -> Model {
        let mut model = Model::new();
        for name in ["source", "mv", "lv", "bldg"] {
            model.add(Node::new(name)).unwrap();
        }
        model
            .add(PowerSource::new("ps_source", "source", Volts(13200.0)))
            .unwrap();
        model
            .add(Line::new("l_mv", "source", "mv").with_phases(PhaseSet::three_phase()))
            .unwrap();
        model
            .add(PowerTransformer::new("t1", "mv", "lv").with_windings(
                (Volts(13200.0), PhaseSet::three_phase()),
                (Volts(480.0), PhaseSet::three_phase()),
                VoltAmperes::from_kva(100.0),
            ))
            .unwrap();
        model
            .add(Line::new("l_lv", "lv", "bldg").with_phases(lv_line))
            .unwrap();
        model
            .add(Load::new("b1", "bldg").with_demand(load_phases, Watts(1000.0), Vars(0.0)))
            .unwrap();
        model
    }

    fn run(model: &Model) -> (CheckOutcome, CheckOutcome) {
        let graph = NetworkGraph::build(model, "ps_source").unwrap();
        let upstream = UpstreamIndex::build(&graph);
        (
            check_matched_phases(model, &graph, &upstream),
            check_transformer_phase_path(model, &upstream),
        )
    }

    #[test]
    fn test_consistent_feeder_passes() {
        let (matched, path) = run(&feeder(PhaseSet::three_phase(), PhaseSet::three_phase()));
        assert!(matched.passed);
        assert!(path.passed);
    }

    #[test]
    fn test_secondary_line_missing_phase_fails() {
        let (matched, path) = run(&feeder(ab(), PhaseSet::three_phase()));
        assert!(!matched.passed);
        assert!(matched.diagnostics.issues[0].message.contains("missing C"));
        assert!(!path.passed);
        assert!(path
            .diagnostics
            .errors()
            .any(|i| i.entity.as_deref() == Some("l_lv")));
    }

    #[test]
    fn test_load_phase_mismatch_fails_path_only() {
        let (matched, path) = run(&feeder(PhaseSet::three_phase(), ab()));
        assert!(matched.passed);
        assert!(!path.passed);
        assert_eq!(
            path.diagnostics.errors().next().unwrap().entity.as_deref(),
            Some("b1")
        );
    }

    #[test]
    fn test_primary_side_checked() {
        let mut model = feeder(PhaseSet::three_phase(), PhaseSet::three_phase());
        if let Some(ugrid_core::Element::Line(line)) = model.get_mut("l_mv") {
            line.set_phases(ab());
        }
        let (matched, path) = run(&model);
        assert!(!matched.passed);
        assert!(matched.diagnostics.issues[0].message.contains("primary"));
        assert!(!path.passed);
    }
}
