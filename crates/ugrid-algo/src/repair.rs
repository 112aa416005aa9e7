//! Topology Repair Engine.
//!
//! Stitches every disconnected component onto the component holding the
//! power source. Each round picks the globally closest pair of nodes between
//! an unattached component and the already-attached ones, redirects every
//! reference from the unattached node to the attached one and deletes the
//! unattached node.
//!
//! Planning and applying are separate steps: [`plan_repair`] is a pure
//! function of the model and its graph, [`apply_repair`] performs the edits.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use ugrid_core::{ElementKind, GridError, GridResult, Model, NetworkGraph, RefSlot};

/// One absorbed component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Merge {
    /// Node deleted from the absorbed component
    pub removed: String,
    /// Node of the attached side that takes over its references
    pub kept: String,
    pub component: usize,
    pub distance: f64,
}

/// A single reference retarget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rewrite {
    pub element: String,
    pub slot: RefSlot,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairPlan {
    pub root_component: usize,
    /// Power sources other than the graph root, left in place
    pub ignored_sources: Vec<String>,
    pub merges: Vec<Merge>,
    pub rewrites: Vec<Rewrite>,
}

impl RepairPlan {
    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }
}

/// Deleted node name -> node it was unified with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubstitutionMap(BTreeMap<String, String>);

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, removed: impl Into<String>, kept: impl Into<String>) {
        self.0.insert(removed.into(), kept.into());
    }

    pub fn get(&self, removed: &str) -> Option<&str> {
        self.0.get(removed).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Follow substitution chains to the surviving name.
    ///
    /// A cycle is reported as a topology error rather than looping.
    pub fn resolve<'a>(&'a self, name: &'a str) -> GridResult<&'a str> {
        let mut current = name;
        for _ in 0..=self.0.len() {
            match self.0.get(current) {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
        Err(GridError::Topology(format!(
            "substitution chain starting at '{name}' does not terminate"
        )))
    }
}

/// Result of [`repair`]: the substitutions made and the rebuilt graph.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub substitutions: SubstitutionMap,
    pub graph: NetworkGraph,
}

fn ensure_nodes(model: &Model) -> GridResult<()> {
    if model.is_empty() {
        return Err(GridError::EmptyModel("no elements".into()));
    }
    if model.nodes().next().is_none() {
        return Err(GridError::EmptyModel("no nodes".into()));
    }
    Ok(())
}

/// Compute the merges needed to leave a single component.
///
/// The component holding the graph root is the trunk; it must contain a
/// power source. A model that is already connected yields an empty plan.
pub fn plan_repair(model: &Model, graph: &NetworkGraph) -> GridResult<RepairPlan> {
    ensure_nodes(model)?;

    let root = graph.root_name();
    let components = graph.components();
    let root_component = components
        .iter()
        .find(|c| c.contains(root) && c.has_power_source())
        .map(|c| c.id)
        .ok_or(GridError::NoSubstation)?;

    let ignored_sources: Vec<String> = model
        .power_sources()
        .map(|source| source.name.clone())
        .filter(|name| name != root)
        .collect();
    if !ignored_sources.is_empty() {
        warn!(
            "multiple power sources found, using '{}' as the root",
            root
        );
    }

    let mut plan = RepairPlan {
        root_component,
        ignored_sources,
        ..RepairPlan::default()
    };
    if components.len() <= 1 {
        return Ok(plan);
    }
    info!(
        "{} connected components found, stitching onto component {}",
        components.len(),
        root_component
    );

    let mut seen: HashSet<usize> = HashSet::from([root_component]);
    let mut removed: HashSet<String> = HashSet::new();

    while seen.len() < components.len() {
        let mut best: Option<Merge> = None;
        for unseen in components.iter().filter(|c| !seen.contains(&c.id)) {
            for attached in components.iter().filter(|c| seen.contains(&c.id)) {
                for (candidate, from) in unseen.positioned_nodes() {
                    for (target, to) in attached.positioned_nodes() {
                        if removed.contains(target) {
                            continue;
                        }
                        let distance = from.planar_distance(&to);
                        let closer = best.as_ref().map_or(true, |b| distance < b.distance);
                        if closer {
                            best = Some(Merge {
                                removed: candidate.to_string(),
                                kept: target.to_string(),
                                component: unseen.id,
                                distance,
                            });
                        }
                    }
                }
            }
        }

        let merge = best.ok_or_else(|| {
            let stranded: Vec<String> = components
                .iter()
                .filter(|c| !seen.contains(&c.id))
                .map(|c| c.id.to_string())
                .collect();
            GridError::Topology(format!(
                "components [{}] have no positioned node to connect",
                stranded.join(", ")
            ))
        })?;
        debug!(
            "merging component {} via {} -> {} (distance {:.6})",
            merge.component, merge.removed, merge.kept, merge.distance
        );
        removed.insert(merge.removed.clone());
        seen.insert(merge.component);
        plan.merges.push(merge);
    }

    for merge in &plan.merges {
        for (element, slot) in model.referencing(&merge.removed) {
            plan.rewrites.push(Rewrite {
                element,
                slot,
                from: merge.removed.clone(),
                to: merge.kept.clone(),
            });
        }
    }
    Ok(plan)
}

/// Perform the rewrites and node deletions of `plan`.
pub fn apply_repair(model: &mut Model, plan: &RepairPlan) -> GridResult<SubstitutionMap> {
    for rewrite in &plan.rewrites {
        model.retarget(&rewrite.element, rewrite.slot, &rewrite.to)?;
    }
    let mut substitutions = SubstitutionMap::new();
    for merge in &plan.merges {
        match model.get(&merge.removed).map(|e| e.kind()) {
            Some(ElementKind::Node) => {}
            Some(kind) => {
                return Err(GridError::Topology(format!(
                    "'{}' is a {kind}, only nodes can be merged",
                    merge.removed
                )))
            }
            None => return Err(GridError::UnknownElement(merge.removed.clone())),
        }
        model.remove(&merge.removed);
        substitutions.insert(merge.removed.clone(), merge.kept.clone());
    }
    Ok(substitutions)
}

/// Plan, apply and rebuild the graph rooted at `source_name`.
pub fn repair(model: &mut Model, source_name: &str) -> GridResult<RepairOutcome> {
    ensure_nodes(model)?;
    let graph = NetworkGraph::build(model, source_name)?;
    let plan = plan_repair(model, &graph)?;
    if plan.is_empty() {
        return Ok(RepairOutcome {
            substitutions: SubstitutionMap::new(),
            graph,
        });
    }
    let substitutions = apply_repair(model, &plan)?;
    let graph = NetworkGraph::build(model, source_name)?;
    info!(
        "repair merged {} components, {} remaining",
        substitutions.len(),
        graph.component_count()
    );
    Ok(RepairOutcome {
        substitutions,
        graph,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ugrid_core::{Line, Load, Node, PowerSource, Volts};

    fn islands() -> Model {
        let mut model = Model::new();
        model.add(Node::new("n1").with_position(0.0, 0.0)).unwrap();
        model.add(Node::new("n2").with_position(0.0, 0.0001)).unwrap();
        model.add(Node::new("n3").with_position(0.0, 0.0003)).unwrap();
        model.add(Node::new("n4").with_position(1.0, 1.0)).unwrap();
        model
            .add(PowerSource::new("s", "n1", Volts(13200.0)))
            .unwrap();
        model.add(Line::new("l23", "n2", "n3")).unwrap();
        model.add(Load::new("b2", "n2")).unwrap();
        model.add(Load::new("b4", "n4")).unwrap();
        model
    }

    #[test]
    fn test_resolve_follows_chains() {
        let mut map = SubstitutionMap::new();
        map.insert("a", "b");
        map.insert("b", "c");
        assert_eq!(map.resolve("a").unwrap(), "c");
        assert_eq!(map.resolve("z").unwrap(), "z");

        map.insert("c", "a");
        assert!(map.resolve("a").is_err());
    }

    #[test]
    fn test_plan_is_pure() {
        let model = islands();
        let graph = NetworkGraph::build(&model, "s").unwrap();
        let plan = plan_repair(&model, &graph).unwrap();
        assert_eq!(plan.merges.len(), 2);
        assert_eq!(plan.merges[0].removed, "n2");
        assert_eq!(plan.merges[0].kept, "n1");
        // n4 is closest to n3 once n2's component is attached
        assert_eq!(plan.merges[1].removed, "n4");
        assert_eq!(plan.merges[1].kept, "n3");
        assert_eq!(model.len(), islands().len());
        assert!(plan
            .rewrites
            .iter()
            .any(|r| r.element == "b2" && r.to == "n1"));
    }

    #[test]
    fn test_repair_leaves_one_component() {
        let mut model = islands();
        let outcome = repair(&mut model, "s").unwrap();
        assert_eq!(outcome.graph.component_count(), 1);
        assert_eq!(outcome.substitutions.len(), 2);
        for (_, kept) in outcome.substitutions.iter() {
            assert!(model.contains(outcome.substitutions.resolve(kept).unwrap()));
        }
        assert!(!model.contains("n2"));
        assert_eq!(model.line("l23").unwrap().from_element, "n1");
        assert!(model.dangling_references().is_empty());
    }

    #[test]
    fn test_missing_source_component() {
        let mut model = Model::new();
        model.add(Node::new("n1")).unwrap();
        let graph = NetworkGraph::build(&model, "n1").unwrap();
        assert!(matches!(
            plan_repair(&model, &graph),
            Err(GridError::NoSubstation)
        ));
    }

    #[test]
    fn test_named_source_is_the_trunk() {
        let mut model = Model::new();
        model.add(Node::new("a1").with_position(0.0, 0.0)).unwrap();
        model.add(Node::new("b1").with_position(0.0, 0.0001)).unwrap();
        model
            .add(PowerSource::new("s1", "a1", Volts(13200.0)))
            .unwrap();
        model
            .add(PowerSource::new("s2", "b1", Volts(13200.0)))
            .unwrap();

        let graph = NetworkGraph::build(&model, "s2").unwrap();
        let plan = plan_repair(&model, &graph).unwrap();
        assert_eq!(plan.ignored_sources, vec!["s1".to_string()]);
        assert!(graph.components()[plan.root_component].contains("s2"));

        let outcome = repair(&mut model, "s2").unwrap();
        assert_eq!(outcome.substitutions.get("a1"), Some("b1"));
        assert!(model.contains("b1"));
        assert!(!model.contains("a1"));
        assert_eq!(model.get("s1").unwrap().references()[0].1, "b1");
    }

    #[test]
    fn test_single_source_ignores_nothing() {
        let model = islands();
        let graph = NetworkGraph::build(&model, "s").unwrap();
        assert!(plan_repair(&model, &graph).unwrap().ignored_sources.is_empty());
    }

    #[test]
    fn test_repair_empty_model() {
        let mut model = Model::new();
        assert!(matches!(
            repair(&mut model, "ps_source"),
            Err(GridError::EmptyModel(_))
        ));

        model
            .add(PowerSource::new("s", "s", Volts(13200.0)))
            .unwrap();
        assert!(matches!(
            repair(&mut model, "s"),
            Err(GridError::EmptyModel(_))
        ));
    }

    #[test]
    fn test_model_without_nodes_is_fatal() {
        let mut model = Model::new();
        model
            .add(PowerSource::new("s", "s", Volts(13200.0)))
            .unwrap();
        let graph = NetworkGraph::build(&model, "s").unwrap();
        assert!(matches!(
            plan_repair(&model, &graph),
            Err(GridError::EmptyModel(_))
        ));
    }
}
