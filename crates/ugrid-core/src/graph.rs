//! Network Graph Builder.
//!
//! The graph is derived from the [`Model`] and never stored with it: lines and
//! transformers become edges between their endpoints, loads, generators and
//! power sources become pendant vertices attached through an
//! [`LinkKind::Attachment`] edge. Rebuild it after every topology mutation.

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::graphmap::UnGraphMap;
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::elements::{Element, ElementKind, Position};
use crate::error::{GridError, GridResult};
use crate::model::Model;

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub name: String,
    pub kind: ElementKind,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LinkKind {
    Line,
    Transformer,
    /// `connecting_element` of a load, PV system or power source
    Attachment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub element: String,
    pub kind: LinkKind,
}

/// Undirected connectivity multigraph rooted at the designated source.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    pub graph: UnGraph<Vertex, Link>,
    index: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

/// Member of a connected component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentMember {
    pub name: String,
    pub kind: ElementKind,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub id: usize,
    pub members: Vec<ComponentMember>,
}

impl Component {
    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }

    pub fn has_power_source(&self) -> bool {
        self.members
            .iter()
            .any(|m| m.kind == ElementKind::PowerSource)
    }

    /// Node members with a known position, in graph order.
    pub fn positioned_nodes(&self) -> impl Iterator<Item = (&str, Position)> {
        self.members.iter().filter_map(|m| match (m.kind, m.position) {
            (ElementKind::Node, Some(position)) => Some((m.name.as_str(), position)),
            _ => None,
        })
    }
}

impl NetworkGraph {
    /// Build the graph for `model`, rooted at `source_name`.
    ///
    /// Fails when the source is not an element of the model or when an
    /// element references a name with no vertex.
    pub fn build(model: &Model, source_name: &str) -> GridResult<Self> {
        let mut graph = UnGraph::<Vertex, Link>::new_undirected();
        let mut index = HashMap::new();

        for element in model.iter() {
            let position = match element {
                Element::Node(node) => node.position(),
                Element::Load(_) | Element::PowerSource(_) | Element::Photovoltaic(_) => None,
                Element::Line(_) | Element::Transformer(_) => continue,
            };
            let idx = graph.add_node(Vertex {
                name: element.name().to_string(),
                kind: element.kind(),
                position,
            });
            index.insert(element.name().to_string(), idx);
        }

        let lookup = |owner: &str, name: &str| -> GridResult<NodeIndex> {
            index.get(name).copied().ok_or_else(|| {
                GridError::UnknownElement(format!("{name} (referenced by {owner})"))
            })
        };

        let mut edges = Vec::new();
        for element in model.iter() {
            match element {
                Element::Line(line) => edges.push((
                    lookup(&line.name, &line.from_element)?,
                    lookup(&line.name, &line.to_element)?,
                    Link {
                        element: line.name.clone(),
                        kind: LinkKind::Line,
                    },
                )),
                Element::Transformer(tx) => edges.push((
                    lookup(&tx.name, &tx.from_element)?,
                    lookup(&tx.name, &tx.to_element)?,
                    Link {
                        element: tx.name.clone(),
                        kind: LinkKind::Transformer,
                    },
                )),
                Element::Load(_) | Element::PowerSource(_) | Element::Photovoltaic(_) => {
                    for (_, target) in element.references() {
                        let own = lookup(element.name(), element.name())?;
                        edges.push((
                            own,
                            lookup(element.name(), target)?,
                            Link {
                                element: element.name().to_string(),
                                kind: LinkKind::Attachment,
                            },
                        ));
                    }
                }
                Element::Node(_) => {}
            }
        }
        for (a, b, link) in edges {
            graph.add_edge(a, b, link);
        }

        let root = index
            .get(source_name)
            .copied()
            .ok_or_else(|| GridError::UnknownElement(source_name.to_string()))?;

        Ok(Self { graph, index, root })
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn root_name(&self) -> &str {
        &self.graph[self.root].name
    }

    pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn vertex(&self, idx: NodeIndex) -> &Vertex {
        &self.graph[idx]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn component_count(&self) -> usize {
        connected_components(&self.graph)
    }

    /// Connected components in vertex order; id 0 holds the first vertex.
    pub fn components(&self) -> Vec<Component> {
        let mut visited = HashSet::new();
        let mut components = Vec::new();
        for start in self.graph.node_indices() {
            if visited.contains(&start) {
                continue;
            }
            let mut queue = VecDeque::new();
            queue.push_back(start);
            let mut members = Vec::new();
            while let Some(node) = queue.pop_front() {
                if !visited.insert(node) {
                    continue;
                }
                members.push(node);
                for neighbor in self.graph.neighbors(node) {
                    if !visited.contains(&neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
            members.sort();
            components.push(Component {
                id: components.len(),
                members: members
                    .into_iter()
                    .map(|idx| {
                        let vertex = &self.graph[idx];
                        ComponentMember {
                            name: vertex.name.clone(),
                            kind: vertex.kind,
                            position: vertex.position,
                        }
                    })
                    .collect(),
            });
        }
        components
    }

    /// Simple graph with parallel edges folded into one; self-loops kept.
    pub fn collapsed(&self) -> UnGraphMap<NodeIndex, usize> {
        let mut simple = UnGraphMap::new();
        for idx in self.graph.node_indices() {
            simple.add_node(idx);
        }
        for edge in self.graph.edge_references() {
            let (a, b) = (edge.source(), edge.target());
            let count = simple.edge_weight(a, b).copied().unwrap_or(0);
            simple.add_edge(a, b, count + 1);
        }
        simple
    }

    pub fn stats(&self) -> GraphStats {
        let node_count = self.graph.node_count();
        let edge_count = self.graph.edge_count();
        let degrees: Vec<usize> = self
            .graph
            .node_indices()
            .map(|node| self.graph.edges(node).count())
            .collect();
        let min_degree = degrees.iter().copied().min().unwrap_or(0);
        let max_degree = degrees.iter().copied().max().unwrap_or(0);
        let avg_degree = if node_count == 0 {
            0.0
        } else {
            degrees.iter().sum::<usize>() as f64 / node_count as f64
        };
        let count_links = |kind: LinkKind| {
            self.graph
                .edge_weights()
                .filter(|link| link.kind == kind)
                .count()
        };
        GraphStats {
            node_count,
            edge_count,
            line_count: count_links(LinkKind::Line),
            transformer_count: count_links(LinkKind::Transformer),
            connected_components: self.component_count(),
            min_degree,
            avg_degree,
            max_degree,
        }
    }
}

/// Summary statistics produced by `graph stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub line_count: usize,
    pub transformer_count: usize,
    pub connected_components: usize,
    pub min_degree: usize,
    pub avg_degree: f64,
    pub max_degree: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Line, Load, Node, PowerSource, PowerTransformer};
    use crate::units::Volts;

    fn two_islands() -> Model {
        let mut model = Model::new();
        model.add(Node::new("source").with_position(0.0, 0.0)).unwrap();
        model.add(Node::new("n1").with_position(0.0, 1.0)).unwrap();
        model.add(Node::new("n2").with_position(5.0, 5.0)).unwrap();
        model
            .add(PowerSource::new("ps_source", "source", Volts(13200.0)))
            .unwrap();
        model.add(Line::new("l1", "source", "n1")).unwrap();
        model.add(Load::new("b1", "n2")).unwrap();
        model
    }

    #[test]
    fn test_build_rejects_missing_source() {
        let err = NetworkGraph::build(&two_islands(), "nowhere").unwrap_err();
        assert!(matches!(err, GridError::UnknownElement(_)));
    }

    #[test]
    fn test_build_rejects_dangling_reference() {
        let mut model = two_islands();
        model.add(Line::new("l_bad", "n1", "ghost")).unwrap();
        assert!(NetworkGraph::build(&model, "source").is_err());
    }

    #[test]
    fn test_components_carry_positions() {
        let graph = NetworkGraph::build(&two_islands(), "source").unwrap();
        let components = graph.components();
        assert_eq!(components.len(), 2);
        assert!(components[0].has_power_source());
        assert!(components[0].contains("n1"));
        assert!(!components[1].has_power_source());
        let nodes: Vec<_> = components[1].positioned_nodes().collect();
        assert_eq!(nodes, vec![("n2", Position::new(5.0, 5.0))]);
    }

    #[test]
    fn test_collapsed_folds_parallel_lines() {
        let mut model = two_islands();
        model.add(Line::new("l1_dup", "n1", "source")).unwrap();
        model
            .add(PowerTransformer::new("t1", "n1", "n2"))
            .unwrap();
        let graph = NetworkGraph::build(&model, "source").unwrap();
        assert_eq!(graph.graph.edge_count(), 5);
        let simple = graph.collapsed();
        assert_eq!(simple.edge_count(), 4);
        let source = graph.index_of("source").unwrap();
        let n1 = graph.index_of("n1").unwrap();
        assert_eq!(simple.edge_weight(source, n1), Some(&2));
        assert_eq!(graph.component_count(), 1);
    }

    #[test]
    fn test_stats() {
        let graph = NetworkGraph::build(&two_islands(), "source").unwrap();
        let stats = graph.stats();
        assert_eq!(stats.node_count, 5);
        assert_eq!(stats.edge_count, 3);
        assert_eq!(stats.line_count, 1);
        assert_eq!(stats.connected_components, 2);
        assert_eq!(stats.max_degree, 2);
    }
}
