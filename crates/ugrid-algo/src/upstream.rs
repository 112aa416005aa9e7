//! Upstream Resolver.
//!
//! A breadth-first walk from the graph root records, for every reachable
//! vertex, the edge leading back toward the source and the nearest
//! transformer crossed on the way. Queries are then lookups; rebuild the
//! index after any topology change.

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, VecDeque};

use ugrid_core::{GridError, GridResult, LinkKind, NetworkGraph};

/// One step on the path toward the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    /// Element traversed (line, transformer or attachment owner)
    pub element: String,
    pub kind: LinkKind,
    /// Vertex on the far side of the hop
    pub toward: String,
}

#[derive(Debug, Clone)]
struct Entry {
    parent: Option<(NodeIndex, Hop)>,
    depth: usize,
    transformer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpstreamIndex {
    names: HashMap<String, NodeIndex>,
    entries: HashMap<NodeIndex, Entry>,
}

impl UpstreamIndex {
    pub fn build(graph: &NetworkGraph) -> Self {
        let root = graph.root();
        let mut entries = HashMap::new();
        entries.insert(
            root,
            Entry {
                parent: None,
                depth: 0,
                transformer: None,
            },
        );

        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            let (depth, inherited) = match entries.get(&current) {
                Some(entry) => (entry.depth, entry.transformer.clone()),
                None => continue,
            };
            for edge in graph.graph.edges(current) {
                let next = if edge.source() == current {
                    edge.target()
                } else {
                    edge.source()
                };
                if entries.contains_key(&next) {
                    continue;
                }
                let link = edge.weight();
                let transformer = match link.kind {
                    LinkKind::Transformer => Some(link.element.clone()),
                    _ => inherited.clone(),
                };
                entries.insert(
                    next,
                    Entry {
                        parent: Some((
                            current,
                            Hop {
                                element: link.element.clone(),
                                kind: link.kind,
                                toward: graph.vertex(current).name.clone(),
                            },
                        )),
                        depth: depth + 1,
                        transformer,
                    },
                );
                queue.push_back(next);
            }
        }

        let names = graph
            .graph
            .node_indices()
            .map(|idx| (graph.vertex(idx).name.clone(), idx))
            .collect();
        Self { names, entries }
    }

    fn entry(&self, name: &str) -> GridResult<&Entry> {
        let idx = self
            .names
            .get(name)
            .ok_or_else(|| GridError::UnknownElement(name.to_string()))?;
        self.entries.get(idx).ok_or_else(|| GridError::Disconnected {
            element: name.to_string(),
        })
    }

    pub fn is_reachable(&self, name: &str) -> bool {
        self.entry(name).is_ok()
    }

    /// Hops from the root, `None` when unreachable.
    pub fn depth(&self, name: &str) -> Option<usize> {
        self.entry(name).ok().map(|entry| entry.depth)
    }

    /// Nearest transformer between `name` and the source.
    ///
    /// `Ok(None)` means the vertex sits on the backbone with no transformer
    /// in between; an unreachable vertex is [`GridError::Disconnected`].
    pub fn get_upstream_transformer(&self, name: &str) -> GridResult<Option<&str>> {
        Ok(self.entry(name)?.transformer.as_deref())
    }

    /// Hops from `name` up to the root, nearest first.
    pub fn path_to_source(&self, name: &str) -> GridResult<Vec<Hop>> {
        let mut hops = Vec::new();
        let mut entry = self.entry(name)?;
        while let Some((parent, hop)) = &entry.parent {
            hops.push(hop.clone());
            entry = self
                .entries
                .get(parent)
                .ok_or_else(|| GridError::Topology(format!("broken parent chain at {name}")))?;
        }
        Ok(hops)
    }
}

/// One-shot query without keeping the index around.
pub fn get_upstream_transformer(graph: &NetworkGraph, name: &str) -> GridResult<Option<String>> {
    UpstreamIndex::build(graph)
        .get_upstream_transformer(name)
        .map(|tx| tx.map(str::to_string))
}
