//! Queryable snapshot of a metadata propagation run

use std::collections::HashMap;

use serde::Serialize;

use conflux_core::{ComponentRef, EdgeId, EdgeRef, GraphId, Metadata, Pipeline};

/// Outcome for one edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeResolution {
    /// Edge id
    pub edge: EdgeId,
    /// Resolved metadata, `None` when nothing could be inferred
    pub metadata: Option<Metadata>,
    /// What the edge would carry without its own assignment; absent when
    /// the hint was not calculated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_metadata: Option<Option<Metadata>>,
}

/// Outcomes for one graph
#[derive(Debug, Clone, Serialize)]
pub struct GraphResolution {
    /// Graph id
    pub graph: GraphId,
    /// Graph name
    pub name: String,
    /// Hosting component, for nested graphs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ComponentRef>,
    /// Edges in insertion order
    pub edges: Vec<EdgeResolution>,
    #[serde(skip)]
    index: HashMap<EdgeId, usize>,
}

impl GraphResolution {
    /// Outcome for an edge of this graph
    pub fn edge(&self, edge: &str) -> Option<&EdgeResolution> {
        self.index.get(edge).map(|&i| &self.edges[i])
    }
}

/// Immutable result of [`propagate_metadata`](crate::propagate_metadata).
///
/// Graphs are kept in tree walk order (root first, depth-first, children in
/// host order), which is also the search order of the `*_recursive` lookups.
#[derive(Debug, Clone, Serialize)]
pub struct PropagationResult {
    graphs: Vec<GraphResolution>,
    #[serde(skip)]
    slots: HashMap<GraphId, usize>,
}

impl PropagationResult {
    pub(crate) fn new(
        pipeline: &Pipeline,
        order: &[GraphId],
        mut resolved: HashMap<EdgeRef, Option<Metadata>>,
        mut no_metadata: Option<HashMap<EdgeRef, Option<Metadata>>>,
    ) -> Self {
        let mut graphs = Vec::with_capacity(order.len());
        for &id in order {
            let Some(graph) = pipeline.graph(id) else {
                continue;
            };

            let mut edges = Vec::with_capacity(graph.edges().len());
            let mut index = HashMap::with_capacity(graph.edges().len());
            for edge in graph.edges() {
                let at = EdgeRef::new(id, edge.id().clone());
                index.insert(edge.id().clone(), edges.len());
                edges.push(EdgeResolution {
                    edge: edge.id().clone(),
                    metadata: resolved.remove(&at).flatten(),
                    no_metadata: no_metadata
                        .as_mut()
                        .map(|hints| hints.remove(&at).flatten()),
                });
            }

            graphs.push(GraphResolution {
                graph: id,
                name: graph.name().to_string(),
                parent: graph.parent().cloned(),
                edges,
                index,
            });
        }

        let slots = graphs
            .iter()
            .enumerate()
            .map(|(slot, g)| (g.graph, slot))
            .collect();
        Self { graphs, slots }
    }

    /// Per-graph outcomes in tree walk order
    pub fn graphs(&self) -> &[GraphResolution] {
        &self.graphs
    }

    /// Outcomes for one graph
    pub fn graph(&self, graph: GraphId) -> Option<&GraphResolution> {
        self.slots.get(&graph).map(|&slot| &self.graphs[slot])
    }

    /// Metadata of a root-graph edge
    pub fn metadata(&self, edge: &str) -> Option<&Metadata> {
        self.metadata_in(GraphId::ROOT, edge)
    }

    /// Metadata of an edge in a given graph
    pub fn metadata_in(&self, graph: GraphId, edge: &str) -> Option<&Metadata> {
        self.graph(graph)?.edge(edge)?.metadata.as_ref()
    }

    /// Metadata of an edge anywhere in the tree
    pub fn metadata_at(&self, edge: &EdgeRef) -> Option<&Metadata> {
        self.metadata_in(edge.graph, edge.edge.as_str())
    }

    /// Metadata of the first edge named `edge` in tree walk order
    pub fn metadata_recursive(&self, edge: &str) -> Option<&Metadata> {
        let at = self.find_recursive(edge)?;
        self.metadata_at(&at)
    }

    /// Locate the first edge named `edge` in tree walk order
    pub fn find_recursive(&self, edge: &str) -> Option<EdgeRef> {
        self.graphs
            .iter()
            .find(|g| g.index.contains_key(edge))
            .map(|g| EdgeRef::new(g.graph, edge))
    }

    /// No-metadata hint of a root-graph edge. The outer `None` means the hint
    /// was not calculated.
    pub fn no_metadata(&self, edge: &str) -> Option<Option<&Metadata>> {
        self.no_metadata_at(&EdgeRef::new(GraphId::ROOT, edge))
    }

    /// No-metadata hint of an edge anywhere in the tree
    pub fn no_metadata_at(&self, edge: &EdgeRef) -> Option<Option<&Metadata>> {
        self.graph(edge.graph)?
            .edge(edge.edge.as_str())?
            .no_metadata
            .as_ref()
            .map(Option::as_ref)
    }

    /// Every edge with its resolved metadata, in tree walk order
    pub fn iter(&self) -> impl Iterator<Item = (EdgeRef, Option<&Metadata>)> + '_ {
        self.graphs.iter().flat_map(|g| {
            g.edges
                .iter()
                .map(move |e| (EdgeRef::new(g.graph, e.edge.clone()), e.metadata.as_ref()))
        })
    }

    /// Edges nothing could be inferred for
    pub fn unresolved(&self) -> impl Iterator<Item = EdgeRef> + '_ {
        self.iter()
            .filter(|(_, metadata)| metadata.is_none())
            .map(|(edge, _)| edge)
    }

    /// Number of edges with resolved metadata
    pub fn resolved_count(&self) -> usize {
        self.iter().filter(|(_, metadata)| metadata.is_some()).count()
    }

    /// Number of edges in the tree
    pub fn len(&self) -> usize {
        self.graphs.iter().map(|g| g.edges.len()).sum()
    }

    /// Whether the tree has no edges
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
