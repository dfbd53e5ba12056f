//! Graph model
//!
//! A [`Pipeline`] is an arena owning every [`Graph`] of one pipeline
//! definition: the root graph plus one graph per subgraph host, nested to
//! any depth. Graphs own their components and edges; everything refers to
//! everything else by id.
//!
//! ```text
//! Pipeline
//!  ├── Graph #0 (root)      components, edges
//!  │     └── host ──link──▶ Graph #1   components (incl. boundaries), edges
//!  │                          └── host ──link──▶ Graph #2 ...
//! ```

use std::collections::HashMap;

use crate::component::{Component, ComponentKind, Direction, SubgraphLink};
use crate::edge::{Edge, EdgeCache, Endpoint};
use crate::error::{Error, Result};
use crate::ids::{ComponentId, ComponentRef, EdgeId, EdgeRef, GraphId};
use crate::metadata::Metadata;

/// Components and edges of one (possibly nested) graph
#[derive(Debug, Clone)]
pub struct Graph {
    id: GraphId,
    name: String,
    parent: Option<ComponentRef>,
    components: Vec<Component>,
    component_index: HashMap<ComponentId, usize>,
    edges: Vec<Edge>,
    edge_index: HashMap<EdgeId, usize>,
}

impl Graph {
    fn new(id: GraphId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            components: Vec::new(),
            component_index: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
        }
    }

    /// Graph id within its pipeline
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Graph name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hosting component, for nested graphs
    pub fn parent(&self) -> Option<&ComponentRef> {
        self.parent.as_ref()
    }

    /// Components in insertion order
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Edges in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Look up a component
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.component_index.get(id).map(|&i| &self.components[i])
    }

    /// Look up an edge
    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edge_index.get(id).map(|&i| &self.edges[i])
    }

    /// Whether the graph contains an edge with this id
    pub fn contains_edge(&self, id: &str) -> bool {
        self.edge_index.contains_key(id)
    }

    /// Edge connected to a component port
    pub fn edge_at(&self, component: &str, direction: Direction, port: usize) -> Option<&Edge> {
        self.component(component)
            .and_then(|c| c.edge_at(direction, port))
            .and_then(|edge| self.edge(edge.as_str()))
    }

    /// Mutable access to one edge's analysis caches
    pub fn edge_cache_mut(&mut self, id: &str) -> Option<&mut EdgeCache> {
        let index = *self.edge_index.get(id)?;
        Some(self.edges[index].cache_mut())
    }

    /// Clear the analysis caches of every edge in this graph (not nested graphs)
    pub fn reset(&mut self) {
        for edge in &mut self.edges {
            edge.reset();
        }
    }

    fn add_component(&mut self, component: Component) -> Result<()> {
        if self.component_index.contains_key(component.id().as_str()) {
            return Err(Error::DuplicateId {
                graph: self.name.clone(),
                kind: "component",
                id: component.id().to_string(),
            });
        }
        self.component_index
            .insert(component.id().clone(), self.components.len());
        self.components.push(component);
        Ok(())
    }

    fn add_edge(&mut self, edge: Edge) -> Result<()> {
        if self.edge_index.contains_key(edge.id().as_str()) {
            return Err(Error::DuplicateId {
                graph: self.name.clone(),
                kind: "edge",
                id: edge.id().to_string(),
            });
        }

        // Check both ends before touching any port slot.
        if let Some(source) = edge.source() {
            self.check_free_port(edge.id(), source, Direction::Output)?;
        }
        if let Some(sink) = edge.sink() {
            self.check_free_port(edge.id(), sink, Direction::Input)?;
        }

        if let Some(source) = edge.source() {
            self.occupy_port(source, Direction::Output, edge.id());
        }
        if let Some(sink) = edge.sink() {
            self.occupy_port(sink, Direction::Input, edge.id());
        }

        self.edge_index.insert(edge.id().clone(), self.edges.len());
        self.edges.push(edge);
        Ok(())
    }

    fn check_free_port(&self, edge: &EdgeId, endpoint: &Endpoint, direction: Direction) -> Result<()> {
        let component =
            self.component(endpoint.component.as_str())
                .ok_or_else(|| Error::UnknownComponent {
                    graph: self.name.clone(),
                    edge: edge.to_string(),
                    component: endpoint.component.to_string(),
                })?;

        if endpoint.port >= component.port_count(direction) {
            return Err(Error::DanglingPort {
                graph: self.name.clone(),
                edge: edge.to_string(),
                component: endpoint.component.to_string(),
                direction: direction.as_str(),
                port: endpoint.port,
            });
        }

        if let Some(existing) = component.edge_at(direction, endpoint.port) {
            return Err(Error::PortInUse {
                graph: self.name.clone(),
                component: endpoint.component.to_string(),
                direction: direction.as_str(),
                port: endpoint.port,
                existing: existing.to_string(),
            });
        }
        Ok(())
    }

    fn occupy_port(&mut self, endpoint: &Endpoint, direction: Direction, edge: &EdgeId) {
        if let Some(&index) = self.component_index.get(endpoint.component.as_str())
            && let Some(slot) = self.components[index].port_slot_mut(direction, endpoint.port)
        {
            *slot = Some(edge.clone());
        }
    }

    fn remove_component(&mut self, id: &str) -> Option<Component> {
        let index = self.component_index.remove(id)?;
        let component = self.components.remove(index);
        for (i, c) in self.components.iter().enumerate().skip(index) {
            self.component_index.insert(c.id().clone(), i);
        }

        for edge in &mut self.edges {
            if edge.source().is_some_and(|s| s.component.as_str() == id) {
                edge.clear_source();
            }
            if edge.sink().is_some_and(|s| s.component.as_str() == id) {
                edge.clear_sink();
            }
        }
        Some(component)
    }

    fn check_endpoint(&self, edge: &Edge, endpoint: &Endpoint, direction: Direction) -> Result<()> {
        let component =
            self.component(endpoint.component.as_str())
                .ok_or_else(|| Error::UnknownComponent {
                    graph: self.name.clone(),
                    edge: edge.id().to_string(),
                    component: endpoint.component.to_string(),
                })?;

        if component.edge_at(direction, endpoint.port) != Some(edge.id()) {
            return Err(Error::DanglingPort {
                graph: self.name.clone(),
                edge: edge.id().to_string(),
                component: endpoint.component.to_string(),
                direction: direction.as_str(),
                port: endpoint.port,
            });
        }
        Ok(())
    }
}

/// Arena of every graph belonging to one pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    graphs: Vec<Graph>,
}

impl Pipeline {
    /// Create a pipeline with an empty root graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            graphs: vec![Graph::new(GraphId::ROOT, name)],
        }
    }

    /// Pipeline name (the root graph's name)
    pub fn name(&self) -> &str {
        self.root().name()
    }

    /// The root graph
    pub fn root(&self) -> &Graph {
        &self.graphs[GraphId::ROOT.index()]
    }

    /// Every graph, root first, in creation order
    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }

    /// Look up a graph
    pub fn graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.get(id.index())
    }

    /// Mutable access to a graph (caches and reset only; structure changes go through the pipeline)
    pub fn graph_mut(&mut self, id: GraphId) -> Option<&mut Graph> {
        self.graphs.get_mut(id.index())
    }

    /// Look up an edge anywhere in the arena
    pub fn edge(&self, edge: &EdgeRef) -> Option<&Edge> {
        self.graph(edge.graph)?.edge(edge.edge.as_str())
    }

    /// Look up a component anywhere in the arena
    pub fn component(&self, component: &ComponentRef) -> Option<&Component> {
        self.graph(component.graph)?
            .component(component.component.as_str())
    }

    /// Create an empty graph that a subgraph host will link to.
    ///
    /// Build the nested graph (including its two boundary components) first,
    /// then add the host with [`Pipeline::add_component`].
    pub fn add_graph(&mut self, name: impl Into<String>) -> GraphId {
        let id = GraphId(self.graphs.len());
        self.graphs.push(Graph::new(id, name));
        id
    }

    /// Add a component to a graph. Subgraph hosts are checked against their
    /// nested graph and become its parent.
    pub fn add_component(&mut self, graph: GraphId, component: Component) -> Result<()> {
        let target = self.graph(graph).ok_or(Error::UnknownGraph(graph.index()))?;
        if target.component_index.contains_key(component.id().as_str()) {
            return Err(Error::DuplicateId {
                graph: target.name.clone(),
                kind: "component",
                id: component.id().to_string(),
            });
        }

        if let ComponentKind::Subgraph(link) = component.kind() {
            self.check_subgraph_link(graph, &component, link)?;
            let parent = ComponentRef::new(graph, component.id().clone());
            self.graphs[link.graph.index()].parent = Some(parent);
        }

        self.graphs[graph.index()].add_component(component)
    }

    /// Add an edge to a graph, connecting its endpoints' ports
    pub fn add_edge(&mut self, graph: GraphId, edge: Edge) -> Result<()> {
        self.graph_mut(graph)
            .ok_or(Error::UnknownGraph(graph.index()))?
            .add_edge(edge)
    }

    /// Replace (or clear) an edge's directly assigned metadata. Resets the graph tree.
    pub fn set_edge_metadata(&mut self, edge: &EdgeRef, metadata: Option<Metadata>) -> Result<()> {
        let graph = self
            .graph_mut(edge.graph)
            .ok_or(Error::UnknownGraph(edge.graph.index()))?;
        let index = *graph
            .edge_index
            .get(edge.edge.as_str())
            .ok_or_else(|| Error::InvalidDefinition {
                pipeline: graph.name.clone(),
                message: format!("no edge '{}'", edge.edge),
            })?;
        graph.edges[index].set_metadata(metadata);
        self.reset_all();
        Ok(())
    }

    /// Remove a component. Its edges stay in the graph with the
    /// corresponding endpoint cleared. Resets the graph tree.
    pub fn remove_component(&mut self, component: &ComponentRef) -> Result<Component> {
        let graph = self
            .graph_mut(component.graph)
            .ok_or(Error::UnknownGraph(component.graph.index()))?;
        let removed = graph
            .remove_component(component.component.as_str())
            .ok_or_else(|| Error::InvalidDefinition {
                pipeline: graph.name.clone(),
                message: format!("no component '{}'", component.component),
            })?;

        if let Some(link) = removed.subgraph_link() {
            self.graphs[link.graph.index()].parent = None;
        }
        self.reset_all();
        Ok(removed)
    }

    /// Graphs hosted directly by components of `graph`, in component order
    pub fn children(&self, graph: GraphId) -> Vec<GraphId> {
        self.graph(graph)
            .map(|g| {
                g.components()
                    .iter()
                    .filter_map(Component::subgraph_link)
                    .map(|link| link.graph)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Clear every edge cache in `graph` and all graphs nested below it
    pub fn reset(&mut self, graph: GraphId) {
        let mut stack = vec![graph];
        while let Some(id) = stack.pop() {
            stack.extend(self.children(id));
            if let Some(g) = self.graph_mut(id) {
                g.reset();
            }
        }
    }

    /// Clear every edge cache in the pipeline
    pub fn reset_all(&mut self) {
        for graph in &mut self.graphs {
            graph.reset();
        }
    }

    /// Re-check the structural invariants of every graph reachable from the root.
    pub fn validate(&self) -> Result<()> {
        let mut stack = vec![GraphId::ROOT];
        while let Some(id) = stack.pop() {
            let graph = self.graph(id).ok_or(Error::UnknownGraph(id.index()))?;

            for edge in graph.edges() {
                if let Some(source) = edge.source() {
                    graph.check_endpoint(edge, source, Direction::Output)?;
                }
                if let Some(sink) = edge.sink() {
                    graph.check_endpoint(edge, sink, Direction::Input)?;
                }
            }

            for component in graph.components() {
                if let Some(link) = component.subgraph_link() {
                    self.check_boundaries(id, component, link)?;
                    stack.push(link.graph);
                }
            }
        }
        Ok(())
    }

    fn check_subgraph_link(&self, graph: GraphId, host: &Component, link: &SubgraphLink) -> Result<()> {
        let invalid = |message: String| Error::InvalidSubgraph {
            graph: self.graphs[graph.index()].name.clone(),
            component: host.id().to_string(),
            message,
        };

        let inner = self
            .graph(link.graph)
            .ok_or(Error::UnknownGraph(link.graph.index()))?;
        if link.graph == GraphId::ROOT {
            return Err(invalid("cannot host the root graph".to_string()));
        }
        if inner.parent.is_some() {
            return Err(invalid(format!(
                "graph '{}' is already hosted by another component",
                inner.name
            )));
        }

        // The host's graph must not sit inside the graph it is about to host.
        let mut ancestor = Some(graph);
        while let Some(id) = ancestor {
            if id == link.graph {
                return Err(invalid(format!(
                    "graph '{}' would contain itself",
                    inner.name
                )));
            }
            ancestor = self.graphs[id.index()].parent.as_ref().map(|p| p.graph);
        }

        self.check_boundaries(graph, host, link)
    }

    fn check_boundaries(&self, graph: GraphId, host: &Component, link: &SubgraphLink) -> Result<()> {
        let invalid = |message: String| Error::InvalidSubgraph {
            graph: self.graphs[graph.index()].name.clone(),
            component: host.id().to_string(),
            message,
        };

        let inner = self
            .graph(link.graph)
            .ok_or(Error::UnknownGraph(link.graph.index()))?;

        let input = inner
            .component(link.input.as_str())
            .filter(|c| matches!(c.kind(), ComponentKind::SubgraphInput))
            .ok_or_else(|| {
                invalid(format!(
                    "graph '{}' has no subgraph input component '{}'",
                    inner.name, link.input
                ))
            })?;
        let output = inner
            .component(link.output.as_str())
            .filter(|c| matches!(c.kind(), ComponentKind::SubgraphOutput))
            .ok_or_else(|| {
                invalid(format!(
                    "graph '{}' has no subgraph output component '{}'",
                    inner.name, link.output
                ))
            })?;

        if input.output_count() != host.input_count() {
            return Err(invalid(format!(
                "host has {} input ports but boundary '{}' exposes {}",
                host.input_count(),
                input.id(),
                input.output_count()
            )));
        }
        if output.input_count() != host.output_count() {
            return Err(invalid(format!(
                "host has {} output ports but boundary '{}' exposes {}",
                host.output_count(),
                output.id(),
                output.input_count()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::TransportMode;
    use crate::metadata::RecordSchema;

    fn chain() -> Pipeline {
        let mut p = Pipeline::new("chain");
        let root = GraphId::ROOT;
        p.add_component(root, Component::standard("a").with_ports(0, 1))
            .unwrap();
        p.add_component(root, Component::pass_through("b").with_ports(1, 1))
            .unwrap();
        p.add_component(root, Component::standard("c").with_ports(1, 0))
            .unwrap();
        p.add_edge(root, Edge::new("e1", Endpoint::new("a", 0), Endpoint::new("b", 0)))
            .unwrap();
        p.add_edge(root, Edge::new("e2", Endpoint::new("b", 0), Endpoint::new("c", 0)))
            .unwrap();
        p
    }

    fn nested(p: &mut Pipeline, name: &str) -> GraphId {
        let inner = p.add_graph(name);
        p.add_component(inner, Component::subgraph_input("in").with_ports(0, 1))
            .unwrap();
        p.add_component(inner, Component::subgraph_output("out").with_ports(1, 0))
            .unwrap();
        p.add_edge(inner, Edge::new("i1", Endpoint::new("in", 0), Endpoint::new("out", 0)))
            .unwrap();
        inner
    }

    fn link(graph: GraphId) -> SubgraphLink {
        SubgraphLink {
            graph,
            input: "in".into(),
            output: "out".into(),
        }
    }

    #[test]
    fn test_ports_record_connected_edges() {
        let p = chain();
        let b = p.root().component("b").unwrap();
        assert_eq!(b.input_edge(0).map(EdgeId::as_str), Some("e1"));
        assert_eq!(b.output_edge(0).map(EdgeId::as_str), Some("e2"));
        assert_eq!(
            p.root().edge_at("c", Direction::Input, 0).map(|e| e.id().as_str()),
            Some("e2")
        );
        p.validate().unwrap();
    }

    #[test]
    fn test_port_accepts_only_one_edge() {
        let mut p = chain();
        let err = p
            .add_edge(
                GraphId::ROOT,
                Edge::new("e3", Endpoint::new("a", 0), Endpoint::new("c", 0)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::PortInUse { .. }));
        // Nothing was connected by the failed call.
        assert!(!p.root().contains_edge("e3"));
    }

    #[test]
    fn test_out_of_range_port_is_dangling() {
        let mut p = chain();
        let err = p
            .add_edge(
                GraphId::ROOT,
                Edge::new("e3", Endpoint::new("a", 7), Endpoint::new("c", 0)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::DanglingPort { port: 7, .. }));
        assert!(err.is_structural());
    }

    #[test]
    fn test_unknown_component_rejected() {
        let mut p = chain();
        let err = p
            .add_edge(
                GraphId::ROOT,
                Edge::new("e3", Endpoint::new("ghost", 0), Endpoint::new("c", 0)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownComponent { .. }));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut p = chain();
        let err = p
            .add_component(GraphId::ROOT, Component::standard("a"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId { kind: "component", .. }));
    }

    #[test]
    fn test_subgraph_host_becomes_parent() {
        let mut p = Pipeline::new("outer");
        let inner = nested(&mut p, "inner");
        p.add_component(
            GraphId::ROOT,
            Component::subgraph("host", link(inner)).with_ports(1, 1),
        )
        .unwrap();

        assert_eq!(
            p.graph(inner).unwrap().parent(),
            Some(&ComponentRef::new(GraphId::ROOT, "host"))
        );
        assert_eq!(p.children(GraphId::ROOT), vec![inner]);
        p.validate().unwrap();
    }

    #[test]
    fn test_subgraph_port_count_mismatch() {
        let mut p = Pipeline::new("outer");
        let inner = nested(&mut p, "inner");
        let err = p
            .add_component(
                GraphId::ROOT,
                Component::subgraph("host", link(inner)).with_ports(2, 1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSubgraph { .. }));
    }

    #[test]
    fn test_graph_cannot_be_hosted_twice() {
        let mut p = Pipeline::new("outer");
        let inner = nested(&mut p, "inner");
        p.add_component(
            GraphId::ROOT,
            Component::subgraph("h1", link(inner)).with_ports(1, 1),
        )
        .unwrap();
        let err = p
            .add_component(
                GraphId::ROOT,
                Component::subgraph("h2", link(inner)).with_ports(1, 1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSubgraph { .. }));
    }

    #[test]
    fn test_graph_cannot_host_itself() {
        let mut p = Pipeline::new("outer");
        let inner = nested(&mut p, "inner");
        let err = p
            .add_component(inner, Component::subgraph("self", link(inner)).with_ports(1, 1))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSubgraph { .. }));
    }

    #[test]
    fn test_reset_clears_nested_caches() {
        let mut p = Pipeline::new("outer");
        let inner = nested(&mut p, "inner");
        p.add_component(
            GraphId::ROOT,
            Component::subgraph("host", link(inner)).with_ports(1, 1),
        )
        .unwrap();

        p.graph_mut(inner)
            .unwrap()
            .edge_cache_mut("i1")
            .unwrap()
            .transport = Some(TransportMode::Direct);
        assert_eq!(
            p.edge(&EdgeRef::new(inner, "i1")).unwrap().transport(),
            Some(TransportMode::Direct)
        );

        p.reset(GraphId::ROOT);
        assert_eq!(p.edge(&EdgeRef::new(inner, "i1")).unwrap().transport(), None);
    }

    #[test]
    fn test_remove_component_leaves_dangling_edges() {
        let mut p = chain();
        p.remove_component(&ComponentRef::new(GraphId::ROOT, "b"))
            .unwrap();

        let e1 = p.root().edge("e1").unwrap();
        let e2 = p.root().edge("e2").unwrap();
        assert!(e1.source().is_some());
        assert!(e1.sink().is_none());
        assert!(e2.source().is_none());
        assert!(p.root().component("c").is_some());
        p.validate().unwrap();
    }

    #[test]
    fn test_set_edge_metadata_resets_caches() {
        let mut p = chain();
        p.graph_mut(GraphId::ROOT)
            .unwrap()
            .edge_cache_mut("e2")
            .unwrap()
            .metadata = Some(None);

        let schema = Metadata::new(RecordSchema::new("row"));
        p.set_edge_metadata(&EdgeRef::new(GraphId::ROOT, "e1"), Some(schema.clone()))
            .unwrap();

        assert_eq!(p.root().edge("e1").unwrap().metadata(), Some(&schema));
        assert_eq!(p.root().edge("e2").unwrap().resolved_metadata(), None);
    }
}
